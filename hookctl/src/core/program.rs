//! # Program
//!
//! Opening and loading of the kernel program object. The object is compiled
//! separately and loaded at runtime; opening it only parses the ELF while
//! loading pushes it into the kernel, which runs the verifier.
//!
//! There is no retry logic here: verifier failures are deterministic for a
//! given object and kernel.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use libbpf_rs::MapCore;

/// Default path of the kernel program object.
pub(crate) const DEFAULT_OBJECT: &str = "kit.bpf.o";
/// Name of the ring buffer map the kernel program reports events on. Please
/// keep in sync with its BPF counterpart.
pub(crate) const EVENTS_MAP_NAME: &str = "rb_comm";

/// Kernel program opened but not yet loaded.
pub(crate) struct OpenProgram {
    path: PathBuf,
    obj: libbpf_rs::OpenObject,
}

/// Opens the kernel program object at `path`.
pub(crate) fn open_program(path: &Path) -> Result<OpenProgram> {
    let obj = libbpf_rs::ObjectBuilder::default()
        .open_file(path)
        .with_context(|| format!("Failed to open BPF object {}", path.display()))?;

    Ok(OpenProgram {
        path: path.to_path_buf(),
        obj,
    })
}

/// Loads and verifies an opened program. On failure the partially loaded
/// object is released when `prog` goes out of scope.
pub(crate) fn load_and_verify(prog: OpenProgram) -> Result<libbpf_rs::Object> {
    let OpenProgram { path, obj } = prog;

    obj.load()
        .with_context(|| format!("Failed to load and verify BPF object {}", path.display()))
}

/// Retrieves a standalone handle on the events ring buffer of a loaded
/// program. The handle holds its own reference on the map.
pub(crate) fn events_map(obj: &libbpf_rs::Object) -> Result<libbpf_rs::MapHandle> {
    let map = obj
        .maps()
        .find(|m| m.name() == EVENTS_MAP_NAME)
        .ok_or_else(|| anyhow!("Map {EVENTS_MAP_NAME} not found in the BPF object"))?;

    if map.map_type() != libbpf_rs::MapType::RingBuf {
        bail!(
            "Map {EVENTS_MAP_NAME} is not a ring buffer ({:?})",
            map.map_type()
        );
    }

    Ok(libbpf_rs::MapHandle::try_from(&map)?)
}
