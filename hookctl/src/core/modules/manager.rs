use std::{collections::HashMap, os::fd::AsFd};

use anyhow::{anyhow, bail, Result};
use log::{debug, info, warn};

use super::config::*;

/// Operations needed to reconfigure the hooks at runtime.
pub(crate) trait ModuleManager {
    /// Marks all families as enabled. Doesn't install anything by itself.
    fn activate_all_config(&mut self);
    /// Marks all families as disabled. Doesn't remove anything by itself.
    fn deactivate_all_config(&mut self);
    /// Installs the programs of all enabled families not already installed.
    fn setup_all(&mut self) -> Result<()>;
    /// Removes all installed programs, regardless of the configuration.
    fn unhook_all(&mut self) -> Result<()>;
}

/// XDP program attached to an interface. XDP attachments are not links, they
/// have to be explicitly detached.
struct XdpAttachment {
    prog: String,
    ifindex: u32,
    flags: u32,
}

/// Module manager installing the programs of the loaded kernel object.
///
/// The manager owns the object; dropping it removes all hooks and unloads the
/// object.
pub(crate) struct HookManager {
    // Links must be dropped before the object, fields are dropped in
    // declaration order.
    /// Attached programs, per family. Dropping a link detaches its program.
    links: HashMap<HookFamily, Vec<libbpf_rs::Link>>,
    xdp: Vec<XdpAttachment>,
    config: ModuleConfig,
    obj: libbpf_rs::Object,
}

impl HookManager {
    pub(crate) fn new(obj: libbpf_rs::Object, config: ModuleConfig) -> Self {
        Self {
            links: HashMap::new(),
            xdp: Vec::new(),
            config,
            obj,
        }
    }

    fn attached(&self, family: HookFamily) -> bool {
        match family {
            HookFamily::NetFilter => !self.xdp.is_empty(),
            _ => self.links.get(&family).is_some_and(|l| !l.is_empty()),
        }
    }

    /// Installs all the programs of a family. Best effort: all programs are
    /// tried, the number of failures is reported.
    fn setup_family(&mut self, family: HookFamily) -> Result<()> {
        let net = self.config.net_filter.clone();
        if family == HookFamily::NetFilter && net.ifindex.is_none() {
            bail!("no network interface configured");
        }

        let mut links = Vec::new();
        let mut xdp = Vec::new();
        let mut failures = 0;

        for prog in self.obj.progs_mut() {
            let section = prog.section().to_string_lossy().into_owned();
            if HookFamily::classify(prog.prog_type(), &section) != Some(family) {
                continue;
            }
            let name = prog.name().to_string_lossy().into_owned();

            let res = match (family, net.ifindex) {
                (HookFamily::NetFilter, Some(ifindex)) => {
                    libbpf_rs::Xdp::new(prog.as_fd())
                        .attach(
                            ifindex as i32,
                            libbpf_rs::XdpFlags::from_bits_truncate(net.flags),
                        )
                        .map(|_| {
                            xdp.push(XdpAttachment {
                                prog: name.clone(),
                                ifindex,
                                flags: net.flags,
                            })
                        })
                }
                _ => prog.attach().map(|link| links.push(link)),
            };

            match res {
                Ok(_) => debug!("Attached {name} ({section}) to the {family} hooks"),
                Err(e) => {
                    warn!("Could not attach {name} ({section}): {e}");
                    failures += 1;
                }
            }
        }

        let attached = links.len() + xdp.len();
        self.links.entry(family).or_default().append(&mut links);
        self.xdp.append(&mut xdp);

        if failures > 0 {
            bail!("{failures} program(s) could not be attached");
        }
        info!("{family} hooks set up ({attached} program(s))");
        Ok(())
    }

    fn detach_xdp(&self, xdp: &XdpAttachment) -> Result<()> {
        let prog = self
            .obj
            .progs()
            .find(|p| p.name() == xdp.prog.as_str())
            .ok_or_else(|| anyhow!("Couldn't get program {}", xdp.prog))?;

        libbpf_rs::Xdp::new(prog.as_fd()).detach(
            xdp.ifindex as i32,
            libbpf_rs::XdpFlags::from_bits_truncate(xdp.flags),
        )?;
        Ok(())
    }
}

impl ModuleManager for HookManager {
    fn activate_all_config(&mut self) {
        self.config.set_all(true);
    }

    fn deactivate_all_config(&mut self) {
        self.config.set_all(false);
    }

    fn setup_all(&mut self) -> Result<()> {
        let mut failed = Vec::new();

        for family in HookFamily::ALL {
            if !self.config.enabled(family) {
                debug!("{family} hooks disabled, skipping");
                continue;
            }
            if self.attached(family) {
                debug!("{family} hooks already set up");
                continue;
            }

            if let Err(e) = self.setup_family(family) {
                warn!("Could not set up {family} hooks: {e}");
                failed.push(family.to_string());
            }
        }

        if !failed.is_empty() {
            bail!("failed to set up hooks: {}", failed.join(", "));
        }
        Ok(())
    }

    fn unhook_all(&mut self) -> Result<()> {
        let links = self.links.drain().map(|(_, l)| l.len()).sum::<usize>();

        let mut failures = 0;
        for xdp in std::mem::take(&mut self.xdp) {
            if let Err(e) = self.detach_xdp(&xdp) {
                warn!(
                    "Could not detach {} from interface {}: {e}",
                    xdp.prog, xdp.ifindex
                );
                failures += 1;
            }
        }

        if failures > 0 {
            bail!("{failures} XDP program(s) could not be detached");
        }
        debug!("{links} link(s) released");
        Ok(())
    }
}

impl Drop for HookManager {
    fn drop(&mut self) {
        if let Err(e) = self.unhook_all() {
            warn!("Could not remove all hooks: {e}");
        }
    }
}
