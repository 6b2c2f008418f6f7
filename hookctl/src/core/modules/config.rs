use std::fmt;

use libbpf_rs::{ProgramType, XdpFlags};

/// Families of kernel hooks, managed as a unit.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub(crate) enum HookFamily {
    /// XDP programs, attached to a network interface.
    NetFilter,
    /// Scheduler tracepoints.
    Sched,
    /// Remaining tracing programs (syscalls and VFS probes).
    Fs,
}

impl HookFamily {
    pub(crate) const ALL: [HookFamily; 3] = [HookFamily::NetFilter, HookFamily::Sched, HookFamily::Fs];

    /// Classifies a program of the kernel object into a family, using its type
    /// and ELF section. Programs not belonging to any family (e.g. tc programs
    /// attached by external tools) are left alone.
    pub(crate) fn classify(prog_type: ProgramType, section: &str) -> Option<Self> {
        match prog_type {
            ProgramType::Xdp => Some(HookFamily::NetFilter),
            ProgramType::Tracepoint | ProgramType::RawTracepoint
                if section
                    .split_once('/')
                    .is_some_and(|(_, target)| target.starts_with("sched")) =>
            {
                Some(HookFamily::Sched)
            }
            ProgramType::Tracepoint
            | ProgramType::RawTracepoint
            | ProgramType::Kprobe
            | ProgramType::Tracing
            | ProgramType::Lsm => Some(HookFamily::Fs),
            _ => None,
        }
    }
}

impl fmt::Display for HookFamily {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            HookFamily::NetFilter => write!(f, "network-filter"),
            HookFamily::Sched => write!(f, "scheduler"),
            HookFamily::Fs => write!(f, "filesystem"),
        }
    }
}

/// Network filter configuration.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct NetFilterConfig {
    pub(crate) enabled: bool,
    /// Interface the XDP programs are attached to. The family can't be set up
    /// without one.
    pub(crate) ifindex: Option<u32>,
    /// Raw XDP attach flags.
    pub(crate) flags: u32,
}

/// Hooks configuration, per family. Built once by the control loop and then
/// owned by the module manager.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct ModuleConfig {
    pub(crate) net_filter: NetFilterConfig,
    pub(crate) sched: bool,
    pub(crate) fs: bool,
}

impl ModuleConfig {
    /// Initial configuration: all families enabled, the network filter only if
    /// an interface was given.
    pub(crate) fn new(ifindex: Option<u32>) -> Self {
        Self {
            net_filter: NetFilterConfig {
                enabled: ifindex.is_some(),
                ifindex,
                flags: XdpFlags::REPLACE.bits(),
            },
            sched: true,
            fs: true,
        }
    }

    pub(crate) fn enabled(&self, family: HookFamily) -> bool {
        match family {
            HookFamily::NetFilter => self.net_filter.enabled,
            HookFamily::Sched => self.sched,
            HookFamily::Fs => self.fs,
        }
    }

    /// Enables or disables all families at once.
    pub(crate) fn set_all(&mut self, enabled: bool) {
        self.net_filter.enabled = enabled;
        self.sched = enabled;
        self.fs = enabled;
    }
}
