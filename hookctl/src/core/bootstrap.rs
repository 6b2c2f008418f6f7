//! # Bootstrap
//!
//! Privileged resources setup, to be performed before anything touches the
//! kernel program or its maps.

use anyhow::{anyhow, Result};
use nix::sys::resource::{setrlimit, Resource, RLIM_INFINITY};

use crate::helpers::signals::Running;

/// Lifts the limit on locked memory. This is needed for older kernels that
/// don't use the memcg based accounting, see https://lwn.net/Articles/837122/.
/// Maps creation would fail unpredictably later on otherwise, so there is no
/// degraded mode here.
pub(crate) fn raise_memory_lock_limit() -> Result<()> {
    setrlimit(Resource::RLIMIT_MEMLOCK, RLIM_INFINITY, RLIM_INFINITY)
        .map_err(|e| anyhow!("Failed to increase RLIMIT_MEMLOCK limit: {e}"))
}

/// Installs the shutdown signal handlers and returns the flag they control.
pub(crate) fn install_shutdown_handlers() -> Result<Running> {
    Running::new().map_err(|e| anyhow!("Failed to install signal handlers: {e}"))
}

#[cfg(test)]
mod tests {
    use nix::sys::resource::getrlimit;
    use serial_test::serial;

    use super::*;

    #[test]
    #[serial(libbpf)]
    #[cfg_attr(not(feature = "test_cap_bpf"), ignore)]
    fn memlock_unbounded() {
        assert!(raise_memory_lock_limit().is_ok());
        assert_eq!(
            getrlimit(Resource::RLIMIT_MEMLOCK).unwrap(),
            (RLIM_INFINITY, RLIM_INFINITY)
        );
    }
}
