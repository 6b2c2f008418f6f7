//! # Channel
//!
//! Boundary with the encrypted channel client. The session protocol is owned
//! by the client implementation; the control plane only hands it an endpoint
//! and reports the outcome.

use anyhow::{bail, Result};

/// Client establishing and driving an outbound encrypted session.
pub(crate) trait ChannelClient {
    /// Runs a session to `host:port`, returning once it ends.
    fn run(&mut self, host: &str, port: u16) -> Result<()>;
}

/// Client used when no session implementation is part of the build. Session
/// requests are refused and reported to the caller.
#[derive(Default)]
pub(crate) struct UnavailableClient;

impl ChannelClient for UnavailableClient {
    fn run(&mut self, host: &str, port: u16) -> Result<()> {
        bail!("No encrypted channel client available, can't reach {host}:{port}")
    }
}
