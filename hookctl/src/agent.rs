//! # Agent
//!
//! Startup sequence and main control loop.

use std::{io, path::Path, time::Duration};

use anyhow::{bail, Context, Result};
use log::{debug, info, warn};

use crate::{
    cli::Cli,
    core::{
        bootstrap::{install_shutdown_handlers, raise_memory_lock_limit},
        channel::UnavailableClient,
        events::{EventReader, EventSource, PollResult, EVENTS_POLL_TIMEOUT_MS},
        maps::{SessionMap, SessionTargetSource},
        modules::{HookManager, ModuleConfig, ModuleManager},
        program::{events_map, load_and_verify, open_program},
    },
    dispatch::Dispatcher,
    helpers::{logger::forward_libbpf_output, net::ifindex_from_name, signals::Running},
};

/// Sets everything up and runs the control loop until termination is
/// requested or polling fails.
pub(crate) fn run(cli: &Cli) -> Result<()> {
    raise_memory_lock_limit()?;
    let run = install_shutdown_handlers()?;
    forward_libbpf_output(cli.verbose);

    let ifindex = match &cli.iface {
        Some(name) => Some(ifindex_from_name(name)?),
        None => None,
    };

    let obj = load_and_verify(open_program(&cli.object)?)?;

    let session = open_session_map(&cli.map_pin)?;

    let config = ModuleConfig::new(ifindex);
    // Take our own reference on the channel map before the object is handed
    // over to the manager.
    let channel = events_map(&obj)?;

    let mut modules = HookManager::new(obj, config);
    if let Err(e) = modules.setup_all() {
        warn!("Initial hooks setup incomplete: {e}");
    }

    let mut dispatcher = Dispatcher::new(
        modules,
        UnavailableClient,
        session,
        Box::new(io::stdout()),
    );
    // Dropping the reader releases the dispatcher, hence unhooks everything
    // and releases the program.
    let mut reader = EventReader::new(channel, move |event| {
        if let Err(e) = dispatcher.dispatch(&event) {
            debug!("Event dropped: {e}");
        }
    })
    .context("Failed to set up the events channel")?;

    info!("Filter set and ready");
    poll_loop(&mut reader, &run)
}

/// Resolves and validates the session map, then reports it. An incompatible
/// map is fatal: nothing is hooked and no event is read.
fn open_session_map(path: &Path) -> Result<SessionMap> {
    let (session, desc) = SessionMap::open(path)
        .with_context(|| format!("Invalid session map {}", path.display()))?;

    info!("Session map: {desc}");
    match session.session_target() {
        Ok(Some(target)) => info!(
            "Session entry: active:{} endpoint:{}",
            target.active, target.addr
        ),
        Ok(None) => info!("Session entry: none"),
        Err(e) => warn!("Could not read the session entry: {e}"),
    }

    Ok(session)
}

/// Polls `source` until termination is requested. An interrupted poll ends
/// the loop successfully, any other polling error is fatal.
pub(crate) fn poll_loop<S: EventSource>(source: &mut S, run: &Running) -> Result<()> {
    let timeout = Duration::from_millis(EVENTS_POLL_TIMEOUT_MS);

    while run.running() {
        match source.poll(timeout) {
            PollResult::Progress(_) => (),
            PollResult::Interrupted => {
                info!("Interrupted, exiting");
                break;
            }
            PollResult::Error(code) => bail!("Error polling ring buffer: {code}"),
        }
    }

    Ok(())
}
