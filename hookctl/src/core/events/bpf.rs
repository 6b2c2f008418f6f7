//! Handles the ring buffer polling and the framing of raw records into events.
//!
//! A ring buffer is used to convey events from the kernel program to userspace.
//! Records are processed synchronously from the polling call, in the order the
//! kernel program emitted them. This matters as commands reconfiguring the
//! hooks must be applied in the order the kernel observed them.

use std::time::Duration;

use anyhow::{bail, Result};
use libbpf_rs::MapCore;
use log::error;
use nix::errno::Errno;

use crate::events::Event;

/// Timeout when polling for new events from BPF.
pub(crate) const EVENTS_POLL_TIMEOUT_MS: u64 = 100;

/// The return value of EventSource::poll().
#[derive(Debug, Eq, PartialEq)]
pub(crate) enum PollResult {
    /// Number of records consumed, possibly 0 if the timeout went off.
    Progress(usize),
    /// The poll call was interrupted, usually by a signal.
    Interrupted,
    /// Polling failed, holds the negative error code.
    Error(i32),
}

impl PollResult {
    /// Converts the raw return value of a ring buffer poll.
    pub(crate) fn from_raw(ret: i32) -> Self {
        match ret {
            n if n >= 0 => PollResult::Progress(n as usize),
            e if e == -(Errno::EINTR as i32) => PollResult::Interrupted,
            e => PollResult::Error(e),
        }
    }
}

/// Source of events polled by the control loop.
pub(crate) trait EventSource {
    /// Waits up to `timeout` for events, processing all available ones.
    fn poll(&mut self, timeout: Duration) -> PollResult;
}

/// Frames a raw record and hands it to `on_event`. Records that can't be
/// framed are reported and skipped, one bad record must not stop the stream.
pub(crate) fn process_raw<F>(data: &[u8], on_event: &mut F)
where
    F: FnMut(Event),
{
    match Event::from_bytes(data) {
        Ok(event) => on_event(event),
        Err(e) => error!("Could not parse raw event: {e}"),
    }
}

/// Reader of the kernel to userspace event channel.
pub(crate) struct EventReader {
    rb: libbpf_rs::RingBuffer<'static>,
    // Declared after the ring buffer so it is released last.
    _map: libbpf_rs::MapHandle,
}

impl EventReader {
    /// Binds a reader to a ring buffer map. `on_event` is called once per
    /// record, from within `poll()`.
    pub(crate) fn new<F>(map: libbpf_rs::MapHandle, mut on_event: F) -> Result<Self>
    where
        F: FnMut(Event) + 'static,
    {
        if map.map_type() != libbpf_rs::MapType::RingBuf {
            bail!("Events map is not a ring buffer ({:?})", map.map_type());
        }

        let mut rb = libbpf_rs::RingBufferBuilder::new();
        rb.add(&map, move |data: &[u8]| -> i32 {
            process_raw(data, &mut on_event);
            0
        })?;
        let rb = rb.build()?;

        Ok(Self { rb, _map: map })
    }
}

impl EventSource for EventReader {
    fn poll(&mut self, timeout: Duration) -> PollResult {
        PollResult::from_raw(self.rb.poll_raw(timeout))
    }
}
