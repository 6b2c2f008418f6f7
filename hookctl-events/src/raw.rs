//! Raw layout of the ring buffer records and their decoding.

use std::mem;

use log::warn;
use plain::Plain;
use thiserror::Error;

use crate::{Category, Event};

/// Size of the message buffer of a raw event. Please keep synced with its BPF
/// counterpart.
pub const EVENT_MESSAGE_MAX: usize = 512;

/// Raw event format shared between the Rust and BPF part. Please keep in sync
/// with its BPF counterpart.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct RawEvent {
    pub pid: u32,
    pub message: [u8; EVENT_MESSAGE_MAX],
    pub code: i32,
    pub event_type: u32,
}

unsafe impl Plain for RawEvent {}

impl Default for RawEvent {
    fn default() -> Self {
        Self {
            pid: 0,
            message: [0; EVENT_MESSAGE_MAX],
            code: 0,
            event_type: 0,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventError {
    #[error("raw event is too small ({actual} < {expected} bytes)")]
    TooSmall { actual: usize, expected: usize },
}

impl Event {
    /// Decodes a raw record as found in the ring buffer. Trailing bytes past
    /// the raw event layout are ignored.
    pub fn from_bytes(data: &[u8]) -> Result<Event, EventError> {
        let expected = mem::size_of::<RawEvent>();
        if data.len() < expected {
            return Err(EventError::TooSmall {
                actual: data.len(),
                expected,
            });
        }

        let mut raw = RawEvent::default();
        plain::copy_from_bytes(&mut raw, data).map_err(|_| EventError::TooSmall {
            actual: data.len(),
            expected,
        })?;

        Ok(Event::from(&raw))
    }

    /// Encodes the event using the raw layout. Messages longer than the raw
    /// buffer are truncated, keeping room for the NULL terminator.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut raw = RawEvent {
            pid: self.pid,
            code: self.code,
            event_type: self.category.to_raw(),
            ..Default::default()
        };

        let msg = self.message.as_bytes();
        let len = msg.len().min(EVENT_MESSAGE_MAX - 1);
        raw.message[..len].copy_from_slice(&msg[..len]);

        unsafe { plain::as_bytes(&raw) }.to_vec()
    }
}

impl From<&RawEvent> for Event {
    fn from(raw: &RawEvent) -> Self {
        Event {
            category: Category::from_raw(raw.event_type),
            pid: raw.pid,
            code: raw.code,
            message: message_to_string(&raw.message),
        }
    }
}

// The kernel side might fill the whole buffer, in which case there is no NULL
// terminator. Keep what we have rather than dropping the record.
fn message_to_string(raw: &[u8]) -> String {
    let len = match raw.iter().position(|&c| c == 0) {
        Some(pos) => pos,
        None => {
            warn!("Event message is not NULL terminated, using the full buffer");
            raw.len()
        }
    };

    String::from_utf8_lossy(&raw[..len]).into_owned()
}
