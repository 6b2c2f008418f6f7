//! # Hookctl events
//!
//! This crate contains the definitions of the records the kernel program emits
//! on its ring buffer, the raw layout shared with it, as well as helpers to
//! decode and display them.

pub mod events;
pub use events::*;

pub mod display;
pub use display::*;

pub mod raw;
pub use raw::*;
