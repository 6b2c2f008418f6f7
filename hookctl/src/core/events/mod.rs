//! # Events
//!
//! Retrieval of the events the kernel program reports on its ring buffer.

pub(crate) mod bpf;
pub(crate) use bpf::*;
