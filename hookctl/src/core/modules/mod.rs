//! # Modules
//!
//! Hook families management: which families are enabled and the installation
//! and removal of their programs.

pub(crate) mod config;
pub(crate) use config::*;

pub(crate) mod manager;
pub(crate) use manager::*;
