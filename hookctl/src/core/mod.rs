pub(crate) mod bootstrap;
pub(crate) mod channel;
pub(crate) mod events;
pub(crate) mod maps;
pub(crate) mod modules;
pub(crate) mod program;
