pub(crate) mod logger;
pub(crate) mod net;
pub(crate) mod signals;
