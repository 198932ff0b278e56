//! Binary-side wiring: engine construction, progress UI, terminal probing.

pub(crate) mod progress_manager;
pub(crate) mod runtime;
pub(crate) mod terminal;
