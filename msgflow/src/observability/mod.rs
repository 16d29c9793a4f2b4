//! Observability utilities.

pub(crate) mod events;
mod subscriber;

pub use events::WarningEvent;
pub use subscriber::{init_tracing, LogFormat};
