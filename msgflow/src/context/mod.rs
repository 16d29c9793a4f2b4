//! Per-message state.
//!
//! This module provides:
//! - The message context threaded through a pipeline
//! - The typed feature bag stages use to exchange data

mod features;
mod message;

pub use features::FeatureBag;
pub use message::MessageContext;
