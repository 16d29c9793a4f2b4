//! Consuming messages through a composed pipeline.
//!
//! This module provides:
//! - The message source and destination contracts
//! - The default sequential fetch loop
//! - A background driver per pipeline and a host running them all

mod driver;
mod host;
mod pipeline;
mod source;

pub use driver::{ConsumerDriver, DriverState};
pub use host::PipelineHost;
pub use pipeline::{Consumer, PipelineConsumer};
pub use source::{DestinationTerminal, MessageDestination, MessageSource};
