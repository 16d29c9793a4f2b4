//! # Msgflow
//!
//! A framework for consuming messages through named, composable pipelines.
//!
//! Msgflow provides a structured approach to building message consumers
//! with support for:
//!
//! - **Onion-style stages**: Each stage wraps the rest of the pipeline
//! - **Named pipelines**: Definitions resolved once per process and cached
//! - **Background consumers**: One cancellable fetch loop per pipeline
//! - **Latency instrumentation**: Per-message timing scopes and exporters
//! - **Contained failures**: Per-message errors become structured warnings
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use msgflow::prelude::*;
//!
//! let registry = PipelineRegistry::builder()
//!     .component_arc(destination)
//!     .pipeline(
//!         "orders",
//!         PipelineDefinition::new()
//!             .with_stages(vec![Arc::new(ValidateStage::new())])
//!             .with_terminal(|c| {
//!                 let dest: Arc<dyn MessageDestination> = c.require::<OrdersTopic>()?;
//!                 Ok(DestinationTerminal::continuation(dest))
//!             })
//!             .with_source(|_| Ok(Arc::new(OrdersQueue::connect()?))),
//!     )
//!     .build()?;
//!
//! let factory = Arc::new(HandlerFactory::new(Arc::new(registry)));
//! let host = PipelineHost::new(factory, DriverConfig::default());
//! host.run_until(shutdown_signal()).await;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod config;
pub mod consumer;
pub mod context;
pub mod errors;
pub mod latency;
pub mod observability;
pub mod registry;
pub mod stages;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{DriverConfig, MsgflowConfig, PipelineOptions};
    pub use crate::consumer::{
        Consumer, ConsumerDriver, DestinationTerminal, DriverState, MessageDestination,
        MessageSource, PipelineConsumer, PipelineHost,
    };
    pub use crate::context::{FeatureBag, MessageContext};
    pub use crate::errors::{
        BrokenAspect, ConfigurationError, DriverError, MsgflowError, ProcessingError,
        ResolutionError,
    };
    pub use crate::latency::{
        LatencyContext, LatencyExporter, LatencyExporters, LatencyMeasureStage,
        LatencyRegistrationStage, LatencyTokens, MeasureToken,
    };
    pub use crate::observability::{init_tracing, LogFormat, WarningEvent};
    pub use crate::registry::{Components, HandlerFactory, PipelineDefinition, PipelineRegistry};
    pub use crate::stages::{compose, handler_fn, Continuation, Handler, SharedStage, Stage};
    pub use tokio_util::sync::CancellationToken;
}
