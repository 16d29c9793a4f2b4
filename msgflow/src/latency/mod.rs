//! Latency instrumentation.
//!
//! Two ordinary stages: a registration stage that gives every message a
//! timing scope and exports it afterwards, and a measurement stage that
//! records how long the rest of the pipeline took under a success or a
//! failure token.

mod exporter;
mod scope;
mod stages;

pub use exporter::{LatencyExporter, LatencyExporters, TracingLatencyExporter};
pub use scope::{
    Checkpoint, LatencyContext, LatencySnapshot, LatencyTokens, MeasureToken, Measurement,
};
pub use stages::{LatencyMeasureStage, LatencyRegistrationStage};
