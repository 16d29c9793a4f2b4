//! Testing utilities for msgflow pipelines.
//!
//! This module provides:
//! - A scripted message source and collecting sinks
//! - Stages that journal their enter and exit order
//! - Capture of the warning events emitted by the consumer loop

mod capture;
mod mocks;

pub use capture::{capture_events, CapturedEvent, CapturedEvents};
pub use mocks::{
    failing_terminal, CollectingDestination, CollectingExporter, InjectedFailure, Journal,
    RecordingStage, ScriptedSource,
};
