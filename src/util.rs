//! Utility functions and types shared across the pipeline.

pub mod telemetry;
