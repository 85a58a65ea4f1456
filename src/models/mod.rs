//! Loaded model handles shared by every pipeline run.

pub mod registry;

pub use registry::ModelRegistry;
