//! carestep-providers — Remote judge backends.
//!
//! Implements the `JudgeProvider` trait for Gemini and Anthropic, plus a
//! mock, and builds the grading pipeline from the configuration file.

pub mod anthropic;
pub mod config;
pub mod gemini;
pub mod mock;

pub use carestep_core::error::TransportError;
pub use config::{
    build_grader, create_judge, load_config, load_config_from, CarestepConfig, GraderOptions,
    ProviderConfig,
};
