//! carestep-core — Assessment and progression engine.
//!
//! This crate defines the submission data model, the per-stage rubric tables
//! and their deterministic scorer, the remote/local grading pipeline, the
//! monthly cycle calendar, and the stage progression rules.

pub mod cycle;
pub mod error;
pub mod grader;
pub mod model;
pub mod parser;
pub mod progression;
pub mod prompt;
pub mod report;
pub mod rubric;
pub mod traits;
pub mod vocabulary;
