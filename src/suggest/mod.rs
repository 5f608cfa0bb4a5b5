//! Cleanup suggestions: deterministic rules with an AI fallback.

mod engine;
pub mod rules;

pub use engine::{GenerationOutcome, GenerationReport, SuggestEngine, SuggestError, SuggestSettings};
