//! Provider-to-local synchronization.

mod engine;
pub mod normalize;

pub use engine::{SyncEngine, SyncError, SyncOutcome, SyncReport, SyncSettings};
