//! Applying approved cleanup actions to the provider and the local store.

mod executor;

pub use executor::{ActionError, ActionExecutor};
