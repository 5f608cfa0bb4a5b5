//! mailsweep: inbox and calendar sync with cleanup suggestions.
//!
//! The [`engine::Engine`] ties together the token manager, sync engine,
//! suggestion engine and action executor over a single SQLite store.

pub mod actions;
pub mod ai;
pub mod config;
pub mod constants;
pub mod credentials;
pub mod crypto;
pub mod engine;
pub mod error;
pub mod locks;
pub mod oauth2;
pub mod provider;
pub mod retry;
pub mod store;
pub mod suggest;
pub mod sync;
pub mod token;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use config::Config;
pub use engine::Engine;
