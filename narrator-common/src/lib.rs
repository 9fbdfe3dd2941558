//! # Narrator Common Library
//!
//! Shared code for the narration engine and its callers including:
//! - Event types (NarrationEvent enum) and the EventBus
//! - Session, backend and error-code enums
//! - Configuration file resolution
//! - Time utilities

pub mod config;
pub mod error;
pub mod events;
pub mod time;

pub use error::{Error, Result};
