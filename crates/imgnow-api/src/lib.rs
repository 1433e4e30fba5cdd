//! imgnow API library
//!
//! HTTP handlers, error mapping and application setup. The binary in `main.rs` only
//! loads configuration and runs what `setup` builds.

pub mod constants;
pub mod error;
mod handlers;
pub mod setup;
pub mod state;

pub use error::{ErrorResponse, HttpAppError};
pub use state::AppState;
