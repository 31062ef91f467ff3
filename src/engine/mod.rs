//! Domain logic: verdicts, VPN assignment, session lifecycle, chat, analytics
//! and the simulated subscription flow.

mod analytics;
mod billing;
mod chat_relay;
pub mod classifier;
mod orchestrator;
pub mod selector;
mod sweeper;

pub use analytics::*;
pub use billing::*;
pub use chat_relay::*;
pub use classifier::{classify, Verdict};
pub use orchestrator::*;
pub use selector::{Assignment, ConnectionSelector};
pub use sweeper::*;

use crate::db::StoreUnavailable;

/// Failures surfaced by domain operations
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Malformed input, rejected before any state is touched
    #[error("{0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    /// The resource exists but belongs to someone else, or the action is disabled for the caller
    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    ResourceExhausted(String),

    /// The resource is in a state that does not allow the operation
    #[error("{0}")]
    InvalidState(String),

    #[error("upstream service failed: {0}")]
    Upstream(String),

    #[error(transparent)]
    Unavailable(#[from] StoreUnavailable),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type EngineResult<T> = Result<T, EngineError>;
