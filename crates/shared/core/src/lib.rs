//! Hermes Core Domain
//!
//! Pure domain types for the hermes streaming gateway.
//! This crate contains no async, no I/O, and is 100% unit testable.

pub mod close;
pub mod events;
pub mod values;

// Re-export commonly used types at crate root
pub use close::{
    CLOSE_ABNORMAL, CLOSE_AUTH_REJECTED, CLOSE_NORMAL, CLOSE_POLICY_VIOLATION,
    CLOSE_PROTOCOL_MISMATCH, CLOSE_STALLED, CloseReason, is_resumable_code,
};
pub use events::{EventKind, HandlerId, Topic};
pub use values::Timestamp;
