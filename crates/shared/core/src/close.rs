use serde::{Deserialize, Serialize};
use std::fmt;

/// Clean shutdown requested by either side.
pub const CLOSE_NORMAL: u16 = 1000;
/// Transport dropped without a close handshake.
pub const CLOSE_ABNORMAL: u16 = 1006;
/// The peer rejected something we sent as a policy breach.
pub const CLOSE_POLICY_VIOLATION: u16 = 1008;
/// Internal code used when the liveness monitor forces a close.
pub const CLOSE_STALLED: u16 = 4000;
/// Credentials or session token rejected by the peer.
pub const CLOSE_AUTH_REJECTED: u16 = 4004;
/// The peer speaks a protocol revision we do not.
pub const CLOSE_PROTOCOL_MISMATCH: u16 = 4010;

/// Whether a connection closed with `code` is worth re-dialing.
///
/// A clean close means the peer is done with us; policy, auth, and protocol
/// rejections will fail the same way on the next attempt. Everything else
/// (network drops, stalls, server restarts) is transient.
pub fn is_resumable_code(code: u16) -> bool {
    !matches!(
        code,
        CLOSE_NORMAL | CLOSE_POLICY_VIOLATION | CLOSE_AUTH_REJECTED | CLOSE_PROTOCOL_MISMATCH
    )
}

/// Why a gateway session terminated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseReason {
    pub code: u16,
    pub resumable: bool,
    pub detail: String,
}

impl CloseReason {
    /// Classify a close code received from (or sent to) the peer.
    pub fn from_close_code(code: u16, detail: impl Into<String>) -> Self {
        CloseReason {
            code,
            resumable: is_resumable_code(code),
            detail: detail.into(),
        }
    }

    /// Locally requested clean shutdown.
    pub fn local_close() -> Self {
        CloseReason {
            code: CLOSE_NORMAL,
            resumable: false,
            detail: "close requested locally".into(),
        }
    }

    /// Liveness monitor declared the peer unresponsive. A stalled connection
    /// is expected to come back after a fresh dial.
    pub fn stalled() -> Self {
        CloseReason {
            code: CLOSE_STALLED,
            resumable: true,
            detail: "no inbound traffic within heartbeat timeout".into(),
        }
    }

    /// Transport failed outside a close handshake.
    pub fn transport_lost(detail: impl Into<String>) -> Self {
        CloseReason {
            code: CLOSE_ABNORMAL,
            resumable: true,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "code {} ({}): {}",
            self.code,
            if self.resumable {
                "resumable"
            } else {
                "fatal"
            },
            self.detail
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_codes_are_not_resumable() {
        assert!(!is_resumable_code(CLOSE_NORMAL));
        assert!(!is_resumable_code(CLOSE_POLICY_VIOLATION));
        assert!(!is_resumable_code(CLOSE_AUTH_REJECTED));
        assert!(!is_resumable_code(CLOSE_PROTOCOL_MISMATCH));
    }

    #[test]
    fn test_other_codes_are_resumable() {
        assert!(is_resumable_code(CLOSE_ABNORMAL));
        assert!(is_resumable_code(CLOSE_STALLED));
        assert!(is_resumable_code(1001));
        assert!(is_resumable_code(1011));
    }

    #[test]
    fn test_stall_reason_is_resumable() {
        let reason = CloseReason::stalled();
        assert!(reason.resumable);
        assert_eq!(reason.code, CLOSE_STALLED);
    }

    #[test]
    fn test_local_close_is_clean() {
        let reason = CloseReason::local_close();
        assert_eq!(reason.code, CLOSE_NORMAL);
        assert!(!reason.resumable);
    }
}
