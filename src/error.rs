//! Stream error taxonomy
//!
//! Three kinds of failure reach the session layer:
//! - cancellation (a newer session superseded this one) - silent
//! - HTTP status / transport failure - logged, session stops, no retry
//! - malformed records - handled inside the decoder, never surfaced here

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StreamError {
    /// The session was superseded or shut down
    #[error("session cancelled")]
    Cancelled,

    /// Backend answered with a non-2xx status
    #[error("backend returned {status}: {body}")]
    Status { status: u16, body: String },

    /// Connect, read, or body error from the HTTP stack
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

impl StreamError {
    /// Cancellation is a normal stop, not a failure
    pub fn is_cancellation(&self) -> bool {
        matches!(self, StreamError::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancellation_is_not_failure() {
        assert!(StreamError::Cancelled.is_cancellation());
        let status = StreamError::Status { status: 502, body: "bad gateway".into() };
        assert!(!status.is_cancellation());
        assert_eq!(status.to_string(), "backend returned 502: bad gateway");
    }
}
