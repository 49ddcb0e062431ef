//! Date-time echo protocol.
//!
//! The only request understood is [`DATETIME_REQUEST`]; it is answered with
//! the current date-time in RFC 3339 form, offset included.  Anything else is
//! a protocol error, which ends the session.

use chrono::{DateTime, FixedOffset, Local, SecondsFormat};
use thiserror::Error;
use wsbridge_core::DATETIME_REQUEST;

/// Failure of the echo protocol.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EchoError {
    /// The request is not [`DATETIME_REQUEST`].  The display text is used as
    /// the close reason sent to the peer.
    #[error("I do not understand")]
    Unrecognized(String),
}

/// Answers one request received at instant `now`.
///
/// # Errors
///
/// [`EchoError::Unrecognized`] for any input other than the exact request
/// text.
pub fn answer(request: &str, now: DateTime<FixedOffset>) -> Result<String, EchoError> {
    if request == DATETIME_REQUEST {
        Ok(now.to_rfc3339_opts(SecondsFormat::AutoSi, false))
    } else {
        Err(EchoError::Unrecognized(request.to_owned()))
    }
}

/// Current local date-time with its UTC offset.
pub fn now() -> DateTime<FixedOffset> {
    Local::now().fixed_offset()
}
