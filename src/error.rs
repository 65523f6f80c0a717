//! Crate-wide error type
//!
//! Every decode/encode entry point in this crate returns a [`Result`] rather
//! than panicking or unwinding; see [`crate::ber::BerError`] for the
//! lower-layer BER error that feeds into this one.

use crate::ber::BerError;
use crate::ldap::ResultCode;

/// Holds the result of any fallible operation in this crate.
///
/// Note that this type is not named `LdapResult` to avoid a collision with
/// the LDAP-standard generic result type ([`crate::ldap::LdapResult`]).
pub type Result<T> = std::result::Result<T, LdapError>;

/// Error taxonomy for the protocol core.
///
/// A failed decode never consumes more input than necessary to detect the
/// failure, and is not resumable — callers must tear down the connection on
/// anything other than [`LdapError::InvalidSyntax`], which is local to a
/// single matching-rule normalization and never poisons sibling attributes.
#[derive(Debug, PartialEq, Eq, Clone, thiserror::Error)]
pub enum LdapError {
    /// Byte source exhausted mid-element.
    #[error("unexpected end of stream while decoding an element")]
    EndOfStream,

    /// Valid bytes, but not a conformant BER encoding: length overrun,
    /// reserved/indefinite length form, non-minimal length, non-constructed
    /// tag where constructed was required.
    #[error("malformed BER encoding: {0}")]
    MalformedBer(String),

    /// Well-formed BER, but the wrong shape for the LDAP op/control it
    /// claims to be: missing mandatory field, duplicate field, or an
    /// unknown APPLICATION tag where a known one was required.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// A matching-rule normalizer rejected a value.
    #[error("invalid syntax at offset {offset}: {reason}")]
    InvalidSyntax {
        /// Byte/character offset of the first offending input.
        offset: usize,
        /// Human-readable reason, stable for a given input.
        reason: String,
    },

    /// A response carried a critical control with no registered decoder.
    #[error("unknown critical control: {oid}")]
    UnknownCriticalControl {
        /// Dotted-decimal OID of the unrecognized control.
        oid: String,
    },

    /// Propagated from the byte source/sink.
    #[error("operation cancelled or timed out")]
    CancelledOrTimedOut,

    /// Recursion depth exceeded while decoding a recursive structure
    /// (currently only [`crate::filter::Filter`]).
    #[error("recursion limit ({limit}) exceeded while decoding")]
    RecursionLimitExceeded {
        /// The limit that was exceeded.
        limit: usize,
    },
}

impl LdapError {
    /// The LDAP result code a server would use to report this class of
    /// failure to a client, per RFC 4511 §4.1.9.
    pub fn result_code(&self) -> ResultCode {
        match self {
            LdapError::EndOfStream => ResultCode::ProtocolError,
            LdapError::MalformedBer(_) => ResultCode::ProtocolError,
            LdapError::ProtocolViolation(_) => ResultCode::ProtocolError,
            LdapError::InvalidSyntax { .. } => ResultCode::InvalidAttributeSyntax,
            LdapError::UnknownCriticalControl { .. } => ResultCode::UnavailableCriticalExtension,
            LdapError::CancelledOrTimedOut => ResultCode::Busy,
            LdapError::RecursionLimitExceeded { .. } => ResultCode::ProtocolError,
        }
    }

    /// Human-readable diagnostic message, suitable for a `diagnosticMessage`
    /// field or a log line.
    pub fn diagnostic_message(&self) -> String {
        self.to_string()
    }

    pub(crate) fn invalid_syntax(offset: usize, reason: impl Into<String>) -> Self {
        LdapError::InvalidSyntax {
            offset,
            reason: reason.into(),
        }
    }
}

impl From<BerError> for LdapError {
    fn from(e: BerError) -> LdapError {
        match e {
            BerError::EndOfStream => LdapError::EndOfStream,
            BerError::Malformed(s) => LdapError::MalformedBer(s),
            BerError::RecursionLimitExceeded { limit } => {
                LdapError::RecursionLimitExceeded { limit }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_codes_match_rfc4511() {
        assert_eq!(
            LdapError::ProtocolViolation("x".into()).result_code(),
            ResultCode::ProtocolError
        );
        assert_eq!(
            LdapError::invalid_syntax(3, "bad digit").result_code(),
            ResultCode::InvalidAttributeSyntax
        );
        assert_eq!(
            LdapError::UnknownCriticalControl { oid: "1.2.3".into() }.result_code(),
            ResultCode::UnavailableCriticalExtension
        );
    }
}
