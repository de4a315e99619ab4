//! Close status codes and their validation.
//!
//! RFC 6455 reserves parts of the close-code space: some codes are only
//! meaningful as locally generated signals (1005, 1006), some are
//! protocol-reserved and must never appear on the wire, and everything
//! below 1000 or between 1014 and 2999 is unassigned. A close frame
//! carrying any of those is itself a protocol error and is answered with
//! close 1002.

use self::CloseCode::*;
use crate::{Error, Result};

/// Validates an inbound close payload.
///
/// An empty payload is fine; a one-byte payload is malformed; otherwise
/// the first two bytes must decode to an allowed status code and any
/// remaining bytes (the reason) must be valid UTF-8.
pub(crate) fn validate_close(payload: &[u8]) -> Result<()> {
    match payload.len() {
        0 => Ok(()),
        1 => Err(Error::InvalidCloseFrame),
        len => {
            let code = u16::from_be_bytes([payload[0], payload[1]]);
            if !CloseCode::from(code).is_allowed() {
                return Err(Error::InvalidCloseCode);
            }
            if len > 2 && std::str::from_utf8(&payload[2..]).is_err() {
                return Err(Error::InvalidUtf8);
            }
            Ok(())
        }
    }
}

/// Status code carried in a close frame, classifying why an endpoint is
/// ending the connection.
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub enum CloseCode {
    /// Normal closure; the purpose of the connection has been fulfilled.
    Normal,
    /// The endpoint is going away (server shutdown, page navigation).
    Away,
    /// A protocol violation was detected.
    Protocol,
    /// A data type the endpoint cannot accept was received.
    Unsupported,
    /// Data inconsistent with the message type (e.g. bad UTF-8 in text).
    Invalid,
    /// A message violated the endpoint's policy.
    Policy,
    /// A message was too large to process.
    Size,
    /// The client expected an extension the server did not negotiate.
    Extension,
    /// The server hit an unexpected condition.
    Error,
    /// The server is restarting; the client may reconnect.
    Restart,
    /// The server is overloaded; the client should back off.
    Again,
    /// Codes registered with IANA for applications (3000-3999).
    Registered(u16),
    /// Codes reserved for private application use (4000-4999).
    Application(u16),
    /// Codes above the ranges RFC 6455 carves out. Not assigned a meaning,
    /// but not reserved either, so they pass validation.
    Other(u16),
    /// Anything that must not appear in a close frame: codes below 1000,
    /// the reserved codes 1004-1006, and the unassigned 1014-2999 range.
    Reserved(u16),
}

impl CloseCode {
    /// Whether this code may legitimately appear in a close frame received
    /// from the wire.
    pub fn is_allowed(self) -> bool {
        !matches!(self, Reserved(_))
    }
}

impl From<u16> for CloseCode {
    fn from(code: u16) -> CloseCode {
        match code {
            1000 => Normal,
            1001 => Away,
            1002 => Protocol,
            1003 => Unsupported,
            1007 => Invalid,
            1008 => Policy,
            1009 => Size,
            1010 => Extension,
            1011 => Error,
            1012 => Restart,
            1013 => Again,
            3000..=3999 => Registered(code),
            4000..=4999 => Application(code),
            5000.. => Other(code),
            _ => Reserved(code),
        }
    }
}

impl From<CloseCode> for u16 {
    fn from(code: CloseCode) -> u16 {
        match code {
            Normal => 1000,
            Away => 1001,
            Protocol => 1002,
            Unsupported => 1003,
            Invalid => 1007,
            Policy => 1008,
            Size => 1009,
            Extension => 1010,
            Error => 1011,
            Restart => 1012,
            Again => 1013,
            Registered(code) => code,
            Application(code) => code,
            Other(code) => code,
            Reserved(code) => code,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assigned_codes_allowed() {
        for code in [1000, 1001, 1002, 1003, 1007, 1008, 1009, 1010, 1011, 1012, 1013] {
            assert!(CloseCode::from(code).is_allowed(), "code {}", code);
        }
    }

    #[test]
    fn test_registered_and_application_ranges_allowed() {
        for code in [3000, 3500, 3999, 4000, 4321, 4999, 5000, 65535] {
            assert!(CloseCode::from(code).is_allowed(), "code {}", code);
        }
    }

    #[test]
    fn test_reserved_codes_rejected() {
        for code in [0, 1, 999, 1004, 1005, 1006, 1014, 1015, 1016, 2000, 2999] {
            assert!(!CloseCode::from(code).is_allowed(), "code {}", code);
        }
    }

    #[test]
    fn test_round_trip() {
        for code in [1000u16, 1002, 1013, 3000, 4999, 1005, 999, 2999, 5000] {
            assert_eq!(u16::from(CloseCode::from(code)), code);
        }
    }

    #[test]
    fn test_validate_close() {
        assert!(validate_close(b"").is_ok());
        assert!(validate_close(b"\x03\xE8").is_ok());
        assert!(validate_close(b"\x03\xE8going away").is_ok());

        assert!(matches!(
            validate_close(b"\x03"),
            Err(Error::InvalidCloseFrame)
        ));
        assert!(matches!(
            validate_close(b"\x03\xED"), // 1005
            Err(Error::InvalidCloseCode)
        ));
        assert!(matches!(
            validate_close(b"\x03\xE8\xFF\xFE"),
            Err(Error::InvalidUtf8)
        ));
    }
}
