//! Fixed-layout records exchanged with the control plane.
//!
//! All multi-byte integers are big-endian and IPv4 addresses travel as four
//! octets in network order.

use bytes::{Buf, BufMut};
use thiserror::Error;

pub mod directive;
pub mod registration;
pub mod response;

pub use directive::{Directive, DirectiveHeader, DirectiveKind, SessionEntry};
pub use registration::{RegistrationReply, RegistrationRequest};
pub use response::{Cause, Response, ResponseKind};

// Directive types
pub const MSG_SESS_CREATE: u32 = 1;
pub const MSG_SESS_MODIFY: u32 = 2;
pub const MSG_SESS_DELETE: u32 = 3;
pub const MSG_KEEPALIVE_ACK: u32 = 4;

// Response types
pub const DPN_RESPONSE: u32 = 1;
pub const DPN_KEEPALIVE_REQ: u32 = 2;

// Record sizes
pub const HOSTNAME_LEN: usize = 64;
pub const DIRECTIVE_LEN: usize = 44;
pub const RESPONSE_LEN: usize = 32 + HOSTNAME_LEN;
pub const REGISTRATION_LEN: usize = 8 + HOSTNAME_LEN;
pub const REGISTRATION_REPLY_LEN: usize = 2;

/// Bearer id of the single default bearer every session is keyed on
pub const DEFAULT_BEARER: u8 = 5;

/// GTP-U well-known UDP port
pub const UDP_PORT_GTPU: u16 = 2152;

/// Errors raised while decoding or encoding a record
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    #[error("record truncated: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("unknown directive type {0}")]
    UnknownDirective(u32),

    #[error("unknown response type {0}")]
    UnknownResponse(u32),

    #[error("unknown cause {0}")]
    UnknownCause(u32),

    #[error("hostname is {0} bytes, at most {} allowed", HOSTNAME_LEN - 1)]
    HostnameTooLong(usize),
}

pub(crate) fn ensure_len(data: &[u8], expected: usize) -> Result<(), WireError> {
    if data.len() < expected {
        return Err(WireError::Truncated {
            expected,
            actual: data.len(),
        });
    }
    Ok(())
}

/// Writes `name` NUL padded to `HOSTNAME_LEN` bytes, always leaving a terminator.
pub(crate) fn put_name<B: BufMut>(buf: &mut B, name: &str) -> Result<(), WireError> {
    let raw = name.as_bytes();
    if raw.len() >= HOSTNAME_LEN {
        return Err(WireError::HostnameTooLong(raw.len()));
    }
    buf.put_slice(raw);
    buf.put_bytes(0, HOSTNAME_LEN - raw.len());
    Ok(())
}

pub(crate) fn get_name<B: Buf>(buf: &mut B) -> String {
    let mut raw = [0u8; HOSTNAME_LEN];
    buf.copy_to_slice(&mut raw);
    let end = raw.iter().position(|b| *b == 0).unwrap_or(HOSTNAME_LEN);
    String::from_utf8_lossy(&raw[..end]).into_owned()
}
