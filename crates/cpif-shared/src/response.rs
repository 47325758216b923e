use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{
    ensure_len, get_name, put_name, DirectiveHeader, WireError, DPN_KEEPALIVE_REQ, DPN_RESPONSE,
    RESPONSE_LEN,
};

/// Response record tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    /// Reply to a Create/Modify/Delete directive
    Response,
    /// Periodic liveness probe towards the control plane
    Keepalive,
}

impl ResponseKind {
    pub fn code(self) -> u32 {
        match self {
            Self::Response => DPN_RESPONSE,
            Self::Keepalive => DPN_KEEPALIVE_REQ,
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            DPN_RESPONSE => Some(Self::Response),
            DPN_KEEPALIVE_REQ => Some(Self::Keepalive),
            _ => None,
        }
    }
}

/// Outcome of a directive as reported to the control plane
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum Cause {
    #[default]
    Accepted = 0,
    SessionNotFound = 1,
    SessionExists = 2,
    ResourceExhausted = 3,
    RuleInstallationFailed = 4,
}

impl Cause {
    pub fn code(self) -> u32 {
        self as u32
    }

    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(Self::Accepted),
            1 => Some(Self::SessionNotFound),
            2 => Some(Self::SessionExists),
            3 => Some(Self::ResourceExhausted),
            4 => Some(Self::RuleInstallationFailed),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Accepted => "accepted",
            Self::SessionNotFound => "session_not_found",
            Self::SessionExists => "session_exists",
            Self::ResourceExhausted => "resource_exhausted",
            Self::RuleInstallationFailed => "rule_installation_failed",
        }
    }
}

/// Response record
///
/// Layout (96 bytes): type u32 | op_id u64 | dp_id u64 | sess_id u64 |
/// cause u32 | dp name (64, NUL padded).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub kind: ResponseKind,
    pub op_id: u64,
    pub dp_id: u64,
    pub sess_id: u64,
    pub cause: Cause,
    pub dp_name: String,
}

impl Response {
    /// Reply echoing the header of the directive it answers
    pub fn reply(header: &DirectiveHeader) -> Self {
        Self {
            kind: ResponseKind::Response,
            op_id: header.op_id,
            dp_id: header.dp_id,
            sess_id: header.sess_id,
            cause: Cause::Accepted,
            dp_name: String::new(),
        }
    }

    /// Keepalive request; node scoped, so op id is always 1 and sess id 0
    pub fn keepalive(dp_id: u64, dp_name: impl Into<String>) -> Self {
        Self {
            kind: ResponseKind::Keepalive,
            op_id: 1,
            dp_id,
            sess_id: 0,
            cause: Cause::Accepted,
            dp_name: dp_name.into(),
        }
    }

    pub fn is_accepted(&self) -> bool {
        self.cause == Cause::Accepted
    }

    pub fn encode(&self) -> Result<Bytes, WireError> {
        let mut buf = BytesMut::with_capacity(RESPONSE_LEN);
        buf.put_u32(self.kind.code());
        buf.put_u64(self.op_id);
        buf.put_u64(self.dp_id);
        buf.put_u64(self.sess_id);
        buf.put_u32(self.cause.code());
        put_name(&mut buf, &self.dp_name)?;
        Ok(buf.freeze())
    }

    pub fn decode(data: &[u8]) -> Result<Self, WireError> {
        ensure_len(data, RESPONSE_LEN)?;
        let mut buf = &data[..RESPONSE_LEN];

        let code = buf.get_u32();
        let kind = ResponseKind::from_code(code).ok_or(WireError::UnknownResponse(code))?;
        let op_id = buf.get_u64();
        let dp_id = buf.get_u64();
        let sess_id = buf.get_u64();
        let cause_code = buf.get_u32();
        let cause = Cause::from_code(cause_code).ok_or(WireError::UnknownCause(cause_code))?;
        let dp_name = get_name(&mut buf);

        Ok(Self {
            kind,
            op_id,
            dp_id,
            sess_id,
            cause,
            dp_name,
        })
    }
}
