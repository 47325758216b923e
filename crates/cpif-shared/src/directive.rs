use std::net::Ipv4Addr;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{
    ensure_len, WireError, DIRECTIVE_LEN, MSG_KEEPALIVE_ACK, MSG_SESS_CREATE, MSG_SESS_DELETE,
    MSG_SESS_MODIFY,
};

/// Session lifecycle instruction sent by the control plane
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DirectiveKind {
    Create,
    Modify,
    Delete,
    KeepAliveAck,
}

impl DirectiveKind {
    pub fn code(self) -> u32 {
        match self {
            Self::Create => MSG_SESS_CREATE,
            Self::Modify => MSG_SESS_MODIFY,
            Self::Delete => MSG_SESS_DELETE,
            Self::KeepAliveAck => MSG_KEEPALIVE_ACK,
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            MSG_SESS_CREATE => Some(Self::Create),
            MSG_SESS_MODIFY => Some(Self::Modify),
            MSG_SESS_DELETE => Some(Self::Delete),
            MSG_KEEPALIVE_ACK => Some(Self::KeepAliveAck),
            _ => None,
        }
    }

    /// Stable label for logs and metrics
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Modify => "modify",
            Self::Delete => "delete",
            Self::KeepAliveAck => "keepalive_ack",
        }
    }
}

/// Fields every directive carries and every response echoes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DirectiveHeader {
    pub op_id: u64,
    pub dp_id: u64,
    pub sess_id: u64,
}

/// Subscriber and peer tunnel addressing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionEntry {
    /// Subscriber (UE) address
    pub ue_addr: Ipv4Addr,
    /// Uplink peer (eNodeB) address
    pub ul_peer_addr: Ipv4Addr,
    /// Uplink teid assigned on the gateway side
    pub ul_teid: u32,
    /// Downlink teid of the peer, the one downlink traffic is encapsulated with
    pub dl_teid: u32,
}

impl Default for SessionEntry {
    fn default() -> Self {
        Self {
            ue_addr: Ipv4Addr::UNSPECIFIED,
            ul_peer_addr: Ipv4Addr::UNSPECIFIED,
            ul_teid: 0,
            dl_teid: 0,
        }
    }
}

/// Decoded directive record
///
/// Layout (44 bytes):
///
/// ```text
/// 0      4        12       20        28     32        36       40       44
/// | type | op_id  | dp_id  | sess_id | ue   | ul peer | ul teid| dl teid|
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Directive {
    pub kind: DirectiveKind,
    pub header: DirectiveHeader,
    pub entry: SessionEntry,
}

impl Directive {
    pub fn new(kind: DirectiveKind, header: DirectiveHeader, entry: SessionEntry) -> Self {
        Self {
            kind,
            header,
            entry,
        }
    }

    /// Parse a directive record; trailing bytes beyond the record are ignored
    pub fn decode(data: &[u8]) -> Result<Self, WireError> {
        ensure_len(data, DIRECTIVE_LEN)?;
        let mut buf = &data[..DIRECTIVE_LEN];

        let code = buf.get_u32();
        let kind = DirectiveKind::from_code(code).ok_or(WireError::UnknownDirective(code))?;

        let header = DirectiveHeader {
            op_id: buf.get_u64(),
            dp_id: buf.get_u64(),
            sess_id: buf.get_u64(),
        };
        let entry = SessionEntry {
            ue_addr: Ipv4Addr::from(buf.get_u32()),
            ul_peer_addr: Ipv4Addr::from(buf.get_u32()),
            ul_teid: buf.get_u32(),
            dl_teid: buf.get_u32(),
        };

        Ok(Self {
            kind,
            header,
            entry,
        })
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(DIRECTIVE_LEN);
        buf.put_u32(self.kind.code());
        buf.put_u64(self.header.op_id);
        buf.put_u64(self.header.dp_id);
        buf.put_u64(self.header.sess_id);
        buf.put_u32(u32::from(self.entry.ue_addr));
        buf.put_u32(u32::from(self.entry.ul_peer_addr));
        buf.put_u32(self.entry.ul_teid);
        buf.put_u32(self.entry.dl_teid);
        buf.freeze()
    }
}
