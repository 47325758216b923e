use std::net::Ipv4Addr;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{
    ensure_len, get_name, put_name, WireError, REGISTRATION_LEN, REGISTRATION_REPLY_LEN,
};

/// Registration request sent once at startup
///
/// Layout (72 bytes): comm address (4) | S1-U address (4) | hostname (64).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationRequest {
    /// Address the control plane pushes directives to
    pub comm_addr: Ipv4Addr,
    /// Peer-facing (S1-U) address of this node
    pub s1u_addr: Ipv4Addr,
    pub hostname: String,
}

impl RegistrationRequest {
    pub fn encode(&self) -> Result<Bytes, WireError> {
        let mut buf = BytesMut::with_capacity(REGISTRATION_LEN);
        buf.put_slice(&self.comm_addr.octets());
        buf.put_slice(&self.s1u_addr.octets());
        put_name(&mut buf, &self.hostname)?;
        Ok(buf.freeze())
    }

    pub fn decode(data: &[u8]) -> Result<Self, WireError> {
        ensure_len(data, REGISTRATION_LEN)?;
        let mut buf = &data[..REGISTRATION_LEN];
        let comm_addr = Ipv4Addr::from(buf.get_u32());
        let s1u_addr = Ipv4Addr::from(buf.get_u32());
        let hostname = get_name(&mut buf);
        Ok(Self {
            comm_addr,
            s1u_addr,
            hostname,
        })
    }
}

/// Registration reply carrying the port responses must be sent to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistrationReply {
    pub send_port: u16,
}

impl RegistrationReply {
    pub fn encode(&self) -> Bytes {
        Bytes::copy_from_slice(&self.send_port.to_be_bytes())
    }

    pub fn decode(data: &[u8]) -> Result<Self, WireError> {
        ensure_len(data, REGISTRATION_REPLY_LEN)?;
        Ok(Self {
            send_port: u16::from_be_bytes([data[0], data[1]]),
        })
    }
}
