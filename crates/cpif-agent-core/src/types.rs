use cpif_shared::DEFAULT_BEARER;
use std::fmt;
use std::net::Ipv4Addr;

// セッションキー (加入者アドレス << 4 | ベアラID)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionKey(u64);

impl SessionKey {
    pub fn new(ue_addr: Ipv4Addr, bearer: u8) -> Self {
        Self((u64::from(u32::from(ue_addr)) << 4) | u64::from(bearer & 0x0f))
    }

    /// Key of the subscriber's default bearer, the only bearer sessions use
    pub fn for_subscriber(ue_addr: Ipv4Addr) -> Self {
        Self::new(ue_addr, DEFAULT_BEARER)
    }

    pub fn ue_addr(self) -> Ipv4Addr {
        Ipv4Addr::from((self.0 >> 4) as u32)
    }

    pub fn bearer(self) -> u8 {
        (self.0 & 0x0f) as u8
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.ue_addr(), self.bearer())
    }
}

// セッション状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionRecord {
    /// Peer downlink teid, 0 until the session is modified
    pub teid: u32,
    /// Usage counter id shared by the session's PDRs
    pub ctr_id: u32,
}
