//! Dataplane rule plans for a session.
//!
//! A session is programmed with two PDRs (one per direction) sharing the
//! session's counter id, two FARs keyed by the peer downlink teid, and the
//! counter in each of the three QoS counter modules.

use crate::types::SessionRecord;
use cpif_shared::{SessionEntry, UDP_PORT_GTPU};
use std::net::Ipv4Addr;

/// Match the whole address
pub const EXACT_MASK: u32 = 0xFFFF_FFFF;

/// FAR forwarding uplink traffic out of the tunnel
pub const FAR_UPLINK: u32 = 0;
/// FAR encapsulating downlink traffic towards the peer
pub const FAR_DOWNLINK: u32 = 1;

/// Interface a packet arrived on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceIface {
    /// Radio side (S1-U / N3)
    Access,
    /// Packet data network side (SGi / N6)
    Core,
}

/// Lookup key of a PDR: ingress interface plus an address match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PdrMatch {
    pub src_iface: SourceIface,
    pub src_addr: Ipv4Addr,
    pub src_mask: u32,
    pub dst_addr: Ipv4Addr,
    pub dst_mask: u32,
}

impl PdrMatch {
    /// Downlink: traffic from the network addressed by its source being the subscriber
    pub fn downlink(ue_addr: Ipv4Addr) -> Self {
        Self {
            src_iface: SourceIface::Core,
            src_addr: ue_addr,
            src_mask: EXACT_MASK,
            dst_addr: Ipv4Addr::UNSPECIFIED,
            dst_mask: 0,
        }
    }

    /// Uplink: traffic from the radio side matching the subscriber as destination
    pub fn uplink(ue_addr: Ipv4Addr) -> Self {
        Self {
            src_iface: SourceIface::Access,
            src_addr: Ipv4Addr::UNSPECIFIED,
            src_mask: 0,
            dst_addr: ue_addr,
            dst_mask: EXACT_MASK,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PdrRule {
    pub key: PdrMatch,
    pub fseid: u32,
    pub ctr_id: u32,
    pub far_id: u32,
    pub need_decap: bool,
}

/// GTP-U outer header parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GtpuEncap {
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
    pub teid: u32,
    pub port: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FarKey {
    pub far_id: u32,
    pub fseid: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FarRule {
    pub key: FarKey,
    /// `None` forwards without tunnelling
    pub encap: Option<GtpuEncap>,
}

/// QoS counter module a counter id is installed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CounterRole {
    PreQos,
    PostUlQos,
    PostDlQos,
}

impl CounterRole {
    pub const ALL: [CounterRole; 3] = [Self::PreQos, Self::PostUlQos, Self::PostDlQos];

    pub fn prefix(self) -> &'static str {
        match self {
            Self::PreQos => "Pre",
            Self::PostUlQos => "PostUL",
            Self::PostDlQos => "PostDL",
        }
    }

    /// Module instance name, e.g. `PreQoSCounter` for base `QoSCounter`
    pub fn module_name(self, base: &str) -> String {
        format!("{}{}", self.prefix(), base)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterRule {
    pub role: CounterRole,
    pub ctr_id: u32,
}

/// One dataplane rule-programming call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleCall {
    AddPdr(PdrRule),
    DelPdr(PdrMatch),
    AddFar(FarRule),
    DelFar(FarKey),
    AddCounter(CounterRule),
    DelCounter(CounterRule),
    RemoveAll,
}

impl RuleCall {
    /// Stable operation label for logs and metrics
    pub fn op(&self) -> &'static str {
        match self {
            Self::AddPdr(_) => "add_pdr",
            Self::DelPdr(_) => "del_pdr",
            Self::AddFar(_) => "add_far",
            Self::DelFar(_) => "del_far",
            Self::AddCounter(_) => "add_counter",
            Self::DelCounter(_) => "del_counter",
            Self::RemoveAll => "remove_all",
        }
    }
}

/// Calls programming a modified session, in issue order
pub fn install_plan(entry: &SessionEntry, ctr_id: u32, s1u_addr: Ipv4Addr) -> Vec<RuleCall> {
    let fseid = entry.dl_teid;
    let mut calls = vec![
        RuleCall::AddPdr(PdrRule {
            key: PdrMatch::downlink(entry.ue_addr),
            fseid,
            ctr_id,
            far_id: FAR_DOWNLINK,
            need_decap: false,
        }),
        RuleCall::AddPdr(PdrRule {
            key: PdrMatch::uplink(entry.ue_addr),
            fseid,
            ctr_id,
            far_id: FAR_UPLINK,
            need_decap: true,
        }),
        RuleCall::AddFar(FarRule {
            key: FarKey {
                far_id: FAR_DOWNLINK,
                fseid,
            },
            encap: Some(GtpuEncap {
                src: s1u_addr,
                dst: entry.ul_peer_addr,
                teid: entry.dl_teid,
                port: UDP_PORT_GTPU,
            }),
        }),
        RuleCall::AddFar(FarRule {
            key: FarKey {
                far_id: FAR_UPLINK,
                fseid,
            },
            encap: None,
        }),
    ];
    calls.extend(
        CounterRole::ALL
            .iter()
            .map(|&role| RuleCall::AddCounter(CounterRule { role, ctr_id })),
    );
    calls
}

/// Calls removing a deleted session, mirroring `install_plan`
pub fn teardown_plan(ue_addr: Ipv4Addr, record: &SessionRecord) -> Vec<RuleCall> {
    let mut calls = vec![
        RuleCall::DelPdr(PdrMatch::downlink(ue_addr)),
        RuleCall::DelPdr(PdrMatch::uplink(ue_addr)),
        RuleCall::DelFar(FarKey {
            far_id: FAR_DOWNLINK,
            fseid: record.teid,
        }),
        RuleCall::DelFar(FarKey {
            far_id: FAR_UPLINK,
            fseid: record.teid,
        }),
    ];
    calls.extend(CounterRole::ALL.iter().map(|&role| {
        RuleCall::DelCounter(CounterRule {
            role,
            ctr_id: record.ctr_id,
        })
    }));
    calls
}
