use crate::registration::register;
use async_trait::async_trait;
use cpif_config::AgentConfig;
use cpif_core::{InboundChannel, OutboundChannel, Result, TcpPullChannel, TcpPushChannel};
use cpif_shared::{RegistrationRequest, DIRECTIVE_LEN};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;
use tracing::info;

/// Long-lived channels of one registration
pub struct ControlChannels {
    pub inbound: Box<dyn InboundChannel>,
    pub outbound: Box<dyn OutboundChannel>,
}

/// Establishes the control channels, registering first
///
/// Allows switching between the TCP control plane and in-process queues (tests).
#[async_trait]
pub trait ControlPlaneLink: Send {
    async fn connect(&mut self) -> Result<ControlChannels>;
}

/// Control plane addressing of this node
#[derive(Debug, Clone)]
pub struct LinkSettings {
    /// Control plane host
    pub cp_addr: Ipv4Addr,
    pub registration_port: u16,
    /// Local address directives are received on, announced at registration
    pub comm_addr: Ipv4Addr,
    pub recv_port: u16,
    pub s1u_addr: Ipv4Addr,
    pub hostname: String,
    pub registration_timeout: Duration,
}

impl LinkSettings {
    /// `hostname` is the already resolved node name
    pub fn from_config(config: &AgentConfig, hostname: String) -> Self {
        Self {
            cp_addr: config.cpiface.zmqd_nb_ip,
            registration_port: config.cpiface.zmqd_nb_port,
            comm_addr: config.cpiface.zmqd_ip,
            recv_port: config.cpiface.zmqd_recv_port,
            s1u_addr: config.cpiface.s1u_sgw_ip,
            hostname,
            registration_timeout: config.supervisor.registration_timeout(),
        }
    }

    pub fn registration_endpoint(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.cp_addr, self.registration_port))
    }

    pub fn recv_endpoint(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.comm_addr, self.recv_port))
    }
}

/// TCP control plane: registration handshake, then a bound receiver for
/// directives and a connected sender for responses
pub struct TcpControlPlane {
    settings: LinkSettings,
}

impl TcpControlPlane {
    pub fn new(settings: LinkSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl ControlPlaneLink for TcpControlPlane {
    async fn connect(&mut self) -> Result<ControlChannels> {
        let request = RegistrationRequest {
            comm_addr: self.settings.comm_addr,
            s1u_addr: self.settings.s1u_addr,
            hostname: self.settings.hostname.clone(),
        };
        let reply = register(
            self.settings.registration_endpoint(),
            &request,
            self.settings.registration_timeout,
        )
        .await?;

        let inbound = TcpPullChannel::bind(self.settings.recv_endpoint(), DIRECTIVE_LEN).await?;
        let send_addr = SocketAddr::V4(SocketAddrV4::new(self.settings.cp_addr, reply.send_port));
        let outbound = TcpPushChannel::connect(send_addr).await?;

        info!(
            recv = %inbound.local_addr(),
            send = %outbound.peer_addr(),
            "Connected to control plane"
        );
        Ok(ControlChannels {
            inbound: Box::new(inbound),
            outbound: Box::new(outbound),
        })
    }
}
