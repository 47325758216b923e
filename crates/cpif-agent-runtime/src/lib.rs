//! Async shell around the session translation core: dataplane rule client,
//! registration handshake, the poll loop and its supervisor.

pub mod installer;
pub mod link;
pub mod registration;
pub mod service;
pub mod supervisor;

pub use installer::{execute, GrpcRuleInstaller, ModuleNames, RuleInstaller};
pub use link::{ControlChannels, ControlPlaneLink, LinkSettings, TcpControlPlane};
pub use registration::{register, resolve_hostname};
pub use service::{AgentService, ServiceConfig, ServiceExit};
pub use supervisor::{Supervisor, SupervisorState};
