//! Command line arguments
//!
//! Flags override the matching configuration file values.

use clap::Parser;
use cpif_config::{AgentConfig, DEFAULT_CONFIG_PATH};
use std::path::PathBuf;

/// Control-plane interface agent of the user-plane function
#[derive(Parser, Debug)]
#[command(name = "cpif-agent")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Log level or filter directive (RUST_LOG still wins)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Node name announced at registration
    #[arg(long)]
    pub hostname: Option<String>,

    /// gRPC endpoint of the dataplane rule service
    #[arg(long)]
    pub dataplane_endpoint: Option<String>,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    pub fn apply(&self, config: &mut AgentConfig) {
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
        if let Some(hostname) = &self.hostname {
            config.cpiface.hostname = hostname.clone();
        }
        if let Some(endpoint) = &self.dataplane_endpoint {
            config.dataplane.endpoint = endpoint.clone();
        }
    }
}
