mod cli;
mod metrics_server;

use cli::Cli;
use cpif_agent_runtime::{
    resolve_hostname, GrpcRuleInstaller, LinkSettings, ModuleNames, ServiceConfig, Supervisor,
    TcpControlPlane,
};
use cpif_config::AgentConfig;
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse_args();

    let mut config: AgentConfig = cpif_config::load_config(&cli.config.to_string_lossy())?;
    cli.apply(&mut config);
    cpif_config::validate(&config)?;

    cpif_logging::init_with(&config.logging.level, config.logging.format);
    cpif_metrics::register_metrics()
        .map_err(|e| anyhow::anyhow!("failed to register metrics: {}", e))?;

    info!(
        service = "cpif-agent",
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        "Starting control plane interface agent"
    );

    let hostname = resolve_hostname(&config.cpiface.hostname)?;
    info!(
        hostname = %hostname,
        control_plane = %config.cpiface.zmqd_nb_ip,
        dataplane = %config.dataplane.endpoint,
        max_sessions = config.max_sessions,
        "Agent configured"
    );

    if config.metrics_port != 0 {
        let port = config.metrics_port;
        tokio::spawn(async move {
            if let Err(e) = metrics_server::serve(port).await {
                error!("Metrics endpoint failed: {}", e);
            }
        });
    }

    let installer = GrpcRuleInstaller::connect_lazy(
        &config.dataplane.endpoint,
        ModuleNames::from(&config.dataplane),
        config.dataplane.rpc_timeout(),
    )?;

    let mut supervisor = Supervisor::new(
        TcpControlPlane::new(LinkSettings::from_config(&config, hostname.clone())),
        Arc::new(installer),
        ServiceConfig::from_config(&config, hostname),
        config.supervisor.restart_mode,
    );

    tokio::select! {
        result = supervisor.run() => {
            if let Err(e) = result {
                error!(severity = ?e.severity(), "Agent stopped: {}", e);
                return Err(e.into());
            }
        }
        signal = shutdown_signal() => {
            signal?;
            info!("Shutdown signal received");
        }
    }

    info!("Agent stopped");
    Ok(())
}

async fn shutdown_signal() -> std::io::Result<()> {
    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result,
        _ = terminate.recv() => Ok(()),
    }
}
