use cpif_core::{CpifError, Result};
use cpif_shared::{RegistrationReply, RegistrationRequest, REGISTRATION_REPLY_LEN};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info};

/// Announce this node to the control plane and obtain the port responses
/// must be pushed to
///
/// One connection per handshake: connect, send the request, wait for exactly
/// one reply, close. Every failure, including the timeout, is a registration
/// failure.
pub async fn register(
    endpoint: SocketAddr,
    request: &RegistrationRequest,
    timeout: Duration,
) -> Result<RegistrationReply> {
    let record = request.encode()?;

    let handshake = async {
        let mut stream = TcpStream::connect(endpoint)
            .await
            .map_err(|e| CpifError::Registration(format!("connect to {}: {}", endpoint, e)))?;
        debug!("Connected to registration endpoint {}", endpoint);

        stream
            .write_all(&record)
            .await
            .map_err(|e| CpifError::Registration(format!("send request: {}", e)))?;

        let mut buf = [0u8; REGISTRATION_REPLY_LEN];
        stream
            .read_exact(&mut buf)
            .await
            .map_err(|e| CpifError::Registration(format!("receive reply: {}", e)))?;

        RegistrationReply::decode(&buf).map_err(|e| CpifError::Registration(e.to_string()))
    };

    let reply = tokio::time::timeout(timeout, handshake)
        .await
        .map_err(|_| {
            CpifError::Registration(format!("no reply from {} within {:?}", endpoint, timeout))
        })??;

    info!(
        hostname = %request.hostname,
        send_port = reply.send_port,
        "Registered with control plane"
    );
    Ok(reply)
}

/// Configured hostname, or the system hostname when none is configured
pub fn resolve_hostname(configured: &str) -> Result<String> {
    if !configured.is_empty() {
        return Ok(configured.to_string());
    }

    let hostname = nix::unistd::gethostname()
        .map_err(|e| CpifError::ConfigError(format!("unable to retrieve hostname: {}", e)))?;
    hostname
        .into_string()
        .map_err(|_| CpifError::ConfigError("hostname is not valid UTF-8".to_string()))
}
