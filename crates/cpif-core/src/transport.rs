use crate::error::{CpifError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

/// Records waiting to be consumed by the poll loop
const INBOUND_QUEUE_DEPTH: usize = 1024;

/// Pause after the first failed accept; doubled per consecutive failure
const ACCEPT_BACKOFF_BASE: Duration = Duration::from_millis(10);
const ACCEPT_BACKOFF_MAX: Duration = Duration::from_secs(1);

/// Receiving half of the control channel
///
/// Allows switching between TCP channels and in-process queues (tests) transparently.
#[async_trait]
pub trait InboundChannel: Send {
    /// Wait for the next complete record
    async fn recv(&mut self) -> Result<Bytes>;

    /// Release the underlying endpoint; returns once it can be bound again
    async fn close(&mut self) {}
}

/// Sending half of the control channel
#[async_trait]
pub trait OutboundChannel: Send {
    async fn send(&mut self, record: Bytes) -> Result<()>;
}

#[async_trait]
impl InboundChannel for mpsc::Receiver<Bytes> {
    async fn recv(&mut self) -> Result<Bytes> {
        mpsc::Receiver::recv(self)
            .await
            .ok_or_else(|| CpifError::ChannelClosed("inbound queue".to_string()))
    }
}

#[async_trait]
impl OutboundChannel for mpsc::Sender<Bytes> {
    async fn send(&mut self, record: Bytes) -> Result<()> {
        mpsc::Sender::send(self, record)
            .await
            .map_err(|_| CpifError::ChannelClosed("outbound queue".to_string()))
    }
}

/// Bound receiver accepting any number of pushing peers
///
/// Each accepted connection carries a stream of fixed-size records; records
/// from all connections are merged in arrival order.
pub struct TcpPullChannel {
    local_addr: SocketAddr,
    records: mpsc::Receiver<Bytes>,
    acceptor: Option<JoinHandle<()>>,
}

impl TcpPullChannel {
    /// Bind the receiver; `record_len` is the fixed size of every record
    pub async fn bind(addr: SocketAddr, record_len: usize) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        let (tx, records) = mpsc::channel(INBOUND_QUEUE_DEPTH);

        let acceptor = tokio::spawn(accept_loop(listener, record_len, tx));
        info!("Control channel receiver bound on {}", local_addr);

        Ok(Self {
            local_addr,
            records,
            acceptor: Some(acceptor),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl Drop for TcpPullChannel {
    fn drop(&mut self) {
        // Dropping the accept task also drops its reader set
        if let Some(acceptor) = &self.acceptor {
            acceptor.abort();
        }
    }
}

#[async_trait]
impl InboundChannel for TcpPullChannel {
    async fn recv(&mut self) -> Result<Bytes> {
        self.records
            .recv()
            .await
            .ok_or_else(|| CpifError::ChannelClosed(format!("receiver {}", self.local_addr)))
    }

    async fn close(&mut self) {
        if let Some(acceptor) = self.acceptor.take() {
            acceptor.abort();
            let _ = acceptor.await;
        }
        self.records.close();
        debug!("Control channel receiver on {} closed", self.local_addr);
    }
}

/// Delay before the next accept after `failures` consecutive accept errors
fn accept_backoff(failures: u32) -> Duration {
    let shift = failures.saturating_sub(1).min(16);
    ACCEPT_BACKOFF_BASE
        .saturating_mul(1 << shift)
        .min(ACCEPT_BACKOFF_MAX)
}

async fn accept_loop(listener: TcpListener, record_len: usize, tx: mpsc::Sender<Bytes>) {
    let mut readers = JoinSet::new();
    let mut failures: u32 = 0;

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((socket, peer)) => {
                    failures = 0;
                    info!("Control plane connected from {}", peer);
                    readers.spawn(read_records(socket, peer, record_len, tx.clone()));
                }
                Err(e) => {
                    // e.g. EMFILE; the error persists until descriptors free up
                    failures = failures.saturating_add(1);
                    let delay = accept_backoff(failures);
                    error!(failures, delay_ms = delay.as_millis() as u64, "Accept error: {}", e);
                    tokio::time::sleep(delay).await;
                }
            },
            Some(_) = readers.join_next(), if !readers.is_empty() => {}
        }
    }
}

async fn read_records(
    mut socket: TcpStream,
    peer: SocketAddr,
    record_len: usize,
    tx: mpsc::Sender<Bytes>,
) {
    let mut buffer = vec![0u8; record_len];

    loop {
        match socket.read_exact(&mut buffer).await {
            Ok(_) => {
                if tx.send(Bytes::copy_from_slice(&buffer)).await.is_err() {
                    return;
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                debug!("Control plane {} disconnected", peer);
                return;
            }
            Err(e) => {
                warn!("Read error from {}: {}", peer, e);
                return;
            }
        }
    }
}

/// Connected sender towards the control plane
///
/// A failed write drops the connection; the next send connects again.
pub struct TcpPushChannel {
    peer_addr: SocketAddr,
    stream: Option<TcpStream>,
}

impl TcpPushChannel {
    pub async fn connect(addr: SocketAddr) -> Result<Self> {
        let stream = Self::open(addr).await?;
        info!("Control channel sender connected to {}", addr);
        Ok(Self {
            peer_addr: addr,
            stream: Some(stream),
        })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    async fn open(addr: SocketAddr) -> Result<TcpStream> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Ok(stream)
    }
}

#[async_trait]
impl OutboundChannel for TcpPushChannel {
    async fn send(&mut self, record: Bytes) -> Result<()> {
        let mut stream = match self.stream.take() {
            Some(stream) => stream,
            None => {
                let stream = Self::open(self.peer_addr).await?;
                info!("Control channel sender reconnected to {}", self.peer_addr);
                stream
            }
        };

        if let Err(e) = stream.write_all(&record).await {
            debug!("Dropping connection to {}: {}", self.peer_addr, e);
            return Err(e.into());
        }
        self.stream = Some(stream);
        Ok(())
    }
}
