// Error types module
pub mod error;

// Control channel transport module
pub mod transport;

// Re-export commonly used types
pub use error::{CpifError, ErrorSeverity, Result};
pub use transport::{InboundChannel, OutboundChannel, TcpPullChannel, TcpPushChannel};
