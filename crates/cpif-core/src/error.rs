use std::net::Ipv4Addr;

use cpif_shared::{Cause, WireError};
use thiserror::Error;

/// Main error type for the control-plane interface
#[derive(Error, Debug)]
pub enum CpifError {
    // ========================================
    // Session Errors
    // ========================================
    #[error("No session for subscriber {0}")]
    SessionNotFound(Ipv4Addr),

    #[error("Session already exists for subscriber {0}")]
    SessionExists(Ipv4Addr),

    #[error("Counter pool exhausted ({capacity} ids in use)")]
    ResourceExhausted { capacity: u32 },

    #[error("Counter id {0} is not allocated")]
    CounterNotAllocated(u32),

    // ========================================
    // Dataplane Errors
    // ========================================
    #[error("Rule installation failed at {op}: {reason}")]
    RuleInstallation { op: &'static str, reason: String },

    // ========================================
    // Control Channel Errors
    // ========================================
    #[error("Registration failed: {0}")]
    Registration(String),

    #[error("Control channel closed: {0}")]
    ChannelClosed(String),

    #[error("Malformed record: {0}")]
    Wire(#[from] WireError),

    // ========================================
    // System Errors
    // ========================================
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    // ========================================
    // Network Errors
    // ========================================
    #[error("Network error: {0}")]
    Network(#[from] std::io::Error),
}

impl CpifError {
    /// Cause reported to the control plane when this error ends a directive
    pub fn to_cause(&self) -> Option<Cause> {
        match self {
            Self::SessionNotFound(_) => Some(Cause::SessionNotFound),
            Self::SessionExists(_) => Some(Cause::SessionExists),
            Self::ResourceExhausted { .. } => Some(Cause::ResourceExhausted),
            Self::RuleInstallation { .. } => Some(Cause::RuleInstallationFailed),
            _ => None,
        }
    }

    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::SessionNotFound(_) | Self::SessionExists(_) | Self::Wire(_) => {
                ErrorSeverity::Warning
            }
            Self::ResourceExhausted { .. } | Self::RuleInstallation { .. } => ErrorSeverity::Error,
            Self::CounterNotAllocated(_) | Self::InternalError(_) => ErrorSeverity::Critical,
            _ if self.is_fatal() => ErrorSeverity::Critical,
            _ => ErrorSeverity::Warning,
        }
    }

    /// Whether the poll loop must stop on this error
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Registration(_)
            | Self::ChannelClosed(_)
            | Self::ConfigError(_)
            | Self::InternalError(_) => true,
            Self::Network(e) => e.kind() != std::io::ErrorKind::Interrupted,
            _ => false,
        }
    }

    /// A receive interrupted by a signal; the poll is simply retried
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Network(e) if e.kind() == std::io::ErrorKind::Interrupted)
    }
}

/// Error severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Warning,
    Error,
    Critical,
}

impl std::fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// Result type alias for control-plane interface operations
pub type Result<T> = std::result::Result<T, CpifError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_error_to_cause() {
        let ue = Ipv4Addr::new(16, 0, 0, 1);
        assert_eq!(
            CpifError::SessionNotFound(ue).to_cause(),
            Some(Cause::SessionNotFound)
        );
        assert_eq!(
            CpifError::SessionExists(ue).to_cause(),
            Some(Cause::SessionExists)
        );
        assert_eq!(
            CpifError::ResourceExhausted { capacity: 4 }.to_cause(),
            Some(Cause::ResourceExhausted)
        );
        assert_eq!(
            CpifError::RuleInstallation {
                op: "add_far",
                reason: "unavailable".to_string()
            }
            .to_cause(),
            Some(Cause::RuleInstallationFailed)
        );
        assert_eq!(CpifError::Registration("x".into()).to_cause(), None);
    }

    #[test]
    fn test_fatal_classification() {
        assert!(CpifError::ChannelClosed("receiver".into()).is_fatal());
        assert!(CpifError::Network(io::Error::from(io::ErrorKind::BrokenPipe)).is_fatal());

        let interrupted = CpifError::Network(io::Error::from(io::ErrorKind::Interrupted));
        assert!(!interrupted.is_fatal());
        assert!(interrupted.is_interrupted());

        assert!(!CpifError::SessionNotFound(Ipv4Addr::LOCALHOST).is_fatal());
    }

    #[test]
    fn test_error_severity() {
        assert_eq!(
            CpifError::SessionNotFound(Ipv4Addr::LOCALHOST).severity(),
            ErrorSeverity::Warning
        );
        assert_eq!(
            CpifError::CounterNotAllocated(3).severity(),
            ErrorSeverity::Critical
        );
        assert_eq!(
            CpifError::Registration("timeout".into()).severity(),
            ErrorSeverity::Critical
        );
    }

    #[test]
    fn test_severity_display() {
        assert_eq!(ErrorSeverity::Warning.to_string(), "warning");
        assert_eq!(ErrorSeverity::Critical.to_string(), "critical");
    }
}
