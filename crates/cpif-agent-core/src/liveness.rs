use std::time::{Duration, Instant};

/// What the poll loop must do after a receive timed out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LivenessAction {
    /// Control plane still considered alive; probe it
    SendKeepalive { dp_id: u64 },
    /// Control plane silent for longer than the timeout
    Fault { silent_for: Duration, dp_id: u64 },
}

/// Tracks how recently the control plane was heard from
#[derive(Debug, Clone)]
pub struct LivenessMonitor {
    last_seen: Instant,
    dp_id: u64,
    timeout: Duration,
}

impl LivenessMonitor {
    pub fn new(now: Instant, timeout: Duration) -> Self {
        Self {
            last_seen: now,
            dp_id: 0,
            timeout,
        }
    }

    /// Any inbound record counts as activity, valid or not
    pub fn on_activity(&mut self, now: Instant) {
        self.last_seen = now;
    }

    pub fn set_dp_id(&mut self, dp_id: u64) {
        self.dp_id = dp_id;
    }

    pub fn dp_id(&self) -> u64 {
        self.dp_id
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn silence(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_seen)
    }

    pub fn on_poll_timeout(&self, now: Instant) -> LivenessAction {
        let silent_for = self.silence(now);
        if silent_for > self.timeout {
            LivenessAction::Fault {
                silent_for,
                dp_id: self.dp_id,
            }
        } else {
            LivenessAction::SendKeepalive { dp_id: self.dp_id }
        }
    }
}
