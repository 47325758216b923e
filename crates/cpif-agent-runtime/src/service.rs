use crate::installer::{execute, RuleInstaller};
use crate::link::ControlChannels;
use bytes::Bytes;
use cpif_agent_core::{LivenessAction, LivenessMonitor, ProtocolHandler, Transaction};
use cpif_config::AgentConfig;
use cpif_core::{CpifError, InboundChannel, OutboundChannel, Result};
use cpif_metrics::{
    ACTIVE_SESSIONS, CONTROL_PLANE_FAULTS_TOTAL, DIRECTIVES_TOTAL, DIRECTIVE_FAILURES_TOTAL,
    DISCARDED_RECORDS_TOTAL, FREE_COUNTERS, KEEPALIVES_SENT_TOTAL, SEND_FAILURES_TOTAL,
};
use cpif_shared::{Cause, Directive, Response};
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Settings of one service instance
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub max_sessions: u32,
    pub s1u_addr: Ipv4Addr,
    pub hostname: String,
    pub poll_timeout: Duration,
    pub liveness_timeout: Duration,
}

impl ServiceConfig {
    /// `hostname` is the already resolved node name
    pub fn from_config(config: &AgentConfig, hostname: String) -> Self {
        Self {
            max_sessions: config.max_sessions,
            s1u_addr: config.cpiface.s1u_sgw_ip,
            hostname,
            poll_timeout: config.supervisor.poll_timeout(),
            liveness_timeout: config.supervisor.liveness_timeout(),
        }
    }
}

/// Why the poll loop stopped without an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceExit {
    /// Nothing heard from the control plane for longer than the liveness timeout
    ControlPlaneLost { silent_for: Duration, dp_id: u64 },
}

fn now() -> Instant {
    // tokio's clock so paused-time tests drive liveness
    tokio::time::Instant::now().into_std()
}

/// One registration's worth of state: session directory, counter pool,
/// liveness and the channels, all owned by the poll loop
pub struct AgentService {
    handler: ProtocolHandler,
    liveness: LivenessMonitor,
    installer: Arc<dyn RuleInstaller>,
    inbound: Box<dyn InboundChannel>,
    outbound: Box<dyn OutboundChannel>,
    hostname: String,
    poll_timeout: Duration,
}

impl AgentService {
    pub fn new(
        config: &ServiceConfig,
        installer: Arc<dyn RuleInstaller>,
        channels: ControlChannels,
    ) -> Self {
        let service = Self {
            handler: ProtocolHandler::new(config.max_sessions, config.s1u_addr),
            liveness: LivenessMonitor::new(now(), config.liveness_timeout),
            installer,
            inbound: channels.inbound,
            outbound: channels.outbound,
            hostname: config.hostname.clone(),
            poll_timeout: config.poll_timeout,
        };
        service.update_gauges();
        service
    }

    pub fn handler(&self) -> &ProtocolHandler {
        &self.handler
    }

    pub fn liveness(&self) -> &LivenessMonitor {
        &self.liveness
    }

    /// Poll until the control plane is lost or a fatal error occurs
    pub async fn run(&mut self) -> Result<ServiceExit> {
        info!(
            max_sessions = self.handler.directory().pool().capacity(),
            poll_timeout_ms = self.poll_timeout.as_millis() as u64,
            "Service poll loop started"
        );
        loop {
            if let Some(exit) = self.poll_once().await? {
                return Ok(exit);
            }
        }
    }

    /// One poll iteration: a received record, or a timeout handled by liveness
    ///
    /// Only receive errors end the loop. Failed pushes to the control plane
    /// are logged and counted; a dead control plane is detected by liveness.
    pub async fn poll_once(&mut self) -> Result<Option<ServiceExit>> {
        match tokio::time::timeout(self.poll_timeout, self.inbound.recv()).await {
            Ok(Ok(record)) => {
                self.on_record(record).await;
                Ok(None)
            }
            Ok(Err(e)) if e.is_interrupted() => {
                debug!("Poll interrupted, retrying");
                Ok(None)
            }
            Ok(Err(e)) => {
                error!(severity = %e.severity(), "Poll failed: {}", e);
                Err(e)
            }
            Err(_) => Ok(self.on_poll_timeout().await),
        }
    }

    /// Release the channels' endpoints
    pub async fn close(&mut self) {
        self.inbound.close().await;
    }

    async fn on_record(&mut self, record: Bytes) {
        self.liveness.on_activity(now());

        let directive = match Directive::decode(&record) {
            Ok(directive) => directive,
            Err(e) => {
                warn!("Discarding record: {}", e);
                DISCARDED_RECORDS_TOTAL.inc();
                return;
            }
        };
        DIRECTIVES_TOTAL
            .with_label_values(&[directive.kind.as_str()])
            .inc();
        debug!(
            kind = directive.kind.as_str(),
            op_id = directive.header.op_id,
            sess_id = directive.header.sess_id,
            ue = %directive.entry.ue_addr,
            "Directive received"
        );

        let mut tx = self.handler.handle(&directive);
        if let Some(dp_id) = tx.learned_dp_id {
            if dp_id != self.liveness.dp_id() {
                info!(dp_id, "Adopted dp id from control plane");
            }
            self.liveness.set_dp_id(dp_id);
        }

        Self::apply(self.installer.as_ref(), &mut tx).await;
        self.report(&tx);
        self.update_gauges();

        if let Some(response) = &tx.response {
            self.deliver(response).await;
        }
    }

    /// Push a record to the control plane; returns whether it was sent
    async fn deliver(&mut self, record: &Response) -> bool {
        let result = match record.encode() {
            Ok(bytes) => self.outbound.send(bytes).await,
            Err(e) => Err(CpifError::from(e)),
        };
        match result {
            Ok(()) => true,
            Err(e) => {
                SEND_FAILURES_TOTAL.inc();
                warn!(
                    kind = ?record.kind,
                    op_id = record.op_id,
                    sess_id = record.sess_id,
                    "Failed to send to control plane: {}",
                    e
                );
                false
            }
        }
    }

    /// Issue the transaction's calls in order, stopping at the first failure
    async fn apply(installer: &dyn RuleInstaller, tx: &mut Transaction) {
        let calls = std::mem::take(&mut tx.calls);
        for call in &calls {
            if let Err(e) = execute(installer, call).await {
                error!(
                    op = call.op(),
                    session = %tx.key,
                    severity = %e.severity(),
                    "Rule call failed, skipping remaining calls: {}",
                    e
                );
                tx.abort(e);
                return;
            }
        }
        tx.calls = calls;
    }

    fn report(&self, tx: &Transaction) {
        let cause = tx.cause();
        if cause == Cause::Accepted {
            if let Some(record) = self.handler.directory().get(tx.key) {
                debug!(
                    kind = tx.kind.as_str(),
                    session = %tx.key,
                    teid = record.teid,
                    ctr_id = record.ctr_id,
                    "Directive applied"
                );
            }
            return;
        }

        DIRECTIVE_FAILURES_TOTAL
            .with_label_values(&[cause.as_str()])
            .inc();
        if let Some(reason) = &tx.rejection {
            warn!(
                kind = tx.kind.as_str(),
                session = %tx.key,
                cause = cause.as_str(),
                "Directive rejected: {}",
                reason
            );
        }
    }

    async fn on_poll_timeout(&mut self) -> Option<ServiceExit> {
        match self.liveness.on_poll_timeout(now()) {
            LivenessAction::SendKeepalive { dp_id } => {
                let keepalive = Response::keepalive(dp_id, self.hostname.clone());
                if self.deliver(&keepalive).await {
                    KEEPALIVES_SENT_TOTAL.inc();
                    debug!(dp_id, "Keepalive sent");
                }
                None
            }
            LivenessAction::Fault { silent_for, dp_id } => {
                CONTROL_PLANE_FAULTS_TOTAL.inc();
                error!(
                    dp_id,
                    silent_ms = silent_for.as_millis() as u64,
                    "Control plane communication lost"
                );
                Some(ServiceExit::ControlPlaneLost { silent_for, dp_id })
            }
        }
    }

    fn update_gauges(&self) {
        let directory = self.handler.directory();
        ACTIVE_SESSIONS.set(directory.len() as i64);
        FREE_COUNTERS.set(directory.free_counters() as i64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::installer::MockRuleInstaller;
    use async_trait::async_trait;
    use cpif_agent_core::SessionKey;
    use cpif_shared::{
        DirectiveHeader, DirectiveKind, ResponseKind, SessionEntry, RESPONSE_LEN,
    };
    use mockall::Sequence;
    use std::collections::VecDeque;
    use std::io;
    use tokio::sync::mpsc;

    struct Harness {
        service: AgentService,
        directives: mpsc::Sender<Bytes>,
        responses: mpsc::Receiver<Bytes>,
    }

    fn harness(installer: MockRuleInstaller) -> Harness {
        cpif_logging::init_test();
        let (directives, inbound) = mpsc::channel(16);
        let (outbound, responses) = mpsc::channel(16);
        let config = ServiceConfig {
            max_sessions: 4,
            s1u_addr: Ipv4Addr::new(11, 1, 1, 1),
            hostname: "upf-test".to_string(),
            poll_timeout: Duration::from_millis(1000),
            liveness_timeout: Duration::from_secs(3),
        };
        let service = AgentService::new(
            &config,
            Arc::new(installer),
            ControlChannels {
                inbound: Box::new(inbound),
                outbound: Box::new(outbound),
            },
        );
        Harness {
            service,
            directives,
            responses,
        }
    }

    fn directive(kind: DirectiveKind, op_id: u64, dl_teid: u32) -> Bytes {
        directive_for(kind, op_id, 1, dl_teid)
    }

    fn directive_for(kind: DirectiveKind, op_id: u64, ue_last: u8, dl_teid: u32) -> Bytes {
        Directive::new(
            kind,
            DirectiveHeader {
                op_id,
                dp_id: 3,
                sess_id: 0x100 + op_id,
            },
            SessionEntry {
                ue_addr: Ipv4Addr::new(16, 0, 0, ue_last),
                ul_peer_addr: Ipv4Addr::new(11, 1, 1, 129),
                ul_teid: 1,
                dl_teid,
            },
        )
        .encode()
    }

    fn key(ue_last: u8) -> SessionKey {
        SessionKey::for_subscriber(Ipv4Addr::new(16, 0, 0, ue_last))
    }

    impl Harness {
        async fn exchange(&mut self, record: Bytes) -> Response {
            self.directives.send(record).await.unwrap();
            assert_eq!(self.service.poll_once().await.unwrap(), None);
            let bytes = self.responses.recv().await.unwrap();
            assert_eq!(bytes.len(), RESPONSE_LEN);
            Response::decode(&bytes).unwrap()
        }
    }

    #[tokio::test]
    async fn test_modify_unknown_session_issues_no_calls() {
        // any rule call on the mock would panic
        let mut h = harness(MockRuleInstaller::new());

        let resp = h.exchange(directive(DirectiveKind::Modify, 11, 0x55)).await;
        assert_eq!(resp.kind, ResponseKind::Response);
        assert_eq!(resp.op_id, 11);
        assert_eq!(resp.dp_id, 3);
        assert_eq!(resp.sess_id, 0x100 + 11);
        assert_eq!(resp.cause, Cause::SessionNotFound);
    }

    #[tokio::test]
    async fn test_modify_issues_calls_in_order() {
        let mut mock = MockRuleInstaller::new();
        let mut seq = Sequence::new();
        mock.expect_add_pdr()
            .withf(|pdr| pdr.far_id == 1 && !pdr.need_decap)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        mock.expect_add_pdr()
            .withf(|pdr| pdr.far_id == 0 && pdr.need_decap)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        mock.expect_add_far()
            .withf(|far| far.key.far_id == 1 && far.encap.is_some())
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        mock.expect_add_far()
            .withf(|far| far.key.far_id == 0 && far.encap.is_none())
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        mock.expect_add_counter()
            .withf(|ctr| ctr.ctr_id == 0)
            .times(3)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));

        let mut h = harness(mock);
        let created = h.exchange(directive(DirectiveKind::Create, 1, 0)).await;
        assert!(created.is_accepted());
        assert_eq!(h.service.liveness().dp_id(), 3);

        let modified = h.exchange(directive(DirectiveKind::Modify, 2, 0xbeef)).await;
        assert!(modified.is_accepted());
    }

    #[tokio::test]
    async fn test_rule_failure_aborts_remaining_calls() {
        let mut mock = MockRuleInstaller::new();
        mock.expect_add_pdr().times(2).returning(|_| Ok(()));
        mock.expect_add_far().times(1).returning(|_| {
            Err(CpifError::RuleInstallation {
                op: "add_far",
                reason: "module not found".to_string(),
            })
        });
        mock.expect_add_counter().times(0);

        let mut h = harness(mock);
        h.exchange(directive(DirectiveKind::Create, 1, 0)).await;
        let resp = h.exchange(directive(DirectiveKind::Modify, 2, 0xbeef)).await;

        assert_eq!(resp.cause, Cause::RuleInstallationFailed);
        // no rollback: the session keeps its teid
        let record = h
            .service
            .handler()
            .directory()
            .get(key(1))
            .copied()
            .unwrap();
        assert_eq!(record.teid, 0xbeef);
    }

    #[tokio::test]
    async fn test_delete_failure_still_releases_counter() {
        let mut mock = MockRuleInstaller::new();
        let mut seq = Sequence::new();
        mock.expect_del_pdr()
            .times(2)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        mock.expect_del_far()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| {
                Err(CpifError::RuleInstallation {
                    op: "del_far",
                    reason: "unavailable".to_string(),
                })
            });
        mock.expect_del_counter().times(0);

        let mut h = harness(mock);
        h.exchange(directive_for(DirectiveKind::Create, 1, 1, 0)).await;
        assert_eq!(h.service.handler().directory().get(key(1)).unwrap().ctr_id, 0);
        h.exchange(directive_for(DirectiveKind::Create, 2, 2, 0)).await;
        assert_eq!(h.service.handler().directory().get(key(2)).unwrap().ctr_id, 1);

        let resp = h.exchange(directive_for(DirectiveKind::Delete, 3, 1, 0)).await;
        assert_eq!(resp.op_id, 3);
        assert_eq!(resp.cause, Cause::RuleInstallationFailed);

        let directory = h.service.handler().directory();
        assert!(directory.get(key(1)).is_none());
        assert_eq!(directory.free_counters(), 3);

        // the released id is handed out next
        h.exchange(directive_for(DirectiveKind::Create, 4, 3, 0)).await;
        assert_eq!(h.service.handler().directory().get(key(3)).unwrap().ctr_id, 0);
    }

    #[tokio::test]
    async fn test_second_delete_issues_no_calls() {
        let mut mock = MockRuleInstaller::new();
        mock.expect_del_pdr().times(2).returning(|_| Ok(()));
        mock.expect_del_far().times(2).returning(|_| Ok(()));
        mock.expect_del_counter().times(3).returning(|_| Ok(()));

        let mut h = harness(mock);
        h.exchange(directive(DirectiveKind::Create, 1, 0)).await;
        assert!(h
            .exchange(directive(DirectiveKind::Delete, 2, 0))
            .await
            .is_accepted());

        let again = h.exchange(directive(DirectiveKind::Delete, 3, 0)).await;
        assert_eq!(again.cause, Cause::SessionNotFound);
        assert_eq!(h.service.handler().directory().free_counters(), 4);
    }

    #[tokio::test]
    async fn test_malformed_record_discarded() {
        let mut h = harness(MockRuleInstaller::new());

        let mut bad = directive(DirectiveKind::Create, 1, 0).to_vec();
        bad[3] = 0x7f;
        h.directives.send(Bytes::from(bad)).await.unwrap();
        assert_eq!(h.service.poll_once().await.unwrap(), None);
        h.directives
            .send(Bytes::from_static(&[0, 0, 0, 1]))
            .await
            .unwrap();
        assert_eq!(h.service.poll_once().await.unwrap(), None);

        assert!(h.responses.try_recv().is_err());
        assert!(h.service.handler().directory().is_empty());
    }

    #[tokio::test]
    async fn test_keepalive_ack_adopts_dp_id_silently() {
        let mut h = harness(MockRuleInstaller::new());
        h.directives
            .send(directive(DirectiveKind::KeepAliveAck, 1, 0))
            .await
            .unwrap();
        assert_eq!(h.service.poll_once().await.unwrap(), None);

        assert_eq!(h.service.liveness().dp_id(), 3);
        assert!(h.responses.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_keepalive_then_fault_on_silence() {
        let mut h = harness(MockRuleInstaller::new());
        h.directives
            .send(directive(DirectiveKind::KeepAliveAck, 1, 0))
            .await
            .unwrap();
        assert_eq!(h.service.poll_once().await.unwrap(), None);

        // 1s and 2s of silence: still within the timeout
        let mut keepalives = 0;
        let exit = loop {
            match h.service.poll_once().await.unwrap() {
                None => {
                    let keepalive = Response::decode(&h.responses.recv().await.unwrap()).unwrap();
                    assert_eq!(keepalive.kind, ResponseKind::Keepalive);
                    assert_eq!(keepalive.op_id, 1);
                    assert_eq!(keepalive.sess_id, 0);
                    assert_eq!(keepalive.dp_id, 3);
                    assert_eq!(keepalive.dp_name, "upf-test");
                    keepalives += 1;
                    assert!(keepalives <= 3, "no fault after {} keepalives", keepalives);
                }
                Some(exit) => break exit,
            }
        };

        assert!(keepalives >= 2);
        let ServiceExit::ControlPlaneLost { silent_for, dp_id } = exit;
        assert!(silent_for > Duration::from_secs(3));
        assert_eq!(dp_id, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_failure_leaves_liveness_in_charge() {
        let mut h = harness(MockRuleInstaller::new());
        let Harness {
            service,
            directives,
            responses,
        } = &mut h;
        responses.close();

        directives
            .send(directive(DirectiveKind::Create, 1, 0))
            .await
            .unwrap();
        assert_eq!(service.poll_once().await.unwrap(), None);
        assert_eq!(service.handler().directory().len(), 1);

        // keepalives fail too; the loop keeps polling until silence faults
        let mut polls = 0;
        let exit = loop {
            if let Some(exit) = service.poll_once().await.unwrap() {
                break exit;
            }
            polls += 1;
            assert!(polls <= 3, "no fault after {} polls", polls);
        };
        let ServiceExit::ControlPlaneLost { silent_for, dp_id } = exit;
        assert!(silent_for > Duration::from_secs(3));
        assert_eq!(dp_id, 3);
    }

    /// Inbound channel replaying a fixed script of receive results
    struct ScriptedInbound {
        script: VecDeque<Result<Bytes>>,
    }

    #[async_trait]
    impl InboundChannel for ScriptedInbound {
        async fn recv(&mut self) -> Result<Bytes> {
            match self.script.pop_front() {
                Some(next) => next,
                None => std::future::pending().await,
            }
        }
    }

    #[tokio::test]
    async fn test_interrupted_poll_is_retried() {
        cpif_logging::init_test();
        let script = VecDeque::from(vec![
            Err(CpifError::Network(io::Error::from(io::ErrorKind::Interrupted))),
            Ok(directive(DirectiveKind::Create, 1, 0)),
            Err(CpifError::Network(io::Error::from(io::ErrorKind::ConnectionReset))),
        ]);
        let (outbound, mut responses) = mpsc::channel::<Bytes>(4);
        let config = ServiceConfig {
            max_sessions: 4,
            s1u_addr: Ipv4Addr::new(11, 1, 1, 1),
            hostname: "upf-test".to_string(),
            poll_timeout: Duration::from_millis(1000),
            liveness_timeout: Duration::from_secs(3),
        };
        let mut service = AgentService::new(
            &config,
            Arc::new(MockRuleInstaller::new()),
            ControlChannels {
                inbound: Box::new(ScriptedInbound { script }),
                outbound: Box::new(outbound),
            },
        );

        assert_eq!(service.poll_once().await.unwrap(), None);
        assert!(responses.try_recv().is_err());

        assert_eq!(service.poll_once().await.unwrap(), None);
        let created = Response::decode(&responses.recv().await.unwrap()).unwrap();
        assert!(created.is_accepted());

        let err = service.poll_once().await.unwrap_err();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_closed_inbound_is_fatal() {
        let mut h = harness(MockRuleInstaller::new());
        drop(h.directives);

        let err = h.service.poll_once().await.unwrap_err();
        assert!(err.is_fatal());
    }
}
