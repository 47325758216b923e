use crate::directory::SessionDirectory;
use crate::rules::{install_plan, teardown_plan, RuleCall};
use crate::types::SessionKey;
use cpif_core::CpifError;
use cpif_shared::{Cause, Directive, DirectiveKind, Response};
use std::net::Ipv4Addr;

/// Outcome of one directive: the rule calls to issue, in order, and the
/// response to send once they have run
#[derive(Debug)]
pub struct Transaction {
    pub kind: DirectiveKind,
    pub key: SessionKey,
    pub calls: Vec<RuleCall>,
    /// `None` for directives that are never answered (keepalive acks)
    pub response: Option<Response>,
    /// dp-instance id the control plane handed us, to be cached
    pub learned_dp_id: Option<u64>,
    /// Why the directive was refused or failed, if it was
    pub rejection: Option<CpifError>,
}

impl Transaction {
    fn new(directive: &Directive) -> Self {
        Self {
            kind: directive.kind,
            key: SessionKey::for_subscriber(directive.entry.ue_addr),
            calls: Vec::new(),
            response: None,
            learned_dp_id: None,
            rejection: None,
        }
    }

    fn reject(&mut self, err: CpifError) {
        if let (Some(resp), Some(cause)) = (self.response.as_mut(), err.to_cause()) {
            resp.cause = cause;
        }
        self.rejection = Some(err);
    }

    /// Record a failed rule call; the remaining calls are not issued and the
    /// response reports the failure
    pub fn abort(&mut self, err: CpifError) {
        self.calls.clear();
        if let Some(resp) = self.response.as_mut() {
            resp.cause = Cause::RuleInstallationFailed;
        }
        self.rejection = Some(err);
    }

    pub fn cause(&self) -> Cause {
        self.response
            .as_ref()
            .map(|r| r.cause)
            .unwrap_or(Cause::Accepted)
    }
}

// ★ Sans-IO Core Logic
/// Translates directives into session state changes and rule calls
#[derive(Debug)]
pub struct ProtocolHandler {
    directory: SessionDirectory,
    s1u_addr: Ipv4Addr,
}

impl ProtocolHandler {
    pub fn new(max_sessions: u32, s1u_addr: Ipv4Addr) -> Self {
        Self {
            directory: SessionDirectory::new(max_sessions),
            s1u_addr,
        }
    }

    pub fn handle(&mut self, directive: &Directive) -> Transaction {
        let mut tx = Transaction::new(directive);

        match directive.kind {
            // イベント1: セッション作成 (カウンタIDのみ割り当て、ルールは Modify で投入)
            DirectiveKind::Create => {
                tx.response = Some(Response::reply(&directive.header));
                tx.learned_dp_id = Some(directive.header.dp_id);
                if let Err(e) = self.directory.create(tx.key) {
                    tx.reject(e);
                }
            }
            // イベント2: トンネル情報の確定 → PDR/FAR/カウンタ投入
            DirectiveKind::Modify => {
                tx.response = Some(Response::reply(&directive.header));
                match self.directory.modify(tx.key, directive.entry.dl_teid) {
                    Ok(ctr_id) => {
                        tx.calls = install_plan(&directive.entry, ctr_id, self.s1u_addr);
                    }
                    Err(e) => tx.reject(e),
                }
            }
            // イベント3: セッション削除 (カウンタIDはここで返却済み)
            DirectiveKind::Delete => {
                tx.response = Some(Response::reply(&directive.header));
                match self.directory.delete(tx.key) {
                    Ok(record) => {
                        tx.calls = teardown_plan(directive.entry.ue_addr, &record);
                    }
                    Err(e) => tx.reject(e),
                }
            }
            // イベント4: KeepAlive ACK (dp_id を更新、応答なし)
            DirectiveKind::KeepAliveAck => {
                tx.learned_dp_id = Some(directive.header.dp_id);
            }
        }

        tx
    }

    pub fn directory(&self) -> &SessionDirectory {
        &self.directory
    }
}
