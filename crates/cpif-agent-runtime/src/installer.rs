use async_trait::async_trait;
use cpif_agent_core::rules::{CounterRule, FarKey, FarRule, PdrMatch, PdrRule, RuleCall, SourceIface};
use cpif_config::DataplaneConfig;
use cpif_core::{CpifError, Result};
use cpif_metrics::{RULE_CALLS_TOTAL, RULE_CALL_SECONDS, RULE_FAILURES_TOTAL};
use cpif_proto::{
    CommandResponse, CounterRequest, FarRequest, PdrRequest, RemoveAllRequest, RuleServiceClient,
    SourceInterface,
};
use std::time::Duration;
use tonic::transport::{Channel, Endpoint};
use tracing::debug;

/// Dataplane rule-programming boundary
///
/// Allows switching between the gRPC dataplane client and test doubles.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RuleInstaller: Send + Sync {
    async fn add_pdr(&self, rule: PdrRule) -> Result<()>;
    async fn del_pdr(&self, key: PdrMatch) -> Result<()>;
    async fn add_far(&self, rule: FarRule) -> Result<()>;
    async fn del_far(&self, key: FarKey) -> Result<()>;
    async fn add_counter(&self, rule: CounterRule) -> Result<()>;
    async fn del_counter(&self, rule: CounterRule) -> Result<()>;
    /// Clear every session rule in the dataplane
    async fn remove_all(&self) -> Result<()>;
}

/// Issue one planned call, recording its outcome and latency
pub async fn execute<I>(installer: &I, call: &RuleCall) -> Result<()>
where
    I: RuleInstaller + ?Sized,
{
    let op = call.op();
    RULE_CALLS_TOTAL.with_label_values(&[op]).inc();
    let timer = RULE_CALL_SECONDS.with_label_values(&[op]).start_timer();

    let result = match *call {
        RuleCall::AddPdr(rule) => installer.add_pdr(rule).await,
        RuleCall::DelPdr(key) => installer.del_pdr(key).await,
        RuleCall::AddFar(rule) => installer.add_far(rule).await,
        RuleCall::DelFar(key) => installer.del_far(key).await,
        RuleCall::AddCounter(rule) => installer.add_counter(rule).await,
        RuleCall::DelCounter(rule) => installer.del_counter(rule).await,
        RuleCall::RemoveAll => installer.remove_all().await,
    };

    timer.observe_duration();
    if result.is_err() {
        RULE_FAILURES_TOTAL.with_label_values(&[op]).inc();
    }
    result
}

/// Dataplane module instances rule calls are addressed to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleNames {
    pub pdr_lookup: String,
    pub far_lookup: String,
    /// Base name; see `CounterRole::module_name`
    pub qos_counter: String,
    pub encap: String,
}

impl From<&DataplaneConfig> for ModuleNames {
    fn from(config: &DataplaneConfig) -> Self {
        Self {
            pdr_lookup: config.pdr_lookup.clone(),
            far_lookup: config.far_lookup.clone(),
            qos_counter: config.qos_counter.clone(),
            encap: config.encap.clone(),
        }
    }
}

impl Default for ModuleNames {
    fn default() -> Self {
        Self::from(&DataplaneConfig::default())
    }
}

/// Rule installer backed by the dataplane's gRPC rule service
#[derive(Debug, Clone)]
pub struct GrpcRuleInstaller {
    client: RuleServiceClient<Channel>,
    modules: ModuleNames,
}

impl GrpcRuleInstaller {
    /// The connection is established on first use; an unreachable dataplane
    /// surfaces as a failed rule call.
    pub fn connect_lazy(endpoint: &str, modules: ModuleNames, rpc_timeout: Duration) -> Result<Self> {
        let endpoint = Endpoint::from_shared(endpoint.to_string())
            .map_err(|e| {
                CpifError::ConfigError(format!("invalid dataplane endpoint {}: {}", endpoint, e))
            })?
            .timeout(rpc_timeout)
            .connect_timeout(rpc_timeout);

        debug!("Dataplane rule service at {}", endpoint.uri());
        Ok(Self {
            client: RuleServiceClient::new(endpoint.connect_lazy()),
            modules,
        })
    }

    fn pdr_request(&self, key: &PdrMatch) -> PdrRequest {
        let src_iface = match key.src_iface {
            SourceIface::Access => SourceInterface::Access,
            SourceIface::Core => SourceInterface::Core,
        };
        PdrRequest {
            module: self.modules.pdr_lookup.clone(),
            src_iface: src_iface as i32,
            src_addr: u32::from(key.src_addr),
            src_mask: key.src_mask,
            dst_addr: u32::from(key.dst_addr),
            dst_mask: key.dst_mask,
            ..Default::default()
        }
    }

    fn far_request(&self, key: &FarKey) -> FarRequest {
        FarRequest {
            module: self.modules.far_lookup.clone(),
            far_id: key.far_id,
            fseid: key.fseid,
            ..Default::default()
        }
    }

    fn counter_request(&self, rule: &CounterRule) -> CounterRequest {
        CounterRequest {
            module: rule.role.module_name(&self.modules.qos_counter),
            ctr_id: rule.ctr_id,
        }
    }
}

fn check(
    op: &'static str,
    result: std::result::Result<tonic::Response<CommandResponse>, tonic::Status>,
) -> Result<()> {
    let response = result
        .map_err(|status| CpifError::RuleInstallation {
            op,
            reason: format!("{:?}: {}", status.code(), status.message()),
        })?
        .into_inner();

    if !response.is_ok() {
        return Err(CpifError::RuleInstallation {
            op,
            reason: format!("code {}: {}", response.code, response.message),
        });
    }
    Ok(())
}

#[async_trait]
impl RuleInstaller for GrpcRuleInstaller {
    async fn add_pdr(&self, rule: PdrRule) -> Result<()> {
        let request = PdrRequest {
            fseid: rule.fseid,
            ctr_id: rule.ctr_id,
            far_id: rule.far_id,
            need_decap: rule.need_decap,
            ..self.pdr_request(&rule.key)
        };
        let mut client = self.client.clone();
        check("add_pdr", client.add_pdr(request).await)
    }

    async fn del_pdr(&self, key: PdrMatch) -> Result<()> {
        let mut client = self.client.clone();
        check("del_pdr", client.del_pdr(self.pdr_request(&key)).await)
    }

    async fn add_far(&self, rule: FarRule) -> Result<()> {
        let mut request = self.far_request(&rule.key);
        if let Some(encap) = rule.encap {
            request.tunnel = true;
            request.tun_src = u32::from(encap.src);
            request.tun_dst = u32::from(encap.dst);
            request.teid = encap.teid;
            request.tun_port = u32::from(encap.port);
        }
        let mut client = self.client.clone();
        check("add_far", client.add_far(request).await)
    }

    async fn del_far(&self, key: FarKey) -> Result<()> {
        let mut client = self.client.clone();
        check("del_far", client.del_far(self.far_request(&key)).await)
    }

    async fn add_counter(&self, rule: CounterRule) -> Result<()> {
        let mut client = self.client.clone();
        check("add_counter", client.add_counter(self.counter_request(&rule)).await)
    }

    async fn del_counter(&self, rule: CounterRule) -> Result<()> {
        let mut client = self.client.clone();
        check("del_counter", client.del_counter(self.counter_request(&rule)).await)
    }

    async fn remove_all(&self) -> Result<()> {
        let request = RemoveAllRequest {
            module: self.modules.encap.clone(),
        };
        let mut client = self.client.clone();
        check("remove_all", client.remove_all(request).await)
    }
}
