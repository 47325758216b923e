use lazy_static::lazy_static;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // Directive metrics
    pub static ref DIRECTIVES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("cpif_directives_total", "Directives received, by kind"),
        &["kind"]
    ).unwrap();

    pub static ref DIRECTIVE_FAILURES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("cpif_directive_failures_total", "Directives answered with an error cause"),
        &["cause"]
    ).unwrap();

    pub static ref DISCARDED_RECORDS_TOTAL: IntCounter = IntCounter::with_opts(
        Opts::new("cpif_discarded_records_total", "Inbound records that could not be decoded")
    ).unwrap();

    // Dataplane rule metrics
    pub static ref RULE_CALLS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("cpif_rule_calls_total", "Rule calls issued to the dataplane, by operation"),
        &["op"]
    ).unwrap();

    pub static ref RULE_FAILURES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("cpif_rule_failures_total", "Failed rule calls, by operation"),
        &["op"]
    ).unwrap();

    pub static ref RULE_CALL_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new("cpif_rule_call_seconds", "Rule call latency in seconds")
            .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]),
        &["op"]
    ).unwrap();

    // Session state
    pub static ref ACTIVE_SESSIONS: IntGauge = IntGauge::with_opts(
        Opts::new("cpif_active_sessions", "Sessions currently in the directory")
    ).unwrap();

    pub static ref FREE_COUNTERS: IntGauge = IntGauge::with_opts(
        Opts::new("cpif_free_counters", "Counter ids available for new sessions")
    ).unwrap();

    // Control plane liveness
    pub static ref KEEPALIVES_SENT_TOTAL: IntCounter = IntCounter::with_opts(
        Opts::new("cpif_keepalives_sent_total", "Keepalives sent to the control plane")
    ).unwrap();

    pub static ref SEND_FAILURES_TOTAL: IntCounter = IntCounter::with_opts(
        Opts::new("cpif_send_failures_total", "Records that could not be pushed to the control plane")
    ).unwrap();

    pub static ref CONTROL_PLANE_FAULTS_TOTAL: IntCounter = IntCounter::with_opts(
        Opts::new("cpif_control_plane_faults_total", "Times the control plane was declared lost")
    ).unwrap();

    pub static ref RESTARTS_TOTAL: IntCounter = IntCounter::with_opts(
        Opts::new("cpif_restarts_total", "Service restarts after a control plane fault")
    ).unwrap();
}

/// Register all metrics with the global registry
///
/// Safe to call more than once; metrics already registered are skipped.
pub fn register_metrics() -> Result<(), prometheus::Error> {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(DIRECTIVES_TOTAL.clone()),
        Box::new(DIRECTIVE_FAILURES_TOTAL.clone()),
        Box::new(DISCARDED_RECORDS_TOTAL.clone()),
        Box::new(RULE_CALLS_TOTAL.clone()),
        Box::new(RULE_FAILURES_TOTAL.clone()),
        Box::new(RULE_CALL_SECONDS.clone()),
        Box::new(ACTIVE_SESSIONS.clone()),
        Box::new(FREE_COUNTERS.clone()),
        Box::new(KEEPALIVES_SENT_TOTAL.clone()),
        Box::new(SEND_FAILURES_TOTAL.clone()),
        Box::new(CONTROL_PLANE_FAULTS_TOTAL.clone()),
        Box::new(RESTARTS_TOTAL.clone()),
    ];

    for collector in collectors {
        match REGISTRY.register(collector) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Gather metrics in Prometheus text format
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = vec![];
    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_registration() {
        register_metrics().unwrap();
        // second registration is a no-op
        register_metrics().unwrap();

        DIRECTIVES_TOTAL.with_label_values(&["create"]).inc();
        RULE_CALL_SECONDS.with_label_values(&["add_pdr"]).observe(0.002);
        ACTIVE_SESSIONS.set(3);
        KEEPALIVES_SENT_TOTAL.inc();

        let metrics = gather_metrics();
        assert!(metrics.contains("cpif_directives_total"));
        assert!(metrics.contains("cpif_rule_call_seconds"));
        assert!(metrics.contains("cpif_active_sessions 3"));
    }
}
