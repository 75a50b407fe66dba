///! Export breaker statistics to Prometheus.
use crate::core::{State, StatsSink};
use lazy_static::lazy_static;
use prometheus_exporter::{
    prometheus::{default_registry, opts, CounterVec, GaugeVec, Registry},
    Builder,
};
use std::sync::Once;
use sysinfo::{System, SystemExt};

lazy_static! {
    static ref HOST_NAME: String = System::new().host_name().unwrap_or_else(|| "<unknown>".to_owned());
    static ref PROCESS_NAME: String = std::env::args().collect::<Vec<String>>()[0].clone();
    static ref PID_STRING: String = format!("{}", std::process::id());
    static ref STATE_GAUGE: GaugeVec = GaugeVec::new(
        opts!(
            "circuit_breaker_state",
            "Current circuit breaker state (0 closed, 1 open, 2 half-open)"
        ),
        &["host", "process", "pid", "name"]
    )
    .unwrap();
    static ref SUCCESS_COUNTER: CounterVec = CounterVec::new(
        opts!(
            "circuit_breaker_success_total",
            "Circuit breaker total successful call count"
        ),
        &["host", "process", "pid", "name", "state"]
    )
    .unwrap();
    static ref FAILURE_COUNTER: CounterVec = CounterVec::new(
        opts!(
            "circuit_breaker_failure_total",
            "Circuit breaker total failed or rejected call count"
        ),
        &["host", "process", "pid", "name", "state"]
    )
    .unwrap();
    static ref GAUGE_METRICS: Vec<GaugeVec> = vec![STATE_GAUGE.clone()];
    static ref COUNTER_METRICS: Vec<CounterVec> =
        vec![SUCCESS_COUNTER.clone(), FAILURE_COUNTER.clone()];
    static ref INIT_ONCE: Once = Once::new();
}

fn state_code(state: State) -> f64 {
    match state {
        State::Closed => 0.0,
        State::Open => 1.0,
        State::HalfOpen => 2.0,
    }
}

pub fn set_breaker_state(name: &str, state: State) {
    STATE_GAUGE
        .with_label_values(&[&HOST_NAME, &PROCESS_NAME, &PID_STRING, name])
        .set(state_code(state));
}

pub fn add_success_counter(name: &str, prev_state: State) {
    SUCCESS_COUNTER
        .with_label_values(&[
            &HOST_NAME,
            &PROCESS_NAME,
            &PID_STRING,
            name,
            &prev_state.to_string(),
        ])
        .inc_by(1.0);
}

pub fn add_failure_counter(name: &str, prev_state: State) {
    FAILURE_COUNTER
        .with_label_values(&[
            &HOST_NAME,
            &PROCESS_NAME,
            &PID_STRING,
            name,
            &prev_state.to_string(),
        ])
        .inc_by(1.0);
}

/// `PrometheusStats` forwards breaker events to the Prometheus collectors.
/// Hand it to a breaker with `CircuitBreakerBuilder::with_stats` and call
/// [`init`] once to serve the metrics endpoint.
#[derive(Debug, Default)]
pub struct PrometheusStats;

impl StatsSink for PrometheusStats {
    fn record_state(&self, name: &str, state: State) {
        set_breaker_state(name, state);
    }

    fn record_success(&self, name: &str, prev_state: State) {
        add_success_counter(name, prev_state);
    }

    fn record_failure(&self, name: &str, prev_state: State) {
        add_failure_counter(name, prev_state);
    }
}

fn register_breaker_metrics(registry: Option<Box<Registry>>) {
    let r = match registry {
        Some(ref r) => r,
        None => default_registry(),
    };
    for item in &*GAUGE_METRICS {
        r.register(Box::new(item.clone())).unwrap();
    }
    for item in &*COUNTER_METRICS {
        r.register(Box::new(item.clone())).unwrap();
    }
}

pub fn reset_breaker_metrics() {
    for item in &*GAUGE_METRICS {
        item.reset();
    }
    for item in &*COUNTER_METRICS {
        item.reset();
    }
}

pub fn init(addr: &str, metrics_path: &str) {
    let binding = addr.parse().unwrap();
    let metrics_path = metrics_path.to_owned();
    INIT_ONCE.call_once(move || {
        // currently, `prometheus_exporter` crate only supports the global registry
        register_breaker_metrics(None);
        let mut builder = Builder::new(binding);
        builder.with_endpoint(&metrics_path).unwrap();
        builder.start().unwrap();
    });
}
