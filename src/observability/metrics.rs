//! # Metrics
//!
//! Prometheus metrics for monitoring the controller.
//!
//! ## Metrics Exposed
//!
//! - `external_secret_reconciliations_total` - Sync cycles started, by trigger
//! - `external_secret_reconciliation_errors_total` - Failed sync cycles, by error class
//! - `external_secret_reconciliation_duration_seconds` - Duration of sync cycles
//! - `external_secret_secrets_synced_total` - Secrets written to the cluster
//! - `external_secret_scheduled_entities` - ExternalSecrets with a periodic schedule
//! - `external_secret_scheduler_fires_total` - Scheduled jobs dispatched
//! - `external_secret_requeues_total` - Requeues signalled to the watch source, by reason
//! - `external_secret_provider_operations_total` - Backend calls, by provider and operation
//! - `external_secret_provider_operation_duration_seconds` - Backend call latency
//! - `external_secret_provider_operation_errors_total` - Failed backend calls

use anyhow::Result;
use prometheus::{Histogram, HistogramVec, IntCounter, IntCounterVec, IntGauge, Registry};
use std::sync::LazyLock;

// Metrics
pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static RECONCILIATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "external_secret_reconciliations_total",
            "Total number of sync cycles",
        ),
        &["trigger"],
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "external_secret_reconciliation_errors_total",
            "Total number of failed sync cycles",
        ),
        &["class"],
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric - this should never happen")
});

static RECONCILIATION_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "external_secret_reconciliation_duration_seconds",
            "Duration of sync cycles in seconds",
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]),
    )
    .expect("Failed to create RECONCILIATION_DURATION metric - this should never happen")
});

static SECRETS_SYNCED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "external_secret_secrets_synced_total",
        "Total number of Secrets written from external stores",
    )
    .expect("Failed to create SECRETS_SYNCED_TOTAL metric - this should never happen")
});

static SCHEDULED_ENTITIES: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "external_secret_scheduled_entities",
        "Current number of ExternalSecrets with a periodic schedule",
    )
    .expect("Failed to create SCHEDULED_ENTITIES metric - this should never happen")
});

static SCHEDULER_FIRES_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "external_secret_scheduler_fires_total",
        "Total number of scheduled jobs dispatched",
    )
    .expect("Failed to create SCHEDULER_FIRES_TOTAL metric - this should never happen")
});

static REQUEUES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "external_secret_requeues_total",
            "Total number of requeues signalled to the watch source",
        ),
        &["reason"],
    )
    .expect("Failed to create REQUEUES_TOTAL metric - this should never happen")
});

static PROVIDER_OPERATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "external_secret_provider_operations_total",
            "Total number of backend operations",
        ),
        &["provider", "operation"],
    )
    .expect("Failed to create PROVIDER_OPERATIONS_TOTAL metric - this should never happen")
});

static PROVIDER_OPERATION_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        prometheus::HistogramOpts::new(
            "external_secret_provider_operation_duration_seconds",
            "Duration of backend operations in seconds",
        )
        .buckets(vec![0.05, 0.1, 0.5, 1.0, 2.0, 5.0]),
        &["provider"],
    )
    .expect("Failed to create PROVIDER_OPERATION_DURATION metric - this should never happen")
});

static PROVIDER_OPERATION_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "external_secret_provider_operation_errors_total",
            "Total number of failed backend operations",
        ),
        &["provider", "class"],
    )
    .expect("Failed to create PROVIDER_OPERATION_ERRORS_TOTAL metric - this should never happen")
});

/// Register all metrics with the process registry
///
/// # Errors
///
/// Fails when called twice, as the registry rejects duplicate collectors.
pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(SECRETS_SYNCED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(SCHEDULED_ENTITIES.clone()))?;
    REGISTRY.register(Box::new(SCHEDULER_FIRES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(REQUEUES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(PROVIDER_OPERATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(PROVIDER_OPERATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(PROVIDER_OPERATION_ERRORS_TOTAL.clone()))?;
    Ok(())
}

pub fn increment_reconciliations(trigger: &str) {
    RECONCILIATIONS_TOTAL.with_label_values(&[trigger]).inc();
}

pub fn increment_reconciliation_errors(class: &str) {
    RECONCILIATION_ERRORS_TOTAL.with_label_values(&[class]).inc();
}

pub fn observe_reconciliation_duration(duration: f64) {
    RECONCILIATION_DURATION.observe(duration);
}

pub fn increment_secrets_synced() {
    SECRETS_SYNCED_TOTAL.inc();
}

pub fn set_scheduled_entities(count: usize) {
    SCHEDULED_ENTITIES.set(i64::try_from(count).unwrap_or(i64::MAX));
}

pub fn increment_scheduler_fires() {
    SCHEDULER_FIRES_TOTAL.inc();
}

pub fn increment_requeues_total(reason: &str) {
    REQUEUES_TOTAL.with_label_values(&[reason]).inc();
}

/// Record one backend call
pub fn record_provider_operation(provider: &str, operation: &str, duration: f64) {
    PROVIDER_OPERATIONS_TOTAL
        .with_label_values(&[provider, operation])
        .inc();
    PROVIDER_OPERATION_DURATION
        .with_label_values(&[provider])
        .observe(duration);
}

pub fn increment_provider_operation_errors(provider: &str, class: &str) {
    PROVIDER_OPERATION_ERRORS_TOTAL
        .with_label_values(&[provider, class])
        .inc();
}
