//! Prometheus metrics for reconciliation outcomes

use std::sync::Arc;

use prometheus::{IntCounterVec, Opts, Registry};

use crate::error::ReconcileError;
use crate::reconciler::ReconcileOutcome;

#[derive(Clone, Debug)]
pub struct Metrics {
    /// Successful reconciliations by managed kind and outcome
    pub reconcile_total: IntCounterVec,
    /// Failed reconciliations by managed kind
    pub reconcile_errors_total: IntCounterVec,
    pub registry: Arc<Registry>,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let reconcile_total = IntCounterVec::new(
            Opts::new(
                "llamastack_reconcile_total",
                "Total number of successful reconciliations of managed objects",
            ),
            &["kind", "outcome"],
        )?;
        registry.register(Box::new(reconcile_total.clone()))?;

        let reconcile_errors_total = IntCounterVec::new(
            Opts::new(
                "llamastack_reconcile_errors_total",
                "Total number of failed reconciliations of managed objects",
            ),
            &["kind"],
        )?;
        registry.register(Box::new(reconcile_errors_total.clone()))?;

        Ok(Self {
            reconcile_total,
            reconcile_errors_total,
            registry: Arc::new(registry),
        })
    }

    /// Count the result of reconciling one managed object.
    pub fn record(&self, kind: &str, result: &Result<ReconcileOutcome, ReconcileError>) {
        match result {
            Ok(outcome) => self
                .reconcile_total
                .with_label_values(&[kind, outcome.as_str()])
                .inc(),
            Err(_) => self.reconcile_errors_total.with_label_values(&[kind]).inc(),
        }
    }
}
