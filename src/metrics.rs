use std::sync::atomic::{AtomicU64, Ordering};

use crate::models::ExecutionOutcome;

#[derive(Debug, Default)]
pub struct MetricsRegistry {
    requests_total: AtomicU64,
    rejected_total: AtomicU64,
    busy_total: AtomicU64,
    succeeded_total: AtomicU64,
    runtime_failed_total: AtomicU64,
    timed_out_total: AtomicU64,
    infra_failed_total: AtomicU64,
    in_flight: AtomicU64,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn received(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn rejected(&self) {
        self.rejected_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn busy(&self) {
        self.busy_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts an execution as in flight until the returned guard drops.
    pub fn started(&self) -> InFlight<'_> {
        self.in_flight.fetch_add(1, Ordering::Relaxed);
        InFlight(self)
    }

    pub fn finished(&self, outcome: &ExecutionOutcome) {
        let counter = match outcome {
            ExecutionOutcome::Success { .. } => &self.succeeded_total,
            ExecutionOutcome::RuntimeFailure { .. } => &self.runtime_failed_total,
            ExecutionOutcome::TimedOut { .. } => &self.timed_out_total,
            ExecutionOutcome::InfrastructureFailure { .. } => &self.infra_failed_total,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn render_prometheus(&self) -> String {
        format!(
            concat!(
                "# TYPE execution_requests_total counter\n",
                "execution_requests_total {}\n",
                "# TYPE execution_rejected_total counter\n",
                "execution_rejected_total {}\n",
                "# TYPE execution_busy_total counter\n",
                "execution_busy_total {}\n",
                "# TYPE execution_succeeded_total counter\n",
                "execution_succeeded_total {}\n",
                "# TYPE execution_runtime_failed_total counter\n",
                "execution_runtime_failed_total {}\n",
                "# TYPE execution_timed_out_total counter\n",
                "execution_timed_out_total {}\n",
                "# TYPE execution_infra_failed_total counter\n",
                "execution_infra_failed_total {}\n",
                "# TYPE execution_in_flight gauge\n",
                "execution_in_flight {}\n"
            ),
            self.requests_total.load(Ordering::Relaxed),
            self.rejected_total.load(Ordering::Relaxed),
            self.busy_total.load(Ordering::Relaxed),
            self.succeeded_total.load(Ordering::Relaxed),
            self.runtime_failed_total.load(Ordering::Relaxed),
            self.timed_out_total.load(Ordering::Relaxed),
            self.infra_failed_total.load(Ordering::Relaxed),
            self.in_flight.load(Ordering::Relaxed),
        )
    }

    fn decrement_in_flight(&self) {
        let mut current = self.in_flight.load(Ordering::Relaxed);
        while current > 0 {
            match self.in_flight.compare_exchange_weak(
                current,
                current - 1,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }
}

pub struct InFlight<'a>(&'a MetricsRegistry);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.decrement_in_flight();
    }
}
