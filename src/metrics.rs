/// Counters tracking queue activity, surfaced for operators.
#[derive(Debug, Clone, Default)]
pub struct QueueMetrics {
    pub publishes: u64,
    pub fetches: u64,
    pub acks: u64,
    pub requeues: u64,
    pub alpha_to_beta_passes: u64,
    pub beta_to_gamma_passes: u64,
    pub beta_to_delta_passes: u64,
    pub delta_to_beta_passes: u64,
    pub demand_loads_from_store: u64,
}

impl QueueMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
