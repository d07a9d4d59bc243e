/// Fixed batch size controlling alpha-to-beta and beta-to-gamma
/// amortisation.
pub const IO_BATCH: usize = 64;

/// Tunable knobs for a single queue instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueConfig {
    /// Number of elements moved per phase-change pass. Defaults to
    /// `IO_BATCH`; tests may lower it to exercise multiple passes
    /// without large fixtures.
    pub io_batch: usize,
    /// Whether the owning queue is durable. A message's `is_persistent`
    /// flag can only ever be true when this is set.
    pub durable: bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            io_batch: IO_BATCH,
            durable: true,
        }
    }
}
