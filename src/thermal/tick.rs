use super::config::{SchedulePolicy, TickConfig};
use super::heat::next_temperature;
use super::neighbor::is_neighbor;
use crate::block::Block;
use crate::store::{BlockStore, StoreError, TemperatureWrite, TickCommit};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Minimum temperature change (exclusive) that gets written back
pub const CHANGE_THRESHOLD: f64 = 0.1;

/// Result of applying the heat model to one snapshot
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TickPlan {
    /// Next temperature of every block, in snapshot order
    pub computed: Vec<TemperatureWrite>,

    /// Subset of `computed` that moved by more than [`CHANGE_THRESHOLD`]
    pub writes: Vec<TemperatureWrite>,

    /// Blocks whose change was at or below the threshold
    pub suppressed: usize,
}

/// Apply the heat model to every block of a snapshot.
///
/// Updates are simultaneous: every neighbor input is read from `blocks`
/// as given, so no block sees another block's result from this pass.
pub fn compute_updates(blocks: &[Block]) -> TickPlan {
    let mut plan = TickPlan::default();
    let mut neighbor_temps = Vec::new();

    for (i, block) in blocks.iter().enumerate() {
        neighbor_temps.clear();
        neighbor_temps.extend(
            blocks
                .iter()
                .enumerate()
                .filter(|(j, other)| *j != i && other.id != block.id && is_neighbor(block, other))
                .map(|(_, other)| other.temperature.value()),
        );

        let next = next_temperature(block, &neighbor_temps);
        let update = TemperatureWrite {
            id: block.id.clone(),
            temperature: next,
        };

        if (next - block.temperature.value()).abs() > CHANGE_THRESHOLD {
            plan.writes.push(update.clone());
        } else {
            plan.suppressed += 1;
        }
        plan.computed.push(update);
    }

    plan
}

/// Outcome of a committed (or empty) tick
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TickReport {
    /// Revision of the snapshot the tick read
    pub revision: u64,
    pub blocks: usize,
    pub written: usize,
    pub suppressed: usize,
}

/// Tick failures. The tick is discarded as a whole; nothing was written.
#[derive(Debug, Clone, PartialEq)]
pub enum TickError {
    Read(StoreError),
    Commit(StoreError),
}

impl TickError {
    /// True when the tick lost an optimistic-concurrency race
    pub fn is_conflict(&self) -> bool {
        match self {
            TickError::Read(e) | TickError::Commit(e) => e.is_conflict(),
        }
    }
}

impl fmt::Display for TickError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TickError::Read(e) => write!(f, "snapshot read failed: {}", e),
            TickError::Commit(e) => write!(f, "temperature commit failed: {}", e),
        }
    }
}

impl std::error::Error for TickError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TickError::Read(e) | TickError::Commit(e) => Some(e),
        }
    }
}

/// Runs the periodic thermal simulation against the block store
pub struct TickCoordinator {
    store: Arc<dyn BlockStore>,
    config: TickConfig,

    /// Ticks started so far (for logging)
    ticks: AtomicU64,
}

impl TickCoordinator {
    pub fn new(store: Arc<dyn BlockStore>, config: TickConfig) -> Self {
        Self {
            store,
            config,
            ticks: AtomicU64::new(0),
        }
    }

    /// Run one simulation cycle.
    ///
    /// Reads the whole collection, computes every block's next temperature
    /// from that snapshot and commits the above-threshold changes in the
    /// same optimistic transaction. The full computed set rides along with
    /// the commit so the resulting broadcast shows sub-threshold values too.
    /// An empty collection is a no-op.
    pub async fn run_tick(&self) -> Result<TickReport, TickError> {
        let snapshot = self.store.read_snapshot().await.map_err(TickError::Read)?;

        if snapshot.is_empty() {
            return Ok(TickReport {
                revision: snapshot.revision,
                ..Default::default()
            });
        }

        let TickPlan {
            computed,
            writes,
            suppressed,
        } = compute_updates(&snapshot.blocks);

        let written = self
            .store
            .commit_temperatures(TickCommit {
                read_revision: snapshot.revision,
                writes,
                computed,
            })
            .await
            .map_err(TickError::Commit)?;

        Ok(TickReport {
            revision: snapshot.revision,
            blocks: snapshot.blocks.len(),
            written,
            suppressed,
        })
    }

    /// Run a tick and contain any failure at this boundary
    async fn tick_and_log(&self) {
        let tick = self.ticks.fetch_add(1, Ordering::Relaxed) + 1;

        match self.run_tick().await {
            Ok(report) => debug!(
                tick,
                revision = report.revision,
                blocks = report.blocks,
                written = report.written,
                suppressed = report.suppressed,
                "Tick committed"
            ),
            Err(e) if e.is_conflict() => {
                warn!(tick, error = %e, "Tick dropped after concurrent modification")
            }
            Err(e) => error!(tick, error = %e, "Tick failed"),
        }
    }

    /// Run ticks forever according to the configured [`SchedulePolicy`].
    ///
    /// A failed tick is not retried; the next scheduled tick supersedes it.
    pub async fn run_tick_loop(self: Arc<Self>) {
        let period = self.config.period();

        info!(
            interval_ms = period.as_millis() as u64,
            policy = ?self.config.policy,
            "Starting tick coordinator"
        );

        match self.config.policy {
            SchedulePolicy::FixedDelay => loop {
                sleep(period).await;
                self.tick_and_log().await;
            },
            SchedulePolicy::FixedRate => {
                let mut ticker = interval_at(Instant::now() + period, period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    ticker.tick().await;
                    self.tick_and_log().await;
                }
            }
            SchedulePolicy::Overlapping => {
                let mut ticker = interval_at(Instant::now() + period, period);
                loop {
                    ticker.tick().await;
                    let coordinator = Arc::clone(&self);
                    tokio::spawn(async move {
                        coordinator.tick_and_log().await;
                    });
                }
            }
        }
    }
}
