/// Enrollment repair sweeper
///
/// A webhook can approve an order and then fail to insert its enrollment
/// (datastore hiccup between the two writes). The approval is never rolled
/// back, so those orders are found here instead: every tick lists approved
/// orders without an enrollment and provisions each one.
///
/// Orders whose repair failed in the previous sweep go to the back of the
/// next batch, so a run of permanently failing orders cannot hold the
/// oldest slots forever.
///
/// Provisioning is keyed by `(user_id, course_id, order_id)` and tolerates
/// the uniqueness conflict, so running next to the API cannot double-enroll.
///
/// # Example
///
/// ```no_run
/// use coursepay_shared::store::InMemoryStore;
/// use coursepay_worker::sweeper::{EnrollmentSweeper, SweeperConfig};
/// use std::sync::Arc;
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() {
/// let sweeper = EnrollmentSweeper::new(Arc::new(InMemoryStore::new()), SweeperConfig::default());
/// let shutdown = CancellationToken::new();
/// sweeper.run(shutdown).await;
/// # }
/// ```

use coursepay_shared::provision::{EnrollmentProvisioner, ProvisionOutcome};
use coursepay_shared::models::Order;
use coursepay_shared::store::{Datastore, StoreError};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Sweep errors
#[derive(Debug, Error)]
pub enum SweepError {
    /// Listing candidate orders failed
    #[error("Failed to list orders missing enrollments: {0}")]
    List(#[from] StoreError),
}

/// Sweeper configuration
#[derive(Debug, Clone)]
pub struct SweeperConfig {
    /// Delay between sweeps
    pub interval: Duration,

    /// Orders examined per sweep at most
    pub batch_size: usize,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        SweeperConfig {
            interval: Duration::from_secs(60),
            batch_size: 50,
        }
    }
}

/// Counts from one sweep
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Approved orders found without an enrollment
    pub examined: usize,

    /// Enrollments inserted by this sweep
    pub repaired: usize,

    /// Enrollments that appeared concurrently
    pub already_present: usize,

    /// Orders whose provisioning failed; retried after fresh candidates
    pub failed: usize,
}

/// Periodic enrollment repair
pub struct EnrollmentSweeper {
    store: Arc<dyn Datastore>,
    provisioner: EnrollmentProvisioner,
    config: SweeperConfig,
    failed: Mutex<HashSet<Uuid>>,
}

impl EnrollmentSweeper {
    /// Creates a sweeper over a datastore
    pub fn new(store: Arc<dyn Datastore>, config: SweeperConfig) -> Self {
        let provisioner = EnrollmentProvisioner::new(store.clone());
        EnrollmentSweeper {
            store,
            provisioner,
            config,
            failed: Mutex::new(HashSet::new()),
        }
    }

    /// Runs a single sweep
    ///
    /// Per-order failures are counted and logged; only a failure to list
    /// candidates aborts the sweep.
    pub async fn run_once(&self) -> Result<SweepReport, SweepError> {
        let deferred = self.failed.lock().await.clone();
        let listed = self
            .store
            .list_approved_without_enrollment(self.config.batch_size + deferred.len())
            .await?;

        let (retries, fresh): (Vec<Order>, Vec<Order>) = listed
            .into_iter()
            .partition(|order| deferred.contains(&order.id));
        let skipped: HashSet<Uuid> = retries
            .iter()
            .skip(self.config.batch_size.saturating_sub(fresh.len()))
            .map(|order| order.id)
            .collect();
        let orders: Vec<Order> = fresh
            .into_iter()
            .chain(retries)
            .take(self.config.batch_size)
            .collect();

        let mut failed = skipped;
        let mut report = SweepReport {
            examined: orders.len(),
            ..Default::default()
        };

        for order in &orders {
            match self.provisioner.provision(order).await {
                Ok(ProvisionOutcome::Created(enrollment)) => {
                    tracing::info!(
                        order_id = %order.id,
                        enrollment_id = %enrollment.id,
                        "Repaired missing enrollment"
                    );
                    report.repaired += 1;
                }
                Ok(ProvisionOutcome::AlreadyExists) => report.already_present += 1,
                Err(e) => {
                    tracing::error!(
                        order_id = %order.id,
                        user_id = %order.user_id,
                        course_id = %order.course_id,
                        error = %e,
                        "Enrollment repair failed"
                    );
                    report.failed += 1;
                    failed.insert(order.id);
                }
            }
        }

        *self.failed.lock().await = failed;
        Ok(report)
    }

    /// Sweeps on every tick until `shutdown` is cancelled
    ///
    /// The first sweep runs immediately.
    pub async fn run(&self, shutdown: CancellationToken) {
        tracing::info!(
            interval_secs = self.config.interval.as_secs(),
            batch_size = self.config.batch_size,
            "Enrollment sweeper starting"
        );

        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            match self.run_once().await {
                Ok(report) if report.examined > 0 => {
                    tracing::info!(
                        examined = report.examined,
                        repaired = report.repaired,
                        already_present = report.already_present,
                        failed = report.failed,
                        "Sweep finished"
                    );
                }
                Ok(_) => tracing::debug!("Sweep found nothing to repair"),
                Err(e) => tracing::error!(error = %e, "Sweep failed"),
            }
        }

        tracing::info!("Enrollment sweeper stopped");
    }
}
