//! Reconciliation worker.
//!
//! Webhooks are not guaranteed to arrive, so every transaction that is still unresolved gets its own polling task
//! that asks the processor for the current status. The worker scans the store on startup and then every
//! `scan_interval`, starting a task for each unresolved transaction whose order is not tracked yet.
//!
//! Each task checks its transaction every `poll_interval` and stops when
//! * the order reached a terminal payment status, through this task or through a webhook,
//! * it used up `max_attempts` status checks (gateway errors count too). The order is left as it is and the task is
//!   kept in the registry as `exhausted` so that it is not restarted and can be followed up manually,
//! * it was stopped through [`ReconciliationRegistry::stop`].
//!
//! Finished tasks stay in the registry only while their order still has an unresolved transaction, which keeps the
//! scan from restarting them. Every scan prunes the others, so the registry never holds more than the unresolved
//! transactions plus the tasks currently running.
//!
//! Status updates go through [`OrderFlowApi::reconcile_transaction`], so a poll result racing a webhook for the same
//! order produces exactly one transition and one notification.
use std::{collections::HashSet, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use dashmap::{mapref::entry::Entry, DashMap};
use gateway_client::{GatewayError, PaymentGateway};
use log::*;
use serde::Serialize;
use storefront_payment_engine::{
    db_types::Transaction,
    events::EventProducers,
    OrderFlowApi,
    OrderManagement,
    SqliteDatabase,
};
use tokio::{task::JoinHandle, time::MissedTickBehavior};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_POLL_ATTEMPTS: u32 = 60;

#[derive(Debug, Clone)]
pub struct ReconciliationConfig {
    /// Time between two status checks of the same transaction
    pub poll_interval: Duration,
    /// Time between two scans for unresolved transactions that are not tracked yet
    pub scan_interval: Duration,
    pub max_attempts: u32,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            scan_interval: DEFAULT_SCAN_INTERVAL,
            max_attempts: DEFAULT_MAX_POLL_ATTEMPTS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PollState {
    Active,
    /// The order reached a terminal payment status
    Resolved,
    /// The attempt budget ran out before the processor resolved the transaction
    Exhausted,
    Stopped,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PollTaskStatus {
    pub order_id: i64,
    pub external_id: String,
    pub attempts: u32,
    pub max_attempts: u32,
    pub state: PollState,
    pub started_at: DateTime<Utc>,
    pub last_checked_at: Option<DateTime<Utc>>,
}

/// Tracks one polling task per order. Cloning the registry shares the underlying map.
#[derive(Debug, Clone, Default)]
pub struct ReconciliationRegistry {
    tasks: Arc<DashMap<i64, PollTaskStatus>>,
}

impl ReconciliationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a task for the order. Returns false if the order is (or was) already tracked.
    pub fn try_register(&self, order_id: i64, external_id: &str, max_attempts: u32) -> bool {
        match self.tasks.entry(order_id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(e) => {
                e.insert(PollTaskStatus {
                    order_id,
                    external_id: external_id.to_string(),
                    attempts: 0,
                    max_attempts,
                    state: PollState::Active,
                    started_at: Utc::now(),
                    last_checked_at: None,
                });
                true
            },
        }
    }

    /// Counts a status check against the task's budget and returns the new attempt count.
    pub fn record_attempt(&self, order_id: i64) -> u32 {
        match self.tasks.get_mut(&order_id) {
            Some(mut task) => {
                task.attempts += 1;
                task.last_checked_at = Some(Utc::now());
                task.attempts
            },
            None => 0,
        }
    }

    /// Stops an active task. The task notices on its next tick, and any gateway response it is waiting for is
    /// discarded. Returns false if there is no active task for the order.
    pub fn stop(&self, order_id: i64) -> bool {
        self.transition(order_id, PollState::Stopped)
    }

    pub fn is_active(&self, order_id: i64) -> bool {
        self.tasks.get(&order_id).map(|t| t.state == PollState::Active).unwrap_or(false)
    }

    pub fn get(&self, order_id: i64) -> Option<PollTaskStatus> {
        self.tasks.get(&order_id).map(|t| t.value().clone())
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Forgets finished tasks whose order is not in `unresolved_orders`. Active tasks are always kept.
    /// Returns the number of entries removed.
    pub fn prune(&self, unresolved_orders: &HashSet<i64>) -> usize {
        let mut removed = 0;
        self.tasks.retain(|order_id, task| {
            let keep = task.state == PollState::Active || unresolved_orders.contains(order_id);
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }

    pub fn snapshot(&self) -> Vec<PollTaskStatus> {
        let mut tasks = self.tasks.iter().map(|t| t.value().clone()).collect::<Vec<_>>();
        tasks.sort_by_key(|t| t.order_id);
        tasks
    }

    fn resolve(&self, order_id: i64) -> bool {
        self.transition(order_id, PollState::Resolved)
    }

    fn exhaust(&self, order_id: i64) -> bool {
        self.transition(order_id, PollState::Exhausted)
    }

    // Only active tasks change state, so a stopped task can never be marked resolved by a late response
    fn transition(&self, order_id: i64, state: PollState) -> bool {
        match self.tasks.get_mut(&order_id) {
            Some(mut task) if task.state == PollState::Active => {
                task.state = state;
                true
            },
            _ => false,
        }
    }
}

/// Starts the reconciliation worker. Do not await the returned JoinHandle, as it will run indefinitely.
pub fn start_reconciliation_worker<G>(
    db: SqliteDatabase,
    gateway: Arc<G>,
    producers: EventProducers,
    config: ReconciliationConfig,
    registry: ReconciliationRegistry,
) -> JoinHandle<()>
where
    G: PaymentGateway + 'static,
{
    tokio::spawn(async move {
        let api = OrderFlowApi::new(db, producers);
        let mut timer = tokio::time::interval(config.scan_interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            "🕰️ Reconciliation worker started. Polling every {}s, at most {} times per transaction.",
            config.poll_interval.as_secs_f32(),
            config.max_attempts
        );
        loop {
            timer.tick().await;
            trace!("🕰️ Scanning for unresolved transactions");
            let transactions = match api.db().fetch_pending_transactions().await {
                Ok(txs) => txs,
                Err(e) => {
                    error!("🕰️ Could not fetch unresolved transactions. {e}");
                    continue;
                },
            };
            let unresolved_orders = transactions.iter().map(|tx| tx.order_id).collect::<HashSet<_>>();
            let pruned = registry.prune(&unresolved_orders);
            if pruned > 0 {
                debug!("🕰️ Forgot {pruned} finished reconciliation tasks");
            }
            let mut started = 0;
            for tx in transactions {
                if registry.try_register(tx.order_id, &tx.external_id, config.max_attempts) {
                    started += 1;
                    let task = PollTask {
                        api: api.clone(),
                        gateway: Arc::clone(&gateway),
                        registry: registry.clone(),
                        poll_interval: config.poll_interval,
                        max_attempts: config.max_attempts,
                    };
                    tokio::spawn(task.run(tx));
                }
            }
            if started > 0 {
                info!("🕰️ Started {started} new reconciliation tasks");
            }
        }
    })
}

struct PollTask<G> {
    api: OrderFlowApi<SqliteDatabase>,
    gateway: Arc<G>,
    registry: ReconciliationRegistry,
    poll_interval: Duration,
    max_attempts: u32,
}

enum Tick {
    Continue,
    Done,
}

impl<G: PaymentGateway> PollTask<G> {
    async fn run(self, tx: Transaction) {
        let order_id = tx.order_id;
        debug!("🕰️ Polling transaction [{}] for order #{order_id}", tx.external_id);
        let mut timer = tokio::time::interval(self.poll_interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately. Give the webhook a head start.
        timer.tick().await;
        loop {
            timer.tick().await;
            if let Tick::Done = self.tick(&tx).await {
                break;
            }
        }
        debug!("🕰️ Stopped polling transaction [{}] for order #{order_id}", tx.external_id);
    }

    async fn tick(&self, tx: &Transaction) -> Tick {
        let order_id = tx.order_id;
        if !self.registry.is_active(order_id) {
            info!("🕰️ Reconciliation of order #{order_id} was stopped");
            return Tick::Done;
        }
        match self.api.db().fetch_order_by_id(order_id).await {
            Ok(Some(order)) if order.payment_status.is_terminal() => {
                debug!("🕰️ Order {} is already {}. Nothing left to reconcile.", order.order_number, order.payment_status);
                self.registry.resolve(order_id);
                return Tick::Done;
            },
            Ok(None) => {
                warn!("🕰️ Order #{order_id} for transaction [{}] no longer exists", tx.external_id);
                self.registry.stop(order_id);
                return Tick::Done;
            },
            Ok(Some(_)) => {},
            Err(e) => warn!("🕰️ Could not load order #{order_id}. Checking the processor anyway. {e}"),
        }
        let attempt = self.registry.record_attempt(order_id);
        let result = self.gateway.get_transaction_status(&tx.external_id).await;
        if !self.registry.is_active(order_id) {
            info!("🕰️ Reconciliation of order #{order_id} was stopped. Discarding the processor response.");
            return Tick::Done;
        }
        match result {
            Ok(gateway_tx) => {
                trace!("🕰️ Attempt {attempt}: transaction [{}] is {}", tx.external_id, gateway_tx.status);
                match self.api.reconcile_transaction(tx, &gateway_tx).await {
                    Ok(update) => {
                        let order = update.order.inner();
                        if order.payment_status.is_terminal() {
                            info!(
                                "🕰️ Order {} resolved as {} after {attempt} status checks",
                                order.order_number, order.payment_status
                            );
                            self.registry.resolve(order_id);
                            return Tick::Done;
                        }
                    },
                    Err(e) => warn!("🕰️ Could not apply status {} to order #{order_id}. {e}", gateway_tx.status),
                }
            },
            Err(e @ GatewayError::Authentication { .. }) => {
                error!("🕰️ The processor rejected our credentials while checking [{}]. {e}", tx.external_id);
            },
            Err(e) => warn!("🕰️ Attempt {attempt}: could not fetch the status of [{}]. {e}", tx.external_id),
        }
        if attempt >= self.max_attempts {
            warn!(
                "🕰️ Transaction [{}] for order #{order_id} is still unresolved after {attempt} status checks. Giving \
                 up. The order needs manual follow-up.",
                tx.external_id
            );
            self.registry.exhaust(order_id);
            return Tick::Done;
        }
        Tick::Continue
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::{AtomicU32, Ordering};

    use gateway_client::{GatewayStatus, GatewayTransaction};
    use storefront_payment_engine::{
        db_types::{OrderStatusType, PaymentMethod, PaymentStatus},
        events::{EventHandlers, NotificationKind},
        test_utils::{event_recorder::EventRecorder, mock_gateway::MockGateway},
        StatusUpdate,
        UpdateOrigin,
    };

    use super::*;
    use crate::endpoint_tests::helpers::{new_test_db, seed_awaiting_order};

    fn fast_config(max_attempts: u32) -> ReconciliationConfig {
        ReconciliationConfig {
            poll_interval: Duration::from_millis(10),
            scan_interval: Duration::from_millis(20),
            max_attempts,
        }
    }

    async fn wait_for_state(registry: &ReconciliationRegistry, order_id: i64, state: PollState) -> PollTaskStatus {
        for _ in 0..500 {
            if let Some(task) = registry.get(order_id) {
                if task.state == state {
                    return task;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("Task for order {order_id} never reached {state:?}. Currently {:?}", registry.get(order_id));
    }

    async fn wait_until_untracked(registry: &ReconciliationRegistry, order_id: i64) {
        for _ in 0..500 {
            if registry.get(order_id).is_none() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("Order {order_id} is still tracked: {:?}", registry.get(order_id));
    }

    fn counting_gateway(calls: Arc<AtomicU32>, f: fn(u32) -> Result<GatewayTransaction, GatewayError>) -> MockGateway {
        let mut gateway = MockGateway::new();
        gateway.expect_get_transaction_status().returning(move |_| {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            f(n)
        });
        gateway
    }

    #[test]
    fn registry_tracks_one_task_per_order() {
        let registry = ReconciliationRegistry::new();
        assert!(registry.try_register(1, "tx_1", 60));
        assert!(!registry.try_register(1, "tx_1b", 60));
        assert_eq!(registry.record_attempt(1), 1);
        assert_eq!(registry.record_attempt(1), 2);
        assert!(registry.stop(1));
        assert!(!registry.stop(1));
        assert!(!registry.is_active(1));
        // A late response cannot revive a stopped task
        assert!(!registry.resolve(1));
        assert!(!registry.try_register(1, "tx_1", 60));
        assert_eq!(registry.get(1).unwrap().state, PollState::Stopped);
        assert!(!registry.stop(2));
    }

    #[test]
    fn prune_keeps_active_and_unresolved_entries() {
        let registry = ReconciliationRegistry::new();
        for id in 1..=4 {
            assert!(registry.try_register(id, &format!("tx_{id}"), 60));
        }
        assert!(registry.resolve(2));
        assert!(registry.exhaust(3));
        assert!(registry.stop(4));
        // Order 4 still has a transaction waiting for a final status
        let unresolved = HashSet::from([4]);
        assert_eq!(registry.prune(&unresolved), 2);
        assert_eq!(registry.len(), 2);
        assert!(registry.is_active(1));
        assert_eq!(registry.get(4).unwrap().state, PollState::Stopped);
        assert!(registry.get(2).is_none());
        assert!(registry.get(3).is_none());
        assert_eq!(registry.prune(&HashSet::new()), 1);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let db = new_test_db().await;
        let order = seed_awaiting_order(&db, PaymentMethod::Pix, "tx_never").await;
        let calls = Arc::new(AtomicU32::new(0));
        let gateway = counting_gateway(Arc::clone(&calls), |_| Ok(GatewayTransaction::new("tx_never", GatewayStatus::Pending)));
        let registry = ReconciliationRegistry::new();
        let worker = start_reconciliation_worker(
            db.clone(),
            Arc::new(gateway),
            EventProducers::default(),
            fast_config(60),
            registry.clone(),
        );
        let task = wait_for_state(&registry, order.id, PollState::Exhausted).await;
        assert_eq!(task.attempts, 60);
        // Exhausted tasks are not restarted by later scans
        tokio::time::sleep(Duration::from_millis(100)).await;
        worker.abort();
        assert_eq!(calls.load(Ordering::SeqCst), 60);
        let order = db.fetch_order_by_id(order.id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatusType::AwaitingPayment);
        assert_eq!(order.payment_status, PaymentStatus::Pending);
    }

    #[tokio::test]
    async fn approves_when_the_processor_settles() {
        let db = new_test_db().await;
        let order = seed_awaiting_order(&db, PaymentMethod::Boleto, "tx_slow").await;
        let calls = Arc::new(AtomicU32::new(0));
        let gateway = counting_gateway(Arc::clone(&calls), |n| {
            let status = if n < 3 { GatewayStatus::Pending } else { GatewayStatus::Approved };
            Ok(GatewayTransaction::new("tx_slow", status))
        });
        let recorder = EventRecorder::new();
        let handlers = EventHandlers::new(16, recorder.hooks());
        let producers = handlers.producers();
        let handles = handlers.start_handlers();
        let registry = ReconciliationRegistry::new();
        let worker =
            start_reconciliation_worker(db.clone(), Arc::new(gateway), producers, fast_config(60), registry.clone());
        for _ in 0..500 {
            if calls.load(Ordering::SeqCst) >= 3 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        // The next scan after the approval forgets the task
        wait_until_untracked(&registry, order.id).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        worker.abort();
        assert!(registry.is_empty());
        let _ = worker.await;
        for h in handles {
            h.await.unwrap();
        }
        let order = db.fetch_order_by_id(order.id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatusType::Processing);
        assert_eq!(order.payment_status, PaymentStatus::Approved);
        assert_eq!(recorder.kinds(), vec![NotificationKind::PaymentApproved]);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn webhook_resolution_ends_the_task() {
        let db = new_test_db().await;
        let order = seed_awaiting_order(&db, PaymentMethod::Pix, "tx_hooked").await;
        let calls = Arc::new(AtomicU32::new(0));
        let gateway = counting_gateway(Arc::clone(&calls), |_| Ok(GatewayTransaction::new("tx_hooked", GatewayStatus::Pending)));
        let registry = ReconciliationRegistry::new();
        let config = ReconciliationConfig {
            poll_interval: Duration::from_millis(300),
            scan_interval: Duration::from_secs(60),
            max_attempts: 60,
        };
        let worker =
            start_reconciliation_worker(db.clone(), Arc::new(gateway), EventProducers::default(), config, registry.clone());
        wait_for_state(&registry, order.id, PollState::Active).await;
        let flow = OrderFlowApi::new(db.clone(), EventProducers::default());
        let update = StatusUpdate::new(GatewayStatus::Approved, "tx_hooked", UpdateOrigin::Webhook);
        assert!(flow.apply_status_update(&order, update).await.unwrap().is_applied());
        let task = wait_for_state(&registry, order.id, PollState::Resolved).await;
        worker.abort();
        assert_eq!(task.attempts, 0);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn gateway_errors_count_toward_the_budget() {
        let db = new_test_db().await;
        let order = seed_awaiting_order(&db, PaymentMethod::Pix, "tx_flaky").await;
        let calls = Arc::new(AtomicU32::new(0));
        let gateway = counting_gateway(Arc::clone(&calls), |_| Err(GatewayError::Transient("Error 503.".into())));
        let registry = ReconciliationRegistry::new();
        let worker = start_reconciliation_worker(
            db.clone(),
            Arc::new(gateway),
            EventProducers::default(),
            fast_config(5),
            registry.clone(),
        );
        let task = wait_for_state(&registry, order.id, PollState::Exhausted).await;
        worker.abort();
        assert_eq!(task.attempts, 5);
        assert_eq!(calls.load(Ordering::SeqCst), 5);
        let order = db.fetch_order_by_id(order.id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatusType::AwaitingPayment);
    }

    #[tokio::test]
    async fn stopped_tasks_are_not_restarted() {
        let db = new_test_db().await;
        let order = seed_awaiting_order(&db, PaymentMethod::Pix, "tx_stop").await;
        let calls = Arc::new(AtomicU32::new(0));
        let gateway = counting_gateway(Arc::clone(&calls), |_| Ok(GatewayTransaction::new("tx_stop", GatewayStatus::Pending)));
        let registry = ReconciliationRegistry::new();
        let config = ReconciliationConfig {
            poll_interval: Duration::from_millis(500),
            scan_interval: Duration::from_millis(20),
            max_attempts: 60,
        };
        let worker =
            start_reconciliation_worker(db.clone(), Arc::new(gateway), EventProducers::default(), config, registry.clone());
        wait_for_state(&registry, order.id, PollState::Active).await;
        assert!(registry.stop(order.id));
        // Several scans run while the order is still unresolved
        tokio::time::sleep(Duration::from_millis(700)).await;
        worker.abort();
        assert_eq!(registry.snapshot().len(), 1);
        assert_eq!(registry.get(order.id).unwrap().state, PollState::Stopped);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
