//! Policy rule ordering
//!
//! ZIA assigns `order`/`rank` on the server and will not always accept a rule
//! at an arbitrary position in one step (the position may not exist yet while
//! sibling rules are still being created). Rule resources therefore create
//! first and reconcile afterwards:
//!
//! 1. [`RuleOrderer::starting_order`] returns a per-kind starting order, the
//!    maximum order observed among existing rules, computed once per process
//!    under the orderer's mutex.
//! 2. After creation every rule registers its desired [`OrderRule`] with
//!    [`RuleOrderer::reorder_with_before_reorder`]. The first caller for a
//!    kind becomes the leader: it waits until no new rules have registered
//!    for [`OrderingSettings::stable_ticks`] consecutive ticks, then applies
//!    all pending orders in ascending order. Everyone else waits for the
//!    leader to finish.
//! 3. Once a resource has read back its final state it calls
//!    [`RuleOrderer::mark_order_rule_as_done`].
//!
//! If the leader fails, its followers wake up, find their orders unapplied,
//! and one of them takes over.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, Notify};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::error::{Error, Result};
use super::rule_constraints::clamp_order;

/// Server-side evaluation position of a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderRule {
    pub order: i32,
    pub rank: i32,
}

/// Callbacks the orderer uses to inspect and rewrite a policy.
#[async_trait]
pub trait OrderOps: Send + Sync {
    /// Number of user-orderable rules currently in the policy.
    async fn count(&self) -> Result<usize>;

    /// Moves rule `id` to `order`. Returns `false` when it was already there.
    async fn apply_order(&self, id: i64, order: OrderRule) -> Result<bool>;
}

/// Timing of the reorder step
#[derive(Debug, Clone)]
pub struct OrderingSettings {
    /// Interval between checks of the pending rule count
    pub settle_interval: Duration,
    /// Consecutive unchanged checks before the leader reorders
    pub stable_ticks: usize,
    /// Upper bound for waiting on, or performing, a reorder
    pub timeout: Duration,
}

impl Default for OrderingSettings {
    fn default() -> Self {
        Self {
            settle_interval: Duration::from_secs(25),
            stable_ticks: 3,
            timeout: Duration::from_secs(3600),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct PendingOrder {
    order: OrderRule,
    applied: bool,
}

#[derive(Debug, Default)]
struct OrdererState {
    pending: HashMap<String, BTreeMap<i64, PendingOrder>>,
    leaders: HashSet<String>,
    starting_orders: HashMap<String, i32>,
}

enum Role {
    Done,
    Leader,
    Follower,
}

/// Process-wide coordinator for rule ordering, keyed by rule kind.
#[derive(Debug)]
pub struct RuleOrderer {
    state: Mutex<OrdererState>,
    released: Notify,
    settings: OrderingSettings,
}

impl Default for RuleOrderer {
    fn default() -> Self {
        Self::new(OrderingSettings::default())
    }
}

impl RuleOrderer {
    pub fn new(settings: OrderingSettings) -> Self {
        Self {
            state: Mutex::new(OrdererState::default()),
            released: Notify::new(),
            settings,
        }
    }

    pub fn settings(&self) -> &OrderingSettings {
        &self.settings
    }

    /// Returns the cached starting order for `kind`, computing it from `list`
    /// on first use.
    ///
    /// The orderer's mutex is held while `list` runs, so concurrent creates
    /// of the same process observe a single scan.
    ///
    /// # Errors
    ///
    /// Returns `Err` if listing the existing rules fails. Nothing is cached
    /// in that case.
    pub async fn starting_order<F, Fut>(&self, kind: &str, list: F) -> Result<i32>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<OrderRule>>>,
    {
        let mut state = self.state.lock().await;
        if let Some(&order) = state.starting_orders.get(kind) {
            return Ok(order);
        }

        let existing = list().await?;
        let order = existing.iter().map(|r| r.order).max().unwrap_or(0).max(1);
        info!(kind, order, existing = existing.len(), "Computed starting order");
        state.starting_orders.insert(kind.to_string(), order);
        Ok(order)
    }

    /// Registers `desired` for rule `id` and returns once it has been applied.
    pub async fn reorder(
        &self,
        kind: &str,
        id: i64,
        desired: OrderRule,
        ops: &dyn OrderOps,
    ) -> Result<()> {
        self.reorder_with_before_reorder(
            kind,
            id,
            desired,
            ops,
            None::<fn() -> std::future::Ready<()>>,
        )
        .await
    }

    /// Like [`RuleOrderer::reorder`], running `before` once if this call
    /// becomes the leader for `kind`.
    ///
    /// # Errors
    ///
    /// Returns `Err` if applying an order fails while this call leads, or if
    /// the reorder does not finish within [`OrderingSettings::timeout`].
    pub async fn reorder_with_before_reorder<B, BF>(
        &self,
        kind: &str,
        id: i64,
        desired: OrderRule,
        ops: &dyn OrderOps,
        before: Option<B>,
    ) -> Result<()>
    where
        B: FnOnce() -> BF,
        BF: Future<Output = ()>,
    {
        let deadline = Instant::now() + self.settings.timeout;
        {
            let mut state = self.state.lock().await;
            state.pending.entry(kind.to_string()).or_default().insert(
                id,
                PendingOrder {
                    order: desired,
                    applied: false,
                },
            );
        }
        debug!(kind, id, order = desired.order, rank = desired.rank, "Registered desired order");

        let mut before = before;
        loop {
            // Created before the leader check so a release in between is not lost
            let released = self.released.notified();

            let role = {
                let mut state = self.state.lock().await;
                let applied = state
                    .pending
                    .get(kind)
                    .and_then(|rules| rules.get(&id))
                    .is_none_or(|p| p.applied);
                if applied {
                    Role::Done
                } else if state.leaders.insert(kind.to_string()) {
                    Role::Leader
                } else {
                    Role::Follower
                }
            };

            match role {
                Role::Done => return Ok(()),
                Role::Leader => {
                    if let Some(hook) = before.take() {
                        hook().await;
                    }
                    return self.lead(kind, ops, deadline).await;
                }
                Role::Follower => {
                    if tokio::time::timeout_at(deadline, released).await.is_err() {
                        return Err(Error::Timeout {
                            operation: format!("waiting for {kind} reorder"),
                            secs: self.settings.timeout.as_secs(),
                        });
                    }
                }
            }
        }
    }

    /// Drops the pending entry of rule `id` once its resource has settled.
    pub async fn mark_order_rule_as_done(&self, kind: &str, id: i64) {
        let mut state = self.state.lock().await;
        if let Some(rules) = state.pending.get_mut(kind) {
            rules.remove(&id);
            if rules.is_empty() {
                state.pending.remove(kind);
            }
        }
    }

    /// Number of rules of `kind` registered and not yet marked done.
    pub async fn pending_count(&self, kind: &str) -> usize {
        let state = self.state.lock().await;
        state.pending.get(kind).map_or(0, BTreeMap::len)
    }

    async fn lead(&self, kind: &str, ops: &dyn OrderOps, deadline: Instant) -> Result<()> {
        self.wait_until_settled(kind, deadline).await;

        loop {
            let batch: Vec<(i64, OrderRule)> = {
                let mut state = self.state.lock().await;
                let batch: Vec<_> = state
                    .pending
                    .get(kind)
                    .map(|rules| {
                        rules
                            .iter()
                            .filter(|(_, p)| !p.applied)
                            .map(|(id, p)| (*id, p.order))
                            .collect()
                    })
                    .unwrap_or_default();
                if batch.is_empty() {
                    // Release under the lock so late registrations find no leader
                    state.leaders.remove(kind);
                    break;
                }
                batch
            };

            if Instant::now() >= deadline {
                self.release(kind).await;
                return Err(Error::Timeout {
                    operation: format!("reordering {kind}"),
                    secs: self.settings.timeout.as_secs(),
                });
            }

            if let Err(e) = self.apply_batch(kind, batch, ops).await {
                warn!(kind, error = %e, "Reorder failed, releasing leadership");
                self.release(kind).await;
                return Err(e);
            }
        }

        self.released.notify_waiters();
        Ok(())
    }

    async fn release(&self, kind: &str) {
        self.state.lock().await.leaders.remove(kind);
        self.released.notify_waiters();
    }

    /// Waits until the number of pending rules for `kind` stops changing.
    async fn wait_until_settled(&self, kind: &str, deadline: Instant) {
        let stable_ticks = self.settings.stable_ticks.max(1);
        let mut ticker = tokio::time::interval(self.settings.settle_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut window: VecDeque<usize> = VecDeque::with_capacity(stable_ticks + 1);

        loop {
            ticker.tick().await;
            let size = self.pending_count(kind).await;
            window.push_back(size);
            if window.len() > stable_ticks {
                window.pop_front();
            }
            if window.len() == stable_ticks && window.iter().all(|&s| s == size) {
                debug!(kind, size, "Pending rules settled");
                return;
            }
            if Instant::now() >= deadline {
                warn!(kind, size, "Pending rules did not settle before the timeout");
                return;
            }
        }
    }

    async fn apply_batch(
        &self,
        kind: &str,
        mut batch: Vec<(i64, OrderRule)>,
        ops: &dyn OrderOps,
    ) -> Result<()> {
        let count = ops.count().await?;
        batch.sort_by_key(|(id, order)| (order.order, *id));

        let mut changed = 0usize;
        for (id, desired) in batch {
            let target = OrderRule {
                order: clamp_order(desired.order, count),
                rank: desired.rank,
            };
            if target.order != desired.order {
                warn!(
                    kind,
                    id,
                    requested = desired.order,
                    applied = target.order,
                    "Requested order exceeds the rule count, placing rule last"
                );
            }

            if ops.apply_order(id, target).await? {
                changed += 1;
            }

            let mut state = self.state.lock().await;
            if let Some(p) = state.pending.get_mut(kind).and_then(|r| r.get_mut(&id)) {
                p.applied = true;
            }
        }

        info!(kind, count, changed, "Reordered rules");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fast_settings() -> OrderingSettings {
        OrderingSettings {
            settle_interval: Duration::from_millis(5),
            stable_ticks: 3,
            timeout: Duration::from_secs(5),
        }
    }

    #[derive(Default)]
    struct RecordingOps {
        count: usize,
        applied: std::sync::Mutex<Vec<(i64, OrderRule)>>,
        fail_next: std::sync::atomic::AtomicBool,
    }

    impl RecordingOps {
        fn with_count(count: usize) -> Self {
            Self {
                count,
                ..Default::default()
            }
        }

        fn applied(&self) -> Vec<(i64, OrderRule)> {
            self.applied.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl OrderOps for RecordingOps {
        async fn count(&self) -> Result<usize> {
            Ok(self.count)
        }

        async fn apply_order(&self, id: i64, order: OrderRule) -> Result<bool> {
            if self.fail_next.swap(false, Ordering::SeqCst) {
                return Err(Error::Internal("update failed".into()));
            }
            self.applied.lock().unwrap().push((id, order));
            Ok(true)
        }
    }

    #[tokio::test]
    async fn test_single_rule_is_applied() {
        let orderer = RuleOrderer::new(fast_settings());
        let ops = RecordingOps::with_count(10);

        orderer
            .reorder("dns", 42, OrderRule { order: 3, rank: 7 }, &ops)
            .await
            .unwrap();

        assert_eq!(ops.applied(), vec![(42, OrderRule { order: 3, rank: 7 })]);
        assert_eq!(orderer.pending_count("dns").await, 1);
        orderer.mark_order_rule_as_done("dns", 42).await;
        assert_eq!(orderer.pending_count("dns").await, 0);
    }

    #[tokio::test]
    async fn test_concurrent_rules_applied_in_ascending_order() {
        let orderer = Arc::new(RuleOrderer::new(fast_settings()));
        let ops = Arc::new(RecordingOps::with_count(20));

        let mut handles = Vec::new();
        for (id, order) in [(1, 5), (2, 1), (3, 4), (4, 2), (5, 3)] {
            let orderer = Arc::clone(&orderer);
            let ops = Arc::clone(&ops);
            handles.push(tokio::spawn(async move {
                orderer
                    .reorder("nat", id, OrderRule { order, rank: 7 }, ops.as_ref())
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let applied = ops.applied();
        assert_eq!(applied.len(), 5);
        let orders: Vec<i32> = applied.iter().map(|(_, o)| o.order).collect();
        let mut sorted = orders.clone();
        sorted.sort_unstable();
        assert_eq!(orders, sorted);
    }

    #[tokio::test]
    async fn test_order_beyond_count_is_clamped() {
        let orderer = RuleOrderer::new(fast_settings());
        let ops = RecordingOps::with_count(3);

        orderer
            .reorder("fw", 7, OrderRule { order: 10, rank: 0 }, &ops)
            .await
            .unwrap();

        assert_eq!(ops.applied(), vec![(7, OrderRule { order: 3, rank: 0 })]);
    }

    #[tokio::test]
    async fn test_kinds_are_independent() {
        let orderer = RuleOrderer::new(fast_settings());
        let ops = RecordingOps::with_count(5);

        orderer
            .reorder("a", 1, OrderRule { order: 1, rank: 7 }, &ops)
            .await
            .unwrap();
        orderer
            .reorder("b", 1, OrderRule { order: 2, rank: 7 }, &ops)
            .await
            .unwrap();

        assert_eq!(ops.applied().len(), 2);
    }

    #[tokio::test]
    async fn test_before_hook_runs_for_leader() {
        let orderer = RuleOrderer::new(fast_settings());
        let ops = RecordingOps::with_count(5);
        let calls = AtomicUsize::new(0);

        orderer
            .reorder_with_before_reorder(
                "bw",
                9,
                OrderRule { order: 1, rank: 7 },
                &ops,
                Some(|| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    std::future::ready(())
                }),
            )
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_reorder_can_be_retried() {
        let orderer = RuleOrderer::new(fast_settings());
        let ops = RecordingOps::with_count(5);
        ops.fail_next.store(true, Ordering::SeqCst);

        let first = orderer
            .reorder("tc", 1, OrderRule { order: 2, rank: 7 }, &ops)
            .await;
        assert!(first.is_err());
        assert!(ops.applied().is_empty());

        orderer
            .reorder("tc", 1, OrderRule { order: 2, rank: 7 }, &ops)
            .await
            .unwrap();
        assert_eq!(ops.applied(), vec![(1, OrderRule { order: 2, rank: 7 })]);
    }

    #[tokio::test]
    async fn test_starting_order_computed_once() {
        let orderer = RuleOrderer::new(fast_settings());
        let scans = AtomicUsize::new(0);

        for _ in 0..3 {
            let order = orderer
                .starting_order("tc", || async {
                    scans.fetch_add(1, Ordering::SeqCst);
                    Ok(vec![
                        OrderRule { order: 4, rank: 7 },
                        OrderRule { order: 9, rank: 0 },
                    ])
                })
                .await
                .unwrap();
            assert_eq!(order, 9);
        }
        assert_eq!(scans.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_starting_order_defaults_to_one() {
        let orderer = RuleOrderer::new(fast_settings());
        let order = orderer
            .starting_order("empty", || async { Ok(Vec::new()) })
            .await
            .unwrap();
        assert_eq!(order, 1);
    }

    #[tokio::test]
    async fn test_starting_order_error_not_cached() {
        let orderer = RuleOrderer::new(fast_settings());
        let failed = orderer
            .starting_order("bw", || async { Err(Error::Internal("down".into())) })
            .await;
        assert!(failed.is_err());

        let order = orderer
            .starting_order("bw", || async { Ok(vec![OrderRule { order: 2, rank: 7 }]) })
            .await
            .unwrap();
        assert_eq!(order, 2);
    }
}
