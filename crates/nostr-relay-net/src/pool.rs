//! Relay pool: fan-out publish/subscribe across many relay connections
//! (spec §4.C "Relay Pool & Subscription Multiplexer").

use crate::config::{default_min_relays_for_eose, PoolConfig};
use crate::connection::{ConnectionState, RelayConnection};
use crate::error::PoolError;
use nostr_wire::{ClientMessage, Event, EventId, Filter, RejectReason, RelayMessage};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, info};

struct SubscriptionState {
    filters: Vec<Filter>,
    seen: Mutex<HashSet<EventId>>,
    events_tx: mpsc::UnboundedSender<Event>,
    eose_from: Mutex<HashSet<String>>,
    eose_notify: Notify,
}

#[derive(Default)]
struct PublishResults {
    accepted: HashSet<String>,
    rejected: HashMap<String, (String, RejectReason)>,
}

struct PublishState {
    results: Mutex<PublishResults>,
    notify: Notify,
}

impl PublishState {
    fn new() -> Self {
        Self {
            results: Mutex::new(PublishResults::default()),
            notify: Notify::new(),
        }
    }
}

/// Outcome of a [`RelayPool::publish`] call (spec §4.C "Publish Engine").
#[derive(Debug, Default, Clone)]
pub struct PublishReport {
    pub accepted: HashSet<String>,
    pub rejected: HashMap<String, (String, RejectReason)>,
    pub retried: bool,
}

/// A live subscription across the pool. Dropping the handle does not close
/// the subscription — call [`SubscriptionHandle::close`] explicitly.
pub struct SubscriptionHandle {
    pub sub_id: String,
    pool: Arc<RelayPoolInner>,
    events_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Event>>,
}

impl SubscriptionHandle {
    /// Receive the next de-duplicated event matching this subscription's
    /// filters, from any relay.
    pub async fn next_event(&self) -> Option<Event> {
        self.events_rx.lock().await.recv().await
    }

    /// Block until EOSE-convergence: every currently `Connected` relay has
    /// sent EOSE and at least `min_relays_for_eose` relays have responded,
    /// or the deadline elapses.
    pub async fn wait_eose(&self, deadline: Duration) -> Result<(), PoolError> {
        self.pool.wait_eose(&self.sub_id, deadline).await
    }

    /// Send `CLOSE` to every relay and stop routing events to this handle.
    pub fn close(&self) {
        self.pool.unsubscribe(&self.sub_id);
    }
}

struct RelayPoolInner {
    config: PoolConfig,
    connections: RwLock<HashMap<String, Arc<RelayConnection>>>,
    subscriptions: RwLock<HashMap<String, Arc<SubscriptionState>>>,
    publishes: RwLock<HashMap<EventId, Arc<PublishState>>>,
    inbound_tx: mpsc::UnboundedSender<(String, RelayMessage)>,
    next_sub_id: AtomicU64,
}

impl RelayPoolInner {
    fn connected_urls(&self) -> Vec<String> {
        self.connections
            .read()
            .iter()
            .filter(|(_, c)| c.status() == ConnectionState::Connected)
            .map(|(url, _)| url.clone())
            .collect()
    }

    /// `min_relays_for_eose` if the caller pinned one, otherwise
    /// `ceil(known_relays / 2)` floored at 2 (spec §4.C default).
    fn effective_min_relays_for_eose(&self) -> usize {
        self.config
            .min_relays_for_eose
            .unwrap_or_else(|| default_min_relays_for_eose(self.connections.read().len()))
    }

    fn broadcast(&self, json: &str) -> usize {
        let conns: Vec<_> = self.connections.read().values().cloned().collect();
        for conn in &conns {
            conn.send(json.to_string());
        }
        conns.len()
    }

    fn unsubscribe(&self, sub_id: &str) {
        if self.subscriptions.write().remove(sub_id).is_some() {
            if let Ok(json) = (ClientMessage::Close { sub_id: sub_id.to_string() }).to_json() {
                self.broadcast(&json);
            }
        }
    }

    async fn wait_eose(&self, sub_id: &str, deadline: Duration) -> Result<(), PoolError> {
        let sub = self
            .subscriptions
            .read()
            .get(sub_id)
            .cloned()
            .ok_or(PoolError::NoRelays)?;

        let deadline_fut = tokio::time::sleep(deadline);
        tokio::pin!(deadline_fut);

        loop {
            let connected = self.connected_urls();
            let eose_from = sub.eose_from.lock().clone();
            let required = self.effective_min_relays_for_eose();
            let converged = !connected.is_empty()
                && connected.iter().all(|u| eose_from.contains(u))
                && eose_from.len() >= required;
            if converged {
                return Ok(());
            }
            tokio::select! {
                _ = sub.eose_notify.notified() => continue,
                _ = &mut deadline_fut => {
                    return Err(PoolError::SubscriptionTimeout {
                        seen: eose_from.len(),
                        required,
                    });
                }
            }
        }
    }

    /// Poll connection state until at least `min` relays are `Connected`,
    /// or `deadline` elapses first (spec §4.C warm-up contract
    /// `waitForMinimumConnection`).
    async fn wait_for_minimum_connection(&self, min: usize, deadline: Duration) -> bool {
        let deadline_fut = tokio::time::sleep(deadline);
        tokio::pin!(deadline_fut);
        let mut poll = tokio::time::interval(Duration::from_millis(50));
        loop {
            if self.connected_urls().len() >= min {
                return true;
            }
            tokio::select! {
                _ = poll.tick() => continue,
                _ = &mut deadline_fut => return self.connected_urls().len() >= min,
            }
        }
    }

    async fn collect_acks(&self, event_id: EventId, deadline: Duration) -> PublishReport {
        let state = match self.publishes.read().get(&event_id).cloned() {
            Some(s) => s,
            None => return PublishReport::default(),
        };
        let connected_count = self.connected_urls().len().max(1);
        let deadline_fut = tokio::time::sleep(deadline);
        tokio::pin!(deadline_fut);

        loop {
            {
                let results = state.results.lock();
                if results.accepted.len() + results.rejected.len() >= connected_count {
                    return PublishReport {
                        accepted: results.accepted.clone(),
                        rejected: results.rejected.clone(),
                        retried: false,
                    };
                }
            }
            tokio::select! {
                _ = state.notify.notified() => continue,
                _ = &mut deadline_fut => {
                    let results = state.results.lock();
                    return PublishReport {
                        accepted: results.accepted.clone(),
                        rejected: results.rejected.clone(),
                        retried: false,
                    };
                }
            }
        }
    }

    /// Any `Connected` relay that never sent an `OK` by the deadline counts
    /// as rejected with reason `no_ack` (spec §4.C, §8 invariant 4).
    fn fill_no_ack(&self, report: &mut PublishReport) {
        for url in self.connected_urls() {
            if !report.accepted.contains(&url) && !report.rejected.contains_key(&url) {
                report.rejected.insert(url, ("no_ack".to_string(), RejectReason::Other));
            }
        }
    }
}

/// Top-level handle to a pool of relay connections. Clone cheaply via
/// `Arc::clone` — it wraps shared state internally.
#[derive(Clone)]
pub struct RelayPool {
    inner: Arc<RelayPoolInner>,
}

impl RelayPool {
    pub fn new(config: PoolConfig) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let inner = Arc::new(RelayPoolInner {
            config,
            connections: RwLock::new(HashMap::new()),
            subscriptions: RwLock::new(HashMap::new()),
            publishes: RwLock::new(HashMap::new()),
            inbound_tx,
            next_sub_id: AtomicU64::new(0),
        });

        let dispatch_inner = inner.clone();
        tokio::spawn(async move { dispatch_loop(dispatch_inner, inbound_rx).await });

        let pool = Self { inner: inner.clone() };
        let relays = inner.config.default_relays.clone();
        if !relays.is_empty() {
            pool.connect(relays);
        }
        pool
    }

    /// Connect to additional relay URLs, skipping any already known.
    pub fn connect(&self, urls: impl IntoIterator<Item = String>) {
        let mut connections = self.inner.connections.write();
        for url in urls {
            if connections.contains_key(&url) {
                continue;
            }
            info!(relay = %url, "adding relay to pool");
            let conn = RelayConnection::spawn(url.clone(), self.inner.config.clone(), self.inner.inbound_tx.clone());
            connections.insert(url, conn);
        }
    }

    /// Status of every known relay.
    pub fn status(&self) -> HashMap<String, ConnectionState> {
        self.inner
            .connections
            .read()
            .iter()
            .map(|(url, conn)| (url.clone(), conn.status()))
            .collect()
    }

    /// Count of known relays and of those currently `Connected`, for gating
    /// UI on minimum connectivity (spec §4.C `status()`).
    pub fn connectivity(&self) -> (usize, usize) {
        let statuses = self.status();
        let connected = statuses.values().filter(|s| **s == ConnectionState::Connected).count();
        (statuses.len(), connected)
    }

    /// Block until at least `min` relays are `Connected`, or `timeout`
    /// elapses. `RelayPool::new` returns usable (possibly degraded)
    /// immediately; callers that cannot tolerate empty results pair every
    /// query with this gate (spec §4.C "warm-up contract").
    pub async fn wait_for_minimum_connection(&self, min: usize, timeout: Duration) -> bool {
        self.inner.wait_for_minimum_connection(min, timeout).await
    }

    /// Open a subscription, fanning `REQ` out to every known relay.
    pub fn subscribe(&self, filters: Vec<Filter>) -> Result<SubscriptionHandle, PoolError> {
        if self.inner.connections.read().is_empty() {
            return Err(PoolError::NoRelays);
        }
        let sub_id = format!("sub-{}", self.inner.next_sub_id.fetch_add(1, Ordering::Relaxed));
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let state = Arc::new(SubscriptionState {
            filters: filters.clone(),
            seen: Mutex::new(HashSet::new()),
            events_tx,
            eose_from: Mutex::new(HashSet::new()),
            eose_notify: Notify::new(),
        });
        self.inner.subscriptions.write().insert(sub_id.clone(), state);

        let json = ClientMessage::Req {
            sub_id: sub_id.clone(),
            filters,
        }
        .to_json()
        .map_err(PoolError::Wire)?;
        self.inner.broadcast(&json);

        Ok(SubscriptionHandle {
            sub_id,
            pool: self.inner.clone(),
            events_rx: tokio::sync::Mutex::new(events_rx),
        })
    }

    /// Publish an event, fanning `EVENT` out to every known relay and
    /// collecting `OK` acks. If no relay acknowledges within the deadline,
    /// retries once after a 500ms pause (spec §4.C "Publish Engine").
    pub async fn publish(&self, event: Event) -> Result<PublishReport, PoolError> {
        if self.inner.connections.read().is_empty() {
            return Err(PoolError::NoRelays);
        }
        let json = ClientMessage::Event { event: event.clone() }
            .to_json()
            .map_err(PoolError::Wire)?;

        self.inner
            .publishes
            .write()
            .insert(event.id, Arc::new(PublishState::new()));
        self.inner.broadcast(&json);
        let mut report = self.inner.collect_acks(event.id, self.inner.config.publish_deadline).await;

        if report.accepted.is_empty() && report.rejected.is_empty() {
            debug!(event_id = %event.id, "no relay acked within deadline, retrying once");
            tokio::time::sleep(Duration::from_millis(500)).await;
            self.inner.broadcast(&json);
            report = self.inner.collect_acks(event.id, self.inner.config.publish_deadline).await;
            report.retried = true;
        }

        self.inner.publishes.write().remove(&event.id);
        self.inner.fill_no_ack(&mut report);

        if report.accepted.is_empty() && report.rejected.is_empty() {
            return Err(PoolError::PublishTimeout);
        }
        Ok(report)
    }
}

async fn dispatch_loop(inner: Arc<RelayPoolInner>, mut inbound_rx: mpsc::UnboundedReceiver<(String, RelayMessage)>) {
    while let Some((relay_url, msg)) = inbound_rx.recv().await {
        match msg {
            RelayMessage::Event { sub_id, event } => {
                let sub = inner.subscriptions.read().get(&sub_id).cloned();
                if let Some(sub) = sub {
                    let is_new = sub.seen.lock().insert(event.id);
                    if is_new && sub.filters.iter().any(|f| f.matches(&event)) {
                        let _ = sub.events_tx.send(event);
                    }
                }
            }
            RelayMessage::Eose { sub_id } => {
                let sub = inner.subscriptions.read().get(&sub_id).cloned();
                if let Some(sub) = sub {
                    sub.eose_from.lock().insert(relay_url);
                    sub.eose_notify.notify_waiters();
                }
            }
            RelayMessage::Ok {
                event_id,
                accepted,
                message,
            } => {
                let publish = inner.publishes.read().get(&event_id).cloned();
                if let Some(publish) = publish {
                    {
                        let mut results = publish.results.lock();
                        if accepted {
                            results.accepted.insert(relay_url);
                        } else {
                            let reason = RejectReason::classify(&message);
                            results.rejected.insert(relay_url, (message, reason));
                        }
                    }
                    publish.notify.notify_waiters();
                }
            }
            RelayMessage::Notice { message } => {
                info!(relay = %relay_url, notice = %message, "relay notice");
            }
            RelayMessage::Auth { .. } => {
                debug!(relay = %relay_url, "relay requested AUTH, ignoring (unsupported)");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nostr_wire::{EventBuilder, KeyPair, Kind};

    #[tokio::test]
    async fn subscribe_with_no_relays_errors() {
        let pool = RelayPool::new(PoolConfig::default());
        let err = pool.subscribe(vec![Filter::new().kinds([Kind::WORKOUT_RECORD])]).unwrap_err();
        assert!(matches!(err, PoolError::NoRelays));
    }

    #[tokio::test]
    async fn publish_with_no_relays_errors() {
        let pool = RelayPool::new(PoolConfig::default());
        let kp = KeyPair::generate();
        let event = EventBuilder::new(Kind::WORKOUT_RECORD).content("ran").build(&kp).unwrap();
        let err = pool.publish(event).await.unwrap_err();
        assert!(matches!(err, PoolError::NoRelays));
    }

    #[tokio::test]
    async fn connectivity_reports_zero_on_an_empty_pool() {
        let pool = RelayPool::new(PoolConfig::default());
        assert_eq!(pool.connectivity(), (0, 0));
    }

    #[tokio::test]
    async fn wait_for_minimum_connection_times_out_with_no_relays() {
        let pool = RelayPool::new(PoolConfig::default());
        let reached = pool.wait_for_minimum_connection(1, Duration::from_millis(50)).await;
        assert!(!reached);
    }

    #[tokio::test]
    async fn wait_for_minimum_connection_is_immediate_when_floor_is_zero() {
        let pool = RelayPool::new(PoolConfig::default());
        let reached = pool.wait_for_minimum_connection(0, Duration::from_millis(50)).await;
        assert!(reached);
    }
}
