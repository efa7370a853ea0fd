//! Stale-while-revalidate loading cache.
//!
//! Every key is in one of three states relative to the clock:
//!
//! - **fresh**: served from memory, no work scheduled
//! - **stale**: served from memory while one background revalidation runs
//! - **expired** or absent: the caller waits for a load
//!
//! Concurrent callers waiting on the same key share a single load. A caller
//! that gives up only drops its own interest; the load is cancelled once
//! nobody (waiter or subscriber) is left.

use crate::error::CacheError;
use crate::loader::{Loaded, Loader};
use crate::policy::CachePolicy;
use crate::subscription::{Snapshot, Subscription};
use bridge_traits::time::{Clock, SystemClock};
use chrono::{DateTime, Utc};
use core_runtime::config::FreshnessPolicy;
use core_runtime::events::{CacheEvent, CoreEvent, EventBus};
use lru::LruCache;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// Values the cache can hold.
pub trait CacheValue: Clone + PartialEq + Send + Sync + 'static {}
impl<T: Clone + PartialEq + Send + Sync + 'static> CacheValue for T {}

/// Errors a [`Loader`] can report.
pub trait CacheFailure: CacheValue + From<CacheError> {}
impl<T: CacheValue + From<CacheError>> CacheFailure for T {}

pub type Weigher<V> = Arc<dyn Fn(&V) -> usize + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    Fresh,
    Stale,
    Expired,
}

/// Where a [`Lookup`] value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Memory,
    Loaded,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Lookup<V> {
    pub value: V,
    pub state: EntryState,
    pub origin: Origin,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub weight: usize,
    pub in_flight: usize,
    pub hits: u64,
    pub stale_hits: u64,
    pub misses: u64,
    pub loads: u64,
    pub load_failures: u64,
    pub evictions: u64,
}

struct Entry<V> {
    value: V,
    weight: usize,
    stale_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    last_access: DateTime<Utc>,
}

impl<V> Entry<V> {
    fn state(&self, now: DateTime<Utc>) -> EntryState {
        classify(now, self.stale_at, self.expires_at)
    }
}

fn classify(now: DateTime<Utc>, stale_at: DateTime<Utc>, expires_at: DateTime<Utc>) -> EntryState {
    if now < stale_at {
        EntryState::Fresh
    } else if now < expires_at {
        EntryState::Stale
    } else {
        EntryState::Expired
    }
}

fn deadline(from: DateTime<Utc>, after: std::time::Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(after)
        .ok()
        .and_then(|delta| from.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlightMode {
    Load,
    Revalidate,
}

type Outcome<V, E> = Result<(V, EntryState), E>;

struct Flight<V, E> {
    id: u64,
    waiters: usize,
    /// Outlives its waiters: background refreshes, and loads a subscriber
    /// is waiting on.
    detached: bool,
    /// Invalidated or overwritten while running: the result goes to the
    /// waiters only. New callers still join it.
    discard: bool,
    cancel: CancellationToken,
    done: watch::Receiver<Option<Outcome<V, E>>>,
}

impl<V, E> Flight<V, E> {
    /// The task ended without reporting (cancelled or panicked).
    fn is_dead(&self) -> bool {
        self.done.has_changed().is_err() && self.done.borrow().is_none()
    }
}

struct State<V, E> {
    entries: LruCache<String, Entry<V>>,
    flights: HashMap<String, Flight<V, E>>,
    subscribers: HashMap<String, watch::Sender<Snapshot<V, E>>>,
    weight: usize,
    stats: CacheStats,
}

impl<V, E> State<V, E> {
    fn has_subscribers(&self, key: &str) -> bool {
        self.subscribers
            .get(key)
            .is_some_and(|tx| tx.receiver_count() > 0)
    }
}

struct Inner<V: CacheValue, E: CacheFailure> {
    state: Mutex<State<V, E>>,
    loader: Arc<dyn Loader<V, E>>,
    clock: Arc<dyn Clock>,
    policy: CachePolicy,
    weigher: Weigher<V>,
    events: Option<EventBus>,
    next_flight: AtomicU64,
}

/// Shared handle to a loading cache. Clones refer to the same cache.
pub struct ReactiveCache<V: CacheValue, E: CacheFailure> {
    inner: Arc<Inner<V, E>>,
}

impl<V: CacheValue, E: CacheFailure> Clone for ReactiveCache<V, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V: CacheValue, E: CacheFailure> std::fmt::Debug for ReactiveCache<V, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReactiveCache")
            .field("policy", &self.inner.policy)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

pub struct CacheBuilder<V: CacheValue, E: CacheFailure> {
    loader: Arc<dyn Loader<V, E>>,
    policy: CachePolicy,
    clock: Arc<dyn Clock>,
    weigher: Weigher<V>,
    events: Option<EventBus>,
}

impl<V: CacheValue, E: CacheFailure> CacheBuilder<V, E> {
    pub fn policy(mut self, policy: CachePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Weight function used with [`CachePolicy::max_weight`]. Defaults to 1
    /// per entry.
    pub fn weigher(mut self, weigher: impl Fn(&V) -> usize + Send + Sync + 'static) -> Self {
        self.weigher = Arc::new(weigher);
        self
    }

    pub fn events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn build(self) -> Result<ReactiveCache<V, E>, CacheError> {
        self.policy.validate()?;
        Ok(ReactiveCache {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    entries: LruCache::unbounded(),
                    flights: HashMap::new(),
                    subscribers: HashMap::new(),
                    weight: 0,
                    stats: CacheStats::default(),
                }),
                loader: self.loader,
                clock: self.clock,
                policy: self.policy,
                weigher: self.weigher,
                events: self.events,
                next_flight: AtomicU64::new(1),
            }),
        })
    }
}

/// A caller waiting on a flight. Dropping it before the result arrives
/// withdraws that caller's interest.
struct Waiter<V: CacheValue, E: CacheFailure> {
    cache: ReactiveCache<V, E>,
    key: String,
    id: u64,
    rx: watch::Receiver<Option<Outcome<V, E>>>,
    finished: bool,
}

impl<V: CacheValue, E: CacheFailure> Waiter<V, E> {
    async fn wait(mut self) -> Result<Lookup<V>, E> {
        let outcome = match self.rx.wait_for(Option::is_some).await {
            Ok(done) => (*done).clone(),
            Err(_) => None,
        };
        self.finished = true;

        match outcome {
            Some(Ok((value, state))) => Ok(Lookup {
                value,
                state,
                origin: Origin::Loaded,
            }),
            Some(Err(err)) => Err(err),
            None => {
                self.cache.forget_dead_flight(&self.key, self.id);
                Err(E::from(CacheError::LoadAborted {
                    key: self.key.clone(),
                }))
            }
        }
    }
}

impl<V: CacheValue, E: CacheFailure> Drop for Waiter<V, E> {
    fn drop(&mut self) {
        if !self.finished {
            self.cache.release(&self.key, self.id);
        }
    }
}

impl<V: CacheValue, E: CacheFailure> ReactiveCache<V, E> {
    pub fn builder(loader: Arc<dyn Loader<V, E>>) -> CacheBuilder<V, E> {
        CacheBuilder {
            loader,
            policy: CachePolicy::default(),
            clock: Arc::new(SystemClock),
            weigher: Arc::new(|_| 1),
            events: None,
        }
    }

    fn lock(&self) -> MutexGuard<'_, State<V, E>> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn now(&self) -> DateTime<Utc> {
        self.inner.clock.now()
    }

    fn may_revalidate(&self) -> bool {
        self.inner.policy.background_revalidation && self.inner.loader.can_revalidate()
    }

    fn emit(&self, event: CacheEvent) {
        if let Some(bus) = &self.inner.events {
            let _ = bus.emit(CoreEvent::Cache(event));
        }
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Return the value for `key`, loading it if needed.
    ///
    /// Fresh entries return at once. Stale entries return at once and
    /// schedule at most one background revalidation. Expired or missing
    /// entries wait for a load shared with every other waiter on the key.
    pub async fn get_or_fetch(&self, key: &str) -> Result<Lookup<V>, E> {
        let now = self.now();
        let waiter = {
            let mut state = self.lock();
            let hit = state.entries.get_mut(key).map(|entry| {
                entry.last_access = now;
                (entry.value.clone(), entry.state(now))
            });

            match hit {
                Some((value, EntryState::Fresh)) => {
                    state.stats.hits += 1;
                    trace!(key, "Cache hit");
                    return Ok(Lookup {
                        value,
                        state: EntryState::Fresh,
                        origin: Origin::Memory,
                    });
                }
                Some((value, EntryState::Stale)) => {
                    state.stats.stale_hits += 1;
                    if self.may_revalidate() {
                        self.start_detached(&mut state, key, FlightMode::Revalidate);
                    }
                    return Ok(Lookup {
                        value,
                        state: EntryState::Stale,
                        origin: Origin::Memory,
                    });
                }
                _ => {}
            }

            state.stats.misses += 1;
            self.join_or_start(&mut state, key, FlightMode::Load)
        };
        waiter.wait().await
    }

    /// Wait for a fresh value from the origin, bypassing memory.
    ///
    /// Joins a load already in progress for the key.
    pub async fn reload(&self, key: &str) -> Result<Lookup<V>, E> {
        let waiter = {
            let mut state = self.lock();
            self.join_or_start(&mut state, key, FlightMode::Revalidate)
        };
        waiter.wait().await
    }

    /// Read without loading and without touching recency.
    pub fn peek(&self, key: &str) -> Option<Lookup<V>> {
        let now = self.now();
        let state = self.lock();
        state.entries.peek(key).map(|entry| Lookup {
            value: entry.value.clone(),
            state: entry.state(now),
            origin: Origin::Memory,
        })
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.lock().entries.contains(key)
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.lock();
        CacheStats {
            entries: state.entries.len(),
            weight: state.weight,
            in_flight: state.flights.len(),
            ..state.stats
        }
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Write a value obtained outside the cache.
    ///
    /// Any load in progress for the key is marked so it cannot overwrite
    /// this value later. Returns the state the value landed in.
    pub fn insert(&self, key: &str, loaded: Loaded<V>) -> EntryState {
        let now = self.now();
        let freshness = self.inner.loader.freshness(key);
        let mut state = self.lock();
        self.discard_flight(&mut state, key);
        self.store_loaded(&mut state, key, loaded.value, loaded.as_of, freshness, now)
    }

    /// Schedule a background revalidation. Returns false if one is already
    /// running for the key.
    pub fn refresh(&self, key: &str) -> bool {
        let mut state = self.lock();
        let mode = if state.entries.contains(key) {
            FlightMode::Revalidate
        } else {
            FlightMode::Load
        };
        self.start_detached(&mut state, key, mode)
    }

    pub fn invalidate(&self, key: &str) -> bool {
        let removed = {
            let mut state = self.lock();
            let removed = self.remove_key(&mut state, key);
            if removed {
                self.reload_for_subscribers(&mut state, key);
            }
            removed
        };
        if removed {
            debug!(key, "Cache entry invalidated");
            self.emit(CacheEvent::Invalidated {
                prefix: key.to_string(),
                removed: 1,
            });
        }
        removed
    }

    /// Drop every key starting with `prefix`. Returns how many keys were
    /// affected.
    pub fn invalidate_prefix(&self, prefix: &str) -> usize {
        let removed = {
            let mut state = self.lock();
            let keys: BTreeSet<String> = state
                .entries
                .iter()
                .map(|(key, _)| key.clone())
                .chain(state.flights.keys().cloned())
                .filter(|key| key.starts_with(prefix))
                .collect();

            let mut removed = 0;
            for key in &keys {
                if self.remove_key(&mut state, key) {
                    removed += 1;
                    self.reload_for_subscribers(&mut state, key);
                }
            }
            removed
        };

        debug!(prefix, removed, "Cache prefix invalidated");
        self.emit(CacheEvent::Invalidated {
            prefix: prefix.to_string(),
            removed,
        });
        removed
    }

    /// Drop expired entries and entries idle longer than the policy allows.
    pub fn purge_expired(&self) -> usize {
        let now = self.now();
        let max_idle = self
            .inner
            .policy
            .max_idle
            .and_then(|idle| chrono::Duration::from_std(idle).ok());

        let mut state = self.lock();
        let doomed: Vec<String> = state
            .entries
            .iter()
            .filter(|(_, entry)| {
                entry.state(now) == EntryState::Expired
                    || max_idle.is_some_and(|idle| now - entry.last_access > idle)
            })
            .map(|(key, _)| key.clone())
            .collect();

        for key in &doomed {
            if let Some(entry) = state.entries.pop(key) {
                state.weight = state.weight.saturating_sub(entry.weight);
                state.stats.evictions += 1;
            }
        }
        doomed.len()
    }

    // ------------------------------------------------------------------
    // Subscriptions
    // ------------------------------------------------------------------

    /// Observe `key`. The first snapshot reflects the current state; a load
    /// or revalidation is started if the key is not fresh.
    pub fn subscribe(&self, key: &str) -> Subscription<V, E> {
        let now = self.now();
        let mut state = self.lock();
        state.subscribers.retain(|_, tx| tx.receiver_count() > 0);

        let current = state
            .entries
            .peek(key)
            .map(|entry| (entry.value.clone(), entry.state(now)));

        let rx = match state.subscribers.get(key) {
            Some(tx) => tx.subscribe(),
            None => {
                let initial = match &current {
                    Some((value, EntryState::Fresh)) => Snapshot::ready(value.clone()),
                    Some((value, EntryState::Stale)) => Snapshot::stale(value.clone()),
                    _ => Snapshot::loading(),
                };
                let (tx, rx) = watch::channel(initial);
                state.subscribers.insert(key.to_string(), tx);
                rx
            }
        };

        match current.map(|(_, entry_state)| entry_state) {
            Some(EntryState::Fresh) => {}
            Some(EntryState::Stale) => {
                if self.may_revalidate() {
                    self.start_detached(&mut state, key, FlightMode::Revalidate);
                }
            }
            Some(EntryState::Expired) | None => {
                self.start_detached(&mut state, key, FlightMode::Load);
            }
        }

        Subscription::new(key.to_string(), rx)
    }

    /// Subscribed keys that are not fresh, in key order.
    pub fn stale_subscribed_keys(&self) -> Vec<String> {
        let now = self.now();
        let state = self.lock();
        let mut keys: Vec<String> = state
            .subscribers
            .iter()
            .filter(|(_, tx)| tx.receiver_count() > 0)
            .filter(|(key, _)| {
                state
                    .entries
                    .peek(key.as_str())
                    .map_or(true, |entry| entry.state(now) != EntryState::Fresh)
            })
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Start one revalidation for every subscribed key that is not fresh.
    /// Keys that already have a load running are not scheduled again.
    pub fn revalidate_subscribed(&self) -> usize {
        let keys = self.stale_subscribed_keys();
        let mut state = self.lock();
        keys.iter()
            .filter(|key| {
                let mode = if state.entries.contains(key.as_str()) {
                    FlightMode::Revalidate
                } else {
                    FlightMode::Load
                };
                self.start_detached(&mut state, key, mode)
            })
            .count()
    }

    // ------------------------------------------------------------------
    // Flights
    // ------------------------------------------------------------------

    fn join_or_start(&self, state: &mut State<V, E>, key: &str, mode: FlightMode) -> Waiter<V, E> {
        if let Some(flight) = state.flights.get_mut(key) {
            if !flight.is_dead() {
                flight.waiters += 1;
                trace!(key, waiters = flight.waiters, "Joining in-flight load");
                return Waiter {
                    cache: self.clone(),
                    key: key.to_string(),
                    id: flight.id,
                    rx: flight.done.clone(),
                    finished: false,
                };
            }
            state.flights.remove(key);
        }

        let (id, rx) = match self.launch(state, key, mode, 1, false) {
            Some(started) => started,
            None => {
                // No runtime to run the load on; the waiter resolves to
                // `LoadAborted` immediately.
                let (_, rx) = watch::channel(None);
                (0, rx)
            }
        };
        Waiter {
            cache: self.clone(),
            key: key.to_string(),
            id,
            rx,
            finished: false,
        }
    }

    fn start_detached(&self, state: &mut State<V, E>, key: &str, mode: FlightMode) -> bool {
        if let Some(flight) = state.flights.get(key) {
            if !flight.is_dead() {
                return false;
            }
            state.flights.remove(key);
        }
        let started = self.launch(state, key, mode, 0, true).is_some();
        if started && mode == FlightMode::Revalidate {
            trace!(key, "Background revalidation scheduled");
            self.emit(CacheEvent::RevalidationScheduled {
                key: key.to_string(),
            });
        }
        started
    }

    fn launch(
        &self,
        state: &mut State<V, E>,
        key: &str,
        mode: FlightMode,
        waiters: usize,
        detached: bool,
    ) -> Option<(u64, watch::Receiver<Option<Outcome<V, E>>>)> {
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                warn!(key, "No async runtime available; cannot start load");
                return None;
            }
        };

        let id = self.inner.next_flight.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = watch::channel(None);
        let cancel = CancellationToken::new();
        state.flights.insert(
            key.to_string(),
            Flight {
                id,
                waiters,
                detached,
                discard: false,
                cancel: cancel.clone(),
                done: rx.clone(),
            },
        );
        state.stats.loads += 1;

        let cache = self.clone();
        let key = key.to_string();
        handle.spawn(async move {
            let loader = Arc::clone(&cache.inner.loader);
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    trace!(key = %key, "Load cancelled");
                    return;
                }
                result = async {
                    match mode {
                        FlightMode::Load => loader.load(&key).await,
                        FlightMode::Revalidate => loader.revalidate(&key).await,
                    }
                } => result,
            };
            let outcome = cache.complete(&key, id, mode, result);
            let _ = tx.send(Some(outcome));
        });

        Some((id, rx))
    }

    fn complete(
        &self,
        key: &str,
        id: u64,
        mode: FlightMode,
        result: Result<Loaded<V>, E>,
    ) -> Outcome<V, E> {
        let now = self.now();
        let freshness = self.inner.loader.freshness(key);
        let mut state = self.lock();

        let (registered, keep) = match state.flights.get(key) {
            Some(flight) if flight.id == id => (true, !flight.discard),
            _ => (false, false),
        };
        if registered {
            state.flights.remove(key);
            // An invalidated key that is still watched gets one fresh load,
            // started only now so loads for the key never overlap.
            if !keep && !state.entries.contains(key) && state.has_subscribers(key) {
                self.start_detached(&mut state, key, FlightMode::Load);
            }
        }

        match result {
            Ok(loaded) => {
                let entry_state = if keep {
                    self.store_loaded(
                        &mut state,
                        key,
                        loaded.value.clone(),
                        loaded.as_of,
                        freshness,
                        now,
                    )
                } else {
                    // Invalidated while loading: the waiters get the value,
                    // memory does not.
                    classify(
                        now,
                        deadline(loaded.as_of, freshness.stale_after),
                        deadline(loaded.as_of, freshness.expire_after),
                    )
                };

                if keep
                    && entry_state == EntryState::Stale
                    && mode == FlightMode::Load
                    && self.may_revalidate()
                {
                    self.start_detached(&mut state, key, FlightMode::Revalidate);
                }
                Ok((loaded.value, entry_state))
            }
            Err(err) => {
                state.stats.load_failures += 1;
                if keep {
                    let previous = state.entries.peek(key).map(|entry| entry.value.clone());
                    Self::publish(&state, key, Snapshot::failed(err.clone(), previous));
                }
                Err(err)
            }
        }
    }

    /// A waiter leaves. The last one out cancels the load unless it is
    /// detached or somebody subscribed to the key meanwhile.
    fn release(&self, key: &str, id: u64) {
        let mut state = self.lock();
        let subscribed = state.has_subscribers(key);
        let Some(flight) = state.flights.get_mut(key) else {
            return;
        };
        if flight.id != id {
            return;
        }

        flight.waiters = flight.waiters.saturating_sub(1);
        if flight.waiters > 0 || flight.detached {
            return;
        }
        if subscribed {
            flight.detached = true;
            return;
        }

        debug!(key, "Last waiter left; cancelling load");
        flight.cancel.cancel();
        state.flights.remove(key);
    }

    fn forget_dead_flight(&self, key: &str, id: u64) {
        let mut state = self.lock();
        if state.flights.get(key).is_some_and(|f| f.id == id && f.is_dead()) {
            state.flights.remove(key);
        }
    }

    // ------------------------------------------------------------------
    // State helpers (caller holds the lock)
    // ------------------------------------------------------------------

    fn store_loaded(
        &self,
        state: &mut State<V, E>,
        key: &str,
        value: V,
        as_of: DateTime<Utc>,
        freshness: FreshnessPolicy,
        now: DateTime<Utc>,
    ) -> EntryState {
        let stale_at = deadline(as_of, freshness.stale_after);
        let expires_at = deadline(as_of, freshness.expire_after);
        let entry_state = classify(now, stale_at, expires_at);

        if entry_state == EntryState::Expired {
            debug!(key, "Value is already expired; not cached");
            return entry_state;
        }

        let snapshot = match entry_state {
            EntryState::Fresh => Snapshot::ready(value.clone()),
            _ => Snapshot::stale(value.clone()),
        };

        let weight = (self.inner.weigher)(&value);
        let entry = Entry {
            value,
            weight,
            stale_at,
            expires_at,
            last_access: now,
        };
        if let Some(old) = state.entries.put(key.to_string(), entry) {
            state.weight = state.weight.saturating_sub(old.weight);
        }
        state.weight += weight;
        self.enforce_limits(state);

        Self::publish(state, key, snapshot);
        entry_state
    }

    fn enforce_limits(&self, state: &mut State<V, E>) {
        let policy = &self.inner.policy;
        while state.entries.len() > policy.capacity
            || (policy.max_weight > 0 && state.weight > policy.max_weight)
        {
            match state.entries.pop_lru() {
                Some((key, entry)) => {
                    state.weight = state.weight.saturating_sub(entry.weight);
                    state.stats.evictions += 1;
                    trace!(key = %key, "Evicted least recently used entry");
                }
                None => break,
            }
        }
    }

    /// Remove the entry and discard any load for `key`.
    fn remove_key(&self, state: &mut State<V, E>, key: &str) -> bool {
        let entry_removed = match state.entries.pop(key) {
            Some(entry) => {
                state.weight = state.weight.saturating_sub(entry.weight);
                true
            }
            None => false,
        };
        let flight_discarded = self.discard_flight(state, key);
        entry_removed || flight_discarded
    }

    /// Stop the flight for `key` from writing to memory.
    ///
    /// A flight with waiters stays registered so later callers join it
    /// instead of starting a second load; its result reaches the waiters
    /// only. Flights nobody waits on are cancelled and forgotten. Returns
    /// false if there was nothing left to discard.
    fn discard_flight(&self, state: &mut State<V, E>, key: &str) -> bool {
        let Some(flight) = state.flights.get_mut(key) else {
            return false;
        };
        if flight.discard {
            return false;
        }
        if flight.waiters > 0 {
            flight.discard = true;
            return true;
        }
        flight.cancel.cancel();
        state.flights.remove(key);
        true
    }

    fn reload_for_subscribers(&self, state: &mut State<V, E>, key: &str) {
        if state.has_subscribers(key) {
            Self::publish(state, key, Snapshot::loading());
            self.start_detached(state, key, FlightMode::Load);
        }
    }

    fn publish(state: &State<V, E>, key: &str, snapshot: Snapshot<V, E>) {
        if let Some(tx) = state.subscribers.get(key) {
            tx.send_if_modified(|current| {
                if *current == snapshot {
                    false
                } else {
                    *current = snapshot;
                    true
                }
            });
        }
    }
}
