use async_trait::async_trait;
use bridge_traits::time::{Clock, ManualClock};
use chrono::{TimeZone, Utc};
use core_cache::{
    CacheError, CachePolicy, EntryState, Loaded, Loader, Origin, ReactiveCache, SnapshotStatus,
};
use core_runtime::config::FreshnessPolicy;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

#[derive(Debug, Clone, PartialEq)]
enum TestError {
    Failed(String),
    Cache(CacheError),
}

impl From<CacheError> for TestError {
    fn from(err: CacheError) -> Self {
        TestError::Cache(err)
    }
}

struct TestLoader {
    clock: Arc<ManualClock>,
    gate: watch::Sender<bool>,
    loads: AtomicUsize,
    revalidations: AtomicUsize,
    completed: AtomicUsize,
    online: AtomicBool,
    fail: AtomicBool,
    constant: AtomicBool,
    /// Seconds subtracted from `as_of` for plain loads.
    load_age_secs: AtomicI64,
}

impl TestLoader {
    fn new(clock: Arc<ManualClock>) -> Arc<Self> {
        let (gate, _) = watch::channel(true);
        Arc::new(Self {
            clock,
            gate,
            loads: AtomicUsize::new(0),
            revalidations: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
            online: AtomicBool::new(true),
            fail: AtomicBool::new(false),
            constant: AtomicBool::new(false),
            load_age_secs: AtomicI64::new(0),
        })
    }

    fn close_gate(&self) {
        self.gate.send_replace(false);
    }

    fn open_gate(&self) {
        self.gate.send_replace(true);
    }

    async fn produce(&self, key: &str, age_secs: i64) -> Result<Loaded<String>, TestError> {
        let mut gate = self.gate.subscribe();
        let _ = gate.wait_for(|open| *open).await;

        if self.fail.load(Ordering::SeqCst) {
            return Err(TestError::Failed(format!("cannot load {key}")));
        }
        let n = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
        let value = if self.constant.load(Ordering::SeqCst) {
            key.to_string()
        } else {
            format!("{key}#{n}")
        };
        let as_of = self.clock.now() - chrono::Duration::seconds(age_secs);
        Ok(Loaded::new(value, as_of))
    }
}

#[async_trait]
impl Loader<String, TestError> for TestLoader {
    async fn load(&self, key: &str) -> Result<Loaded<String>, TestError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        let age = self.load_age_secs.load(Ordering::SeqCst);
        self.produce(key, age).await
    }

    async fn revalidate(&self, key: &str) -> Result<Loaded<String>, TestError> {
        self.revalidations.fetch_add(1, Ordering::SeqCst);
        self.produce(key, 0).await
    }

    fn freshness(&self, _key: &str) -> FreshnessPolicy {
        FreshnessPolicy::new(Duration::from_secs(60), Duration::from_secs(600))
    }

    fn can_revalidate(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}

struct Harness {
    clock: Arc<ManualClock>,
    loader: Arc<TestLoader>,
    cache: ReactiveCache<String, TestError>,
}

fn harness_with(policy: CachePolicy) -> Harness {
    let clock = Arc::new(ManualClock::new(
        Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
    ));
    let loader = TestLoader::new(Arc::clone(&clock));
    let cache = ReactiveCache::builder(loader.clone() as Arc<dyn Loader<String, TestError>>)
        .policy(policy)
        .clock(clock.clone() as Arc<dyn Clock>)
        .weigher(|value: &String| value.len())
        .build()
        .unwrap();
    Harness {
        clock,
        loader,
        cache,
    }
}

fn harness() -> Harness {
    harness_with(CachePolicy::default())
}

/// Let spawned loads run.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

#[tokio::test(start_paused = true)]
async fn miss_then_hit() {
    let h = harness();

    let first = h.cache.get_or_fetch("a").await.unwrap();
    assert_eq!(first.value, "a#1");
    assert_eq!(first.origin, Origin::Loaded);
    assert_eq!(first.state, EntryState::Fresh);

    let second = h.cache.get_or_fetch("a").await.unwrap();
    assert_eq!(second.value, "a#1");
    assert_eq!(second.origin, Origin::Memory);

    assert_eq!(h.loader.loads.load(Ordering::SeqCst), 1);
    let stats = h.cache.stats();
    assert_eq!((stats.hits, stats.misses), (1, 1));
}

#[tokio::test(start_paused = true)]
async fn concurrent_misses_share_one_load() {
    let h = harness();
    h.loader.close_gate();

    let tasks: Vec<_> = (0..5)
        .map(|_| {
            let cache = h.cache.clone();
            tokio::spawn(async move { cache.get_or_fetch("a").await })
        })
        .collect();
    settle().await;
    assert_eq!(h.cache.stats().in_flight, 1);

    h.loader.open_gate();
    for task in tasks {
        assert_eq!(task.await.unwrap().unwrap().value, "a#1");
    }
    assert_eq!(h.loader.loads.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn stale_value_is_served_and_revalidated_once() {
    let h = harness();
    h.cache.get_or_fetch("a").await.unwrap();

    h.clock.advance(chrono::Duration::seconds(90));
    h.loader.close_gate();

    for _ in 0..3 {
        let lookup = h.cache.get_or_fetch("a").await.unwrap();
        assert_eq!(lookup.state, EntryState::Stale);
        assert_eq!(lookup.origin, Origin::Memory);
        assert_eq!(lookup.value, "a#1");
    }
    settle().await;
    assert_eq!(h.loader.revalidations.load(Ordering::SeqCst), 1);

    h.loader.open_gate();
    settle().await;

    let refreshed = h.cache.get_or_fetch("a").await.unwrap();
    assert_eq!(refreshed.state, EntryState::Fresh);
    assert_eq!(refreshed.value, "a#2");
}

#[tokio::test(start_paused = true)]
async fn stale_value_is_not_refreshed_when_revalidation_is_impossible() {
    let h = harness();
    h.cache.get_or_fetch("a").await.unwrap();

    h.loader.online.store(false, Ordering::SeqCst);
    h.clock.advance(chrono::Duration::seconds(90));

    let lookup = h.cache.get_or_fetch("a").await.unwrap();
    assert_eq!(lookup.state, EntryState::Stale);
    settle().await;
    assert_eq!(h.loader.revalidations.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn background_revalidation_can_be_disabled() {
    let h = harness_with(CachePolicy::default().with_background_revalidation(false));
    h.cache.get_or_fetch("a").await.unwrap();
    h.clock.advance(chrono::Duration::seconds(90));

    assert_eq!(h.cache.get_or_fetch("a").await.unwrap().state, EntryState::Stale);
    settle().await;
    assert_eq!(h.loader.revalidations.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn expired_entry_waits_for_a_load() {
    let h = harness();
    h.cache.get_or_fetch("a").await.unwrap();

    h.clock.advance(chrono::Duration::seconds(700));
    let lookup = h.cache.get_or_fetch("a").await.unwrap();
    assert_eq!(lookup.origin, Origin::Loaded);
    assert_eq!(lookup.state, EntryState::Fresh);
    assert_eq!(lookup.value, "a#2");
}

#[tokio::test(start_paused = true)]
async fn stale_load_result_schedules_one_revalidation() {
    let h = harness();
    h.loader.load_age_secs.store(90, Ordering::SeqCst);

    let lookup = h.cache.get_or_fetch("a").await.unwrap();
    assert_eq!(lookup.state, EntryState::Stale);
    settle().await;

    assert_eq!(h.loader.revalidations.load(Ordering::SeqCst), 1);
    assert_eq!(h.cache.peek("a").unwrap().state, EntryState::Fresh);
}

#[tokio::test(start_paused = true)]
async fn dropping_one_waiter_keeps_the_shared_load() {
    let h = harness();
    h.loader.close_gate();

    let quitter = {
        let cache = h.cache.clone();
        tokio::spawn(async move { cache.get_or_fetch("a").await })
    };
    let stayer = {
        let cache = h.cache.clone();
        tokio::spawn(async move { cache.get_or_fetch("a").await })
    };
    settle().await;

    quitter.abort();
    settle().await;
    assert_eq!(h.cache.stats().in_flight, 1);

    h.loader.open_gate();
    assert_eq!(stayer.await.unwrap().unwrap().value, "a#1");
    assert_eq!(h.loader.completed.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn last_waiter_leaving_cancels_the_load() {
    let h = harness();
    h.loader.close_gate();

    let attempt = tokio::time::timeout(Duration::from_millis(50), h.cache.get_or_fetch("a")).await;
    assert!(attempt.is_err());
    assert_eq!(h.cache.stats().in_flight, 0);

    h.loader.open_gate();
    settle().await;
    assert_eq!(h.loader.completed.load(Ordering::SeqCst), 0);
    assert!(!h.cache.contains_key("a"));
}

#[tokio::test(start_paused = true)]
async fn failures_reach_every_waiter_and_are_not_cached() {
    let h = harness();
    h.loader.fail.store(true, Ordering::SeqCst);

    let err = h.cache.get_or_fetch("a").await.unwrap_err();
    assert_eq!(err, TestError::Failed("cannot load a".into()));
    assert!(!h.cache.contains_key("a"));

    h.loader.fail.store(false, Ordering::SeqCst);
    assert!(h.cache.get_or_fetch("a").await.is_ok());
    assert_eq!(h.loader.loads.load(Ordering::SeqCst), 2);
    assert_eq!(h.cache.stats().load_failures, 1);
}

#[tokio::test(start_paused = true)]
async fn subscription_sees_loading_then_ready_and_reloads_after_invalidate() {
    let h = harness();
    let mut sub = h.cache.subscribe("a");

    let first = sub.next().await.unwrap();
    assert_eq!(first.status, SnapshotStatus::Loading);
    assert!(first.value.is_none());

    let ready = sub.next().await.unwrap();
    assert_eq!(ready.status, SnapshotStatus::Ready);
    assert_eq!(ready.value.as_deref(), Some("a#1"));

    assert!(h.cache.invalidate("a"));
    assert_eq!(sub.next().await.unwrap().status, SnapshotStatus::Loading);
    let reloaded = sub.next().await.unwrap();
    assert_eq!(reloaded.value.as_deref(), Some("a#2"));
}

#[tokio::test(start_paused = true)]
async fn identical_reload_does_not_notify_subscribers() {
    let h = harness();
    h.loader.constant.store(true, Ordering::SeqCst);

    let mut sub = h.cache.subscribe("a");
    sub.next().await.unwrap();
    assert_eq!(sub.next().await.unwrap().status, SnapshotStatus::Ready);

    h.cache.reload("a").await.unwrap();
    let quiet = tokio::time::timeout(Duration::from_millis(50), sub.next()).await;
    assert!(quiet.is_err());
}

#[tokio::test(start_paused = true)]
async fn subscriber_sees_failed_load() {
    let h = harness();
    h.loader.fail.store(true, Ordering::SeqCst);

    let mut sub = h.cache.subscribe("a");
    assert_eq!(sub.next().await.unwrap().status, SnapshotStatus::Loading);
    let failed = sub.next().await.unwrap();
    assert_eq!(failed.status, SnapshotStatus::Error);
    assert!(failed.error.is_some());
    assert!(failed.value.is_none());
}

#[tokio::test(start_paused = true)]
async fn capacity_evicts_least_recently_used() {
    let h = harness_with(CachePolicy::new(2));
    h.cache.get_or_fetch("a").await.unwrap();
    h.cache.get_or_fetch("b").await.unwrap();
    h.cache.get_or_fetch("a").await.unwrap();
    h.cache.get_or_fetch("c").await.unwrap();

    assert!(h.cache.contains_key("a"));
    assert!(!h.cache.contains_key("b"));
    assert!(h.cache.contains_key("c"));
    assert_eq!(h.cache.stats().evictions, 1);
}

#[tokio::test(start_paused = true)]
async fn weight_bound_evicts() {
    let h = harness_with(CachePolicy::new(10).with_max_weight(5));
    h.cache.get_or_fetch("a").await.unwrap();
    h.cache.get_or_fetch("b").await.unwrap();

    let stats = h.cache.stats();
    assert_eq!(stats.entries, 1);
    assert_eq!(stats.weight, 3);
    assert!(h.cache.contains_key("b"));
}

#[tokio::test(start_paused = true)]
async fn invalidate_prefix_only_touches_matching_keys() {
    let h = harness();
    for key in ["content/a", "content/b", "index"] {
        h.cache.get_or_fetch(key).await.unwrap();
    }

    assert_eq!(h.cache.invalidate_prefix("content/"), 2);
    assert!(h.cache.contains_key("index"));
    assert!(!h.cache.contains_key("content/a"));
    assert!(!h.cache.invalidate("content/a"));
}

#[tokio::test(start_paused = true)]
async fn stale_subscribed_keys_are_revalidated_once() {
    let h = harness();
    let _a = h.cache.subscribe("a");
    let _b = h.cache.subscribe("b");
    settle().await;
    assert!(h.cache.stale_subscribed_keys().is_empty());

    h.loader.online.store(false, Ordering::SeqCst);
    h.clock.advance(chrono::Duration::seconds(90));
    assert_eq!(h.cache.stale_subscribed_keys(), vec!["a".to_string(), "b".to_string()]);

    h.loader.online.store(true, Ordering::SeqCst);
    h.loader.close_gate();
    assert_eq!(h.cache.revalidate_subscribed(), 2);
    assert_eq!(h.cache.revalidate_subscribed(), 0);

    h.loader.open_gate();
    settle().await;
    assert_eq!(h.loader.revalidations.load(Ordering::SeqCst), 2);
    assert!(h.cache.stale_subscribed_keys().is_empty());
}

#[tokio::test(start_paused = true)]
async fn dropped_subscriptions_are_not_revalidated() {
    let h = harness();
    {
        let _sub = h.cache.subscribe("a");
        settle().await;
    }
    h.clock.advance(chrono::Duration::seconds(90));
    assert!(h.cache.stale_subscribed_keys().is_empty());
    assert_eq!(h.cache.revalidate_subscribed(), 0);
}

#[tokio::test(start_paused = true)]
async fn purge_drops_idle_entries() {
    let h = harness_with(CachePolicy::default().with_max_idle(Some(Duration::from_secs(30))));
    h.cache.get_or_fetch("a").await.unwrap();

    h.clock.advance(chrono::Duration::seconds(31));
    assert_eq!(h.cache.purge_expired(), 1);
    assert_eq!(h.cache.stats().entries, 0);
}

#[tokio::test(start_paused = true)]
async fn insert_wins_over_a_load_in_progress() {
    let h = harness();
    h.loader.close_gate();

    let waiter = {
        let cache = h.cache.clone();
        tokio::spawn(async move { cache.get_or_fetch("a").await })
    };
    settle().await;

    let state = h.cache.insert("a", Loaded::new("manual".to_string(), h.clock.now()));
    assert_eq!(state, EntryState::Fresh);

    h.loader.open_gate();
    assert_eq!(waiter.await.unwrap().unwrap().value, "a#1");
    assert_eq!(h.cache.peek("a").unwrap().value, "manual");
}

#[test]
fn invalid_policy_is_rejected() {
    let clock = Arc::new(ManualClock::default());
    let loader = TestLoader::new(clock);
    let built = ReactiveCache::<String, TestError>::builder(loader as Arc<dyn Loader<String, TestError>>)
        .policy(CachePolicy::new(0))
        .build();
    assert!(matches!(built, Err(CacheError::InvalidPolicy(_))));
}

#[tokio::test(start_paused = true)]
async fn invalidating_during_a_load_does_not_start_a_second_one() {
    let h = harness();
    h.loader.close_gate();

    let first = {
        let cache = h.cache.clone();
        tokio::spawn(async move { cache.get_or_fetch("a").await })
    };
    settle().await;
    assert!(h.cache.invalidate("a"));

    let second = {
        let cache = h.cache.clone();
        tokio::spawn(async move { cache.get_or_fetch("a").await })
    };
    settle().await;
    assert_eq!(h.cache.stats().in_flight, 1);
    assert_eq!(h.loader.loads.load(Ordering::SeqCst), 1);

    h.loader.open_gate();
    assert_eq!(first.await.unwrap().unwrap().value, "a#1");
    assert_eq!(second.await.unwrap().unwrap().value, "a#1");
    assert_eq!(h.loader.loads.load(Ordering::SeqCst), 1);
    // The load began before the invalidation, so memory stays empty.
    assert!(h.cache.peek("a").is_none());
    assert_eq!(h.cache.stats().in_flight, 0);
}

#[tokio::test(start_paused = true)]
async fn invalidated_subscription_reloads_after_the_running_load() {
    let h = harness();
    h.loader.close_gate();

    let waiter = {
        let cache = h.cache.clone();
        tokio::spawn(async move { cache.get_or_fetch("a").await })
    };
    settle().await;
    let mut sub = h.cache.subscribe("a");
    assert_eq!(sub.next().await.unwrap().status, SnapshotStatus::Loading);

    assert!(h.cache.invalidate("a"));
    assert_eq!(h.cache.stats().in_flight, 1);

    h.loader.open_gate();
    assert_eq!(waiter.await.unwrap().unwrap().value, "a#1");

    let ready = sub.next().await.unwrap();
    assert_eq!(ready.status, SnapshotStatus::Ready);
    assert_eq!(ready.value.as_deref(), Some("a#2"));
    assert_eq!(h.loader.loads.load(Ordering::SeqCst), 2);
    assert_eq!(h.cache.peek("a").unwrap().value, "a#2");
}
