//! End-to-end behaviour of the fire risk pipeline.
//!
//! Timing-sensitive scenarios use scripted providers on a paused clock; the
//! wiremock scenarios exercise the real HTTP providers.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use wildfire_core::StorageError;
use wildfire_risk::geo::cell_key;
use wildfire_risk::{
    Coordinate, FireRiskService, Freshness, KeyValueStore, PrimaryProvider, RegionalProvider,
    RiskAssessment, RiskError, RiskLevel, RiskProvider, RiskSource, SpatialCache, SqliteStore,
    Tier, TierBudgets, TierOutcome,
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Provider with a fixed answer after a fixed delay.
struct Scripted {
    source: RiskSource,
    answer: Result<f64, RiskError>,
    delay: Duration,
    calls: Arc<AtomicUsize>,
}

impl Scripted {
    fn ok(source: RiskSource, index: f64) -> Self {
        Self {
            source,
            answer: Ok(index),
            delay: Duration::ZERO,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn err(source: RiskSource, error: RiskError) -> Self {
        Self {
            source,
            answer: Err(error),
            delay: Duration::ZERO,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Shared call counter that outlives the move into the service.
    fn counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

impl RiskProvider for Scripted {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn fetch_risk(
        &self,
        _coord: Coordinate,
        _cancel: &CancellationToken,
    ) -> Result<RiskAssessment, RiskError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        match &self.answer {
            Ok(index) => {
                let assessment =
                    RiskAssessment::new(*index, Utc::now(), self.source, Freshness::Live);
                Ok(assessment.unwrap())
            }
            Err(e) => Err(e.clone()),
        }
    }
}

/// SQLite store that counts reads.
struct CountingStore {
    inner: SqliteStore,
    gets: AtomicUsize,
}

impl KeyValueStore for CountingStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.inner.set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.inner.remove(key)
    }
}

fn edinburgh() -> Coordinate {
    Coordinate::new(55.95, -3.19).unwrap()
}

fn madrid() -> Coordinate {
    Coordinate::new(40.42, -3.70).unwrap()
}

fn fresh_cache() -> Arc<SpatialCache> {
    Arc::new(SpatialCache::open(Arc::new(SqliteStore::in_memory().unwrap())))
}

async fn wait_for_cache(cache: &SpatialCache, cell: &str) -> Option<RiskAssessment> {
    for _ in 0..100 {
        if let Some(hit) = cache.get(cell) {
            return Some(hit);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    None
}

#[tokio::test]
async fn test_primary_success_short_circuits_later_tiers() {
    let store = Arc::new(CountingStore {
        inner: SqliteStore::in_memory().unwrap(),
        gets: AtomicUsize::new(0),
    });
    let cache = Arc::new(SpatialCache::open(store.clone()));
    store.gets.store(0, Ordering::SeqCst);

    let regional = Scripted::ok(RiskSource::Regional, 5.0);
    let regional_calls = regional.counter();
    let service = FireRiskService::new(Scripted::ok(RiskSource::Primary, 30.0), regional, cache);

    let resolution = service.get_current_detailed(edinburgh()).await.unwrap();

    assert_eq!(regional_calls.load(Ordering::SeqCst), 0);
    assert_eq!(resolution.assessment.source(), RiskSource::Primary);
    assert_eq!(resolution.assessment.freshness(), Freshness::Live);
    assert_eq!(resolution.report.attempted(), vec![Tier::Primary]);
    assert_eq!(store.gets.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_regional_never_attempted_outside_region() {
    let regional = Scripted::ok(RiskSource::Regional, 22.5);
    let regional_calls = regional.counter();
    let service = FireRiskService::new(
        Scripted::err(RiskSource::Primary, RiskError::NoCoverage),
        regional,
        fresh_cache(),
    );

    let resolution = service.get_current_detailed(madrid()).await.unwrap();

    assert_eq!(regional_calls.load(Ordering::SeqCst), 0);
    assert_eq!(resolution.assessment.source(), RiskSource::Mock);
    assert!(matches!(
        resolution.report.attempts[1].outcome,
        TierOutcome::Skipped(_)
    ));
}

#[tokio::test(start_paused = true)]
async fn test_slow_primary_falls_to_regional_inside_region() {
    let primary = Scripted::ok(RiskSource::Primary, 3.0).delayed(Duration::from_secs(4));
    let regional = Scripted::ok(RiskSource::Regional, 22.5);
    let service = FireRiskService::new(primary, regional, fresh_cache());

    let resolution = service.get_current_detailed(edinburgh()).await.unwrap();
    let assessment = &resolution.assessment;

    assert_eq!(assessment.level(), RiskLevel::High);
    assert_eq!(assessment.source(), RiskSource::Regional);
    assert_eq!(assessment.freshness(), Freshness::Live);
    assert!(matches!(
        resolution.report.attempts[0].outcome,
        TierOutcome::Failed(RiskError::Timeout)
    ));
    let primary_elapsed = resolution.report.attempts[0].elapsed;
    assert!(primary_elapsed >= Duration::from_secs(3));
    assert!(primary_elapsed < Duration::from_millis(3100));
}

#[tokio::test]
async fn test_provider_failures_fall_back_to_cached_entry() {
    let cache = fresh_cache();
    let coord = edinburgh();
    let earlier = Utc::now() - chrono::Duration::hours(2);
    let stored = RiskAssessment::new(15.0, earlier, RiskSource::Regional, Freshness::Live).unwrap();
    cache.put_at(&cell_key(&coord), stored, earlier).unwrap();

    let service = FireRiskService::new(
        Scripted::err(RiskSource::Primary, RiskError::Timeout),
        Scripted::err(
            RiskSource::Regional,
            RiskError::Network(wildfire_core::NetworkError::Timeout),
        ),
        cache,
    );

    let resolution = service.get_current_detailed(coord).await.unwrap();
    let assessment = &resolution.assessment;

    assert_eq!(assessment.level(), RiskLevel::Moderate);
    assert_eq!(assessment.freshness(), Freshness::Cached);
    assert_eq!(assessment.source(), RiskSource::Regional);
    assert_eq!(
        resolution.report.attempted(),
        vec![Tier::Primary, Tier::Regional, Tier::Cache]
    );
}

#[tokio::test]
async fn test_everything_failing_yields_fast_mock() {
    let service = FireRiskService::new(
        Scripted::err(RiskSource::Primary, RiskError::NoCoverage),
        Scripted::err(RiskSource::Regional, RiskError::NoCoverage),
        fresh_cache(),
    );

    let resolution = service.get_current_detailed(edinburgh()).await.unwrap();
    let mock_attempt = resolution.report.attempts.last().unwrap();

    assert_eq!(resolution.assessment.source(), RiskSource::Mock);
    assert_eq!(resolution.assessment.freshness(), Freshness::Mock);
    assert_eq!(mock_attempt.tier, Tier::Mock);
    assert!(mock_attempt.elapsed < Duration::from_millis(100));
}

#[tokio::test]
async fn test_mock_is_stable_for_a_coordinate() {
    let service = FireRiskService::new(
        Scripted::err(RiskSource::Primary, RiskError::NoCoverage),
        Scripted::err(RiskSource::Regional, RiskError::NoCoverage),
        fresh_cache(),
    );

    let first = service.get_current(madrid()).await.unwrap();
    let second = service.get_current(madrid()).await.unwrap();

    assert_eq!(first.level(), second.level());
}

#[tokio::test(start_paused = true)]
async fn test_global_deadline_abandons_hung_primary() {
    let primary = Scripted::ok(RiskSource::Primary, 10.0).delayed(Duration::from_secs(10));
    let service = FireRiskService::new(
        primary,
        Scripted::ok(RiskSource::Regional, 10.0),
        fresh_cache(),
    )
    .with_budgets(TierBudgets {
        global: Duration::from_secs(8),
        primary: Duration::from_secs(30),
        regional: Duration::from_secs(2),
        cache: Duration::from_secs(1),
    });

    let started = tokio::time::Instant::now();
    let resolution = service.get_current_detailed(edinburgh()).await.unwrap();

    assert_eq!(resolution.assessment.source(), RiskSource::Mock);
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(8));
    assert!(elapsed < Duration::from_millis(8100));
    assert_eq!(resolution.report.attempted(), vec![Tier::Primary, Tier::Mock]);
}

#[tokio::test(start_paused = true)]
async fn test_slow_providers_with_default_budgets_still_answer_in_time() {
    let service = FireRiskService::new(
        Scripted::ok(RiskSource::Primary, 10.0).delayed(Duration::from_secs(10)),
        Scripted::ok(RiskSource::Regional, 10.0).delayed(Duration::from_secs(10)),
        fresh_cache(),
    );

    let started = tokio::time::Instant::now();
    let resolution = service.get_current_detailed(edinburgh()).await.unwrap();

    assert_eq!(resolution.assessment.source(), RiskSource::Mock);
    assert!(started.elapsed() < Duration::from_secs(8));
}

#[tokio::test]
async fn test_live_results_are_written_through() {
    let cache = fresh_cache();
    let service = FireRiskService::new(
        Scripted::ok(RiskSource::Primary, 30.0),
        Scripted::ok(RiskSource::Regional, 5.0),
        Arc::clone(&cache),
    );

    service.get_current(edinburgh()).await.unwrap();
    let cached = wait_for_cache(&cache, &cell_key(&edinburgh())).await.unwrap();

    assert_eq!(cached.source(), RiskSource::Primary);
    assert_eq!(cached.freshness(), Freshness::Cached);
    assert_eq!(cached.numeric_index(), 30.0);
}

#[tokio::test]
async fn test_out_of_range_coordinate_is_rejected_before_any_tier() {
    let primary = Scripted::ok(RiskSource::Primary, 30.0);
    let primary_calls = primary.counter();
    let service =
        FireRiskService::new(primary, Scripted::ok(RiskSource::Regional, 5.0), fresh_cache());

    let bad = Coordinate {
        latitude: -91.0,
        longitude: 10.0,
    };
    let result = service.get_current(bad).await;

    assert!(matches!(result, Err(RiskError::Validation(_))));
    assert_eq!(primary_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_regional_answers_over_http_when_primary_errors() {
    let primary_server = MockServer::start().await;
    let regional_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/gwis"))
        .respond_with(ResponseTemplate::new(502))
        .expect(1)
        .mount(&primary_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/fire-danger/point"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "coverage": true,
            "index": 22.5,
            "issued_at": "2026-07-01T06:00:00Z"
        })))
        .expect(1)
        .mount(&regional_server)
        .await;

    let service = FireRiskService::new(
        PrimaryProvider::new(format!("{}/gwis", primary_server.uri()), "test").unwrap(),
        RegionalProvider::new(regional_server.uri(), "test").unwrap(),
        fresh_cache(),
    );

    let assessment = service.get_current(edinburgh()).await.unwrap();

    assert_eq!(assessment.level(), RiskLevel::High);
    assert_eq!(assessment.source(), RiskSource::Regional);
    assert_eq!(assessment.freshness(), Freshness::Live);
}

#[tokio::test]
async fn test_no_network_call_for_invalid_coordinate_over_http() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let service = FireRiskService::new(
        PrimaryProvider::new(format!("{}/gwis", server.uri()), "test").unwrap(),
        RegionalProvider::new(server.uri(), "test").unwrap(),
        fresh_cache(),
    );

    let bad = Coordinate {
        latitude: f64::NAN,
        longitude: 0.0,
    };
    assert!(matches!(
        service.get_current(bad).await,
        Err(RiskError::Validation(_))
    ));
}
