//! Fire risk resolution pipeline.
//!
//! Tiers run strictly in order (primary, regional, cache, mock) under one global
//! deadline. Every tier failure falls through to the next; the mock tier always
//! answers, so callers only ever see a validation error.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use wildfire_core::TimeoutConfig;

use crate::cache::SpatialCache;
use crate::geo;
use crate::mock;
use crate::provider::RiskProvider;
use crate::types::{Coordinate, RiskAssessment, RiskError, Tier};

/// Time budgets for one resolution. Tier budgets are capped by what is left of `global`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierBudgets {
    pub global: Duration,
    pub primary: Duration,
    pub regional: Duration,
    pub cache: Duration,
}

impl Default for TierBudgets {
    fn default() -> Self {
        Self::from(&TimeoutConfig::default())
    }
}

impl From<&TimeoutConfig> for TierBudgets {
    fn from(config: &TimeoutConfig) -> Self {
        Self {
            global: config.global(),
            primary: config.primary(),
            regional: config.regional(),
            cache: config.cache(),
        }
    }
}

/// What happened at one tier.
#[derive(Debug, Clone)]
pub enum TierOutcome {
    /// The tier produced the returned assessment.
    Hit,
    /// The cache had nothing usable for the cell.
    Miss,
    Failed(RiskError),
    Skipped(&'static str),
}

#[derive(Debug, Clone)]
pub struct TierAttempt {
    pub tier: Tier,
    pub outcome: TierOutcome,
    pub elapsed: Duration,
}

/// Trace of a resolution, enough to explain a degraded answer to the user.
#[derive(Debug, Clone, Default)]
pub struct ResolutionReport {
    pub attempts: Vec<TierAttempt>,
    pub elapsed: Duration,
}

impl ResolutionReport {
    /// Tiers that actually ran, in order.
    pub fn attempted(&self) -> Vec<Tier> {
        self.attempts
            .iter()
            .filter(|a| !matches!(a.outcome, TierOutcome::Skipped(_)))
            .map(|a| a.tier)
            .collect()
    }

    pub fn was_attempted(&self, tier: Tier) -> bool {
        self.attempted().contains(&tier)
    }

    /// Most recent tier failure, if any.
    pub fn last_error(&self) -> Option<&RiskError> {
        self.attempts.iter().rev().find_map(|a| match &a.outcome {
            TierOutcome::Failed(e) => Some(e),
            _ => None,
        })
    }

    fn record(&mut self, tier: Tier, outcome: TierOutcome, elapsed: Duration) {
        match &outcome {
            TierOutcome::Failed(e) => {
                tracing::info!("{} tier failed after {:?}: {}", tier, elapsed, e)
            }
            TierOutcome::Skipped(reason) => tracing::debug!("{} tier skipped: {}", tier, reason),
            TierOutcome::Miss => tracing::debug!("{} tier missed", tier),
            TierOutcome::Hit => tracing::debug!("{} tier hit in {:?}", tier, elapsed),
        }
        self.attempts.push(TierAttempt {
            tier,
            outcome,
            elapsed,
        });
    }
}

#[derive(Debug, Clone)]
pub struct Resolution {
    pub assessment: RiskAssessment,
    pub report: ResolutionReport,
}

/// Orchestrates the four risk tiers.
///
/// The cache is injected so that each instance (and each test) owns its own.
pub struct FireRiskService<P, R> {
    primary: P,
    regional: R,
    cache: Arc<SpatialCache>,
    budgets: TierBudgets,
}

impl<P: RiskProvider, R: RiskProvider> FireRiskService<P, R> {
    pub fn new(primary: P, regional: R, cache: Arc<SpatialCache>) -> Self {
        Self {
            primary,
            regional,
            cache,
            budgets: TierBudgets::default(),
        }
    }

    pub fn with_budgets(mut self, budgets: TierBudgets) -> Self {
        self.budgets = budgets;
        self
    }

    pub fn cache(&self) -> &Arc<SpatialCache> {
        &self.cache
    }

    pub fn budgets(&self) -> TierBudgets {
        self.budgets
    }

    /// Current fire risk at `coord`.
    pub async fn get_current(&self, coord: Coordinate) -> Result<RiskAssessment, RiskError> {
        self.get_current_detailed(coord)
            .await
            .map(|resolution| resolution.assessment)
    }

    /// Like [`get_current`](Self::get_current), with the per-tier report.
    pub async fn get_current_detailed(&self, coord: Coordinate) -> Result<Resolution, RiskError> {
        self.get_current_with_cancel(coord, &CancellationToken::new())
            .await
    }

    /// Resolve under a caller-owned cancellation token. Cancelling it abandons the
    /// in-flight tier; the pipeline still falls through to the mock tier.
    pub async fn get_current_with_cancel(
        &self,
        coord: Coordinate,
        cancel: &CancellationToken,
    ) -> Result<Resolution, RiskError> {
        if let Err(e) = coord.validate() {
            tracing::warn!("Rejected fire risk request: coordinate out of range");
            return Err(e.into());
        }

        let started = Instant::now();
        let deadline = started + self.budgets.global;
        let token = cancel.child_token();
        // Stops any provider still holding the token once we return
        let _cancel_on_exit = token.clone().drop_guard();
        let watchdog = {
            let token = token.clone();
            tokio::spawn(async move {
                tokio::time::sleep_until(deadline).await;
                token.cancel();
            })
        };

        let cell = geo::cell_key(&coord);
        let mut report = ResolutionReport::default();
        let assessment = self
            .walk_tiers(coord, &cell, deadline, &token, &mut report)
            .await;
        watchdog.abort();

        report.elapsed = started.elapsed();
        tracing::info!(
            "Fire risk at {} resolved: {} ({:?}, {:?}) in {:?}",
            coord.redacted(),
            assessment.level().description(),
            assessment.source(),
            assessment.freshness(),
            report.elapsed
        );

        Ok(Resolution { assessment, report })
    }

    async fn walk_tiers(
        &self,
        coord: Coordinate,
        cell: &str,
        deadline: Instant,
        token: &CancellationToken,
        report: &mut ResolutionReport,
    ) -> RiskAssessment {
        // Tier 1: primary, regardless of geography
        let budget = self.budgets.primary;
        if let Some(assessment) = self
            .provider_tier(Tier::Primary, &self.primary, coord, budget, deadline, token, report)
            .await
        {
            self.write_through(cell, &assessment);
            return assessment;
        }

        // Tier 2: regional, only inside its polygon
        if geo::is_in_region(&coord) {
            let budget = self.budgets.regional;
            if let Some(assessment) = self
                .provider_tier(
                    Tier::Regional,
                    &self.regional,
                    coord,
                    budget,
                    deadline,
                    token,
                    report,
                )
                .await
            {
                self.write_through(cell, &assessment);
                return assessment;
            }
        } else {
            report.record(Tier::Regional, TierOutcome::Skipped("outside region"), Duration::ZERO);
        }

        // Tier 3: cache
        if let Some(assessment) = self.cache_tier(cell, deadline, token, report).await {
            return assessment;
        }

        // Tier 4: mock, unconditionally
        let tier_start = Instant::now();
        let assessment = mock::assess(&coord);
        report.record(Tier::Mock, TierOutcome::Hit, tier_start.elapsed());
        assessment
    }

    async fn provider_tier<Q: RiskProvider>(
        &self,
        tier: Tier,
        provider: &Q,
        coord: Coordinate,
        budget: Duration,
        deadline: Instant,
        token: &CancellationToken,
        report: &mut ResolutionReport,
    ) -> Option<RiskAssessment> {
        if out_of_time(deadline, token) {
            report.record(tier, TierOutcome::Skipped("deadline exhausted"), Duration::ZERO);
            return None;
        }

        tracing::debug!("Querying {} provider ({})", tier, provider.name());
        let tier_start = Instant::now();
        let result = run_tier(budget, deadline, token, provider.fetch_risk(coord, token)).await;
        let elapsed = tier_start.elapsed();

        match result {
            Ok(assessment) => {
                report.record(tier, TierOutcome::Hit, elapsed);
                Some(assessment)
            }
            Err(e) => {
                report.record(tier, TierOutcome::Failed(e), elapsed);
                None
            }
        }
    }

    async fn cache_tier(
        &self,
        cell: &str,
        deadline: Instant,
        token: &CancellationToken,
        report: &mut ResolutionReport,
    ) -> Option<RiskAssessment> {
        if out_of_time(deadline, token) {
            report.record(Tier::Cache, TierOutcome::Skipped("deadline exhausted"), Duration::ZERO);
            return None;
        }

        let cache = Arc::clone(&self.cache);
        let key = cell.to_string();
        let lookup = async move {
            tokio::task::spawn_blocking(move || cache.get(&key))
                .await
                .map_err(|e| {
                    RiskError::PersistenceCorruption(format!("cache lookup aborted: {}", e))
                })
        };

        let tier_start = Instant::now();
        let result = run_tier(self.budgets.cache, deadline, token, lookup).await;
        let elapsed = tier_start.elapsed();

        match result {
            Ok(Some(assessment)) => {
                report.record(Tier::Cache, TierOutcome::Hit, elapsed);
                Some(assessment)
            }
            Ok(None) => {
                report.record(Tier::Cache, TierOutcome::Miss, elapsed);
                None
            }
            Err(e) => {
                report.record(Tier::Cache, TierOutcome::Failed(e), elapsed);
                None
            }
        }
    }

    /// Store a live result without delaying the response.
    fn write_through(&self, cell: &str, assessment: &RiskAssessment) {
        let cache = Arc::clone(&self.cache);
        let key = cell.to_string();
        let assessment = assessment.clone();
        tokio::task::spawn_blocking(move || {
            if let Err(e) = cache.put(&key, assessment) {
                tracing::warn!("Failed to cache risk for cell {}: {}", key, e);
            }
        });
    }
}

fn out_of_time(deadline: Instant, token: &CancellationToken) -> bool {
    token.is_cancelled() || Instant::now() >= deadline
}

/// Run one tier's future under `min(budget, time left before deadline)`, abandoning it
/// early if the token is cancelled.
async fn run_tier<T, F>(
    budget: Duration,
    deadline: Instant,
    token: &CancellationToken,
    fut: F,
) -> Result<T, RiskError>
where
    F: Future<Output = Result<T, RiskError>>,
{
    let tier_deadline = (Instant::now() + budget).min(deadline);

    tokio::select! {
        biased;
        _ = token.cancelled() => Err(RiskError::Timeout),
        result = tokio::time::timeout_at(tier_deadline, fut) => {
            result.unwrap_or(Err(RiskError::Timeout))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;
    use crate::types::{Freshness, RiskSource};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Provider that always fails with `NoCoverage` and counts calls.
    #[derive(Default)]
    struct Empty {
        calls: AtomicUsize,
    }

    impl RiskProvider for Empty {
        fn name(&self) -> &'static str {
            "empty"
        }

        async fn fetch_risk(
            &self,
            _coord: Coordinate,
            _cancel: &CancellationToken,
        ) -> Result<RiskAssessment, RiskError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(RiskError::NoCoverage)
        }
    }

    fn service() -> FireRiskService<Empty, Empty> {
        let cache = Arc::new(SpatialCache::open(Arc::new(SqliteStore::in_memory().unwrap())));
        FireRiskService::new(Empty::default(), Empty::default(), cache)
    }

    #[tokio::test]
    async fn test_rejects_out_of_range_without_calling_providers() {
        let service = service();
        for (lat, lon) in [(91.0, 0.0), (0.0, 181.0), (f64::NAN, 0.0), (-90.5, -180.5)] {
            let coord = Coordinate {
                latitude: lat,
                longitude: lon,
            };
            let result = service.get_current(coord).await;
            assert!(matches!(result, Err(RiskError::Validation(_))));
        }
        assert_eq!(service.primary.calls.load(Ordering::SeqCst), 0);
        assert_eq!(service.regional.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_regional_skipped_outside_region() {
        let service = service();
        let paris = Coordinate::new(48.86, 2.35).unwrap();

        let resolution = service.get_current_detailed(paris).await.unwrap();

        assert_eq!(service.primary.calls.load(Ordering::SeqCst), 1);
        assert_eq!(service.regional.calls.load(Ordering::SeqCst), 0);
        assert!(!resolution.report.was_attempted(Tier::Regional));
        assert_eq!(resolution.assessment.source(), RiskSource::Mock);
    }

    #[tokio::test]
    async fn test_regional_attempted_inside_region() {
        let service = service();
        let edinburgh = Coordinate::new(55.95, -3.19).unwrap();

        let resolution = service.get_current_detailed(edinburgh).await.unwrap();

        assert_eq!(service.regional.calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            resolution.report.attempted(),
            vec![Tier::Primary, Tier::Regional, Tier::Cache, Tier::Mock]
        );
        assert!(matches!(
            resolution.report.last_error(),
            Some(RiskError::NoCoverage)
        ));
    }

    #[tokio::test]
    async fn test_mock_result_is_stable() {
        let service = service();
        let coord = Coordinate::new(-33.87, 151.21).unwrap();

        let a = service.get_current(coord).await.unwrap();
        let b = service.get_current(coord).await.unwrap();

        assert_eq!(a.level(), b.level());
        assert_eq!(a.freshness(), Freshness::Mock);
    }

    #[tokio::test]
    async fn test_cancelled_token_still_answers() {
        let service = service();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let resolution = service
            .get_current_with_cancel(Coordinate::new(55.95, -3.19).unwrap(), &cancel)
            .await
            .unwrap();

        assert_eq!(resolution.assessment.source(), RiskSource::Mock);
        assert_eq!(service.primary.calls.load(Ordering::SeqCst), 0);
        assert_eq!(resolution.report.attempted(), vec![Tier::Mock]);
    }

    #[test]
    fn test_default_budgets_fit_global_deadline() {
        let b = TierBudgets::default();
        assert!(b.primary + b.regional + b.cache < b.global);
    }
}
