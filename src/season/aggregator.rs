//! Seasonal aggregation.
//!
//! Fetches a season's schedule, fans out one results fetch per round
//! through a bounded pool, and merges every round into per-driver
//! season-long record sequences.
//!
//! The merge map is owned by the loop draining the pool: fetch futures
//! only produce rows, and rows are merged one round at a time as they
//! complete, so the map never has more than one writer.

use crate::config::AggregationConfig;
use crate::error::{GatewayError, GatewayResult, PartialAggregationError, RoundFailure};
use crate::models::{DriverSeasonEntry, RoundResult, SeasonReport};
use crate::season::assembler::{assemble, AssemblyOptions};
use crate::season::{cancellable, RoundSource};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// When a season scan with failed rounds still produces a report.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Fail only if more rounds failed than contributed results.
    #[default]
    Majority,
    /// Fail only if every scheduled round failed.
    AllFailed,
    /// Any failed round fails the whole scan.
    Strict,
}

impl FailurePolicy {
    /// Whether `failed` round failures are acceptable for a season of
    /// `scheduled` rounds where `contributing` rounds produced results.
    pub fn tolerates(&self, scheduled: usize, contributing: usize, failed: usize) -> bool {
        match self {
            FailurePolicy::Majority => failed <= contributing,
            FailurePolicy::AllFailed => failed < scheduled,
            FailurePolicy::Strict => failed == 0,
        }
    }
}

/// Tunables for one aggregator.
#[derive(Debug, Clone)]
pub struct AggregationSettings {
    /// Ceiling on concurrent round fetches.
    pub concurrency: usize,
    pub failure_policy: FailurePolicy,
    /// Sort each driver's records by round before reporting.
    pub sort_records: bool,
}

impl Default for AggregationSettings {
    fn default() -> Self {
        Self::from(&AggregationConfig::default())
    }
}

impl From<&AggregationConfig> for AggregationSettings {
    fn from(config: &AggregationConfig) -> Self {
        Self {
            concurrency: config.concurrency,
            failure_policy: config.failure_policy,
            sort_records: config.sort_records,
        }
    }
}

/// One seasonal query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeasonQuery {
    pub season: String,
    /// Keep only the best `top` drivers by points; zero or `None` keeps all.
    pub top: Option<usize>,
}

impl SeasonQuery {
    pub fn new(season: impl Into<String>) -> Self {
        Self {
            season: season.into(),
            top: None,
        }
    }
}

/// A complete season report, plus the rounds that could not be fetched.
#[derive(Debug, Clone)]
pub struct AggregateOutcome {
    pub report: SeasonReport,
    pub degraded: Option<PartialAggregationError>,
}

/// Per-driver accumulator for one aggregation run.
#[derive(Debug, Default)]
pub struct SeasonMerge {
    entries: HashMap<String, DriverSeasonEntry>,
}

impl SeasonMerge {
    /// Merge one round's rows. The first sighting of a driver fixes its
    /// snapshot; every sighting appends one record.
    pub fn absorb(&mut self, round: &str, rows: Vec<RoundResult>) {
        for RoundResult { driver, mut record } in rows {
            record.round = round.to_string();
            let entry = self
                .entries
                .entry(driver.id.clone())
                .or_insert_with(|| DriverSeasonEntry {
                    driver,
                    records: Vec::new(),
                });

            if entry.records.iter().any(|r| r.round == record.round) {
                warn!(
                    "Duplicate result for {} in round {}, keeping the first",
                    entry.driver.id, round
                );
                continue;
            }
            entry.records.push(record);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_entries(self) -> HashMap<String, DriverSeasonEntry> {
        self.entries
    }
}

/// Drives the scatter/gather over a season's rounds.
pub struct SeasonAggregator {
    source: Arc<dyn RoundSource>,
    settings: AggregationSettings,
}

impl SeasonAggregator {
    pub fn new(source: Arc<dyn RoundSource>, settings: AggregationSettings) -> Self {
        Self { source, settings }
    }

    /// Aggregate every round of `query.season` into a season report.
    ///
    /// Fails immediately if the schedule cannot be fetched. Round failures
    /// are collected and reported through [`AggregateOutcome::degraded`]
    /// unless the configured [`FailurePolicy`] rejects them. Cancelling
    /// `cancel` drops every in-flight fetch and discards merged state.
    pub async fn aggregate(
        &self,
        query: &SeasonQuery,
        cancel: &CancellationToken,
    ) -> GatewayResult<AggregateOutcome> {
        let season = query.season.trim();
        if season.is_empty() {
            return Err(GatewayError::InvalidRequest(
                "season must not be empty".to_string(),
            ));
        }

        let schedule = cancellable(cancel, self.source.schedule(season)).await?;
        if schedule.is_empty() {
            return Err(GatewayError::NotFound {
                what: "schedule".to_string(),
            });
        }

        let scheduled = schedule.len();
        let workers = self.settings.concurrency.clamp(1, scheduled);
        info!(
            "Aggregating season {}: {} rounds, {} concurrent fetches",
            season, scheduled, workers
        );

        let source = self.source.as_ref();
        let mut fetches = stream::iter(schedule.iter())
            .map(|round| async move {
                debug!("Fetching results for round {}", round.round);
                let outcome = source.results(season, &round.round).await;
                (round.round.as_str(), outcome)
            })
            .buffer_unordered(workers);

        let mut merge = SeasonMerge::default();
        let mut failures: Vec<RoundFailure> = Vec::new();
        let mut contributing = 0;

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    warn!("Season {} aggregation cancelled", season);
                    return Err(GatewayError::Cancelled);
                }
                next = fetches.next() => next,
            };
            let Some((round, outcome)) = next else {
                break;
            };

            match outcome {
                Ok(rows) if rows.is_empty() => {
                    debug!("Round {} has no results", round);
                }
                Ok(rows) => {
                    debug!("Merging {} results from round {}", rows.len(), round);
                    contributing += 1;
                    merge.absorb(round, rows);
                }
                Err(GatewayError::Cancelled) => return Err(GatewayError::Cancelled),
                Err(error) => {
                    warn!("Round {} failed: {}", round, error);
                    failures.push(RoundFailure {
                        round: round.to_string(),
                        error,
                    });
                    if self.settings.failure_policy == FailurePolicy::Strict {
                        return Err(GatewayError::TooManyRoundFailures {
                            scheduled,
                            failures,
                        });
                    }
                }
            }
        }

        if !self
            .settings
            .failure_policy
            .tolerates(scheduled, contributing, failures.len())
        {
            return Err(GatewayError::TooManyRoundFailures {
                scheduled,
                failures,
            });
        }

        if merge.is_empty() {
            info!("Season {} has no results yet", season);
        }
        info!(
            "Season {}: {} drivers from {} rounds ({} failed)",
            season,
            merge.len(),
            contributing,
            failures.len()
        );

        let report = assemble(
            season,
            merge,
            &AssemblyOptions {
                sort_records: self.settings.sort_records,
                top: query.top,
            },
        );

        Ok(AggregateOutcome {
            report,
            degraded: (!failures.is_empty()).then(|| PartialAggregationError { failures }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Driver, Record, Round};
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// What a scripted round does when fetched.
    #[derive(Clone)]
    enum Script {
        Rows(Vec<(&'static str, f64)>),
        Fail(GatewayError),
        Hang,
    }

    struct ScriptedSource {
        schedule: GatewayResult<Vec<Round>>,
        rounds: HashMap<String, Script>,
        max_latency_ms: u64,
        result_calls: AtomicUsize,
        in_flight: AtomicUsize,
        peak_in_flight: AtomicUsize,
    }

    impl ScriptedSource {
        fn new(rounds: Vec<(&str, Script)>) -> Self {
            Self {
                schedule: Ok(rounds.iter().map(|(id, _)| Round::numbered(id)).collect()),
                rounds: rounds
                    .into_iter()
                    .map(|(id, script)| (id.to_string(), script))
                    .collect(),
                max_latency_ms: 0,
                result_calls: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                peak_in_flight: AtomicUsize::new(0),
            }
        }

        fn with_latency(mut self, max_ms: u64) -> Self {
            self.max_latency_ms = max_ms;
            self
        }
    }

    fn driver(id: &str) -> Driver {
        Driver {
            id: id.to_string(),
            number: None,
            code: None,
            given_name: id.to_uppercase(),
            family_name: String::new(),
            date_of_birth: String::new(),
            nationality: String::new(),
            url: String::new(),
        }
    }

    fn row(round: &str, id: &str, points: f64) -> RoundResult {
        RoundResult {
            driver: driver(id),
            record: Record {
                round: round.to_string(),
                position: "1".to_string(),
                points,
                status: "Finished".to_string(),
                constructor: None,
            },
        }
    }

    fn transport_error(round: &str) -> GatewayError {
        GatewayError::Transport {
            path: format!("2021/{}/results.json", round),
            detail: "connection reset".to_string(),
        }
    }

    #[async_trait]
    impl RoundSource for ScriptedSource {
        async fn schedule(&self, _season: &str) -> GatewayResult<Vec<Round>> {
            self.schedule.clone()
        }

        async fn results(&self, _season: &str, round: &str) -> GatewayResult<Vec<RoundResult>> {
            self.result_calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak_in_flight.fetch_max(now, Ordering::SeqCst);

            if self.max_latency_ms > 0 {
                let delay = fastrand::u64(0..=self.max_latency_ms);
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }

            let script = self.rounds.get(round).cloned().unwrap_or(Script::Rows(vec![]));
            let outcome = match script {
                Script::Rows(rows) => Ok(rows
                    .into_iter()
                    .map(|(id, points)| row(round, id, points))
                    .collect()),
                Script::Fail(error) => Err(error),
                Script::Hang => std::future::pending().await,
            };
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            outcome
        }
    }

    fn aggregator(source: Arc<ScriptedSource>, settings: AggregationSettings) -> SeasonAggregator {
        SeasonAggregator::new(source, settings)
    }

    fn points_of(report: &SeasonReport, id: &str) -> Vec<f64> {
        report
            .entry(id)
            .map(|e| e.records.iter().map(|r| r.points).collect())
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn test_flaky_round_degrades_instead_of_failing() {
        let source = Arc::new(ScriptedSource::new(vec![
            ("1", Script::Rows(vec![("ham", 25.0)])),
            ("2", Script::Rows(vec![("ham", 18.0), ("ver", 25.0)])),
            ("3", Script::Fail(transport_error("3"))),
        ]));

        let outcome = aggregator(source, AggregationSettings::default())
            .aggregate(&SeasonQuery::new("2021"), &CancellationToken::new())
            .await
            .unwrap();

        let degraded = outcome.degraded.expect("round 3 should be reported");
        assert_eq!(degraded.rounds(), vec!["3"]);
        assert!(matches!(
            degraded.failures[0].error,
            GatewayError::Transport { .. }
        ));

        let report = outcome.report;
        assert_eq!(report.season, "2021");
        assert_eq!(report.drivers.len(), 2);
        assert_eq!(points_of(&report, "ham"), vec![25.0, 18.0]);
        assert_eq!(points_of(&report, "ver"), vec![25.0]);
    }

    #[tokio::test]
    async fn test_empty_schedule_fails_before_round_fetches() {
        let mut source = ScriptedSource::new(vec![]);
        source.schedule = Ok(vec![]);
        let source = Arc::new(source);

        let err = aggregator(source.clone(), AggregationSettings::default())
            .aggregate(&SeasonQuery::new("1900"), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, GatewayError::NotFound { .. }));
        assert_eq!(source.result_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_schedule_error_propagates_unchanged() {
        let mut source = ScriptedSource::new(vec![("1", Script::Rows(vec![("ham", 25.0)]))]);
        let status = GatewayError::UpstreamStatus {
            path: "2021.json".to_string(),
            status: 502,
        };
        source.schedule = Err(status.clone());
        let source = Arc::new(source);

        let err = aggregator(source.clone(), AggregationSettings::default())
            .aggregate(&SeasonQuery::new("2021"), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err, status);
        assert_eq!(source.result_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_round_is_neither_error_nor_entry() {
        let source = Arc::new(ScriptedSource::new(vec![
            ("1", Script::Rows(vec![("ham", 25.0)])),
            ("2", Script::Rows(vec![])),
        ]));

        let outcome = aggregator(source, AggregationSettings::default())
            .aggregate(&SeasonQuery::new("2021"), &CancellationToken::new())
            .await
            .unwrap();

        assert!(outcome.degraded.is_none());
        assert_eq!(outcome.report.drivers.len(), 1);
        assert_eq!(points_of(&outcome.report, "ham"), vec![25.0]);
    }

    #[tokio::test]
    async fn test_majority_policy_rejects_mostly_failed_season() {
        let source = Arc::new(ScriptedSource::new(vec![
            ("1", Script::Rows(vec![("ham", 25.0)])),
            ("2", Script::Fail(transport_error("2"))),
            ("3", Script::Fail(transport_error("3"))),
        ]));

        let err = aggregator(source, AggregationSettings::default())
            .aggregate(&SeasonQuery::new("2021"), &CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            GatewayError::TooManyRoundFailures {
                scheduled,
                failures,
            } => {
                assert_eq!(scheduled, 3);
                let rounds: HashSet<_> = failures.iter().map(|f| f.round.as_str()).collect();
                assert_eq!(rounds, HashSet::from(["2", "3"]));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_all_failed_policy_tolerates_majority_failure() {
        let source = Arc::new(ScriptedSource::new(vec![
            ("1", Script::Rows(vec![("ham", 25.0)])),
            ("2", Script::Fail(transport_error("2"))),
            ("3", Script::Fail(transport_error("3"))),
        ]));
        let settings = AggregationSettings {
            failure_policy: FailurePolicy::AllFailed,
            ..AggregationSettings::default()
        };

        let outcome = aggregator(source, settings)
            .aggregate(&SeasonQuery::new("2021"), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome.degraded.map(|d| d.failures.len()), Some(2));
        assert_eq!(outcome.report.drivers.len(), 1);
    }

    #[tokio::test]
    async fn test_strict_policy_fails_on_first_round_error() {
        let source = Arc::new(ScriptedSource::new(vec![
            ("1", Script::Rows(vec![("ham", 25.0)])),
            ("2", Script::Fail(transport_error("2"))),
        ]));
        let settings = AggregationSettings {
            failure_policy: FailurePolicy::Strict,
            ..AggregationSettings::default()
        };

        let err = aggregator(source, settings)
            .aggregate(&SeasonQuery::new("2021"), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::TooManyRoundFailures { .. }));
    }

    #[test]
    fn test_policy_thresholds() {
        assert!(FailurePolicy::Majority.tolerates(3, 2, 1));
        assert!(FailurePolicy::Majority.tolerates(2, 1, 1));
        assert!(!FailurePolicy::Majority.tolerates(3, 1, 2));
        assert!(FailurePolicy::Majority.tolerates(4, 0, 0));
        assert!(FailurePolicy::AllFailed.tolerates(3, 0, 2));
        assert!(!FailurePolicy::AllFailed.tolerates(3, 0, 3));
        assert!(FailurePolicy::Strict.tolerates(3, 3, 0));
        assert!(!FailurePolicy::Strict.tolerates(3, 2, 1));
    }

    #[tokio::test]
    async fn test_cancellation_mid_flight_returns_no_report() {
        let source = Arc::new(ScriptedSource::new(vec![
            ("1", Script::Rows(vec![("ham", 25.0)])),
            ("2", Script::Hang),
            ("3", Script::Hang),
        ]));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let watched = source.clone();
        tokio::spawn(async move {
            while watched.in_flight.load(Ordering::SeqCst) != 2 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            trigger.cancel();
        });

        let outcome = tokio::time::timeout(
            Duration::from_secs(5),
            aggregator(source.clone(), AggregationSettings::default())
                .aggregate(&SeasonQuery::new("2021"), &cancel),
        )
        .await
        .expect("aggregation must not hang after cancellation");

        assert_eq!(outcome.unwrap_err(), GatewayError::Cancelled);
        assert_eq!(source.result_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_already_cancelled_skips_schedule() {
        let source = Arc::new(ScriptedSource::new(vec![(
            "1",
            Script::Rows(vec![("ham", 25.0)]),
        )]));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = aggregator(source.clone(), AggregationSettings::default())
            .aggregate(&SeasonQuery::new("2021"), &cancel)
            .await
            .unwrap_err();
        assert_eq!(err, GatewayError::Cancelled);
        assert_eq!(source.result_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_pool_is_bounded() {
        let rounds: Vec<(String, Script)> = (1..=20)
            .map(|i| (i.to_string(), Script::Rows(vec![("ham", 1.0)])))
            .collect();
        let source = Arc::new(
            ScriptedSource::new(rounds.iter().map(|(id, s)| (id.as_str(), s.clone())).collect())
                .with_latency(5),
        );
        let settings = AggregationSettings {
            concurrency: 3,
            ..AggregationSettings::default()
        };

        let outcome = aggregator(source.clone(), settings)
            .aggregate(&SeasonQuery::new("2021"), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(points_of(&outcome.report, "ham").len(), 20);
        assert!(source.peak_in_flight.load(Ordering::SeqCst) <= 3);
        assert_eq!(source.result_calls.load(Ordering::SeqCst), 20);
    }

    #[tokio::test]
    async fn test_records_sorted_by_round_despite_completion_order() {
        let rounds: Vec<(String, Script)> = (1..=12)
            .map(|i| (i.to_string(), Script::Rows(vec![("ham", i as f64)])))
            .collect();
        let source = Arc::new(
            ScriptedSource::new(rounds.iter().map(|(id, s)| (id.as_str(), s.clone())).collect())
                .with_latency(10),
        );

        let outcome = aggregator(source, AggregationSettings::default())
            .aggregate(&SeasonQuery::new("2021"), &CancellationToken::new())
            .await
            .unwrap();

        let order: Vec<_> = outcome.report.drivers[0]
            .records
            .iter()
            .map(|r| r.round.clone())
            .collect();
        let expected: Vec<_> = (1..=12).map(|i| i.to_string()).collect();
        assert_eq!(order, expected);
    }

    /// Many rounds sharing a driver pool, random latency, several pool sizes.
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_stress_no_drops_or_duplicates() {
        const DRIVERS: [&str; 8] = ["ham", "ver", "bot", "per", "nor", "lec", "sai", "ric"];
        const ROUNDS: usize = 60;

        let mut expected: HashMap<&str, usize> = HashMap::new();
        let mut rounds = Vec::new();
        for i in 1..=ROUNDS {
            // Each round features a rotating subset of the shared pool.
            let present: Vec<(&'static str, f64)> = DRIVERS
                .iter()
                .enumerate()
                .filter(|(d, _)| (i + d) % 3 != 0)
                .map(|(_, id)| (*id, (i % 26) as f64))
                .collect();
            for (id, _) in &present {
                *expected.entry(*id).or_default() += 1;
            }
            rounds.push((i.to_string(), Script::Rows(present)));
        }

        let mut first: Option<SeasonReport> = None;
        for concurrency in [1, 4, 8, 16, 64] {
            for _ in 0..3 {
                let source = Arc::new(
                    ScriptedSource::new(
                        rounds.iter().map(|(id, s)| (id.as_str(), s.clone())).collect(),
                    )
                    .with_latency(3),
                );
                let settings = AggregationSettings {
                    concurrency,
                    ..AggregationSettings::default()
                };

                let outcome = aggregator(source, settings)
                    .aggregate(&SeasonQuery::new("2021"), &CancellationToken::new())
                    .await
                    .unwrap();
                assert!(outcome.degraded.is_none());

                let report = outcome.report;
                assert_eq!(report.drivers.len(), expected.len());
                for entry in &report.drivers {
                    assert!(!entry.driver.id.is_empty());
                    assert_eq!(entry.driver.given_name, entry.driver.id.to_uppercase());
                    let distinct: HashSet<_> = entry.records.iter().map(|r| &r.round).collect();
                    assert_eq!(distinct.len(), entry.records.len());
                    assert_eq!(entry.records.len(), expected[entry.driver.id.as_str()]);
                }

                match &first {
                    Some(previous) => assert_eq!(previous, &report),
                    None => first = Some(report),
                }
            }
        }
    }

    #[test]
    fn test_merge_keeps_first_snapshot_and_skips_duplicates() {
        let mut merge = SeasonMerge::default();
        merge.absorb("1", vec![row("1", "ham", 25.0)]);

        let mut renamed = row("2", "ham", 18.0);
        renamed.driver.given_name = "Someone Else".to_string();
        merge.absorb("2", vec![renamed, row("2", "ham", 99.0)]);

        let entries = merge.into_entries();
        let ham = &entries["ham"];
        assert_eq!(ham.driver.given_name, "HAM");
        assert_eq!(
            ham.records.iter().map(|r| r.points).collect::<Vec<_>>(),
            vec![25.0, 18.0]
        );
    }
}
