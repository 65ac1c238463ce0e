//! The update cycle: fetch every configured stop, compute ETAs, publish.
//!
//! One pass handles bus stops, then aggregate groups, then rail stops, each in
//! registry order and one at a time. A failure for one stop is logged and the
//! pass moves on. Between passes the cycle sleeps a constant interval.

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDateTime, Utc};
use chrono_tz::Tz;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::error::FetchError;
use crate::eta::{NO_PREDICTION, aggregate_min, first_eta};
use crate::publish::Publish;
use crate::registry::{AggregateGroup, Mode, StopRegistry, StopSpec};
use crate::tracker::PredictionSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    Running,
}

/// Outcome counts for one pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PassSummary {
    pub published: usize,
    /// Aggregates with no member prediction.
    pub skipped: usize,
    pub fetch_failed: usize,
    pub publish_failed: usize,
}

pub struct UpdateCycle {
    registry: StopRegistry,
    bus: Arc<dyn PredictionSource>,
    rail: Arc<dyn PredictionSource>,
    publisher: Arc<dyn Publish>,
    interval: Duration,
    timezone: Tz,
    state: CycleState,
}

impl UpdateCycle {
    pub fn new(
        registry: StopRegistry,
        bus: Arc<dyn PredictionSource>,
        rail: Arc<dyn PredictionSource>,
        publisher: Arc<dyn Publish>,
        interval: Duration,
        timezone: Tz,
    ) -> Self {
        Self {
            registry,
            bus,
            rail,
            publisher,
            interval,
            timezone,
            state: CycleState::Idle,
        }
    }

    pub fn state(&self) -> CycleState {
        self.state
    }

    /// Current wall-clock time in the agency's zone.
    pub fn local_now(&self) -> NaiveDateTime {
        Utc::now().with_timezone(&self.timezone).naive_local()
    }

    /// Runs passes until `cycles` have completed; `0` runs forever.
    pub async fn run(&mut self, cycles: usize) {
        let mut count = 0;

        loop {
            if cycles > 0 && count >= cycles {
                break;
            }
            count += 1;

            self.state = CycleState::Running;
            let now = self.local_now();
            let summary = self
                .run_pass(now)
                .instrument(info_span!("update_cycle", cycle = count))
                .await;
            self.state = CycleState::Idle;

            info!(
                cycle = count,
                published = summary.published,
                skipped = summary.skipped,
                fetch_failed = summary.fetch_failed,
                publish_failed = summary.publish_failed,
                "Update cycle complete"
            );

            if cycles == 0 || count < cycles {
                tokio::time::sleep(self.interval).await;
            }
        }
    }

    /// One full pass with `now` as the reference time for every ETA.
    pub async fn run_pass(&self, now: NaiveDateTime) -> PassSummary {
        let mut summary = PassSummary::default();

        for spec in self.registry.bus_stops() {
            self.update_stop(spec, now, &mut summary).await;
        }
        for group in self.registry.aggregates() {
            self.update_aggregate(group, now, &mut summary).await;
        }
        for spec in self.registry.rail_stops() {
            self.update_stop(spec, now, &mut summary).await;
        }

        summary
    }

    fn source(&self, mode: Mode) -> &dyn PredictionSource {
        match mode {
            Mode::Bus => self.bus.as_ref(),
            Mode::Rail => self.rail.as_ref(),
        }
    }

    async fn stop_eta(&self, spec: &StopSpec, now: NaiveDateTime) -> Result<i64, FetchError> {
        let source = self.source(spec.mode);
        let batch = source.try_fetch(&spec.stop_id, spec.route.as_deref()).await?;
        Ok(first_eta(&source.compute_etas(&batch, now)))
    }

    async fn update_stop(&self, spec: &StopSpec, now: NaiveDateTime, summary: &mut PassSummary) {
        match self.stop_eta(spec, now).await {
            Ok(eta) => self.send(&spec.topic, eta, summary),
            Err(e) => {
                warn!(
                    stop_id = %spec.stop_id,
                    route = ?spec.route,
                    topic = %spec.topic,
                    error = %e,
                    "Fetch failed, skipping stop"
                );
                summary.fetch_failed += 1;
            }
        }
    }

    async fn update_aggregate(
        &self,
        group: &AggregateGroup,
        now: NaiveDateTime,
        summary: &mut PassSummary,
    ) {
        let mut firsts = Vec::with_capacity(group.members.len());
        for member in &group.members {
            match self.stop_eta(member, now).await {
                Ok(eta) => firsts.push(eta),
                Err(e) => {
                    warn!(
                        group = %group.name,
                        stop_id = %member.stop_id,
                        route = ?member.route,
                        error = %e,
                        "Aggregate member fetch failed"
                    );
                    summary.fetch_failed += 1;
                    firsts.push(NO_PREDICTION);
                }
            }
        }

        match aggregate_min(&firsts) {
            Some(eta) => self.send(&group.topic, eta, summary),
            None => {
                debug!(group = %group.name, topic = %group.topic, "No member predictions, skipping aggregate");
                summary.skipped += 1;
            }
        }
    }

    fn send(&self, topic: &str, eta: i64, summary: &mut PassSummary) {
        match self.publisher.publish_eta(topic, eta) {
            Ok(()) => {
                debug!(topic, eta, "Published");
                summary.published += 1;
            }
            Err(e) => {
                warn!(topic, eta, error = %e, "Publish failed, value dropped");
                summary.publish_failed += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PublishError;
    use crate::parser::PredictionBatch;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use reqwest::StatusCode;
    use std::collections::HashMap;
    use std::sync::Mutex;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 12)
            .unwrap()
            .and_hms_opt(14, 0, 0)
            .unwrap()
    }

    /// Answers from a fixed table; stops not in the table fail with a 503.
    struct Scripted {
        mode: Mode,
        answers: HashMap<(String, Option<String>), Vec<String>>,
    }

    impl Scripted {
        fn new(mode: Mode, answers: Vec<(&str, Option<&str>, Vec<&str>)>) -> Arc<Self> {
            let answers = answers
                .into_iter()
                .map(|(stop, route, arrivals)| {
                    (
                        (stop.to_string(), route.map(str::to_string)),
                        arrivals.iter().map(|a| a.to_string()).collect(),
                    )
                })
                .collect();
            Arc::new(Self { mode, answers })
        }
    }

    #[async_trait]
    impl PredictionSource for Scripted {
        fn mode(&self) -> Mode {
            self.mode
        }

        async fn try_fetch(
            &self,
            stop_id: &str,
            route: Option<&str>,
        ) -> Result<PredictionBatch, FetchError> {
            let key = (stop_id.to_string(), route.map(str::to_string));
            match self.answers.get(&key) {
                Some(arrivals) => Ok(PredictionBatch {
                    mode: self.mode,
                    arrivals: arrivals.clone(),
                }),
                None => Err(FetchError::Status(StatusCode::SERVICE_UNAVAILABLE)),
            }
        }
    }

    #[derive(Default)]
    struct Recorder {
        sent: Mutex<Vec<(String, String)>>,
        reject: Option<String>,
    }

    impl Publish for Recorder {
        fn publish(&self, topic: &str, payload: &str) -> Result<(), PublishError> {
            if self.reject.as_deref() == Some(topic) {
                return Err(PublishError::NotConnected);
            }
            self.sent
                .lock()
                .unwrap()
                .push((topic.to_string(), payload.to_string()));
            Ok(())
        }
    }

    impl Recorder {
        fn sent(&self) -> Vec<(String, String)> {
            self.sent.lock().unwrap().clone()
        }
    }

    fn cycle(
        registry: StopRegistry,
        bus: Arc<Scripted>,
        rail: Arc<Scripted>,
        publisher: Arc<Recorder>,
    ) -> UpdateCycle {
        UpdateCycle::new(
            registry,
            bus,
            rail,
            publisher,
            Duration::from_millis(1),
            chrono_tz::America::Chicago,
        )
    }

    fn pair(topic: &str, value: &str) -> (String, String) {
        (topic.to_string(), value.to_string())
    }

    #[tokio::test]
    async fn test_failed_stop_does_not_block_later_stops() {
        let registry = StopRegistry::new(
            vec![StopSpec::bus("1", "A"), StopSpec::bus("2", "B")],
            vec![],
        );
        let bus = Scripted::new(Mode::Bus, vec![("2", Some("B"), vec!["20240312 14:03"])]);
        let rail = Scripted::new(Mode::Rail, vec![]);
        let publisher = Arc::new(Recorder::default());

        let summary = cycle(registry, bus, rail, publisher.clone())
            .run_pass(now())
            .await;

        assert_eq!(publisher.sent(), vec![pair("CTApredictions/BUS/2/B", "180")]);
        assert_eq!(summary.fetch_failed, 1);
        assert_eq!(summary.published, 1);
    }

    #[tokio::test]
    async fn test_empty_prediction_publishes_sentinel() {
        let registry = StopRegistry::new(vec![StopSpec::rail("30016")], vec![]);
        let bus = Scripted::new(Mode::Bus, vec![]);
        let rail = Scripted::new(Mode::Rail, vec![("30016", None, vec![])]);
        let publisher = Arc::new(Recorder::default());

        cycle(registry, bus, rail, publisher.clone())
            .run_pass(now())
            .await;

        assert_eq!(publisher.sent(), vec![pair("CTApredictions/RAIL/30016", "-1")]);
    }

    #[tokio::test]
    async fn test_aggregate_publishes_minimum() {
        let group = AggregateGroup {
            name: "express".to_string(),
            topic: "CTApredictions/BUS/dwtnEXP".to_string(),
            members: vec![
                StopSpec::bus("1056", "X9"),
                StopSpec::bus("1056", "146"),
                StopSpec::bus("1056", "147"),
            ],
        };
        let registry = StopRegistry::new(vec![], vec![group]);
        let bus = Scripted::new(
            Mode::Bus,
            vec![
                ("1056", Some("X9"), vec![]),
                ("1056", Some("146"), vec!["20240312 14:04"]),
                ("1056", Some("147"), vec!["20240312 14:10"]),
            ],
        );
        let rail = Scripted::new(Mode::Rail, vec![]);
        let publisher = Arc::new(Recorder::default());

        cycle(registry, bus, rail, publisher.clone())
            .run_pass(now())
            .await;

        assert_eq!(publisher.sent(), vec![pair("CTApredictions/BUS/dwtnEXP", "240")]);
    }

    #[tokio::test]
    async fn test_aggregate_all_unavailable_is_skipped() {
        let group = AggregateGroup {
            name: "express".to_string(),
            topic: "CTApredictions/BUS/dwtnEXP".to_string(),
            members: vec![StopSpec::bus("1056", "X9"), StopSpec::bus("1056", "146")],
        };
        let registry = StopRegistry::new(vec![], vec![group]);
        // X9 has no predictions, 146 fails outright
        let bus = Scripted::new(Mode::Bus, vec![("1056", Some("X9"), vec![])]);
        let rail = Scripted::new(Mode::Rail, vec![]);
        let publisher = Arc::new(Recorder::default());

        let summary = cycle(registry, bus, rail, publisher.clone())
            .run_pass(now())
            .await;

        assert!(publisher.sent().is_empty());
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.fetch_failed, 1);
    }

    #[tokio::test]
    async fn test_publish_failure_continues_pass() {
        let registry = StopRegistry::new(
            vec![StopSpec::bus("1", "A"), StopSpec::rail("30016")],
            vec![],
        );
        let bus = Scripted::new(Mode::Bus, vec![("1", Some("A"), vec!["20240312 14:01"])]);
        let rail = Scripted::new(Mode::Rail, vec![("30016", None, vec!["20240312 14:00:45"])]);
        let publisher = Arc::new(Recorder {
            reject: Some("CTApredictions/BUS/1/A".to_string()),
            ..Recorder::default()
        });

        let summary = cycle(registry, bus, rail, publisher.clone())
            .run_pass(now())
            .await;

        assert_eq!(publisher.sent(), vec![pair("CTApredictions/RAIL/30016", "45")]);
        assert_eq!(summary.publish_failed, 1);
    }

    #[tokio::test]
    async fn test_run_bounded_cycles_returns_idle() {
        let registry = StopRegistry::new(vec![StopSpec::rail("30016")], vec![]);
        let bus = Scripted::new(Mode::Bus, vec![]);
        let rail = Scripted::new(Mode::Rail, vec![("30016", None, vec![])]);
        let publisher = Arc::new(Recorder::default());

        let mut update = cycle(registry, bus, rail, publisher.clone());
        update.run(3).await;

        assert_eq!(update.state(), CycleState::Idle);
        assert_eq!(publisher.sent().len(), 3);
    }
}
