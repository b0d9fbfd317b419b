//! Prediction and learning cycles over a history source and a store.
//!
//! A prediction cycle trains every enabled scorer on the history strictly
//! before the target period, persists the snapshot set in one transaction,
//! then fuses whatever the store holds for that period. A learning cycle
//! evaluates the stored snapshots against the actual draw and derives the
//! weight map for the next cycle.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;
use dlt_db::models::{Draw, EvaluationRecord, ScorerSnapshot, WeightRecord};
use dlt_db::rusqlite::Connection;
use dlt_db::{db, store};
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::ensemble::evaluation::evaluate;
use crate::ensemble::weights::{update_weights, WeightMap};
use crate::ensemble::{fuse, FusedRanking};
use crate::error::{PipelineError, Result, ScorerError};
use crate::scorers::{all_scorers, canonical_name, Scorer, ScorerOutput};
use crate::slips::{build_slip, BetSlip, SlipShape};

#[derive(Debug, Clone, PartialEq)]
pub struct Recommendation {
    pub period_id: String,
    pub ranking: FusedRanking,
    pub slips: Vec<(SlipShape, BetSlip)>,
    pub top_k: usize,
}

impl Recommendation {
    pub fn top_front(&self) -> &[(u8, f64)] {
        &self.ranking.front[..self.top_k.min(self.ranking.front.len())]
    }

    pub fn top_back(&self) -> &[(u8, f64)] {
        &self.ranking.back[..self.top_k.min(self.ranking.back.len())]
    }
}

#[derive(Debug)]
pub struct PredictOutcome {
    pub recommendation: Recommendation,
    /// True when the stored snapshot set was already complete.
    pub cached: bool,
    pub ran: Vec<String>,
    pub failures: Vec<(String, ScorerError)>,
}

#[derive(Debug, Clone)]
pub struct LearnOutcome {
    pub period_id: String,
    pub records: Vec<EvaluationRecord>,
    pub previous: WeightMap,
    pub weights: WeightMap,
}

#[derive(Debug)]
pub enum BackfillStep {
    Learned { predicted: bool, outcome: LearnOutcome },
    Skipped { reason: String },
}

#[derive(Debug, Default)]
pub struct BackfillReport {
    pub predicted: usize,
    pub evaluated: usize,
    pub skipped: Vec<(String, String)>,
}

struct ScorerRun {
    name: String,
    version: String,
    params: std::collections::BTreeMap<String, f64>,
    output: ScorerOutput,
}

impl ScorerRun {
    fn into_snapshot(self, period_id: &str) -> ScorerSnapshot {
        ScorerSnapshot {
            scorer_name: self.name,
            scorer_version: self.version,
            period_id: period_id.to_string(),
            created_at: Utc::now(),
            front_scores: self.output.front,
            back_scores: self.output.back,
            confidence: self.output.confidence.clamp(0.0, 1.0),
            params: self.params,
            diagnostics: self.output.diagnostics,
        }
    }
}

/// Trains and runs one scorer on a worker thread, giving up after `budget`.
/// A timed-out worker is left to finish on its own; its result is dropped.
fn run_scorer(mut scorer: Box<dyn Scorer>, history: Arc<Vec<Draw>>, budget: Duration) -> std::result::Result<ScorerRun, ScorerError> {
    let name = scorer.name().to_string();
    let (tx, rx) = mpsc::channel();

    let spawned = thread::Builder::new()
        .name(format!("scorer-{name}"))
        .spawn(move || {
            let outcome = scorer.train(&history).and_then(|()| {
                let output = scorer.predict(&history)?;
                Ok(ScorerRun {
                    name: scorer.name().to_string(),
                    version: scorer.version().to_string(),
                    params: scorer.params(),
                    output,
                })
            });
            let _ = tx.send(outcome);
        });
    if spawned.is_err() {
        return Err(ScorerError::Aborted(name));
    }

    match rx.recv_timeout(budget) {
        Ok(outcome) => outcome,
        Err(RecvTimeoutError::Timeout) => Err(ScorerError::Timeout { scorer: name, budget }),
        Err(RecvTimeoutError::Disconnected) => Err(ScorerError::Aborted(name)),
    }
}

pub struct Pipeline<'a> {
    history: &'a Connection,
    store: &'a Connection,
    config: &'a AppConfig,
    budget: Duration,
}

impl<'a> Pipeline<'a> {
    pub fn new(history: &'a Connection, store: &'a Connection, config: &'a AppConfig) -> Self {
        Self {
            history,
            store,
            config,
            budget: Duration::from_secs(config.scorers.timeout_secs),
        }
    }

    /// Overrides the per-scorer time budget.
    pub fn with_budget(mut self, budget: Duration) -> Self {
        self.budget = budget;
        self
    }

    fn enabled(&self) -> &[String] {
        &self.config.scorers.enabled
    }

    fn checked_weights(&self, record: WeightRecord) -> Result<WeightMap> {
        if let Some(unknown) = record.weights.keys().find(|name| canonical_name(name).is_none()) {
            return Err(PipelineError::Configuration(format!(
                "unknown scorer '{}' in weights learned from {}",
                unknown, record.period_id
            )));
        }
        Ok(WeightMap::from_map(record.weights))
    }

    /// Latest learned weights, or uniform over the enabled scorers.
    pub fn current_weights(&self) -> Result<WeightMap> {
        match store::load_current_weights(self.store)? {
            Some(record) => self.checked_weights(record),
            None => Ok(WeightMap::uniform(self.enabled())),
        }
    }

    pub fn weight_history(&self, limit: u32) -> Result<Vec<WeightRecord>> {
        Ok(store::load_weight_history(self.store, limit)?)
    }

    pub fn predict_period(&self, target: &str, shapes: &[SlipShape], rerun: bool) -> Result<PredictOutcome> {
        self.predict_with(target, shapes, rerun, all_scorers(&self.config.scorers))
    }

    /// Prediction cycle with an explicit scorer set. Scorers that are not
    /// enabled, or whose snapshot already exists (unless `rerun`), are skipped.
    pub fn predict_with(
        &self,
        target: &str,
        shapes: &[SlipShape],
        rerun: bool,
        scorers: Vec<Box<dyn Scorer>>,
    ) -> Result<PredictOutcome> {
        for shape in shapes {
            shape.validate()?;
        }
        let weights = self.current_weights()?;

        let existing = store::snapshot_scorers(self.store, target)?;
        let missing: Vec<&str> = self
            .enabled()
            .iter()
            .map(String::as_str)
            .filter(|name| !existing.iter().any(|e| e.as_str() == *name))
            .collect();

        if !rerun && missing.is_empty() {
            info!(period = target, "complete snapshot set on record, reusing it");
            let recommendation = self.recommend(target, &weights, shapes)?;
            return Ok(PredictOutcome {
                recommendation,
                cached: true,
                ran: Vec::new(),
                failures: Vec::new(),
            });
        }

        let history = db::fetch_history_before(self.history, target)?;
        let need = self.config.scorers.min_history;
        if history.len() < need {
            return Err(PipelineError::InsufficientData {
                period: target.to_string(),
                have: history.len(),
                need,
            });
        }
        let history = Arc::new(history);

        let mut snapshots = Vec::new();
        let mut ran = Vec::new();
        let mut failures = Vec::new();

        for scorer in scorers {
            let name = scorer.name().to_string();
            let wanted = if rerun {
                self.enabled().iter().any(|e| *e == name)
            } else {
                missing.contains(&name.as_str())
            };
            if !wanted {
                continue;
            }

            let started = Instant::now();
            match run_scorer(scorer, Arc::clone(&history), self.budget) {
                Ok(run) => {
                    debug!(scorer = %name, elapsed_ms = started.elapsed().as_millis() as u64, "scorer done");
                    snapshots.push(run.into_snapshot(target));
                    ran.push(name);
                }
                Err(e) => {
                    warn!(scorer = %name, period = target, "{e}");
                    failures.push((name, e));
                }
            }
        }

        if !snapshots.is_empty() {
            let written = store::save_snapshots(self.store, &snapshots, rerun)?;
            info!(period = target, written, history = history.len(), "prediction snapshots persisted");
        }

        let recommendation = self.recommend(target, &weights, shapes)?;
        Ok(PredictOutcome {
            recommendation,
            cached: false,
            ran,
            failures,
        })
    }

    /// Fuses the snapshots the store holds for `target`.
    fn recommend(&self, target: &str, weights: &WeightMap, shapes: &[SlipShape]) -> Result<Recommendation> {
        let enabled = self.enabled();
        let snapshots: Vec<ScorerSnapshot> = store::load_snapshots(self.store, target)?
            .into_iter()
            .filter(|s| enabled.contains(&s.scorer_name))
            .collect();
        if snapshots.is_empty() {
            return Err(PipelineError::MissingSnapshot(target.to_string()));
        }

        let ranking = fuse(weights, &snapshots, target);
        let slips = shapes
            .iter()
            .map(|shape| -> Result<(SlipShape, BetSlip)> { Ok((shape.clone(), build_slip(&ranking, shape)?)) })
            .collect::<Result<Vec<_>>>()?;

        Ok(Recommendation {
            period_id: target.to_string(),
            ranking,
            slips,
            top_k: self.config.recommend.top_k,
        })
    }

    /// Learning cycle for a period whose draw is known.
    pub fn evaluate_and_learn(&self, period: &str) -> Result<LearnOutcome> {
        let actual = db::fetch_draw(self.history, period)?
            .ok_or_else(|| PipelineError::MissingDraw(period.to_string()))?;

        let snapshots = store::load_snapshots(self.store, period)?;
        if snapshots.is_empty() {
            warn!(period, "no snapshots to evaluate; weights unchanged");
            return Err(PipelineError::MissingSnapshot(period.to_string()));
        }

        let records = evaluate(&actual, &snapshots)?;
        store::save_evaluations(self.store, &records)?;

        // Read back what was just persisted, together with the preceding periods.
        let recent = store::load_recent_evaluations(self.store, period, self.config.updater.window)?;

        let previous = match store::load_weights_before(self.store, period)? {
            Some(record) => self.checked_weights(record)?,
            None => WeightMap::uniform(self.enabled()),
        };
        let alpha = self.config.updater.alpha;
        let weights = update_weights(&recent, self.enabled(), &previous, alpha);

        store::save_weights(
            self.store,
            &WeightRecord {
                period_id: period.to_string(),
                weights: weights.as_map().clone(),
                alpha,
                updated_at: Utc::now(),
            },
        )?;
        info!(period, evaluated = records.len(), window = self.config.updater.window, "weights updated");

        Ok(LearnOutcome {
            period_id: period.to_string(),
            records,
            previous,
            weights,
        })
    }

    /// Periods with a known draw in `from..=to`, ascending.
    pub fn backfill_periods(&self, from: &str, to: &str) -> Result<Vec<String>> {
        Ok(db::fetch_draws_between(self.history, from, to)?
            .into_iter()
            .map(|d| d.period_id)
            .collect())
    }

    /// Predicts `period` if needed, then learns from it. Data gaps skip the
    /// period; persistence and configuration failures abort.
    pub fn backfill_step(&self, period: &str, evaluate_only: bool) -> Result<BackfillStep> {
        let mut predicted = false;
        if !evaluate_only {
            match self.predict_period(period, &[], false) {
                Ok(outcome) => predicted = !outcome.cached,
                Err(e @ (PipelineError::InsufficientData { .. } | PipelineError::MissingSnapshot(_))) => {
                    debug!(period, "{e}");
                    return Ok(BackfillStep::Skipped { reason: e.to_string() });
                }
                Err(e) => return Err(e),
            }
        }

        match self.evaluate_and_learn(period) {
            Ok(outcome) => Ok(BackfillStep::Learned { predicted, outcome }),
            Err(e @ PipelineError::MissingSnapshot(_)) => Ok(BackfillStep::Skipped { reason: e.to_string() }),
            Err(e) => Err(e),
        }
    }

    /// Runs `backfill_step` over `from..=to` in ascending order.
    pub fn backfill(&self, from: &str, to: &str, evaluate_only: bool) -> Result<BackfillReport> {
        let mut report = BackfillReport::default();
        for period in self.backfill_periods(from, to)? {
            match self.backfill_step(&period, evaluate_only)? {
                BackfillStep::Learned { predicted, .. } => {
                    if predicted {
                        report.predicted += 1;
                    }
                    report.evaluated += 1;
                }
                BackfillStep::Skipped { reason } => report.skipped.push((period, reason)),
            }
        }
        Ok(report)
    }
}
