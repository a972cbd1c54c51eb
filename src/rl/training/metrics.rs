//! Training Metrics
//!
//! Rolling per-episode histories, exponentially smoothed evaluation
//! reward and the value-overestimation signal.

use std::collections::VecDeque;

use serde::Serialize;

use super::rollout::EpisodeOutcome;
use super::schedule::EpisodeMode;

/// Ratio above which the value estimate is considered too high
pub const OVERESTIMATION_RATIO: f64 = 0.9;

/// Append-only sequence with optional bounded retention
#[derive(Debug, Clone)]
pub struct Sequence<T> {
    values: VecDeque<T>,
    limit: Option<usize>,
}

impl<T: Clone> Sequence<T> {
    /// Create an empty sequence; `limit` bounds retention, dropping the oldest first
    pub fn new(limit: Option<usize>) -> Self {
        Self {
            values: VecDeque::new(),
            limit,
        }
    }

    pub fn push(&mut self, value: T) {
        if let Some(limit) = self.limit {
            if limit == 0 {
                return;
            }
            while self.values.len() >= limit {
                self.values.pop_front();
            }
        }
        self.values.push_back(value);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn last(&self) -> Option<&T> {
        self.values.back()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator {
        self.values.iter()
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.values.iter().cloned().collect()
    }
}

impl Sequence<f64> {
    /// Mean of the last `n` entries.
    ///
    /// Averages everything available when `n` is 0 or exceeds the length.
    /// `None` when the sequence is empty.
    pub fn trailing_mean(&self, n: usize) -> Option<f64> {
        trailing_mean(self.values.iter().copied(), n)
    }
}

/// Mean of the last `n` items of an iterator (all items when `n` is 0 or too large)
pub fn trailing_mean<I>(values: I, n: usize) -> Option<f64>
where
    I: DoubleEndedIterator<Item = f64> + ExactSizeIterator,
{
    let len = values.len();
    if len == 0 {
        return None;
    }
    let take = if n == 0 { len } else { n.min(len) };
    let sum: f64 = values.rev().take(take).sum();
    Some(sum / take as f64)
}

/// Evaluation reward tagged with its episode index
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EvalPoint {
    pub episode: usize,
    pub reward: f64,
}

/// Running maxima of the discounted return
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ReturnMaxima {
    pub max_discounted: f64,
    pub max_abs_discounted: f64,
}

impl Default for ReturnMaxima {
    fn default() -> Self {
        Self {
            max_discounted: f64::NEG_INFINITY,
            max_abs_discounted: f64::NEG_INFINITY,
        }
    }
}

impl ReturnMaxima {
    /// Fold in one episode's discounted return
    pub fn update(&mut self, discounted: f64) {
        self.max_discounted = self.max_discounted.max(discounted);
        self.max_abs_discounted = self.max_abs_discounted.max(discounted.abs());
    }

    /// `(value - max_discounted) / max_abs_discounted`; `None` when undefined
    pub fn overestimation_ratio(&self, value_estimate: f64) -> Option<f64> {
        if !self.max_abs_discounted.is_finite() || self.max_abs_discounted == 0.0 {
            return None;
        }
        let ratio = (value_estimate - self.max_discounted) / self.max_abs_discounted;
        ratio.is_finite().then_some(ratio)
    }
}

/// Value estimate exceeding what has been observed
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Overestimation {
    pub value_estimate: f64,
    pub max_discounted: f64,
    pub ratio: f64,
}

/// Selects one of the scalar histories
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Series {
    /// Raw reward of every episode
    Reward,
    /// Discounted return of every episode
    Discounted,
    /// Smoothed average after each evaluation episode
    Smoothed,
    /// Raw reward of evaluation episodes
    EvalReward,
}

/// The five rolling sequences kept across a run.
///
/// Rewards are stored divided by the reward-scale factor.
#[derive(Debug, Clone)]
pub struct RollingHistory {
    pub rewards: Sequence<f64>,
    pub discounted: Sequence<f64>,
    pub smoothed: Sequence<f64>,
    pub eval_rewards: Sequence<EvalPoint>,
    pub maxima: Sequence<ReturnMaxima>,
}

impl RollingHistory {
    pub fn new(limit: Option<usize>) -> Self {
        Self {
            rewards: Sequence::new(limit),
            discounted: Sequence::new(limit),
            smoothed: Sequence::new(limit),
            eval_rewards: Sequence::new(limit),
            maxima: Sequence::new(limit),
        }
    }

    fn series_values(&self, series: Series) -> Vec<f64> {
        match series {
            Series::Reward => self.rewards.to_vec(),
            Series::Discounted => self.discounted.to_vec(),
            Series::Smoothed => self.smoothed.to_vec(),
            Series::EvalReward => self.eval_rewards.iter().map(|p| p.reward).collect(),
        }
    }
}

impl Default for RollingHistory {
    fn default() -> Self {
        Self::new(None)
    }
}

/// Accumulates episode outcomes
#[derive(Debug, Clone)]
pub struct MetricsTracker {
    history: RollingHistory,
    maxima: ReturnMaxima,
    /// Smoothed raw reward, seeded from the first outcome recorded
    avg: Option<f64>,
    eval_count: usize,
    total_steps: usize,
}

impl MetricsTracker {
    pub fn new(history_limit: Option<usize>) -> Self {
        Self {
            history: RollingHistory::new(history_limit),
            maxima: ReturnMaxima::default(),
            avg: None,
            eval_count: 0,
            total_steps: 0,
        }
    }

    /// Smoothing increment for the `eval_count`-th evaluation (1-based)
    pub fn smoothing_increment(eval_count: usize) -> f64 {
        (0.05 + 1.0 / (eval_count as f64).sqrt()).max(0.2)
    }

    /// Update the running maxima with an episode's discounted return and
    /// check the value estimate against them.
    ///
    /// The result is informational only.
    pub fn observe_return(
        &mut self,
        discounted: f64,
        value_estimate: f64,
    ) -> Option<Overestimation> {
        self.maxima.update(discounted);
        self.history.maxima.push(self.maxima);

        let ratio = self.maxima.overestimation_ratio(value_estimate)?;
        (ratio > OVERESTIMATION_RATIO).then_some(Overestimation {
            value_estimate,
            max_discounted: self.maxima.max_discounted,
            ratio,
        })
    }

    /// Record an episode outcome. `scale` is the reward-scale factor.
    pub fn record(&mut self, episode: usize, mode: EpisodeMode, outcome: &EpisodeOutcome, scale: f64) {
        let scale = if scale == 0.0 { 1.0 } else { scale };
        self.total_steps += outcome.steps;

        let avg = *self.avg.get_or_insert(outcome.total_reward);

        if mode.is_evaluate() {
            self.eval_count += 1;
            let inc = Self::smoothing_increment(self.eval_count);
            let avg = avg * (1.0 - inc) + inc * outcome.total_reward;
            self.avg = Some(avg);

            self.history.eval_rewards.push(EvalPoint {
                episode,
                reward: outcome.total_reward / scale,
            });
            self.history.smoothed.push(avg / scale);
        }

        self.history.rewards.push(outcome.total_reward / scale);
        self.history.discounted.push(outcome.discounted_return / scale);
    }

    /// Mean of the last `n` entries of a history
    pub fn trailing_mean(&self, series: Series, n: usize) -> Option<f64> {
        match series {
            Series::Reward => self.history.rewards.trailing_mean(n),
            Series::Discounted => self.history.discounted.trailing_mean(n),
            Series::Smoothed => self.history.smoothed.trailing_mean(n),
            Series::EvalReward => {
                let values = self.history.series_values(series);
                trailing_mean(values.into_iter(), n)
            }
        }
    }

    pub fn history(&self) -> &RollingHistory {
        &self.history
    }

    pub fn into_history(self) -> RollingHistory {
        self.history
    }

    /// Smoothed raw reward (unscaled)
    pub fn smoothed_average(&self) -> Option<f64> {
        self.avg
    }

    pub fn maxima(&self) -> ReturnMaxima {
        self.maxima
    }

    pub fn eval_count(&self) -> usize {
        self.eval_count
    }

    pub fn total_steps(&self) -> usize {
        self.total_steps
    }
}

impl Default for MetricsTracker {
    fn default() -> Self {
        Self::new(None)
    }
}
