//! Episode Scheduling
//!
//! Decides per episode whether the agent trains or is evaluated, and
//! which periodic driver actions fall on an episode.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::rl::core::Control;

/// Mode an episode runs in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EpisodeMode {
    /// Exploration on, learning updates on
    Train,
    /// No exploration, no learning updates
    Evaluate,
}

impl EpisodeMode {
    /// Mode of episode `episode` (0-based).
    ///
    /// Evaluation happens every `test_every`-th episode and for the final
    /// `eval_tail` episodes of the run.
    pub fn for_episode(
        episode: usize,
        total_episodes: usize,
        test_every: usize,
        eval_tail: usize,
    ) -> Self {
        let periodic = test_every > 0 && (episode + 1) % test_every == 0;
        let tail = episode >= total_episodes.saturating_sub(eval_tail);
        if periodic || tail {
            EpisodeMode::Evaluate
        } else {
            EpisodeMode::Train
        }
    }

    pub fn is_evaluate(&self) -> bool {
        matches!(self, EpisodeMode::Evaluate)
    }

    /// Control value handed to the agent
    pub fn control(&self, episode: usize) -> Control {
        match self {
            EpisodeMode::Train => Control::Explore { episode },
            EpisodeMode::Evaluate => Control::Greedy,
        }
    }

    /// Learning updates are applied only while training
    pub fn learns(&self) -> bool {
        matches!(self, EpisodeMode::Train)
    }

    /// Rendering is allowed only on evaluation episodes the user asked to see
    pub fn renders(&self, requested: bool) -> bool {
        requested && self.is_evaluate()
    }
}

impl fmt::Display for EpisodeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EpisodeMode::Train => write!(f, "train"),
            EpisodeMode::Evaluate => write!(f, "evaluate"),
        }
    }
}

/// Whether results are published before running `episode`
pub fn publish_due(episode: usize, publish_every: usize) -> bool {
    episode > 1 && publish_every > 0 && episode % publish_every == 0
}

/// Whether a checkpoint is written after `episode`, counted from the resume point
pub fn checkpoint_due(episode: usize, start_episode: usize, checkpoint_every: usize) -> bool {
    checkpoint_every > 0 && (episode + 1).saturating_sub(start_episode) % checkpoint_every == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_rule() {
        let mode = |e| EpisodeMode::for_episode(e, 1000, 25, 100);

        assert_eq!(mode(0), EpisodeMode::Train);
        assert_eq!(mode(24), EpisodeMode::Evaluate);
        assert_eq!(mode(25), EpisodeMode::Train);
        assert_eq!(mode(49), EpisodeMode::Evaluate);
        // 900th episode is periodic as well as one short of the tail
        assert_eq!(mode(899), EpisodeMode::Evaluate);
        assert_eq!(mode(898), EpisodeMode::Train);
        assert_eq!(mode(900), EpisodeMode::Evaluate);
        assert_eq!(mode(999), EpisodeMode::Evaluate);
    }

    #[test]
    fn test_mode_rule_exhaustive() {
        for e in 0..1000 {
            let expected = (e + 1) % 25 == 0 || e >= 900;
            assert_eq!(
                EpisodeMode::for_episode(e, 1000, 25, 100).is_evaluate(),
                expected,
                "episode {}",
                e
            );
        }
    }

    #[test]
    fn test_tail_larger_than_run() {
        assert!(EpisodeMode::for_episode(0, 10, 25, 100).is_evaluate());
    }

    #[test]
    fn test_control_and_flags() {
        assert_eq!(EpisodeMode::Train.control(12), Control::Explore { episode: 12 });
        assert_eq!(EpisodeMode::Evaluate.control(12), Control::Greedy);
        assert!(EpisodeMode::Train.learns());
        assert!(!EpisodeMode::Evaluate.learns());
        assert!(!EpisodeMode::Train.renders(true));
        assert!(EpisodeMode::Evaluate.renders(true));
        assert!(!EpisodeMode::Evaluate.renders(false));
    }

    #[test]
    fn test_publish_due() {
        assert!(!publish_due(0, 50));
        assert!(!publish_due(1, 1));
        assert!(publish_due(50, 50));
        assert!(!publish_due(51, 50));
        assert!(publish_due(100, 50));
    }

    #[test]
    fn test_checkpoint_due_counts_from_resume_point() {
        assert!(checkpoint_due(19, 0, 20));
        assert!(!checkpoint_due(20, 0, 20));
        // resumed at 19: next save after 20 more episodes
        assert!(!checkpoint_due(19, 19, 20));
        assert!(checkpoint_due(38, 19, 20));
    }
}
