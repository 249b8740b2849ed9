//! Score, milestones and moves. Scores are queued while a cascade runs and applied in one
//! go once the board settles.

use std::sync::mpsc::{self, Receiver, Sender};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreRules {
    pub points_per_tile: u32,
    /// Extra points for a match of exactly four.
    pub bonus_four: u32,
    /// Extra points for a match of five or more.
    pub bonus_five: u32,
    /// Ascending score thresholds.
    pub milestones: Vec<u32>,
}

impl Default for ScoreRules {
    fn default() -> Self {
        Self {
            points_per_tile: 10,
            bonus_four: 20,
            bonus_five: 50,
            milestones: vec![1000, 2500, 5000, 8000, 12000],
        }
    }
}

impl ScoreRules {
    pub fn points(&self, count: usize, size: usize) -> u32 {
        let bonus = match size {
            4 => self.bonus_four,
            s if s >= 5 => self.bonus_five,
            _ => 0,
        };
        (count as u32).saturating_mul(self.points_per_tile).saturating_add(bonus)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MilestoneData {
    /// Index of the milestone being worked towards (== `total` once all are done).
    pub milestone: usize,
    pub score: u32,
    /// Progress towards `threshold` from the previous threshold, `0.0..=1.0`.
    pub fraction: f32,
    pub threshold: u32,
    pub total: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProgressEvent {
    Updated(MilestoneData),
    MilestoneCompleted(MilestoneData),
}

#[derive(Debug)]
pub struct Progress {
    rules: ScoreRules,
    moves_per_game: u32,
    moves: u32,
    score: u32,
    milestone: usize,
    pending: Vec<(usize, usize)>,
    subscribers: Vec<Sender<ProgressEvent>>,
}

impl Progress {
    pub fn new(rules: ScoreRules, moves_per_game: u32) -> Self {
        Self {
            rules,
            moves_per_game,
            moves: moves_per_game,
            score: 0,
            milestone: 0,
            pending: Vec::new(),
            subscribers: Vec::new(),
        }
    }

    /// Receiver for every future event. Dropped receivers are pruned on the next send.
    pub fn subscribe(&mut self) -> Receiver<ProgressEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.push(tx);
        rx
    }

    fn emit(&mut self, event: ProgressEvent) {
        self.subscribers.retain(|tx| tx.send(event).is_ok());
    }

    pub fn add_pending_score(&mut self, count: usize, size: usize) {
        if count > 0 {
            self.pending.push((count, size));
        }
    }

    #[cfg(test)]
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Apply every queued score. Returns true when a milestone threshold was crossed.
    pub fn process_pending_scores(&mut self) -> bool {
        if self.pending.is_empty() {
            return false;
        }
        let gained: u32 = self
            .pending
            .drain(..)
            .map(|(count, size)| self.rules.points(count, size))
            .fold(0, u32::saturating_add);
        self.score = self.score.saturating_add(gained);

        let mut crossed = false;
        while self
            .rules
            .milestones
            .get(self.milestone)
            .is_some_and(|&threshold| self.score >= threshold)
        {
            self.milestone += 1;
            crossed = true;
        }
        let data = self.milestone_data();
        if crossed {
            info!(milestone = self.milestone, score = self.score, "milestone completed");
            self.emit(ProgressEvent::MilestoneCompleted(data));
        }
        self.emit(ProgressEvent::Updated(data));
        crossed
    }

    pub fn milestone_data(&self) -> MilestoneData {
        let total = self.rules.milestones.len();
        let previous = self
            .milestone
            .checked_sub(1)
            .and_then(|i| self.rules.milestones.get(i))
            .copied()
            .unwrap_or(0);
        let threshold = self
            .rules
            .milestones
            .get(self.milestone)
            .or(self.rules.milestones.last())
            .copied()
            .unwrap_or(0);
        let fraction = if self.milestone >= total || threshold <= previous {
            1.0
        } else {
            (self.score.saturating_sub(previous) as f32 / (threshold - previous) as f32).clamp(0.0, 1.0)
        };
        MilestoneData {
            milestone: self.milestone,
            score: self.score,
            fraction,
            threshold,
            total,
        }
    }

    pub fn score(&self) -> u32 {
        self.score
    }

    pub fn moves_remaining(&self) -> u32 {
        self.moves
    }

    pub fn spend_move(&mut self) -> u32 {
        self.moves = self.moves.saturating_sub(1);
        self.moves
    }

    pub fn reset(&mut self) {
        self.moves = self.moves_per_game;
        self.score = 0;
        self.milestone = 0;
        self.pending.clear();
        let data = self.milestone_data();
        self.emit(ProgressEvent::Updated(data));
    }
}
