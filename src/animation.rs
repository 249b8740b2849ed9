//! Animation contract between the game core and whatever draws it.
//!
//! The core never waits on wall-clock time directly. Every visual operation returns a
//! [`Completion`] that resolves once the animation has played; the orchestrator collects
//! them in a [`Barrier`] and only advances when all of them are done. [`Timeline`] is the
//! implementation the terminal front end uses: it keeps the in-flight tweens so the
//! renderer can interpolate them and resolves each one as time advances.

use crate::board::{GridPos, MoveTask};
use crate::tile::{CandyKind, SpecialKind, Tile, TileId};
use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

pub const SWAP_DURATION: Duration = Duration::from_millis(300);
pub const DESTROY_DURATION: Duration = Duration::from_millis(350);
pub const COMBINE_DURATION: Duration = Duration::from_millis(250);
pub const MOVE_DURATION: Duration = Duration::from_millis(250);
pub const CELEBRATION_DURATION: Duration = Duration::from_millis(1800);

/// One-shot completion signal shared between the animator and the waiting side.
#[derive(Debug, Clone, Default)]
pub struct Completion(Rc<Cell<bool>>);

impl Completion {
    pub fn pending() -> Self {
        Self::default()
    }

    pub fn resolved() -> Self {
        let done = Self::default();
        done.resolve();
        done
    }

    pub fn resolve(&self) {
        self.0.set(true);
    }

    #[inline]
    pub fn is_done(&self) -> bool {
        self.0.get()
    }
}

/// Fan-in over any number of completions. Done once every member is done, in any order;
/// an empty barrier is done immediately.
#[derive(Debug, Clone, Default)]
pub struct Barrier {
    parts: Vec<Completion>,
}

impl Barrier {
    pub fn push(&mut self, completion: Completion) {
        self.parts.push(completion);
    }

    pub fn is_done(&self) -> bool {
        self.parts.iter().all(Completion::is_done)
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }
}

impl From<Completion> for Barrier {
    fn from(completion: Completion) -> Self {
        Self {
            parts: vec![completion],
        }
    }
}

impl Extend<Completion> for Barrier {
    fn extend<T: IntoIterator<Item = Completion>>(&mut self, iter: T) {
        self.parts.extend(iter);
    }
}

impl Extend<Barrier> for Barrier {
    fn extend<T: IntoIterator<Item = Barrier>>(&mut self, iter: T) {
        for barrier in iter {
            self.parts.extend(barrier.parts);
        }
    }
}

impl FromIterator<Completion> for Barrier {
    fn from_iter<T: IntoIterator<Item = Completion>>(iter: T) -> Self {
        Self {
            parts: iter.into_iter().collect(),
        }
    }
}

/// What the renderer needs to keep drawing a tile after the board has let go of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileSprite {
    pub id: TileId,
    pub kind: CandyKind,
    pub special: SpecialKind,
    pub pos: GridPos,
}

impl TileSprite {
    pub fn of(tile: &Tile, pos: GridPos) -> Self {
        Self {
            id: tile.id,
            kind: tile.kind,
            special: tile.special,
            pos,
        }
    }

    pub fn glyph(&self) -> char {
        self.special.glyph().unwrap_or_else(|| self.kind.glyph())
    }
}

/// Cosmetic notifications. Nothing waits on these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpecialEffect {
    /// A special tile fired; `cells` are the cells it hit.
    Activated {
        origin: GridPos,
        special: SpecialKind,
        cells: Vec<GridPos>,
    },
    /// Delayed second blast of a wrapped tile.
    SecondaryWave {
        origin: GridPos,
        cells: Vec<GridPos>,
        delay: Duration,
    },
}

/// Rendering/animation collaborator consumed by the orchestrator.
pub trait Animator {
    /// Two tiles trade places; each sprite carries its starting cell.
    fn swap(&mut self, a: &TileSprite, b: &TileSprite) -> Completion;
    /// Destroy animation followed by the particle burst.
    fn destroy(&mut self, tile: &TileSprite) -> Completion;
    /// A tile merging into a newly created special tile at `into`.
    fn combine(&mut self, tile: &TileSprite, into: GridPos) -> Completion;
    /// Fall, refill and shuffle relocations.
    fn move_tile(&mut self, task: &MoveTask, tile: &TileSprite) -> Completion;
    fn celebrate(&mut self, milestone: usize) -> Completion;
    fn effect(&mut self, effect: SpecialEffect);
    fn advance(&mut self, dt: Duration);
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Motion {
    Move { from: GridPos, to: GridPos },
    Destroy,
    Combine { into: GridPos },
}

#[derive(Debug, Clone)]
pub struct Tween {
    pub tile: TileSprite,
    pub motion: Motion,
    start: Duration,
    length: Duration,
    done: Completion,
}

#[derive(Debug)]
struct Celebration {
    milestone: usize,
    start: Duration,
    length: Duration,
    done: Completion,
}

#[derive(Debug)]
struct Scheduled {
    due: Duration,
    effect: SpecialEffect,
}

/// Clock-driven animator. `speed` scales every duration (2.0 plays twice as fast);
/// an instant timeline resolves everything on creation and keeps no tweens.
#[derive(Debug)]
pub struct Timeline {
    now: Duration,
    speed: f32,
    instant: bool,
    tweens: Vec<Tween>,
    celebration: Option<Celebration>,
    scheduled: Vec<Scheduled>,
    fired: Vec<SpecialEffect>,
}

impl Timeline {
    pub fn new(speed: f32) -> Self {
        Self {
            now: Duration::ZERO,
            speed: if speed.is_finite() && speed > 0.0 { speed } else { 1.0 },
            instant: false,
            tweens: Vec::new(),
            celebration: None,
            scheduled: Vec::new(),
            fired: Vec::new(),
        }
    }

    pub fn instant() -> Self {
        Self {
            instant: true,
            ..Self::new(1.0)
        }
    }

    fn scaled(&self, base: Duration) -> Duration {
        // whole nanoseconds so a speed of 1.0 leaves durations exact
        Duration::from_nanos((base.as_nanos() as f64 / f64::from(self.speed)).round() as u64)
    }

    fn start(&mut self, tile: &TileSprite, motion: Motion, base: Duration) -> Completion {
        if self.instant {
            return Completion::resolved();
        }
        let done = Completion::pending();
        self.tweens.push(Tween {
            tile: *tile,
            motion,
            start: self.now,
            length: self.scaled(base),
            done: done.clone(),
        });
        done
    }

    /// Normalised progress of a tween in `0.0..=1.0`.
    pub fn progress(&self, tween: &Tween) -> f32 {
        if tween.length.is_zero() {
            return 1.0;
        }
        let elapsed = self.now.saturating_sub(tween.start);
        (elapsed.as_secs_f32() / tween.length.as_secs_f32()).clamp(0.0, 1.0)
    }

    pub fn tweens(&self) -> &[Tween] {
        &self.tweens
    }

    /// In-flight tween for a tile, if it is animating.
    pub fn tween_for(&self, id: TileId) -> Option<&Tween> {
        self.tweens.iter().find(|t| t.tile.id == id)
    }

    pub fn is_animating(&self, id: TileId) -> bool {
        self.tween_for(id).is_some()
    }

    /// Milestone being celebrated and its progress.
    pub fn celebration(&self) -> Option<(usize, f32)> {
        self.celebration.as_ref().map(|c| {
            let elapsed = self.now.saturating_sub(c.start).as_secs_f32();
            let length = c.length.as_secs_f32().max(f32::EPSILON);
            (c.milestone, (elapsed / length).clamp(0.0, 1.0))
        })
    }

    /// Cosmetic effects that have come due since the last call.
    pub fn drain_effects(&mut self) -> Vec<SpecialEffect> {
        std::mem::take(&mut self.fired)
    }

    pub fn is_idle(&self) -> bool {
        self.tweens.is_empty() && self.celebration.is_none() && self.scheduled.is_empty()
    }
}

impl Default for Timeline {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl Animator for Timeline {
    fn swap(&mut self, a: &TileSprite, b: &TileSprite) -> Completion {
        let first = self.start(a, Motion::Move { from: a.pos, to: b.pos }, SWAP_DURATION);
        // both halves share one clock, so the second tween finishing implies the first
        self.start(b, Motion::Move { from: b.pos, to: a.pos }, SWAP_DURATION);
        first
    }

    fn destroy(&mut self, tile: &TileSprite) -> Completion {
        self.start(tile, Motion::Destroy, DESTROY_DURATION)
    }

    fn combine(&mut self, tile: &TileSprite, into: GridPos) -> Completion {
        self.start(tile, Motion::Combine { into }, COMBINE_DURATION)
    }

    fn move_tile(&mut self, task: &MoveTask, tile: &TileSprite) -> Completion {
        let motion = Motion::Move {
            from: task.from,
            to: task.to,
        };
        self.start(tile, motion, MOVE_DURATION)
    }

    fn celebrate(&mut self, milestone: usize) -> Completion {
        if self.instant {
            return Completion::resolved();
        }
        let done = Completion::pending();
        self.celebration = Some(Celebration {
            milestone,
            start: self.now,
            length: self.scaled(CELEBRATION_DURATION),
            done: done.clone(),
        });
        done
    }

    fn effect(&mut self, effect: SpecialEffect) {
        match effect {
            SpecialEffect::SecondaryWave { delay, .. } if !self.instant && !delay.is_zero() => {
                let due = self.now + self.scaled(delay);
                self.scheduled.push(Scheduled { due, effect });
            }
            effect => self.fired.push(effect),
        }
    }

    fn advance(&mut self, dt: Duration) {
        self.now += dt;
        let now = self.now;
        self.tweens.retain(|t| {
            let finished = now >= t.start + t.length;
            if finished {
                t.done.resolve();
            }
            !finished
        });
        if let Some(c) = &self.celebration {
            if now >= c.start + c.length {
                c.done.resolve();
                self.celebration = None;
            }
        }
        let (due, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut self.scheduled)
            .into_iter()
            .partition(|s| now >= s.due);
        self.scheduled = waiting;
        self.fired.extend(due.into_iter().map(|s| s.effect));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sprite(id: u64, x: i32, y: i32) -> TileSprite {
        TileSprite {
            id: TileId(id),
            kind: CandyKind::Red,
            special: SpecialKind::Normal,
            pos: GridPos::new(x, y),
        }
    }

    #[test]
    fn test_barrier_waits_for_every_member() {
        let a = Completion::pending();
        let b = Completion::pending();
        let barrier: Barrier = [a.clone(), b.clone()].into_iter().collect();
        assert!(!barrier.is_done());
        b.resolve();
        assert!(!barrier.is_done());
        a.resolve();
        assert!(barrier.is_done());
        assert!(Barrier::default().is_done());
    }

    #[test]
    fn test_timeline_resolves_after_duration() {
        let mut timeline = Timeline::new(1.0);
        let done = timeline.destroy(&sprite(1, 0, 0));
        assert!(timeline.is_animating(TileId(1)));
        timeline.advance(Duration::from_millis(200));
        assert!(!done.is_done());
        let tween = timeline.tween_for(TileId(1)).unwrap();
        assert!((timeline.progress(tween) - 200.0 / 350.0).abs() < 1e-3);
        timeline.advance(Duration::from_millis(150));
        assert!(done.is_done());
        assert!(timeline.is_idle());
    }

    #[test]
    fn test_speed_scales_durations() {
        let mut timeline = Timeline::new(2.0);
        let done = timeline.swap(&sprite(1, 0, 0), &sprite(2, 1, 0));
        assert_eq!(timeline.tweens().len(), 2);
        timeline.advance(Duration::from_millis(150));
        assert!(done.is_done());
        assert!(timeline.tweens().is_empty());
    }

    #[test]
    fn test_scaled_durations_are_exact() {
        let base = Duration::from_millis(300);
        assert_eq!(Timeline::new(1.0).scaled(base), base);
        assert_eq!(Timeline::new(3.0).scaled(base), Duration::from_millis(100));
        assert_eq!(Timeline::new(0.5).scaled(base), Duration::from_millis(600));
    }

    #[test]
    fn test_instant_timeline_resolves_immediately() {
        let mut timeline = Timeline::instant();
        assert!(timeline.combine(&sprite(1, 0, 0), GridPos::new(1, 0)).is_done());
        assert!(timeline.celebrate(0).is_done());
        assert!(timeline.tweens().is_empty());
    }

    #[test]
    fn test_secondary_wave_fires_after_delay() {
        let mut timeline = Timeline::new(1.0);
        let wave = SpecialEffect::SecondaryWave {
            origin: GridPos::new(2, 2),
            cells: vec![GridPos::new(0, 0)],
            delay: Duration::from_millis(300),
        };
        timeline.effect(wave.clone());
        assert!(timeline.drain_effects().is_empty());
        timeline.advance(Duration::from_millis(299));
        assert!(timeline.drain_effects().is_empty());
        timeline.advance(Duration::from_millis(1));
        assert_eq!(timeline.drain_effects(), vec![wave]);
    }

    #[test]
    fn test_celebration_progress() {
        let mut timeline = Timeline::new(1.0);
        let done = timeline.celebrate(2);
        timeline.advance(CELEBRATION_DURATION / 2);
        let (milestone, progress) = timeline.celebration().unwrap();
        assert_eq!(milestone, 2);
        assert!((progress - 0.5).abs() < 1e-3);
        timeline.advance(CELEBRATION_DURATION);
        assert!(done.is_done());
        assert!(timeline.celebration().is_none());
    }
}
