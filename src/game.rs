//! Game state: selection, swaps, cascades, special-tile chains, gravity, shuffles, moves
//! and milestones.
//!
//! Every board mutation happens here, in response to a tap or to the current phase's
//! animations finishing. `tick` advances the animator and then walks the phase machine
//! as far as the resolved completions allow.

use crate::GameConfig;
use crate::animation::{Animator, Barrier, TileSprite};
use crate::board::{Board, BoardError, GridPos, MoveTask};
use crate::matcher::{self, MatchGroup};
use crate::progress::Progress;
use crate::special::{self, Activation, Partner, Trigger};
use crate::tile::{Tile, TileId, TileState};
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Shuffle attempts before a deadlocked board is accepted as is.
pub const SHUFFLE_RETRIES: usize = 20;

/// Player inactivity before a hint is offered.
pub const HINT_DELAY: Duration = Duration::from_secs(5);

/// Upper bound on phase transitions per tick (instant animators resolve whole cascades).
const MAX_STEPS_PER_TICK: usize = 256;

/// Coarse phase, for the UI and input gating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    TileSelected,
    Swapping,
    Resolving,
    Falling,
    Shuffling,
    Celebrating,
    GameOver,
}

#[derive(Debug)]
enum Phase {
    Idle,
    Swapping { a: TileId, b: TileId, wait: Barrier },
    Reverting { wait: Barrier },
    Resolving { wait: Barrier },
    RainbowWaves { waves: VecDeque<Vec<TileId>>, wait: Barrier },
    Falling { wait: Barrier },
    Shuffling { wait: Barrier },
    Celebrating { wait: Barrier },
    GameOver,
}

impl Phase {
    fn is_ready(&self) -> bool {
        match self {
            Self::Idle | Self::GameOver => false,
            Self::Swapping { wait, .. }
            | Self::Reverting { wait }
            | Self::Resolving { wait }
            | Self::RainbowWaves { wait, .. }
            | Self::Falling { wait }
            | Self::Shuffling { wait }
            | Self::Celebrating { wait } => wait.is_done(),
        }
    }
}

/// Player input behind the resolution pass in flight.
#[derive(Debug, Clone, Copy, Default)]
struct Turn {
    /// Both halves of a committed rainbow swap, snapshotted before anything is removed.
    swapped: Option<(Partner, Partner)>,
    clicked: Option<TileId>,
}

impl Turn {
    fn trigger_for(&self, id: TileId) -> (Trigger, Option<Partner>) {
        if self.clicked == Some(id) {
            return (Trigger::RainbowClick, None);
        }
        match self.swapped {
            Some((a, b)) if a.id == id => (Trigger::PlayerSwap, Some(b)),
            Some((a, b)) if b.id == id => (Trigger::PlayerSwap, Some(a)),
            _ => (Trigger::Passive, None),
        }
    }
}

pub struct GameState<A: Animator> {
    board: Board,
    animator: A,
    progress: Progress,
    phase: Phase,
    turn: Turn,
    selected: Option<TileId>,
    paused: bool,
    idle_for: Duration,
    hint: Option<(GridPos, GridPos)>,
    hint_checked: bool,
}

impl<A: Animator> GameState<A> {
    /// Fresh board from `config`, opening cascade already started.
    pub fn new(config: &GameConfig, animator: A) -> Self {
        let board = Board::new(config.width, config.height, config.kinds, config.seed);
        let mut game = Self::with_board(board, config, animator);
        game.new_game();
        game
    }

    /// Wrap an existing board without touching it.
    pub fn with_board(board: Board, config: &GameConfig, animator: A) -> Self {
        Self {
            board,
            animator,
            progress: Progress::new(config.scoring.clone(), config.moves),
            phase: Phase::Idle,
            turn: Turn::default(),
            selected: None,
            paused: false,
            idle_for: Duration::ZERO,
            hint: None,
            hint_checked: false,
        }
    }

    pub fn new_game(&mut self) {
        self.progress.reset();
        info!(
            width = self.board.width(),
            height = self.board.height(),
            moves = self.progress.moves_remaining(),
            "new game"
        );
        self.board.clear();
        self.board.initialize();
        self.selected = None;
        self.paused = false;
        self.turn = Turn::default();
        self.phase = Phase::Idle;
        self.reset_idle();
        self.resolve_board();
    }

    /// Resolve whatever the board holds right now, exactly as after a settle.
    pub fn resolve_board(&mut self) {
        self.check_matches(None);
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    #[cfg(test)]
    pub fn board_mut(&mut self) -> &mut Board {
        &mut self.board
    }

    pub fn animator(&self) -> &A {
        &self.animator
    }

    pub fn animator_mut(&mut self) -> &mut A {
        &mut self.animator
    }

    pub fn progress(&self) -> &Progress {
        &self.progress
    }

    pub fn progress_mut(&mut self) -> &mut Progress {
        &mut self.progress
    }

    pub fn moves_remaining(&self) -> u32 {
        self.progress.moves_remaining()
    }

    pub fn selected(&self) -> Option<TileId> {
        self.selected
    }

    /// A swap that would match, offered after the player has been idle for a while.
    pub fn hint(&self) -> Option<(GridPos, GridPos)> {
        self.hint
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn is_game_over(&self) -> bool {
        matches!(self.phase, Phase::GameOver)
    }

    /// True when a tap would be acted on.
    pub fn accepts_input(&self) -> bool {
        !self.paused && matches!(self.phase, Phase::Idle)
    }

    pub fn stage(&self) -> Stage {
        match self.phase {
            Phase::Idle if self.selected.is_some() => Stage::TileSelected,
            Phase::Idle => Stage::Idle,
            Phase::Swapping { .. } | Phase::Reverting { .. } => Stage::Swapping,
            Phase::Resolving { .. } | Phase::RainbowWaves { .. } => Stage::Resolving,
            Phase::Falling { .. } => Stage::Falling,
            Phase::Shuffling { .. } => Stage::Shuffling,
            Phase::Celebrating { .. } => Stage::Celebrating,
            Phase::GameOver => Stage::GameOver,
        }
    }

    pub fn pause(&mut self) {
        if !self.paused && !self.is_game_over() {
            self.paused = true;
            info!("paused");
        }
    }

    pub fn resume(&mut self) {
        if self.paused {
            self.paused = false;
            self.reset_idle();
            info!("resumed");
        }
    }

    pub fn toggle_pause(&mut self) {
        if self.paused {
            self.resume();
        } else {
            self.pause();
        }
    }

    pub fn tap_at(&mut self, pos: GridPos) {
        if let Some(id) = self.board.tile_id_at(pos) {
            self.tap(id);
        }
    }

    /// First tap selects; a second tap on an adjacent tile swaps, anywhere else moves the
    /// selection. Tapping a selected rainbow sets it off.
    pub fn tap(&mut self, id: TileId) {
        if !self.accepts_input() {
            trace!(tile = %id, "tap ignored");
            return;
        }
        self.reset_idle();
        if !self.board.contains(id) {
            warn!(tile = %id, "tapped tile is not on the board");
            return;
        }
        let Some(first) = self.selected else {
            self.select(id);
            return;
        };
        if first == id {
            if self.is_rainbow(id) {
                self.click_rainbow(id);
            } else {
                self.deselect();
            }
            return;
        }
        let (a, b) = match (self.board.board_position(first), self.board.board_position(id)) {
            (Ok(a), Ok(b)) => (a, b),
            (Err(err), _) | (_, Err(err)) => {
                warn!(%err, "selection went stale, swap aborted");
                self.deselect();
                return;
            }
        };
        if a.manhattan(b) != 1 {
            self.deselect();
            self.select(id);
            return;
        }
        self.deselect();
        match self.swap_tiles(first, id) {
            Ok(wait) => {
                debug!(a = %first, b = %id, "swap");
                self.phase = Phase::Swapping { a: first, b: id, wait };
            }
            Err(err) => warn!(%err, "swap aborted"),
        }
    }

    /// Advance animations by `dt` and resolve as far as they allow. Frozen while paused.
    pub fn tick(&mut self, dt: Duration) {
        if self.paused {
            return;
        }
        self.animator.advance(dt);
        for _ in 0..MAX_STEPS_PER_TICK {
            if !self.step() {
                break;
            }
            debug_assert!(self.board.index_is_consistent());
        }
        if matches!(self.phase, Phase::Idle) {
            self.idle_for += dt;
            if self.idle_for >= HINT_DELAY && !self.hint_checked {
                self.hint_checked = true;
                self.hint = matcher::find_swappable_pair(&mut self.board);
                trace!(hint = ?self.hint, "hint");
            }
        }
    }

    fn step(&mut self) -> bool {
        if !self.phase.is_ready() {
            return false;
        }
        match std::mem::replace(&mut self.phase, Phase::Idle) {
            phase @ (Phase::Idle | Phase::GameOver) => {
                self.phase = phase;
                return false;
            }
            Phase::Swapping { a, b, .. } => self.check_matches(Some((a, b))),
            Phase::Reverting { .. } => self.enter_idle(),
            Phase::Resolving { .. } => self.start_fall(),
            Phase::RainbowWaves { mut waves, .. } => match waves.pop_front() {
                Some(wave) => {
                    let wait = self.destroy_wave(wave);
                    self.phase = Phase::RainbowWaves { waves, wait };
                }
                None => self.start_fall(),
            },
            Phase::Falling { .. } | Phase::Celebrating { .. } => self.check_matches(None),
            Phase::Shuffling { .. } => {
                let groups = matcher::find_matches(&self.board);
                if groups.is_empty() {
                    self.enter_idle();
                } else {
                    self.remove_groups(groups);
                }
            }
        }
        true
    }

    fn check_matches(&mut self, swap: Option<(TileId, TileId)>) {
        let groups = matcher::find_matches(&self.board);
        let rainbow_swap = swap
            .filter(|&(a, b)| self.is_rainbow(a) || self.is_rainbow(b))
            .and_then(|(a, b)| Some((self.partner(a)?, self.partner(b)?)));
        if groups.is_empty() && rainbow_swap.is_none() {
            match swap {
                Some((a, b)) => self.revert_swap(a, b),
                None => self.settle(),
            }
            return;
        }
        if swap.is_some() {
            let left = self.progress.spend_move();
            debug!(moves_left = left, "move committed");
        }
        self.turn = Turn {
            swapped: rainbow_swap,
            clicked: None,
        };
        self.remove_groups(groups);
    }

    fn revert_swap(&mut self, a: TileId, b: TileId) {
        match self.swap_tiles(a, b) {
            Ok(wait) => {
                debug!(a = %a, b = %b, "no match, swap reverted");
                self.phase = Phase::Reverting { wait };
            }
            Err(err) => {
                warn!(%err, "swap could not be reverted");
                self.enter_idle();
            }
        }
    }

    fn swap_tiles(&mut self, a: TileId, b: TileId) -> Result<Barrier, BoardError> {
        let sa = self.sprite(a)?;
        let sb = self.sprite(b)?;
        self.board.swap(sa.pos, sb.pos)?;
        Ok(Barrier::from(self.animator.swap(&sa, &sb)))
    }

    fn click_rainbow(&mut self, id: TileId) {
        self.deselect();
        let left = self.progress.spend_move();
        debug!(tile = %id, moves_left = left, "rainbow clicked");
        self.turn = Turn {
            swapped: None,
            clicked: Some(id),
        };
        self.remove_groups(Vec::new());
    }

    /// Score the groups, send special-creating groups through the factory and destroy the
    /// rest together with the tiles the player set off directly.
    fn remove_groups(&mut self, groups: Vec<MatchGroup>) {
        let mut seeds: Vec<TileId> = Vec::new();
        let mut claimed: HashSet<TileId> = HashSet::new();
        let mut wait = Barrier::default();

        for group in &groups {
            self.progress.add_pending_score(group.len(), group.len());
            debug!(pattern = group.pattern, shape = ?group.shape, len = group.len(), "match");

            let Some(kind) = special::should_create_special_tile(group) else {
                seeds.extend(group.tiles.iter().copied());
                continue;
            };
            let center = group.center_tile();
            let mut combined = Vec::with_capacity(group.len());
            for (&id, &pos) in group.tiles.iter().zip(&group.positions) {
                if self.board.tile(id).is_some_and(Tile::is_special) {
                    seeds.extend(self.activate(id, pos).affected);
                }
                if id == center {
                    continue;
                }
                if let Some(sprite) = self.remove_tile(pos) {
                    combined.push(sprite);
                }
                claimed.insert(id);
            }
            claimed.insert(center);
            if let Some(done) =
                special::create_special_tile(&mut self.board, &mut self.animator, center, kind, &combined)
            {
                wait.extend([done]);
            }
        }

        if let Some((a, b)) = self.turn.swapped {
            seeds.extend([a.id, b.id]);
        }
        seeds.extend(self.turn.clicked);
        self.start_destroy(seeds, &claimed, wait);
    }

    /// Destroy `seeds` plus everything their special tiles take with them, as one
    /// fan-in. Tiles claimed by the factory this pass are left alone.
    fn start_destroy(&mut self, seeds: Vec<TileId>, claimed: &HashSet<TileId>, mut wait: Barrier) {
        let direct: HashSet<TileId> = seeds.iter().copied().collect();
        let mut queue: VecDeque<TileId> = seeds.into();
        let mut seen: HashSet<TileId> = HashSet::new();
        let mut chained = 0;

        while let Some(id) = queue.pop_front() {
            if claimed.contains(&id) || !seen.insert(id) {
                continue;
            }
            let (Ok(pos), Some(tile)) = (self.board.board_position(id), self.board.tile(id)) else {
                trace!(tile = %id, "already gone");
                continue;
            };
            if tile.is_special() {
                let (trigger, partner) = self.turn.trigger_for(id);
                if tile.is_rainbow() && trigger == Trigger::Passive {
                    trace!(tile = %id, "rainbow left standing");
                    continue;
                }
                let activation = self.activate(id, pos);
                if activation.double_rainbow {
                    if let Some(other) = partner {
                        if chained > 0 {
                            self.progress.add_pending_score(chained, 1);
                        }
                        self.start_rainbow_waves(pos, other.pos, claimed, wait);
                        return;
                    }
                }
                queue.extend(
                    activation
                        .affected
                        .into_iter()
                        .filter(|hit| !seen.contains(hit) && !claimed.contains(hit)),
                );
            }
            if let Some(sprite) = self.remove_tile(pos) {
                if !direct.contains(&id) {
                    chained += 1;
                }
                wait.push(self.animator.destroy(&sprite));
            }
        }

        if chained > 0 {
            self.progress.add_pending_score(chained, 1);
        }
        if wait.is_empty() {
            trace!("nothing left to destroy");
        }
        trace!(tiles = seen.len(), chained, waiting = wait.len(), "destroying");
        self.phase = Phase::Resolving { wait };
    }

    fn activate(&mut self, id: TileId, pos: GridPos) -> Activation {
        let (trigger, partner) = self.turn.trigger_for(id);
        let activation = special::activate_special_tile(&self.board, id, partner, pos, trigger);
        if let Some(tile) = self.board.tile(id) {
            debug!(tile = %id, special = ?tile.special, ?trigger, hits = activation.affected.len(), "special activated");
            for effect in activation.effects(&self.board, pos, tile.special) {
                self.animator.effect(effect);
            }
        }
        activation
    }

    fn start_rainbow_waves(&mut self, a: GridPos, b: GridPos, claimed: &HashSet<TileId>, wait: Barrier) {
        let waves: VecDeque<Vec<TileId>> = special::rainbow_waves(&self.board, a, b)
            .into_iter()
            .map(|wave| wave.into_iter().filter(|id| !claimed.contains(id)).collect())
            .collect();
        let total: usize = waves.iter().map(Vec::len).sum();
        info!(tiles = total, shells = waves.len(), "double rainbow");
        self.progress.add_pending_score(total, 1);
        self.phase = Phase::RainbowWaves { waves, wait };
    }

    fn destroy_wave(&mut self, wave: Vec<TileId>) -> Barrier {
        let mut wait = Barrier::default();
        for id in wave {
            let Ok(pos) = self.board.board_position(id) else {
                continue;
            };
            if let Some(sprite) = self.remove_tile(pos) {
                wait.push(self.animator.destroy(&sprite));
            }
        }
        wait
    }

    fn start_fall(&mut self) {
        self.turn = Turn::default();
        let tasks = self.board.collapse();
        if tasks.is_empty() {
            self.check_matches(None);
            return;
        }
        let mut wait = Barrier::default();
        for task in &tasks {
            if let Some(tile) = self.board.tile(task.tile) {
                wait.push(self.animator.move_tile(task, &TileSprite::of(tile, task.from)));
            }
        }
        trace!(tiles = tasks.len(), "falling");
        self.phase = Phase::Falling { wait };
    }

    /// The cascade is over: bank the score, then celebrate, end the game or make sure the
    /// player has a move.
    fn settle(&mut self) {
        debug_assert!(self.board.is_full(), "settled board has holes");
        self.turn = Turn::default();
        if self.progress.process_pending_scores() {
            let milestone = self.progress.milestone_data().milestone;
            info!(milestone, score = self.progress.score(), "milestone reached, new board");
            self.board.clear();
            self.board.initialize();
            let wait = Barrier::from(self.animator.celebrate(milestone));
            self.phase = Phase::Celebrating { wait };
            return;
        }
        if self.progress.moves_remaining() == 0 {
            info!(score = self.progress.score(), "game over");
            self.deselect();
            self.phase = Phase::GameOver;
            return;
        }
        self.ensure_playable();
    }

    fn ensure_playable(&mut self) {
        if matcher::has_swappable_pair(&mut self.board) {
            self.enter_idle();
            return;
        }
        let before: HashMap<TileId, GridPos> = self.board.tiles().map(|(pos, t)| (t.id, pos)).collect();
        if !self.shuffle_until_playable() {
            warn!(attempts = SHUFFLE_RETRIES, "board still has no move after shuffling, keeping it");
        }
        let mut wait = Barrier::default();
        for (pos, tile) in self.board.tiles() {
            let Some(&from) = before.get(&tile.id) else {
                continue;
            };
            if from != pos {
                let task = MoveTask {
                    tile: tile.id,
                    from,
                    to: pos,
                    is_new: false,
                };
                wait.push(self.animator.move_tile(&task, &TileSprite::of(tile, from)));
            }
        }
        self.phase = Phase::Shuffling { wait };
    }

    /// Shuffle until the board matches or has a matching swap. False when the retry
    /// budget runs out first.
    fn shuffle_until_playable(&mut self) -> bool {
        for attempt in 1..=SHUFFLE_RETRIES {
            let moved = self.board.shuffle();
            if matcher::has_matches(&self.board) || matcher::has_swappable_pair(&mut self.board) {
                info!(attempt, moved, "deadlocked board shuffled");
                return true;
            }
        }
        false
    }

    fn enter_idle(&mut self) {
        self.phase = Phase::Idle;
        self.reset_idle();
    }

    fn reset_idle(&mut self) {
        self.idle_for = Duration::ZERO;
        self.hint = None;
        self.hint_checked = false;
    }

    fn select(&mut self, id: TileId) {
        if let Some(tile) = self.board.tile_mut(id) {
            tile.state = TileState::Selected;
            self.selected = Some(id);
        }
    }

    fn deselect(&mut self) {
        if let Some(tile) = self.selected.take().and_then(|id| self.board.tile_mut(id)) {
            tile.state = TileState::Idle;
        }
    }

    fn is_rainbow(&self, id: TileId) -> bool {
        self.board.tile(id).is_some_and(Tile::is_rainbow)
    }

    fn partner(&self, id: TileId) -> Option<Partner> {
        let pos = self.board.board_position(id).ok()?;
        self.board.tile(id).map(|tile| Partner::of(tile, pos))
    }

    fn sprite(&self, id: TileId) -> Result<TileSprite, BoardError> {
        let pos = self.board.board_position(id)?;
        let tile = self.board.tile(id).ok_or(BoardError::NotOnBoard(id))?;
        Ok(TileSprite::of(tile, pos))
    }

    fn remove_tile(&mut self, pos: GridPos) -> Option<TileSprite> {
        self.board
            .clear_tile_at(pos)
            .map(|tile| TileSprite::of(&tile, pos))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::{Completion, SpecialEffect, Timeline};
    use crate::progress::{ProgressEvent, ScoreRules};
    use crate::tile::CandyKind::{Blue as B, Green as G, Red as R, Yellow as Y};
    use crate::tile::SpecialKind;

    /// Resolves everything immediately and remembers what it was asked to play.
    #[derive(Debug, Default)]
    struct Recorder {
        swaps: usize,
        destroyed: Vec<TileSprite>,
        moved: usize,
        celebrations: Vec<usize>,
        effects: Vec<SpecialEffect>,
    }

    impl Animator for Recorder {
        fn swap(&mut self, _: &TileSprite, _: &TileSprite) -> Completion {
            self.swaps += 1;
            Completion::resolved()
        }
        fn destroy(&mut self, tile: &TileSprite) -> Completion {
            self.destroyed.push(*tile);
            Completion::resolved()
        }
        fn combine(&mut self, _: &TileSprite, _: GridPos) -> Completion {
            Completion::resolved()
        }
        fn move_tile(&mut self, _: &MoveTask, _: &TileSprite) -> Completion {
            self.moved += 1;
            Completion::resolved()
        }
        fn celebrate(&mut self, milestone: usize) -> Completion {
            self.celebrations.push(milestone);
            Completion::resolved()
        }
        fn effect(&mut self, effect: SpecialEffect) {
            self.effects.push(effect);
        }
        fn advance(&mut self, _: Duration) {}
    }

    fn config(moves: u32, milestones: Vec<u32>) -> GameConfig {
        GameConfig {
            moves,
            scoring: ScoreRules {
                milestones,
                ..ScoreRules::default()
            },
            ..GameConfig::default()
        }
    }

    fn game(rows: &[&[crate::tile::CandyKind]], moves: u32) -> GameState<Recorder> {
        let board = Board::from_kinds(rows, 4, 11);
        GameState::with_board(board, &config(moves, vec![1_000_000]), Recorder::default())
    }

    /// No match anywhere; swapping (0,2)/(0,3) makes a red line on the bottom row.
    const PLAIN: [&[crate::tile::CandyKind]; 4] = [&[R, G, B, Y], &[G, B, Y, R], &[R, Y, G, B], &[Y, R, R, G]];

    fn run<T: Animator>(game: &mut GameState<T>) {
        for _ in 0..200 {
            game.tick(Duration::from_millis(50));
            if game.accepts_input() || game.is_game_over() {
                return;
            }
        }
        panic!("cascade did not settle, stage {:?}", game.stage());
    }

    fn snapshot<T: Animator>(game: &GameState<T>) -> Vec<Option<TileId>> {
        game.board().positions().map(|p| game.board().tile_id_at(p)).collect()
    }

    #[test]
    fn test_swap_without_match_is_reverted() {
        let mut game = game(&PLAIN, 30);
        let before = snapshot(&game);
        game.tap_at(GridPos::new(0, 0));
        game.tap_at(GridPos::new(1, 0));
        assert_eq!(game.stage(), Stage::Swapping);
        run(&mut game);
        assert_eq!(snapshot(&game), before);
        assert_eq!(game.moves_remaining(), 30);
        assert_eq!(game.animator().swaps, 2);
        assert!(game.animator().destroyed.is_empty());
        assert!(game.board().index_is_consistent());
    }

    #[test]
    fn test_matching_swap_spends_exactly_one_move() {
        let mut game = game(&PLAIN, 30);
        game.tap_at(GridPos::new(0, 2));
        game.tap_at(GridPos::new(0, 3));
        run(&mut game);
        assert_eq!(game.moves_remaining(), 29);
        assert!(game.animator().destroyed.len() >= 3);
        assert!(game.animator().moved >= 3);
        assert!(game.board().is_full());
        assert!(game.board().index_is_consistent());
        assert!(game.progress().score() >= 30);
    }

    #[test]
    fn test_four_in_row_creates_striped_at_center() {
        let board = Board::from_kinds(&[&[R, R, G, R], &[G, B, R, B], &[B, G, Y, G], &[Y, B, G, Y]], 4, 3);
        let mut game = GameState::with_board(board, &config(30, vec![1_000_000]), Timeline::new(1.0));
        let mover = game.board().tile_id_at(GridPos::new(2, 1)).unwrap();
        game.tap_at(GridPos::new(2, 0));
        game.tap_at(GridPos::new(2, 1));
        game.tick(Duration::from_millis(300));

        assert_eq!(game.stage(), Stage::Resolving);
        let tile = game.board().tile(mover).unwrap();
        assert_eq!(tile.special, SpecialKind::StripedHorizontal);
        assert_eq!(tile.kind, R);
        assert_eq!(game.board().tile_id_at(GridPos::new(2, 0)), Some(mover));
        for x in [0, 1, 3] {
            assert!(game.board().tile_id_at(GridPos::new(x, 0)).is_none());
        }
        assert_eq!(game.moves_remaining(), 29);
        run(&mut game);
        assert!(game.board().index_is_consistent());
    }

    #[test]
    fn test_rainbow_swap_clears_partner_kind() {
        let mut game = game(&[&[G, B, R, Y], &[B, Y, G, R], &[Y, R, B, G], &[R, G, Y, B]], 30);
        let rainbow = game.board_mut().set_special(GridPos::new(0, 0), SpecialKind::Rainbow);
        let blues: HashSet<TileId> = game
            .board()
            .tiles()
            .filter(|(_, t)| t.kind == B && !t.is_rainbow())
            .map(|(_, t)| t.id)
            .collect();
        assert_eq!(blues.len(), 4);

        game.tap_at(GridPos::new(0, 0));
        game.tap_at(GridPos::new(1, 0));
        run(&mut game);

        let first: HashSet<TileId> = game.animator().destroyed[..5].iter().map(|s| s.id).collect();
        let mut expected = blues.clone();
        expected.insert(rainbow);
        assert_eq!(first, expected);
        assert_eq!(game.moves_remaining(), 29);
    }

    #[test]
    fn test_rainbow_swap_partner_completing_a_line() {
        let board = Board::from_kinds(&[&[G, B, R, Y], &[B, Y, G, R], &[B, R, Y, G], &[R, G, B, Y]], 4, 3);
        let mut game = GameState::with_board(board, &config(30, vec![1_000_000]), Timeline::new(1.0));
        let rainbow = game.board_mut().set_special(GridPos::new(0, 0), SpecialKind::Rainbow);
        let far_blue = game.board().tile_id_at(GridPos::new(2, 3)).unwrap();
        game.tap_at(GridPos::new(0, 0));
        game.tap_at(GridPos::new(1, 0));
        game.tick(Duration::from_millis(301));

        assert_eq!(game.stage(), Stage::Resolving);
        for y in 0..3 {
            assert!(game.board().tile_id_at(GridPos::new(0, y)).is_none());
        }
        assert!(game.board().tile(rainbow).is_none());
        assert!(game.board().tile(far_blue).is_none());
        assert!(game.board().tile_id_at(GridPos::new(2, 3)).is_none());
        assert_eq!(game.moves_remaining(), 29);
        run(&mut game);
        assert!(game.board().index_is_consistent());
    }

    #[test]
    fn test_rainbow_swap_partner_completing_a_striped_line() {
        let board = Board::from_kinds(&[&[B, G, B, B], &[G, B, Y, R], &[Y, R, G, B], &[R, G, Y, G]], 4, 3);
        let mut game = GameState::with_board(board, &config(30, vec![1_000_000]), Timeline::new(1.0));
        let rainbow = game.board_mut().set_special(GridPos::new(1, 0), SpecialKind::Rainbow);
        let center = game.board().tile_id_at(GridPos::new(2, 0)).unwrap();
        let far_blue = game.board().tile_id_at(GridPos::new(3, 2)).unwrap();
        game.tap_at(GridPos::new(1, 0));
        game.tap_at(GridPos::new(1, 1));
        game.tick(Duration::from_millis(300));

        assert_eq!(game.stage(), Stage::Resolving);
        let striped = game.board().tile(center).unwrap();
        assert_eq!(striped.special, SpecialKind::StripedHorizontal);
        assert_eq!(striped.kind, B);
        assert_eq!(game.board().tile_id_at(GridPos::new(2, 0)), Some(center));
        for x in [0, 1, 3] {
            assert!(game.board().tile_id_at(GridPos::new(x, 0)).is_none());
        }
        assert!(game.board().tile(rainbow).is_none());
        assert!(game.board().tile(far_blue).is_none());
        run(&mut game);
        assert!(game.board().index_is_consistent());
    }

    #[test]
    fn test_chain_before_double_rainbow_is_scored() {
        let mut game = game(&[&[G, B, R, Y], &[B, Y, G, R], &[Y, R, B, G], &[R, G, Y, B]], 30);
        let striped = game.board_mut().set_special(GridPos::new(0, 2), SpecialKind::StripedHorizontal);
        let a = game.board_mut().set_special(GridPos::new(2, 2), SpecialKind::Rainbow);
        let b = game.board_mut().set_special(GridPos::new(3, 2), SpecialKind::Rainbow);
        game.turn = Turn {
            swapped: Some((game.partner(a).unwrap(), game.partner(b).unwrap())),
            clicked: None,
        };
        // the stripe reaches (1,2) before the first rainbow
        game.start_destroy(vec![striped], &HashSet::new(), Barrier::default());
        assert!(matches!(game.phase, Phase::RainbowWaves { .. }));

        game.progress.process_pending_scores();
        // one chained tile plus the 14 left for the waves
        assert_eq!(game.progress().score(), 150);
    }

    #[test]
    fn test_double_rainbow_destroys_in_shells() {
        let mut game = game(&[&[G, B, R, Y], &[B, Y, G, R], &[Y, R, B, G], &[R, G, Y, B]], 30);
        game.board_mut().set_special(GridPos::new(1, 1), SpecialKind::Rainbow);
        game.board_mut().set_special(GridPos::new(2, 1), SpecialKind::Rainbow);
        game.tap_at(GridPos::new(1, 1));
        game.tap_at(GridPos::new(2, 1));
        run(&mut game);

        let destroyed = &game.animator().destroyed;
        assert!(destroyed.len() >= 16);
        let (a, b) = (GridPos::new(1, 1), GridPos::new(2, 1));
        let distances: Vec<u32> = destroyed[..16]
            .iter()
            .map(|s| s.pos.chebyshev(a).min(s.pos.chebyshev(b)))
            .collect();
        assert!(distances.windows(2).all(|w| w[0] <= w[1]), "{distances:?}");
        assert_eq!(game.moves_remaining(), 29);
    }

    #[test]
    fn test_special_in_match_chains_its_column() {
        let mut game = game(&[&[R, R, R, Y], &[B, G, B, G], &[Y, B, G, B], &[G, Y, Y, R]], 30);
        game.board_mut().set_special(GridPos::new(1, 0), SpecialKind::StripedVertical);
        game.resolve_board();
        run(&mut game);

        let first: HashSet<GridPos> = game.animator().destroyed[..6].iter().map(|s| s.pos).collect();
        let expected: HashSet<GridPos> = [(0, 0), (1, 0), (2, 0), (1, 1), (1, 2), (1, 3)]
            .iter()
            .map(|&(x, y)| GridPos::new(x, y))
            .collect();
        assert_eq!(first, expected);
        assert!(matches!(
            game.animator().effects[0],
            SpecialEffect::Activated {
                special: SpecialKind::StripedVertical,
                ..
            }
        ));
        assert_eq!(game.moves_remaining(), 30);
    }

    #[test]
    fn test_milestone_resets_board_and_celebrates() {
        let board = Board::from_kinds(&[&[R, R, R, Y], &[B, G, B, G], &[Y, B, G, B], &[G, Y, Y, R]], 4, 5);
        let mut game = GameState::with_board(board, &config(30, vec![10]), Recorder::default());
        let events = game.progress_mut().subscribe();
        game.resolve_board();
        run(&mut game);

        assert_eq!(game.animator().celebrations, vec![1]);
        assert!(
            events
                .try_iter()
                .any(|e| matches!(e, ProgressEvent::MilestoneCompleted(data) if data.milestone == 1))
        );
        assert!(game.board().is_full());
        assert!(game.board().index_is_consistent());
        assert!(!game.is_game_over());
    }

    #[test]
    fn test_last_move_ends_game() {
        let mut game = game(&PLAIN, 1);
        game.tap_at(GridPos::new(0, 2));
        game.tap_at(GridPos::new(0, 3));
        run(&mut game);
        assert!(game.is_game_over());
        assert_eq!(game.stage(), Stage::GameOver);

        let before = snapshot(&game);
        game.tap_at(GridPos::new(0, 0));
        assert_eq!(game.selected(), None);
        assert_eq!(snapshot(&game), before);
    }

    #[test]
    fn test_second_tap_elsewhere_moves_selection() {
        let mut game = game(&PLAIN, 30);
        let first = game.board().tile_id_at(GridPos::new(0, 0)).unwrap();
        let second = game.board().tile_id_at(GridPos::new(2, 2)).unwrap();
        game.tap(first);
        assert_eq!(game.stage(), Stage::TileSelected);
        game.tap(second);
        assert_eq!(game.selected(), Some(second));
        assert_eq!(game.board().tile(first).unwrap().state, TileState::Idle);
        assert_eq!(game.board().tile(second).unwrap().state, TileState::Selected);
        game.tap(second);
        assert_eq!(game.selected(), None);
    }

    #[test]
    fn test_stale_selection_aborts_swap() {
        let mut game = game(&PLAIN, 30);
        game.tap_at(GridPos::new(0, 0));
        game.board_mut().clear_tile_at(GridPos::new(0, 0));
        let before = snapshot(&game);
        game.tap_at(GridPos::new(1, 0));
        assert_eq!(game.stage(), Stage::Idle);
        assert_eq!(game.selected(), None);
        assert_eq!(snapshot(&game), before);
        assert_eq!(game.animator().swaps, 0);
        assert_eq!(game.moves_remaining(), 30);
    }

    #[test]
    fn test_input_ignored_while_busy_or_paused() {
        let board = Board::from_kinds(&PLAIN, 4, 11);
        let mut game = GameState::with_board(board, &config(30, vec![1_000_000]), Timeline::new(1.0));
        game.pause();
        game.tap_at(GridPos::new(0, 0));
        assert_eq!(game.selected(), None);
        game.toggle_pause();
        assert!(!game.is_paused());

        game.tap_at(GridPos::new(0, 2));
        game.tap_at(GridPos::new(0, 3));
        assert!(!game.accepts_input());
        game.tap_at(GridPos::new(3, 3));
        assert_eq!(game.selected(), None);

        game.pause();
        game.tick(Duration::from_secs(10));
        assert_eq!(game.stage(), Stage::Swapping);
        game.resume();
        run(&mut game);
        assert_eq!(game.moves_remaining(), 29);
    }

    #[test]
    fn test_rainbow_click_spends_a_move() {
        let mut game = game(&[&[G, B, R, Y], &[B, Y, G, R], &[Y, R, B, G], &[R, G, Y, B]], 30);
        let rainbow = game.board_mut().set_special(GridPos::new(1, 1), SpecialKind::Rainbow);
        game.tap(rainbow);
        game.tap(rainbow);
        run(&mut game);
        assert_eq!(game.moves_remaining(), 29);
        let first: HashSet<TileId> = game.animator().destroyed[..16].iter().map(|s| s.id).collect();
        assert_eq!(first.len(), 16);
        assert!(first.contains(&rainbow));
    }

    #[test]
    fn test_hint_after_idle_delay() {
        let mut game = game(&PLAIN, 30);
        game.resolve_board();
        run(&mut game);
        game.tick(HINT_DELAY - Duration::from_secs(1));
        assert_eq!(game.hint(), None);
        game.tick(Duration::from_secs(1));
        assert_eq!(game.hint(), Some((GridPos::new(0, 2), GridPos::new(0, 3))));
        game.tap_at(GridPos::new(3, 3));
        assert_eq!(game.hint(), None);
    }

    #[test]
    fn test_deadlocked_board_is_shuffled() {
        let mut game = game(&[&[G, R, R, B], &[Y, B, G, Y], &[B, R, Y, G], &[Y, G, B, B]], 30);
        let mut before: Vec<TileId> = game.board().tiles().map(|(_, t)| t.id).collect();
        assert!(!matcher::has_swappable_pair(game.board_mut()));
        game.resolve_board();
        run(&mut game);
        assert!(game.accepts_input());
        assert!(game.board().index_is_consistent());
        if game.animator().destroyed.is_empty() {
            let mut after: Vec<TileId> = game.board().tiles().map(|(_, t)| t.id).collect();
            before.sort();
            after.sort();
            assert_eq!(before, after);
        }
    }

    #[test]
    fn test_unsolvable_board_is_accepted_after_retries() {
        let mut game = game(&[&[R, G], &[B, Y]], 30);
        game.resolve_board();
        run(&mut game);
        assert!(game.accepts_input());
        assert_eq!(game.board().tile_count(), 4);
        assert!(!matcher::has_swappable_pair(game.board_mut()));
    }

    #[test]
    fn test_new_game_resets_everything() {
        let mut game = GameState::new(&GameConfig::default(), Recorder::default());
        run(&mut game);
        game.tap_at(GridPos::new(0, 0));
        game.pause();
        game.new_game();
        run(&mut game);
        assert!(!game.is_paused());
        assert_eq!(game.selected(), None);
        assert!(game.board().is_full());
        assert!(!matcher::has_matches(game.board()));
        assert_eq!(game.moves_remaining(), GameConfig::default().moves);
    }
}
