//! Special tiles: which match creates which power-up, promoting the surviving tile, and
//! what each power-up hits when it fires.

use crate::animation::{Animator, Barrier, SpecialEffect, TileSprite};
use crate::board::{Board, GridPos};
use crate::matcher::{MatchGroup, MatchShape};
use crate::tile::{CandyKind, SpecialKind, Tile, TileId};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, warn};

pub const BOMB_RADIUS: u32 = 1;
pub const WRAPPED_RADIUS: u32 = 1;
pub const WRAPPED_SECOND_RADIUS: u32 = 2;
pub const WRAPPED_SECOND_WAVE_DELAY: Duration = Duration::from_millis(300);
pub const RAINBOW_CLICK_MAX_EDGES: usize = 5;

/// Power-up a match group creates, if any.
pub fn should_create_special_tile(group: &MatchGroup) -> Option<SpecialKind> {
    let len = group.len();
    if len < 4 {
        return None;
    }
    match group.shape {
        MatchShape::Horizontal | MatchShape::Vertical if len >= 5 => Some(SpecialKind::Rainbow),
        MatchShape::Horizontal => Some(SpecialKind::StripedHorizontal),
        MatchShape::Vertical => Some(SpecialKind::StripedVertical),
        MatchShape::TShape | MatchShape::LShape => Some(SpecialKind::Wrapped),
        MatchShape::Square => Some(SpecialKind::Bomb),
        MatchShape::Complex if len >= 6 => Some(SpecialKind::Rainbow),
        MatchShape::Complex => Some(SpecialKind::Wrapped),
    }
}

/// Promote `source` in place to `kind` and merge every `combined` sprite into it.
///
/// The returned barrier resolves once every combine effect has finished, in whatever
/// order they finish. A source that is no longer on the board is skipped and yields
/// `None`.
pub fn create_special_tile<A: Animator + ?Sized>(
    board: &mut Board,
    animator: &mut A,
    source: TileId,
    kind: SpecialKind,
    combined: &[TileSprite],
) -> Option<Barrier> {
    let pos = match board.board_position(source) {
        Ok(pos) => pos,
        Err(err) => {
            warn!(%err, ?kind, "special tile source vanished, skipping");
            return None;
        }
    };
    let tile = board.tile_mut(source)?;
    tile.special = kind;
    debug!(tile = %source, ?kind, x = pos.x, y = pos.y, combined = combined.len(), "special tile created");

    Some(
        combined
            .iter()
            .map(|sprite| animator.combine(sprite, pos))
            .collect(),
    )
}

/// How a special tile was set off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Removed by a match or caught in another tile's blast.
    Passive,
    /// One of the two tiles the player swapped.
    PlayerSwap,
    /// Tapped again while selected.
    RainbowClick,
}

/// Delayed visual-only blast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecondaryWave {
    pub cells: Vec<GridPos>,
    pub delay: Duration,
}

#[derive(Debug, Clone, Default)]
pub struct Activation {
    /// Tiles to destroy on top of the activated one.
    pub affected: Vec<TileId>,
    pub secondary: Option<SecondaryWave>,
    /// Two rainbows were swapped together: the whole board goes, shell by shell.
    pub double_rainbow: bool,
}

impl Activation {
    /// Cosmetic effects for this activation.
    pub fn effects(&self, board: &Board, origin: GridPos, special: SpecialKind) -> Vec<SpecialEffect> {
        let cells = self
            .affected
            .iter()
            .filter_map(|&id| board.position(id))
            .collect();
        let mut effects = vec![SpecialEffect::Activated {
            origin,
            special,
            cells,
        }];
        if let Some(wave) = &self.secondary {
            effects.push(SpecialEffect::SecondaryWave {
                origin,
                cells: wave.cells.clone(),
                delay: wave.delay,
            });
        }
        effects
    }
}

/// The other half of a player swap, as it was when the swap committed. Earlier removals
/// in the same pass may take the tile itself off the board before its partner fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partner {
    pub id: TileId,
    pub kind: CandyKind,
    pub rainbow: bool,
    pub pos: GridPos,
}

impl Partner {
    pub fn of(tile: &Tile, pos: GridPos) -> Self {
        Self {
            id: tile.id,
            kind: tile.kind,
            rainbow: tile.is_rainbow(),
            pos,
        }
    }
}

/// Tiles a special tile takes with it. Pure query: nothing is removed here.
pub fn activate_special_tile(
    board: &Board,
    tile: TileId,
    partner: Option<Partner>,
    coords: GridPos,
    trigger: Trigger,
) -> Activation {
    let Some(special) = board.tile(tile).map(|t| t.special) else {
        return Activation::default();
    };
    match special {
        SpecialKind::Normal => Activation::default(),
        SpecialKind::Bomb => Activation {
            affected: blast(board, coords, BOMB_RADIUS),
            ..Activation::default()
        },
        SpecialKind::StripedHorizontal => Activation {
            affected: (0..board.width() as i32)
                .filter_map(|x| board.tile_id_at(GridPos::new(x, coords.y)))
                .collect(),
            ..Activation::default()
        },
        SpecialKind::StripedVertical => Activation {
            affected: (0..board.height() as i32)
                .filter_map(|y| board.tile_id_at(GridPos::new(coords.x, y)))
                .collect(),
            ..Activation::default()
        },
        SpecialKind::Wrapped => Activation {
            affected: blast(board, coords, WRAPPED_RADIUS),
            secondary: Some(SecondaryWave {
                cells: area(board, coords, WRAPPED_SECOND_RADIUS).collect(),
                delay: WRAPPED_SECOND_WAVE_DELAY,
            }),
            double_rainbow: false,
        },
        SpecialKind::Rainbow => activate_rainbow(board, partner, coords, trigger),
    }
}

fn activate_rainbow(board: &Board, partner: Option<Partner>, coords: GridPos, trigger: Trigger) -> Activation {
    match trigger {
        Trigger::Passive => Activation::default(),
        Trigger::RainbowClick => Activation {
            affected: spiral_positions(coords, RAINBOW_CLICK_MAX_EDGES)
                .into_iter()
                .filter_map(|pos| board.tile_at(pos))
                .filter(|t| !t.is_rainbow())
                .map(|t| t.id)
                .collect(),
            ..Activation::default()
        },
        Trigger::PlayerSwap => {
            let Some(partner) = partner else {
                return Activation::default();
            };
            if partner.rainbow {
                return Activation {
                    affected: board.tiles().map(|(_, t)| t.id).collect(),
                    secondary: None,
                    double_rainbow: true,
                };
            }
            let kind = partner.kind;
            Activation {
                affected: board
                    .tiles()
                    .filter(|(_, t)| t.kind == kind && !t.is_rainbow())
                    .map(|(_, t)| t.id)
                    .collect(),
                ..Activation::default()
            }
        }
    }
}

fn area(board: &Board, center: GridPos, radius: u32) -> impl Iterator<Item = GridPos> {
    let r = radius as i32;
    (-r..=r)
        .flat_map(move |dy| (-r..=r).map(move |dx| center.offset(dx, dy)))
        .filter(move |&pos| board.in_bounds(pos))
}

/// Occupied, non-rainbow tiles within Chebyshev `radius` of `center`.
fn blast(board: &Board, center: GridPos, radius: u32) -> Vec<TileId> {
    area(board, center, radius)
        .filter_map(|pos| board.tile_at(pos))
        .filter(|t| !t.is_rainbow())
        .map(|t| t.id)
        .collect()
}

/// Square spiral out of `center`: right, down, left, up, the step growing by one every
/// two turns. Yields `max_edges²` cells, starting with `center`; cells off the board are
/// included and left to the caller to filter.
pub fn spiral_positions(center: GridPos, max_edges: usize) -> Vec<GridPos> {
    const TURNS: [(i32, i32); 4] = [(1, 0), (0, 1), (-1, 0), (0, -1)];
    let total = max_edges * max_edges;
    let mut out = Vec::with_capacity(total);
    if total == 0 {
        return out;
    }
    out.push(center);
    let (mut pos, mut step, mut dir) = (center, 1, 0);
    while out.len() < total {
        for _ in 0..2 {
            let (dx, dy) = TURNS[dir % 4];
            for _ in 0..step {
                if out.len() == total {
                    return out;
                }
                pos = pos.offset(dx, dy);
                out.push(pos);
            }
            dir += 1;
        }
        step += 1;
    }
    out
}

/// Every board tile bucketed by Chebyshev distance to the nearer of `a` and `b`, nearest
/// shell first.
pub fn rainbow_waves(board: &Board, a: GridPos, b: GridPos) -> Vec<Vec<TileId>> {
    let mut shells: BTreeMap<u32, Vec<TileId>> = BTreeMap::new();
    for (pos, tile) in board.tiles() {
        let distance = pos.chebyshev(a).min(pos.chebyshev(b));
        shells.entry(distance).or_default().push(tile.id);
    }
    shells.into_values().collect()
}
