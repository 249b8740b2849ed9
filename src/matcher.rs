//! Match Finder: pattern library, largest-first scan, swappable-pair probe.

use crate::board::{Board, GridPos};
use crate::tile::TileId;
use std::collections::HashSet;

/// Geometry of a match group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchShape {
    Horizontal,
    Vertical,
    TShape,
    LShape,
    Square,
    Complex,
}

/// Named offset pattern. Offsets are relative to the scanned anchor cell; `center` is the
/// index of the offset a special tile is created at. Line patterns carry their axis so a
/// longer run keeps extending past the listed offsets.
#[derive(Debug, Clone, Copy)]
pub struct Pattern {
    pub name: &'static str,
    pub shape: MatchShape,
    pub offsets: &'static [(i32, i32)],
    pub center: usize,
    pub axis: Option<(i32, i32)>,
}

impl Pattern {
    #[inline]
    pub fn size(&self) -> usize {
        self.offsets.len()
    }
}

const fn line(name: &'static str, shape: MatchShape, offsets: &'static [(i32, i32)], axis: (i32, i32)) -> Pattern {
    Pattern {
        name,
        shape,
        offsets,
        center: offsets.len() / 2,
        axis: Some(axis),
    }
}

const fn anchored(name: &'static str, shape: MatchShape, offsets: &'static [(i32, i32)]) -> Pattern {
    Pattern {
        name,
        shape,
        offsets,
        center: 0,
        axis: None,
    }
}

/// Pattern library in descending size order. Scanning strictly in this order means a
/// shape is claimed before any smaller pattern inside it can be.
pub const PATTERNS: &[Pattern] = &[
    line("line5-h", MatchShape::Horizontal, &[(0, 0), (1, 0), (2, 0), (3, 0), (4, 0)], (1, 0)),
    line("line5-v", MatchShape::Vertical, &[(0, 0), (0, 1), (0, 2), (0, 3), (0, 4)], (0, 1)),
    anchored("plus", MatchShape::Complex, &[(0, 0), (-1, 0), (1, 0), (0, -1), (0, 1)]),
    anchored("t-down", MatchShape::TShape, &[(0, 0), (-1, 0), (1, 0), (0, 1), (0, 2)]),
    anchored("t-up", MatchShape::TShape, &[(0, 0), (-1, 0), (1, 0), (0, -1), (0, -2)]),
    anchored("t-right", MatchShape::TShape, &[(0, 0), (0, -1), (0, 1), (1, 0), (2, 0)]),
    anchored("t-left", MatchShape::TShape, &[(0, 0), (0, -1), (0, 1), (-1, 0), (-2, 0)]),
    anchored("l-down-right", MatchShape::LShape, &[(0, 0), (1, 0), (2, 0), (0, 1), (0, 2)]),
    anchored("l-down-left", MatchShape::LShape, &[(0, 0), (-1, 0), (-2, 0), (0, 1), (0, 2)]),
    anchored("l-up-right", MatchShape::LShape, &[(0, 0), (1, 0), (2, 0), (0, -1), (0, -2)]),
    anchored("l-up-left", MatchShape::LShape, &[(0, 0), (-1, 0), (-2, 0), (0, -1), (0, -2)]),
    line("line4-h", MatchShape::Horizontal, &[(0, 0), (1, 0), (2, 0), (3, 0)], (1, 0)),
    line("line4-v", MatchShape::Vertical, &[(0, 0), (0, 1), (0, 2), (0, 3)], (0, 1)),
    anchored("square", MatchShape::Square, &[(0, 0), (1, 0), (0, 1), (1, 1)]),
    line("line3-h", MatchShape::Horizontal, &[(0, 0), (1, 0), (2, 0)], (1, 0)),
    line("line3-v", MatchShape::Vertical, &[(0, 0), (0, 1), (0, 2)], (0, 1)),
];

/// One group found in a single scan. Tiles and positions are parallel, in pattern order
/// followed by any line extension.
#[derive(Debug, Clone)]
pub struct MatchGroup {
    pub tiles: Vec<TileId>,
    pub positions: Vec<GridPos>,
    pub shape: MatchShape,
    pub center: usize,
    pub pattern: &'static str,
}

impl MatchGroup {
    #[inline]
    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn center_tile(&self) -> TileId {
        self.tiles[self.center.min(self.tiles.len().saturating_sub(1))]
    }

    pub fn contains(&self, id: TileId) -> bool {
        self.tiles.contains(&id)
    }
}

/// Scan the board for every match group, largest pattern first. Rainbow tiles never
/// take part; claimed tiles are not reused by later (smaller) patterns.
pub fn find_matches(board: &Board) -> Vec<MatchGroup> {
    let mut claimed: HashSet<GridPos> = HashSet::new();
    let mut groups = Vec::new();

    let mut start = 0;
    while start < PATTERNS.len() {
        let size = PATTERNS[start].size();
        let end = PATTERNS[start..]
            .iter()
            .position(|p| p.size() != size)
            .map_or(PATTERNS.len(), |n| start + n);
        let class = &PATTERNS[start..end];

        for anchor in board.positions() {
            if claimed.contains(&anchor) {
                continue;
            }
            let Some(tile) = board.tile_at(anchor) else {
                continue;
            };
            if tile.is_rainbow() {
                continue;
            }
            let kind = tile.kind;
            let matches_at = |pos: GridPos, claimed: &HashSet<GridPos>| {
                !claimed.contains(&pos)
                    && board
                        .tile_at(pos)
                        .is_some_and(|t| t.kind == kind && !t.is_rainbow())
            };

            for pattern in class {
                let mut positions: Vec<GridPos> = pattern
                    .offsets
                    .iter()
                    .map(|&(dx, dy)| anchor.offset(dx, dy))
                    .collect();
                if !positions.iter().all(|&p| matches_at(p, &claimed)) {
                    continue;
                }
                if let Some((dx, dy)) = pattern.axis {
                    let mut next = positions[positions.len() - 1].offset(dx, dy);
                    while matches_at(next, &claimed) {
                        positions.push(next);
                        next = next.offset(dx, dy);
                    }
                }
                claimed.extend(positions.iter().copied());
                let tiles = positions
                    .iter()
                    .filter_map(|&p| board.tile_id_at(p))
                    .collect();
                groups.push(MatchGroup {
                    tiles,
                    positions,
                    shape: pattern.shape,
                    center: pattern.center,
                    pattern: pattern.name,
                });
                break;
            }
        }
        start = end;
    }
    groups
}

pub fn has_matches(board: &Board) -> bool {
    !find_matches(board).is_empty()
}

/// First adjacent pair (right or down neighbour) whose swap would produce a match.
/// Swaps grid contents only, probes, and swaps back. A pair involving a rainbow tile
/// is always a valid move.
pub fn find_swappable_pair(board: &mut Board) -> Option<(GridPos, GridPos)> {
    let positions: Vec<GridPos> = board.positions().collect();
    for pos in positions {
        let Some(tile) = board.tile_at(pos) else {
            continue;
        };
        let rainbow = tile.is_rainbow();
        for other in [pos.offset(1, 0), pos.offset(0, 1)] {
            let Some(neighbour) = board.tile_at(other) else {
                continue;
            };
            if rainbow || neighbour.is_rainbow() {
                return Some((pos, other));
            }
            board.swap_unindexed(pos, other);
            let found = has_matches(board);
            board.swap_unindexed(pos, other);
            if found {
                return Some((pos, other));
            }
        }
    }
    None
}

pub fn has_swappable_pair(board: &mut Board) -> bool {
    find_swappable_pair(board).is_some()
}
