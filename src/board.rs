//! Board Manager: main grid, off-board reserve, tile arena and tile↔coordinate index.
//!
//! Every mutation of the grid or the reserve goes through this module so the index stays
//! in exact bijection with the occupied cells. Row 0 is the top of the board; reserve
//! tiles are indexed with negative rows (`-1` is the reserve row closest to the board).

use crate::tile::{CandyKind, Tile, TileId};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use thiserror::Error;
use tracing::trace;

/// Cell coordinate. `y < 0` addresses the reserve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GridPos {
    pub x: i32,
    pub y: i32,
}

impl GridPos {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    #[inline]
    pub const fn offset(self, dx: i32, dy: i32) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }

    pub fn manhattan(self, other: Self) -> u32 {
        self.x.abs_diff(other.x) + self.y.abs_diff(other.y)
    }

    pub fn chebyshev(self, other: Self) -> u32 {
        self.x.abs_diff(other.x).max(self.y.abs_diff(other.y))
    }

    #[inline]
    pub const fn is_reserve(self) -> bool {
        self.y < 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BoardError {
    #[error("({x}, {y}) is outside the {width}x{height} board")]
    OutOfBounds {
        x: i32,
        y: i32,
        width: usize,
        height: usize,
    },
    #[error("tile {0} is not on the board")]
    NotOnBoard(TileId),
}

/// A tile travelling from one cell to another. `is_new` tiles come out of the reserve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveTask {
    pub tile: TileId,
    pub from: GridPos,
    pub to: GridPos,
    pub is_new: bool,
}

#[derive(Debug)]
pub struct Board {
    width: usize,
    height: usize,
    reserve_depth: usize,
    /// Number of candy kinds new tiles are drawn from.
    kinds: usize,
    cells: Vec<Option<TileId>>,
    reserve: Vec<Option<TileId>>,
    tiles: HashMap<TileId, Tile>,
    coords: HashMap<TileId, GridPos>,
    next_id: u64,
    rng: StdRng,
}

impl Board {
    /// Empty board; call [`Board::initialize`] to populate it.
    pub fn new(width: usize, height: usize, kinds: usize, seed: u64) -> Self {
        Self {
            width,
            height,
            reserve_depth: height,
            kinds: kinds.clamp(1, CandyKind::ALL.len()),
            cells: vec![None; width * height],
            reserve: vec![None; width * height],
            tiles: HashMap::new(),
            coords: HashMap::new(),
            next_id: 0,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Fill every empty cell and reserve slot with a fresh random tile.
    pub fn initialize(&mut self) {
        for y in 0..self.height as i32 {
            for x in 0..self.width as i32 {
                let pos = GridPos::new(x, y);
                if self.tile_id_at(pos).is_none() {
                    self.create_tile_at(pos);
                }
            }
        }
        self.refill_reserve();
    }

    /// Drop every tile, on board and in reserve.
    pub fn clear(&mut self) {
        self.cells.iter_mut().for_each(|c| *c = None);
        self.reserve.iter_mut().for_each(|c| *c = None);
        self.tiles.clear();
        self.coords.clear();
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn reserve_depth(&self) -> usize {
        self.reserve_depth
    }

    #[inline]
    pub fn in_bounds(&self, pos: GridPos) -> bool {
        pos.x >= 0 && pos.y >= 0 && (pos.x as usize) < self.width && (pos.y as usize) < self.height
    }

    pub fn check_bounds(&self, pos: GridPos) -> Result<(), BoardError> {
        if self.in_bounds(pos) {
            Ok(())
        } else {
            Err(BoardError::OutOfBounds {
                x: pos.x,
                y: pos.y,
                width: self.width,
                height: self.height,
            })
        }
    }

    fn cell_index(&self, pos: GridPos) -> Option<usize> {
        self.in_bounds(pos)
            .then(|| pos.y as usize * self.width + pos.x as usize)
    }

    fn reserve_index(&self, x: i32, row: usize) -> Option<usize> {
        (x >= 0 && (x as usize) < self.width && row < self.reserve_depth)
            .then(|| row * self.width + x as usize)
    }

    /// Every on-board cell, row-major.
    pub fn positions(&self) -> impl Iterator<Item = GridPos> + use<> {
        let (w, h) = (self.width as i32, self.height as i32);
        (0..h).flat_map(move |y| (0..w).map(move |x| GridPos::new(x, y)))
    }

    #[inline]
    pub fn tile_id_at(&self, pos: GridPos) -> Option<TileId> {
        self.cell_index(pos).and_then(|i| self.cells[i])
    }

    pub fn tile_at(&self, pos: GridPos) -> Option<&Tile> {
        self.tile_id_at(pos).and_then(|id| self.tiles.get(&id))
    }

    pub fn tile(&self, id: TileId) -> Option<&Tile> {
        self.tiles.get(&id)
    }

    pub fn tile_mut(&mut self, id: TileId) -> Option<&mut Tile> {
        self.tiles.get_mut(&id)
    }

    /// Indexed coordinate of a tile, on board or in reserve.
    pub fn position(&self, id: TileId) -> Option<GridPos> {
        self.coords.get(&id).copied()
    }

    /// Coordinate of a tile that must currently sit on the board.
    pub fn board_position(&self, id: TileId) -> Result<GridPos, BoardError> {
        match self.position(id) {
            Some(pos) if !pos.is_reserve() => {
                self.check_bounds(pos)?;
                Ok(pos)
            }
            _ => Err(BoardError::NotOnBoard(id)),
        }
    }

    /// True while the tile occupies a board cell (liveness check for stale references).
    pub fn contains(&self, id: TileId) -> bool {
        self.board_position(id).is_ok()
    }

    /// On-board tiles, row-major.
    pub fn tiles(&self) -> impl Iterator<Item = (GridPos, &Tile)> {
        self.positions()
            .filter_map(move |pos| self.tile_at(pos).map(|tile| (pos, tile)))
    }

    #[cfg(test)]
    pub fn tile_count(&self) -> usize {
        self.cells.iter().flatten().count()
    }

    pub fn is_full(&self) -> bool {
        self.cells.iter().all(Option::is_some)
    }

    /// Place `tile` at `pos` (or empty the cell). A tile already indexed elsewhere is
    /// moved; a different tile displaced from `pos` is dropped.
    pub fn set_tile_at(&mut self, pos: GridPos, tile: Option<TileId>) {
        let Some(i) = self.cell_index(pos) else {
            return;
        };
        if let Some(prev) = self.cells[i].take() {
            if Some(prev) != tile {
                self.coords.remove(&prev);
                self.tiles.remove(&prev);
            }
        }
        if let Some(id) = tile {
            if let Some(old) = self.coords.insert(id, pos) {
                if old != pos {
                    self.vacate(old, id);
                }
            }
            self.cells[i] = Some(id);
        }
    }

    fn vacate(&mut self, pos: GridPos, id: TileId) {
        let slot = if pos.is_reserve() {
            let row = (-pos.y - 1) as usize;
            self.reserve_index(pos.x, row)
                .and_then(|i| self.reserve.get_mut(i))
        } else {
            self.cell_index(pos).and_then(|i| self.cells.get_mut(i))
        };
        if let Some(slot) = slot {
            if *slot == Some(id) {
                *slot = None;
            }
        }
    }

    /// Remove the tile at `pos` from grid, index and arena, returning it.
    pub fn clear_tile_at(&mut self, pos: GridPos) -> Option<Tile> {
        let i = self.cell_index(pos)?;
        let id = self.cells[i].take()?;
        self.coords.remove(&id);
        self.tiles.remove(&id)
    }

    fn spawn(&mut self) -> TileId {
        let id = TileId(self.next_id);
        self.next_id += 1;
        let kind = CandyKind::ALL[self.rng.random_range(0..self.kinds)];
        self.tiles.insert(id, Tile::new(id, kind));
        id
    }

    /// Create a fresh random tile at `pos`.
    pub fn create_tile_at(&mut self, pos: GridPos) -> Option<TileId> {
        self.cell_index(pos)?;
        let id = self.spawn();
        self.set_tile_at(pos, Some(id));
        Some(id)
    }

    /// Exchange the contents (and index entries) of two board cells.
    pub fn swap(&mut self, a: GridPos, b: GridPos) -> Result<(), BoardError> {
        self.check_bounds(a)?;
        self.check_bounds(b)?;
        let (Some(ia), Some(ib)) = (self.cell_index(a), self.cell_index(b)) else {
            return Ok(());
        };
        self.cells.swap(ia, ib);
        if let Some(id) = self.cells[ia] {
            self.coords.insert(id, a);
        }
        if let Some(id) = self.cells[ib] {
            self.coords.insert(id, b);
        }
        Ok(())
    }

    /// Exchange cell contents without touching the index. Only for hypothetical-move
    /// probes that swap back before returning.
    pub(crate) fn swap_unindexed(&mut self, a: GridPos, b: GridPos) {
        if let (Some(ia), Some(ib)) = (self.cell_index(a), self.cell_index(b)) {
            self.cells.swap(ia, ib);
        }
    }

    pub fn reserve_tile_at(&self, x: i32, row: usize) -> Option<TileId> {
        self.reserve_index(x, row).and_then(|i| self.reserve[i])
    }

    /// Pull up to `count` tiles out of column `x` of the reserve, closest row first.
    /// The returned tiles are unindexed until the caller places them.
    pub fn take_reserve_for_column(&mut self, x: i32, count: usize) -> Vec<TileId> {
        let mut taken = Vec::with_capacity(count);
        for row in 0..self.reserve_depth {
            if taken.len() == count {
                break;
            }
            let Some(i) = self.reserve_index(x, row) else {
                break;
            };
            if let Some(id) = self.reserve[i].take() {
                self.coords.remove(&id);
                taken.push(id);
            }
        }
        taken
    }

    /// Top the reserve back up to full depth.
    pub fn refill_reserve(&mut self) {
        for row in 0..self.reserve_depth {
            for x in 0..self.width as i32 {
                let Some(i) = self.reserve_index(x, row) else {
                    continue;
                };
                if self.reserve[i].is_none() {
                    let id = self.spawn();
                    self.reserve[i] = Some(id);
                    self.coords.insert(id, GridPos::new(x, -(row as i32) - 1));
                }
            }
        }
    }

    /// Gravity settle: compact every column downward keeping tile order, fill the gaps
    /// from the reserve and top the reserve up again. Returns one task per moved tile;
    /// an already settled board yields none.
    pub fn collapse(&mut self) -> Vec<MoveTask> {
        let (w, h) = (self.width as i32, self.height as i32);
        let mut moves = Vec::new();
        for x in 0..w {
            let column: Vec<(TileId, i32)> = (0..h)
                .rev()
                .filter_map(|y| self.tile_id_at(GridPos::new(x, y)).map(|id| (id, y)))
                .collect();
            if column.len() == self.height {
                continue;
            }
            for y in 0..h {
                if let Some(i) = self.cell_index(GridPos::new(x, y)) {
                    self.cells[i] = None;
                }
            }
            for (i, &(id, from_y)) in column.iter().enumerate() {
                let to = GridPos::new(x, h - 1 - i as i32);
                self.place(to, id);
                if from_y != to.y {
                    moves.push(MoveTask {
                        tile: id,
                        from: GridPos::new(x, from_y),
                        to,
                        is_new: false,
                    });
                }
            }

            let mut filled = column.len() as i32;
            let mut entering = 0;
            while filled < h {
                let fresh = self.take_reserve_for_column(x, (h - filled) as usize);
                if fresh.is_empty() {
                    self.refill_reserve();
                    continue;
                }
                for id in fresh {
                    let to = GridPos::new(x, h - 1 - filled);
                    self.place(to, id);
                    entering += 1;
                    filled += 1;
                    moves.push(MoveTask {
                        tile: id,
                        from: GridPos::new(x, -entering),
                        to,
                        is_new: true,
                    });
                }
            }
        }
        self.refill_reserve();
        trace!(moves = moves.len(), "board collapsed");
        moves
    }

    fn place(&mut self, pos: GridPos, id: TileId) {
        if let Some(i) = self.cell_index(pos) {
            self.cells[i] = Some(id);
            self.coords.insert(id, pos);
        }
    }

    /// Randomly reassign the existing on-board tiles to the occupied cells and rebuild
    /// the index. Returns how many tiles changed cell.
    pub fn shuffle(&mut self) -> usize {
        let occupied: Vec<(GridPos, TileId)> = self
            .positions()
            .filter_map(|pos| self.tile_id_at(pos).map(|id| (pos, id)))
            .collect();
        let mut ids: Vec<TileId> = occupied.iter().map(|&(_, id)| id).collect();
        ids.shuffle(&mut self.rng);

        let mut moved = 0;
        for (&(pos, old), &id) in occupied.iter().zip(&ids) {
            self.place(pos, id);
            if old != id {
                moved += 1;
            }
        }
        moved
    }

    /// Top-left of a cell in world units, relative to the board origin. Reserve rows map
    /// above the board.
    pub fn world_position(&self, pos: GridPos, tile_w: i32, tile_h: i32) -> (i32, i32) {
        (pos.x * tile_w, pos.y * tile_h)
    }

    /// Board cell under a world point, if any.
    pub fn position_at_world(&self, wx: i32, wy: i32, tile_w: i32, tile_h: i32) -> Option<GridPos> {
        if tile_w <= 0 || tile_h <= 0 {
            return None;
        }
        let pos = GridPos::new(wx.div_euclid(tile_w), wy.div_euclid(tile_h));
        self.in_bounds(pos).then_some(pos)
    }

    /// The index holds exactly the occupied board and reserve cells, each at its own
    /// coordinate, and the arena holds exactly the indexed tiles.
    pub fn index_is_consistent(&self) -> bool {
        let mut seen = 0;
        for pos in self.positions() {
            if let Some(id) = self.tile_id_at(pos) {
                seen += 1;
                if self.coords.get(&id) != Some(&pos) || !self.tiles.contains_key(&id) {
                    return false;
                }
            }
        }
        for row in 0..self.reserve_depth {
            for x in 0..self.width as i32 {
                if let Some(id) = self.reserve_tile_at(x, row) {
                    seen += 1;
                    let expected = GridPos::new(x, -(row as i32) - 1);
                    if self.coords.get(&id) != Some(&expected) || !self.tiles.contains_key(&id) {
                        return false;
                    }
                }
            }
        }
        seen == self.coords.len() && seen == self.tiles.len()
    }

    /// Test boards: `rows[y][x]` gives the kind of every cell; the reserve is random.
    #[cfg(test)]
    pub fn from_kinds(rows: &[&[CandyKind]], kinds: usize, seed: u64) -> Self {
        let height = rows.len();
        let width = rows.first().map_or(0, |r| r.len());
        let mut board = Self::new(width, height, kinds, seed);
        for (y, row) in rows.iter().enumerate() {
            for (x, &kind) in row.iter().enumerate() {
                let id = TileId(board.next_id);
                board.next_id += 1;
                board.tiles.insert(id, Tile::new(id, kind));
                board.place(GridPos::new(x as i32, y as i32), id);
            }
        }
        board.refill_reserve();
        board
    }

    #[cfg(test)]
    pub fn set_special(&mut self, pos: GridPos, special: crate::tile::SpecialKind) -> TileId {
        let id = self.tile_id_at(pos).expect("test board cell is occupied");
        if let Some(tile) = self.tiles.get_mut(&id) {
            tile.special = special;
        }
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tile::CandyKind::{Blue as B, Green as G, Red as R};
    use proptest::prelude::*;

    #[test]
    fn test_initialize_fills_board_and_reserve() {
        let mut board = Board::new(8, 8, 5, 7);
        board.initialize();
        assert!(board.is_full());
        assert_eq!(board.tile_count(), 64);
        for x in 0..8 {
            for row in 0..board.reserve_depth() {
                assert!(board.reserve_tile_at(x, row).is_some());
            }
        }
        assert!(board.index_is_consistent());
    }

    #[test]
    fn test_spawns_only_active_kinds() {
        let mut board = Board::new(8, 8, 3, 11);
        board.initialize();
        assert!(
            board
                .tiles()
                .all(|(_, t)| matches!(t.kind, CandyKind::Red | CandyKind::Orange | CandyKind::Yellow))
        );
    }

    #[test]
    fn test_set_and_clear_keep_index() {
        let mut board = Board::from_kinds(&[&[R, G], &[B, R]], 3, 1);
        let id = board.tile_id_at(GridPos::new(0, 0)).unwrap();
        board.set_tile_at(GridPos::new(1, 0), Some(id));
        assert_eq!(board.position(id), Some(GridPos::new(1, 0)));
        assert_eq!(board.tile_id_at(GridPos::new(0, 0)), None);
        assert!(board.index_is_consistent());

        let removed = board.clear_tile_at(GridPos::new(1, 0)).unwrap();
        assert_eq!(removed.id, id);
        assert!(!board.contains(id));
        assert!(board.index_is_consistent());
    }

    #[test]
    fn test_swap_exchanges_cells_and_index() {
        let mut board = Board::from_kinds(&[&[R, G, B]], 3, 1);
        let a = board.tile_id_at(GridPos::new(0, 0)).unwrap();
        let b = board.tile_id_at(GridPos::new(1, 0)).unwrap();
        board.swap(GridPos::new(0, 0), GridPos::new(1, 0)).unwrap();
        assert_eq!(board.position(a), Some(GridPos::new(1, 0)));
        assert_eq!(board.position(b), Some(GridPos::new(0, 0)));
        assert!(board.index_is_consistent());
        assert!(matches!(
            board.swap(GridPos::new(2, 0), GridPos::new(3, 0)),
            Err(BoardError::OutOfBounds { x: 3, .. })
        ));
    }

    #[test]
    fn test_collapse_on_settled_board_is_noop() {
        let mut board = Board::new(6, 6, 4, 3);
        board.initialize();
        assert!(board.collapse().is_empty());
        assert!(board.collapse().is_empty());
    }

    #[test]
    fn test_collapse_preserves_column_order_and_refills() {
        let mut board = Board::from_kinds(&[&[R], &[G], &[B], &[R]], 3, 5);
        let top = board.tile_id_at(GridPos::new(0, 0)).unwrap();
        let second = board.tile_id_at(GridPos::new(0, 1)).unwrap();
        let reserve_front = board.reserve_tile_at(0, 0).unwrap();
        board.clear_tile_at(GridPos::new(0, 2));
        board.clear_tile_at(GridPos::new(0, 3));

        let moves = board.collapse();
        assert_eq!(board.position(top), Some(GridPos::new(0, 2)));
        assert_eq!(board.position(second), Some(GridPos::new(0, 3)));
        assert_eq!(board.position(reserve_front), Some(GridPos::new(0, 1)));
        assert!(board.is_full());
        assert!(board.index_is_consistent());

        let new_tiles: Vec<_> = moves.iter().filter(|m| m.is_new).collect();
        assert_eq!(new_tiles.len(), 2);
        assert_eq!(new_tiles[0].from, GridPos::new(0, -1));
        assert_eq!(new_tiles[0].to, GridPos::new(0, 1));
        assert_eq!(new_tiles[1].from, GridPos::new(0, -2));
        assert_eq!(new_tiles[1].to, GridPos::new(0, 0));
        assert!(board.reserve_tile_at(0, 0).is_some());
    }

    #[test]
    fn test_collapse_refills_an_emptied_column() {
        let mut board = Board::new(3, 5, 4, 9);
        board.initialize();
        for y in 0..5 {
            board.clear_tile_at(GridPos::new(1, y));
        }
        let moves = board.collapse();
        assert_eq!(moves.len(), 5);
        assert!(moves.iter().all(|m| m.is_new && m.to.x == 1));
        assert!(board.is_full());
        assert!(board.index_is_consistent());
    }

    #[test]
    fn test_shuffle_keeps_tile_set() {
        let mut board = Board::new(5, 5, 4, 21);
        board.initialize();
        let cells: HashMap<GridPos, TileId> = board.tiles().map(|(pos, t)| (pos, t.id)).collect();
        let mut before: Vec<_> = cells.values().copied().collect();
        let moved = board.shuffle();
        let changed = board.tiles().filter(|(pos, t)| cells.get(pos) != Some(&t.id)).count();
        assert_eq!(moved, changed);
        let mut after: Vec<_> = board.tiles().map(|(_, t)| t.id).collect();
        before.sort();
        after.sort();
        assert_eq!(before, after);
        assert!(board.index_is_consistent());
    }

    #[test]
    fn test_world_mapping_round_trips_cells() {
        let board = Board::new(8, 8, 4, 0);
        let pos = GridPos::new(3, 5);
        let (wx, wy) = board.world_position(pos, 4, 2);
        assert_eq!((wx, wy), (12, 10));
        assert_eq!(board.position_at_world(wx + 3, wy + 1, 4, 2), Some(pos));
        assert_eq!(board.position_at_world(-1, 0, 4, 2), None);
        assert_eq!(board.world_position(GridPos::new(0, -1), 4, 2), (0, -2));
    }

    proptest! {
        #[test]
        fn prop_index_stays_bijective(
            seed in any::<u64>(),
            ops in proptest::collection::vec((0u8..4, 0i32..64, any::<bool>()), 1..48),
        ) {
            let mut board = Board::new(8, 8, 5, seed);
            board.initialize();
            for (op, cell, horizontal) in ops {
                let pos = GridPos::new(cell % 8, cell / 8);
                match op {
                    0 => {
                        let other = if horizontal { pos.offset(1, 0) } else { pos.offset(0, 1) };
                        let _ = board.swap(pos, other);
                    }
                    1 => {
                        board.clear_tile_at(pos);
                    }
                    2 => {
                        board.collapse();
                    }
                    _ => {
                        board.shuffle();
                    }
                }
                prop_assert!(board.index_is_consistent());
            }
        }
    }
}
