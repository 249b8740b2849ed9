//! Tiles: candy palette, special power-ups and per-tile interaction state.

use std::fmt;

/// Stable identity of one tile instance. Survives falls, swaps and shuffles until the
/// tile is destroyed; never reused within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileId(pub u64);

impl fmt::Display for TileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Candy kinds (the colour palette). Only the first `GameConfig::kinds` are spawned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CandyKind {
    Red,
    Orange,
    Yellow,
    Green,
    Blue,
    Purple,
}

impl CandyKind {
    pub const ALL: [Self; 6] = [
        Self::Red,
        Self::Orange,
        Self::Yellow,
        Self::Green,
        Self::Blue,
        Self::Purple,
    ];

    /// Index into theme colour tables.
    pub fn index(self) -> usize {
        match self {
            Self::Red => 0,
            Self::Orange => 1,
            Self::Yellow => 2,
            Self::Green => 3,
            Self::Blue => 4,
            Self::Purple => 5,
        }
    }

    /// Glyph for a plain candy of this kind.
    pub fn glyph(self) -> char {
        match self {
            Self::Red => '●',
            Self::Orange => '◆',
            Self::Yellow => '▲',
            Self::Green => '■',
            Self::Blue => '★',
            Self::Purple => '♥',
        }
    }
}

/// Power-up carried by a tile. `Normal` tiles only clear by matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SpecialKind {
    #[default]
    Normal,
    Bomb,
    Rainbow,
    StripedHorizontal,
    StripedVertical,
    Wrapped,
}

impl SpecialKind {
    /// Glyph drawn instead of the candy glyph; `None` for normal tiles.
    pub fn glyph(self) -> Option<char> {
        match self {
            Self::Normal => None,
            Self::Bomb => Some('✹'),
            Self::Rainbow => Some('✦'),
            Self::StripedHorizontal => Some('═'),
            Self::StripedVertical => Some('║'),
            Self::Wrapped => Some('▣'),
        }
    }
}

/// Interaction state shown by the renderer (replaces per-tile state objects).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TileState {
    #[default]
    Idle,
    Selected,
}

/// One grid occupant. Identity lives in `id`.
#[derive(Debug, Clone)]
pub struct Tile {
    pub id: TileId,
    pub kind: CandyKind,
    pub special: SpecialKind,
    pub state: TileState,
}

impl Tile {
    pub fn new(id: TileId, kind: CandyKind) -> Self {
        Self {
            id,
            kind,
            special: SpecialKind::Normal,
            state: TileState::Idle,
        }
    }

    #[inline]
    pub fn is_rainbow(&self) -> bool {
        self.special == SpecialKind::Rainbow
    }

    #[inline]
    pub fn is_special(&self) -> bool {
        self.special != SpecialKind::Normal
    }

    pub fn glyph(&self) -> char {
        self.special.glyph().unwrap_or_else(|| self.kind.glyph())
    }
}
