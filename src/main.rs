//! Candytui: match-3 candy puzzle game in the terminal.

mod animation;
mod app;
mod board;
mod game;
mod input;
mod matcher;
mod progress;
mod special;
mod theme;
mod tile;
mod ui;

use anyhow::{Context, Result};
use app::App;
use clap::{Parser, ValueEnum};
use progress::ScoreRules;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use tracing::{Level, info};
use tracing_subscriber::prelude::*;

/// Smallest board that can hold a line of three in both directions.
pub const MIN_BOARD_SIDE: usize = 3;
pub const MAX_BOARD_SIDE: usize = 16;
/// Fewer than three kinds make every board a match; more than the palette has is impossible.
pub const MIN_KINDS: usize = 3;

/// Session options derived from the CLI that affect game behaviour.
#[derive(Debug, Clone, PartialEq)]
pub struct GameConfig {
    pub width: usize,
    pub height: usize,
    /// Number of candy kinds new tiles are drawn from.
    pub kinds: usize,
    pub moves: u32,
    pub seed: u64,
    pub scoring: ScoreRules,
    /// Play animations at all; `false` resolves every completion immediately.
    pub animate: bool,
    /// Animation time scale (2.0 plays twice as fast).
    pub speed: f32,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            width: 8,
            height: 8,
            kinds: 5,
            moves: 30,
            seed: 0,
            scoring: ScoreRules::default(),
            animate: true,
            speed: 1.0,
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("board must be between {min}x{min} and {max}x{max}, got {width}x{height}")]
    BoardSize {
        width: usize,
        height: usize,
        min: usize,
        max: usize,
    },
    #[error("candy kinds must be between {min} and {max}, got {kinds}")]
    Kinds { kinds: usize, min: usize, max: usize },
    #[error("a game needs at least one move")]
    NoMoves,
    #[error("at least one milestone is required")]
    NoMilestones,
    #[error("milestones must be strictly ascending")]
    UnorderedMilestones,
    #[error("animation speed must be a positive number, got {0}")]
    Speed(f32),
}

impl GameConfig {
    pub fn from_args(args: &Args) -> Self {
        Self {
            width: args.width,
            height: args.height,
            kinds: args.kinds,
            moves: args.moves,
            seed: args.seed.unwrap_or_else(rand::random),
            scoring: ScoreRules::default(),
            animate: !args.no_animation,
            speed: args.speed,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let side = MIN_BOARD_SIDE..=MAX_BOARD_SIDE;
        if !side.contains(&self.width) || !side.contains(&self.height) {
            return Err(ConfigError::BoardSize {
                width: self.width,
                height: self.height,
                min: MIN_BOARD_SIDE,
                max: MAX_BOARD_SIDE,
            });
        }
        let max_kinds = tile::CandyKind::ALL.len();
        if !(MIN_KINDS..=max_kinds).contains(&self.kinds) {
            return Err(ConfigError::Kinds {
                kinds: self.kinds,
                min: MIN_KINDS,
                max: max_kinds,
            });
        }
        if self.moves == 0 {
            return Err(ConfigError::NoMoves);
        }
        if self.scoring.milestones.is_empty() {
            return Err(ConfigError::NoMilestones);
        }
        if self.scoring.milestones.windows(2).any(|w| w[0] >= w[1]) {
            return Err(ConfigError::UnorderedMilestones);
        }
        if !(self.speed.is_finite() && self.speed > 0.0) {
            return Err(ConfigError::Speed(self.speed));
        }
        Ok(())
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    if let Some(path) = &args.log_file {
        init_logging(path, args.log_level.into())?;
    }
    let config = GameConfig::from_args(&args);
    config.validate()?;
    info!(seed = config.seed, width = config.width, height = config.height, "starting");
    let theme = theme::Theme::for_palette(args.palette);
    let mut app = App::new(config, theme);
    app.run()?;
    Ok(())
}

/// The terminal belongs to the UI, so logs only ever go to a file.
fn init_logging(path: &Path, level: Level) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("cannot create log file {}", path.display()))?;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(Mutex::new(file)),
        )
        .with(tracing_subscriber::filter::LevelFilter::from_level(level))
        .init();
    Ok(())
}

/// Match-3 candy puzzle game in the terminal.
#[derive(Debug, Parser)]
#[command(
    name = "candytui",
    version,
    about = "Match-3 candy puzzle in the terminal. Swap neighbouring candies to line up three or more.",
    long_about = "Candytui is a terminal match-3 puzzle game.\n\n\
        Swap two neighbouring candies to make a line of three or more of the same kind. \
        Bigger matches and T/L/square shapes leave special candies behind: striped candies \
        clear a row or column, wrapped candies explode twice, bombs clear their surroundings \
        and rainbow candies clear every candy of one kind. Reach the score milestones before \
        your moves run out.\n\n\
        CONTROLS:\n  Arrows / hjkl  Move cursor    Enter / Space  Select / swap\n  \
        Mouse click    Select / swap  P              Pause\n  R              Restart        Q / Esc        Quit\n\n\
        Select a candy, then select a neighbour to swap them. Select a rainbow candy twice to fire it."
)]
pub struct Args {
    /// Board width in columns.
    #[arg(long, default_value = "8", value_name = "COLS")]
    pub width: usize,

    /// Board height in rows.
    #[arg(long, default_value = "8", value_name = "ROWS")]
    pub height: usize,

    /// Number of candy kinds in play (3 to 6). Fewer kinds mean more matches.
    #[arg(short, long, default_value = "5", value_name = "N")]
    pub kinds: usize,

    /// Moves available per game.
    #[arg(short, long, default_value = "30", value_name = "N")]
    pub moves: u32,

    /// Seed for the tile generator. Random if not set.
    #[arg(short, long, value_name = "SEED")]
    pub seed: Option<u64>,

    /// Colour palette: normal, high-contrast, or colorblind.
    #[arg(long, default_value = "normal")]
    pub palette: Palette,

    /// Disable animations (swaps, falls and explosions complete instantly).
    #[arg(long)]
    pub no_animation: bool,

    /// Animation speed multiplier (2.0 = twice as fast).
    #[arg(long, default_value = "1.0", value_name = "FACTOR")]
    pub speed: f32,

    /// Write logs to this file. Nothing is logged without it.
    #[arg(long, value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    /// Log level used with --log-file.
    #[arg(long, default_value = "info")]
    pub log_level: LogLevel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Palette {
    #[default]
    Normal,

    #[value(alias = "highcontrast", alias = "contrast")]
    HighContrast,

    #[value(alias = "colourblind")]
    Colorblind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => Self::ERROR,
            LogLevel::Warn => Self::WARN,
            LogLevel::Info => Self::INFO,
            LogLevel::Debug => Self::DEBUG,
            LogLevel::Trace => Self::TRACE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert_eq!(GameConfig::default().validate(), Ok(()));
    }

    #[test]
    fn test_board_size_limits() {
        let config = GameConfig {
            width: 2,
            ..GameConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::BoardSize { width: 2, .. })));
        let config = GameConfig {
            height: MAX_BOARD_SIDE + 1,
            ..GameConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::BoardSize { .. })));
    }

    #[test]
    fn test_kinds_moves_and_speed_limits() {
        let kinds = |kinds| GameConfig {
            kinds,
            ..GameConfig::default()
        };
        assert!(matches!(kinds(2).validate(), Err(ConfigError::Kinds { .. })));
        assert!(matches!(kinds(7).validate(), Err(ConfigError::Kinds { .. })));
        assert_eq!(kinds(6).validate(), Ok(()));

        let config = GameConfig {
            moves: 0,
            ..GameConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::NoMoves));

        let config = GameConfig {
            speed: 0.0,
            ..GameConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::Speed(0.0)));
    }

    #[test]
    fn test_milestones_must_ascend() {
        let mut config = GameConfig::default();
        config.scoring.milestones = vec![100, 100];
        assert_eq!(config.validate(), Err(ConfigError::UnorderedMilestones));
        config.scoring.milestones.clear();
        assert_eq!(config.validate(), Err(ConfigError::NoMilestones));
    }

    #[test]
    fn test_args_build_config() {
        let args = Args::parse_from([
            "candytui",
            "--width",
            "6",
            "--kinds",
            "4",
            "--seed",
            "7",
            "--no-animation",
            "--palette",
            "contrast",
        ]);
        let config = GameConfig::from_args(&args);
        assert_eq!(config.width, 6);
        assert_eq!(config.height, 8);
        assert_eq!(config.kinds, 4);
        assert_eq!(config.seed, 7);
        assert!(!config.animate);
        assert_eq!(args.palette, Palette::HighContrast);
    }
}
