//! Layout and drawing: board, in-flight animations, sidebar, pause and game over.

use crate::animation::{Motion, SpecialEffect, Timeline, TileSprite};
use crate::app::Screen;
use crate::board::{Board, GridPos};
use crate::game::{GameState, Stage};
use crate::theme::Theme;
use ratatui::Frame;
use ratatui::buffer::Buffer;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Position, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Clear, Gauge, Paragraph, Widget};
use std::collections::HashSet;
use std::time::Duration;
use tachyonfx::{
    CellFilter, Duration as TfxDuration, Effect, EffectRenderer, Interpolation, fx, ref_count,
};

/// Terminal cells per board cell. The glyph box is `TILE_WIDTH` wide; the rest is gap.
pub const CELL_WIDTH: u16 = 4;
pub const CELL_HEIGHT: u16 = 2;
const TILE_WIDTH: u16 = 3;

const SIDEBAR_WIDTH: u16 = 24;

/// Flash over the cells a special tile hit.
const BLAST_FADE_MS: u32 = 450;
/// Glow over the whole board when a milestone is reached.
const CELEBRATION_FADE_MS: u32 = 1200;

/// Playfield size in terminal cells (border + board) for a board.
fn playfield_size(board: &Board) -> (u16, u16) {
    (
        board.width() as u16 * CELL_WIDTH + 2,
        board.height() as u16 * CELL_HEIGHT + 2,
    )
}

/// Playfield and sidebar rects, centred in `area`.
fn game_layout(area: Rect, board: &Board) -> (Rect, Rect) {
    let (pw, ph) = playfield_size(board);
    let total_w = pw + SIDEBAR_WIDTH;

    let horiz = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Fill(1),
            Constraint::Length(total_w),
            Constraint::Fill(1),
        ])
        .split(area);
    let vert = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Fill(1),
            Constraint::Length(ph),
            Constraint::Fill(1),
        ])
        .split(horiz[1]);
    let inner = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(pw), Constraint::Length(SIDEBAR_WIDTH)])
        .split(vert[1]);
    (inner[0], inner[1])
}

/// Board rect (inside the playfield border) for a given terminal area.
pub fn board_rect(area: Rect, board: &Board) -> Rect {
    let (playfield, _) = game_layout(area, board);
    Rect {
        x: playfield.x + 1,
        y: playfield.y + 1,
        width: (board.width() as u16 * CELL_WIDTH).min(playfield.width.saturating_sub(2)),
        height: (board.height() as u16 * CELL_HEIGHT).min(playfield.height.saturating_sub(2)),
    }
}

/// Board cell under a terminal position (mouse click), if any.
pub fn cell_at(area: Rect, board: &Board, column: u16, row: u16) -> Option<GridPos> {
    let rect = board_rect(area, board);
    if !rect.contains(Position::new(column, row)) {
        return None;
    }
    board.position_at_world(
        i32::from(column) - i32::from(rect.x),
        i32::from(row) - i32::from(rect.y),
        i32::from(CELL_WIDTH),
        i32::from(CELL_HEIGHT),
    )
}

/// Top-left terminal cell for a (possibly fractional) board position; `None` when any part
/// of the glyph box would fall outside the board.
fn tile_origin(rect: Rect, x: f32, y: f32) -> Option<(u16, u16)> {
    let sx = (f32::from(rect.x) + x * f32::from(CELL_WIDTH)).round();
    let sy = (f32::from(rect.y) + y * f32::from(CELL_HEIGHT)).round();
    let right = f32::from(rect.x + rect.width);
    let bottom = f32::from(rect.y + rect.height);
    if sx < f32::from(rect.x) || sy < f32::from(rect.y) || sx + f32::from(TILE_WIDTH) > right || sy >= bottom
    {
        return None;
    }
    Some((sx as u16, sy as u16))
}

/// Buffer (x, y) positions covered by the glyph boxes of on-board `cells`.
fn cell_buffer_positions(board: &Board, rect: Rect, cells: &[GridPos]) -> HashSet<(u16, u16)> {
    let mut set = HashSet::new();
    for &cell in cells.iter().filter(|&&c| board.in_bounds(c)) {
        let (wx, wy) = board.world_position(cell, i32::from(CELL_WIDTH), i32::from(CELL_HEIGHT));
        let (Ok(dx), Ok(dy)) = (u16::try_from(wx), u16::try_from(wy)) else {
            continue;
        };
        let (x0, y0) = (rect.x + dx, rect.y + dy);
        if y0 >= rect.y + rect.height {
            continue;
        }
        for bx in x0..(x0 + TILE_WIDTH).min(rect.x + rect.width) {
            set.insert((bx, y0));
        }
    }
    set
}

fn lerp(from: GridPos, to: GridPos, t: f32) -> (f32, f32) {
    (
        ((to.x - from.x) as f32).mul_add(t, from.x as f32),
        ((to.y - from.y) as f32).mul_add(t, from.y as f32),
    )
}

fn tile_fg(theme: &Theme, sprite: &TileSprite) -> Color {
    if sprite.special == crate::tile::SpecialKind::Rainbow {
        theme.flash
    } else {
        theme.candy_color(sprite.kind)
    }
}

/// One glyph box: `[g]` when the cursor is on it, ` g ` otherwise.
fn draw_tile(buf: &mut Buffer, origin: (u16, u16), glyph: char, fg: Color, bg: Color, cursor: Option<Color>) {
    let (x, y) = origin;
    let style = Style::default().fg(fg).bg(bg).add_modifier(Modifier::BOLD);
    let (left, right) = if cursor.is_some() { ("[", "]") } else { (" ", " ") };
    let edge = Style::default().fg(cursor.unwrap_or(fg)).bg(bg);
    buf[(x, y)].set_symbol(left).set_style(edge);
    buf[(x + 1, y)].set_char(glyph).set_style(style);
    buf[(x + 2, y)].set_symbol(right).set_style(edge);
}

/// tachyonfx effects layered over the board after it is drawn.
#[derive(Default)]
pub struct Effects {
    /// Cells hit by a special tile, waiting for an effect or fading.
    blasts: Vec<(Vec<GridPos>, Option<Effect>)>,
    celebration: Option<(usize, Effect)>,
}

impl Effects {
    pub fn push(&mut self, effect: SpecialEffect) {
        match effect {
            SpecialEffect::Activated { cells, .. } | SpecialEffect::SecondaryWave { cells, .. } => {
                if !cells.is_empty() {
                    self.blasts.push((cells, None));
                }
            }
        }
    }

    pub fn clear(&mut self) {
        self.blasts.clear();
        self.celebration = None;
    }

    pub fn is_empty(&self) -> bool {
        self.blasts.is_empty() && self.celebration.is_none()
    }

    fn render(
        &mut self,
        frame: &mut Frame,
        board: &Board,
        rect: Rect,
        theme: &Theme,
        milestone: Option<usize>,
        delta: TfxDuration,
    ) {
        for (cells, effect) in &mut self.blasts {
            let effect = effect.get_or_insert_with(|| {
                let hit = cell_buffer_positions(board, rect, cells);
                let filter = CellFilter::PositionFn(ref_count(move |pos: Position| hit.contains(&(pos.x, pos.y))));
                fx::fade_from(theme.flash, theme.flash, (BLAST_FADE_MS, Interpolation::QuadOut))
                    .with_filter(filter)
                    .with_area(rect)
            });
            frame.render_effect(effect, rect, delta);
        }
        self.blasts.retain(|(_, effect)| effect.as_ref().is_none_or(|e| !e.done()));

        let fresh = milestone.filter(|&m| self.celebration.as_ref().is_none_or(|(current, _)| *current != m));
        if let Some(m) = fresh {
            let glow = fx::fade_from(theme.title, theme.cell_bg, (CELEBRATION_FADE_MS, Interpolation::SineOut))
                .with_area(rect);
            self.celebration = Some((m, glow));
        }
        if let Some((_, effect)) = &mut self.celebration {
            frame.render_effect(effect, rect, delta);
            if effect.done() && milestone.is_none() {
                self.celebration = None;
            }
        }
    }
}

/// Draw the current screen: board and sidebar, pause or game-over overlay, then effects.
/// `delta` is the time since the previous frame, used to advance tachyonfx effects.
pub fn draw(
    frame: &mut Frame,
    screen: Screen,
    game: &GameState<Timeline>,
    theme: &Theme,
    cursor: GridPos,
    effects: &mut Effects,
    delta: Duration,
) {
    let area = frame.area();
    Block::default()
        .style(Style::default().bg(theme.bg))
        .render(area, frame.buffer_mut());

    let (playfield, sidebar) = game_layout(area, game.board());
    draw_playfield(frame, game, theme, playfield, cursor);
    draw_sidebar(frame, game, theme, sidebar);

    let rect = board_rect(area, game.board());
    let timeline = game.animator();
    if let Some((milestone, _)) = timeline.celebration() {
        draw_celebration(frame, theme, rect, milestone);
    }
    let delta_ms = delta.as_millis().min(u128::from(u32::MAX)) as u32;
    effects.render(
        frame,
        game.board(),
        rect,
        theme,
        timeline.celebration().map(|(m, _)| m),
        TfxDuration::from_millis(delta_ms),
    );

    match screen {
        Screen::Playing if game.is_paused() => draw_pause_overlay(frame, theme, area),
        Screen::Playing => {}
        Screen::GameOver => draw_game_over(frame, game, theme, area),
    }
}

fn stage_label(stage: Stage) -> &'static str {
    match stage {
        Stage::Idle | Stage::TileSelected => "",
        Stage::Swapping | Stage::Resolving | Stage::Falling => "…",
        Stage::Shuffling => "Shuffling",
        Stage::Celebrating => "Milestone!",
        Stage::GameOver => "Game over",
    }
}

fn draw_playfield(frame: &mut Frame, game: &GameState<Timeline>, theme: &Theme, area: Rect, cursor: GridPos) {
    let label = stage_label(game.stage());
    let title = if label.is_empty() {
        " Candytui ".to_string()
    } else {
        format!(" Candytui | {label} ")
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(theme.div_line).bg(theme.bg))
        .title(Span::styled(title, Style::default().fg(theme.title)));
    let inner = block.inner(area);
    block.render(area, frame.buffer_mut());

    let board = game.board();
    let timeline = game.animator();
    let rect = Rect {
        width: (board.width() as u16 * CELL_WIDTH).min(inner.width),
        height: (board.height() as u16 * CELL_HEIGHT).min(inner.height),
        ..inner
    };
    let selected = game.selected().and_then(|id| board.position(id));
    let hint = game.hint();
    let show_cursor = game.accepts_input();
    let buf = frame.buffer_mut();

    for pos in board.positions() {
        let Some(origin) = tile_origin(rect, pos.x as f32, pos.y as f32) else {
            continue;
        };
        let bg = if Some(pos) == selected {
            theme.selected_bg
        } else if hint.is_some_and(|(a, b)| a == pos || b == pos) {
            theme.hint_bg
        } else {
            theme.cell_bg
        };
        let cursor_colour = (show_cursor && pos == cursor).then_some(theme.cursor);
        match board.tile_at(pos) {
            Some(tile) if !timeline.is_animating(tile.id) => {
                let sprite = TileSprite::of(tile, pos);
                draw_tile(buf, origin, sprite.glyph(), tile_fg(theme, &sprite), bg, cursor_colour);
            }
            _ => draw_tile(buf, origin, ' ', theme.main_fg, bg, cursor_colour),
        }
    }

    for tween in timeline.tweens() {
        let t = timeline.progress(tween);
        let sprite = &tween.tile;
        let (x, y, glyph, fg) = match tween.motion {
            Motion::Move { from, to } => {
                let (x, y) = lerp(from, to, t);
                (x, y, sprite.glyph(), tile_fg(theme, sprite))
            }
            Motion::Combine { into } => {
                let (x, y) = lerp(sprite.pos, into, t);
                (x, y, sprite.glyph(), tile_fg(theme, sprite))
            }
            Motion::Destroy => {
                let (glyph, fg) = match t {
                    t if t < 0.4 => (sprite.glyph(), theme.flash),
                    t if t < 0.8 => ('✧', tile_fg(theme, sprite)),
                    _ => ('·', theme.inactive_fg),
                };
                (sprite.pos.x as f32, sprite.pos.y as f32, glyph, fg)
            }
        };
        if let Some(origin) = tile_origin(rect, x, y) {
            draw_tile(buf, origin, glyph, fg, theme.cell_bg, None);
        }
    }
}

fn sidebar_block(theme: &Theme, title: &'static str) -> Block<'static> {
    Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(theme.div_line).bg(theme.bg))
        .title(Span::styled(title, Style::default().fg(theme.title)))
}

fn draw_sidebar(frame: &mut Frame, game: &GameState<Timeline>, theme: &Theme, area: Rect) {
    let title_style = Style::default().fg(theme.title);
    let fg_style = Style::default().fg(theme.main_fg);
    let dim_style = Style::default().fg(theme.inactive_fg);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(5), // Score + milestone gauge
            Constraint::Length(1), // gap
            Constraint::Length(3), // Moves
            Constraint::Length(1), // gap
            Constraint::Length(8), // Keys
        ])
        .split(area);

    // --- Score ---
    let data = game.progress().milestone_data();
    let score_block = sidebar_block(theme, " Score ");
    let score_inner = score_block.inner(chunks[0]);
    score_block.render(chunks[0], frame.buffer_mut());
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Length(1), Constraint::Length(1)])
        .split(score_inner);
    Paragraph::new(Line::from(Span::styled(data.score.to_string(), fg_style)))
        .render(rows[0], frame.buffer_mut());
    let milestone = if data.milestone >= data.total {
        "All milestones".to_string()
    } else {
        format!("Next: {}", data.threshold)
    };
    Paragraph::new(Line::from(vec![
        Span::styled(milestone, title_style),
        Span::styled(format!(" {}/{}", data.milestone, data.total), dim_style),
    ]))
    .render(rows[1], frame.buffer_mut());
    Gauge::default()
        .ratio(f64::from(data.fraction).clamp(0.0, 1.0))
        .label("")
        .gauge_style(Style::default().fg(theme.candy[3]).bg(theme.cell_bg))
        .render(rows[2], frame.buffer_mut());

    // --- Moves ---
    let moves = game.moves_remaining();
    let moves_style = match moves {
        0..=3 => Style::default().fg(Color::Red),
        4..=9 => Style::default().fg(Color::Yellow),
        _ => fg_style,
    };
    let moves_block = sidebar_block(theme, " Moves ");
    let moves_inner = moves_block.inner(chunks[2]);
    moves_block.render(chunks[2], frame.buffer_mut());
    Paragraph::new(Line::from(Span::styled(moves.to_string(), moves_style)))
        .render(moves_inner, frame.buffer_mut());

    // --- Keys ---
    let keys_block = sidebar_block(theme, " Keys ");
    let keys_inner = keys_block.inner(chunks[4]);
    keys_block.render(chunks[4], frame.buffer_mut());
    let key = |k: &'static str, what: &'static str| {
        Line::from(vec![Span::styled(format!("{k:<10}"), title_style), Span::styled(what, dim_style)])
    };
    Paragraph::new(Text::from(vec![
        key("←↓↑→ hjkl", "Move"),
        key("Enter", "Select"),
        key("Click", "Select"),
        key("P", "Pause"),
        key("R", "Restart"),
        key("Q", "Quit"),
    ]))
    .render(keys_inner, frame.buffer_mut());
}

fn centered(area: Rect, width: u16, height: u16) -> Rect {
    Rect {
        x: area.x + area.width.saturating_sub(width) / 2,
        y: area.y + area.height.saturating_sub(height) / 2,
        width: width.min(area.width),
        height: height.min(area.height),
    }
}

fn draw_celebration(frame: &mut Frame, theme: &Theme, rect: Rect, milestone: usize) {
    let banner = centered(rect, rect.width.min(26), 3);
    Clear.render(banner, frame.buffer_mut());
    Paragraph::new(Line::from(Span::styled(
        format!(" Milestone {milestone}! "),
        Style::default().fg(Color::Black).bg(theme.title).add_modifier(Modifier::BOLD),
    )))
    .alignment(Alignment::Center)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(theme.title).bg(theme.bg)),
    )
    .render(banner, frame.buffer_mut());
}

fn draw_pause_overlay(frame: &mut Frame, theme: &Theme, area: Rect) {
    let popup = centered(area, 30, 5);
    let lines = vec![
        Line::from(""),
        Line::from(Span::styled(
            " Paused ",
            Style::default().fg(Color::Black).bg(Color::Yellow),
        )),
        Line::from(""),
        Line::from(Span::styled(
            " P Resume  R Restart  Q Quit ",
            Style::default().fg(theme.main_fg),
        )),
    ];
    Clear.render(popup, frame.buffer_mut());
    Paragraph::new(lines)
        .alignment(Alignment::Center)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(theme.div_line).bg(theme.bg)),
        )
        .render(popup, frame.buffer_mut());
}

fn draw_game_over(frame: &mut Frame, game: &GameState<Timeline>, theme: &Theme, area: Rect) {
    let data = game.progress().milestone_data();
    let fg = Style::default().fg(theme.main_fg);
    let title = if data.milestone >= data.total {
        " All milestones reached! "
    } else {
        " Out of moves "
    };
    let lines = vec![
        Line::from(""),
        Line::from(Span::styled(title, Style::default().fg(Color::White).bg(Color::Red))),
        Line::from(""),
        Line::from(Span::styled(format!(" Score: {} ", data.score), fg)),
        Line::from(Span::styled(
            format!(" Milestones: {} / {} ", data.milestone, data.total),
            fg,
        )),
        Line::from(""),
        Line::from(Span::styled(" R Restart    Q Quit ", fg)),
        Line::from(""),
    ];
    let popup = centered(area, 32, lines.len() as u16 + 2);
    Clear.render(popup, frame.buffer_mut());
    Paragraph::new(lines)
        .alignment(Alignment::Center)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(theme.div_line).bg(theme.bg))
                .title(Span::styled(" Candytui ", Style::default().fg(theme.title))),
        )
        .render(popup, frame.buffer_mut());
}
