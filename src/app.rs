//! App: terminal init, main loop, tick and input handling.

use crate::GameConfig;
use crate::animation::Timeline;
use crate::board::GridPos;
use crate::game::GameState;
use crate::input::{Action, key_to_action};
use crate::progress::ProgressEvent;
use crate::theme::Theme;
use crate::ui::{self, Effects};
use anyhow::Result;
use crossterm::event::{self, Event, KeyEventKind, MouseButton, MouseEvent, MouseEventKind};
use ratatui::DefaultTerminal;
use ratatui::layout::Rect;
use std::sync::mpsc::Receiver;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Target frame time (~60 FPS).
const FRAME_DURATION: Duration = Duration::from_millis(16);
/// Frame time while nothing moves on screen.
const IDLE_FRAME_DURATION: Duration = Duration::from_millis(100);
/// Longest step handed to the game in one frame, so a stalled terminal doesn't skip animations.
const MAX_FRAME_STEP: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Playing,
    GameOver,
}

pub struct App {
    game: GameState<Timeline>,
    theme: Theme,
    screen: Screen,
    /// Keyboard cursor on the board.
    cursor: GridPos,
    effects: Effects,
    events: Receiver<ProgressEvent>,
    /// Last drawn terminal area, for mapping mouse clicks.
    area: Rect,
    last_frame: Instant,
}

fn timeline_for(config: &GameConfig) -> Timeline {
    if config.animate {
        Timeline::new(config.speed)
    } else {
        Timeline::instant()
    }
}

impl App {
    pub fn new(config: GameConfig, theme: Theme) -> Self {
        let mut game = GameState::new(&config, timeline_for(&config));
        let events = game.progress_mut().subscribe();
        Self {
            game,
            theme,
            screen: Screen::Playing,
            cursor: GridPos::new(0, 0),
            effects: Effects::default(),
            events,
            area: Rect::default(),
            last_frame: Instant::now(),
        }
    }

    fn restart(&mut self) {
        self.game.new_game();
        self.effects.clear();
        self.screen = Screen::Playing;
    }

    /// Move the cursor, clamped to the board.
    fn move_cursor(&mut self, dx: i32, dy: i32) {
        let board = self.game.board();
        let next = self.cursor.offset(dx, dy);
        if board.in_bounds(next) {
            self.cursor = next;
        }
    }

    /// Returns false when the app should quit.
    fn apply_action(&mut self, action: Action) -> bool {
        match (self.screen, action) {
            (_, Action::Quit) => return false,
            (_, Action::Restart) => self.restart(),
            (Screen::Playing, Action::Pause) => self.game.toggle_pause(),
            (Screen::Playing, _) if self.game.is_paused() => {}
            (Screen::Playing, Action::MoveLeft) => self.move_cursor(-1, 0),
            (Screen::Playing, Action::MoveRight) => self.move_cursor(1, 0),
            (Screen::Playing, Action::MoveUp) => self.move_cursor(0, -1),
            (Screen::Playing, Action::MoveDown) => self.move_cursor(0, 1),
            (Screen::Playing, Action::Tap) => self.game.tap_at(self.cursor),
            _ => {}
        }
        true
    }

    fn handle_mouse(&mut self, mouse: MouseEvent) {
        if self.screen != Screen::Playing || self.game.is_paused() {
            return;
        }
        if let MouseEventKind::Down(MouseButton::Left) = mouse.kind {
            if let Some(pos) = ui::cell_at(self.area, self.game.board(), mouse.column, mouse.row) {
                self.cursor = pos;
                self.game.tap_at(pos);
            }
        }
    }

    /// Advance the game by the wall time since the last frame and collect its output.
    fn tick(&mut self, now: Instant) -> Duration {
        let dt = now.saturating_duration_since(self.last_frame).min(MAX_FRAME_STEP);
        self.last_frame = now;
        // pausing stops the clock: GameState::tick is a no-op while paused
        self.game.tick(dt);
        for effect in self.game.animator_mut().drain_effects() {
            self.effects.push(effect);
        }
        for event in self.events.try_iter() {
            match event {
                ProgressEvent::MilestoneCompleted(data) => {
                    info!(milestone = data.milestone, total = data.total, "milestone reached");
                }
                ProgressEvent::Updated(data) => {
                    debug!(score = data.score, fraction = data.fraction, "progress");
                }
            }
        }
        if self.screen == Screen::Playing && self.game.is_game_over() {
            self.screen = Screen::GameOver;
        }
        if self.game.is_paused() { Duration::ZERO } else { dt }
    }

    /// Nothing is animating, so frames can be spaced out.
    fn is_still(&self) -> bool {
        (self.game.accepts_input() || self.game.is_paused() || self.game.is_game_over())
            && self.game.animator().is_idle()
            && self.effects.is_empty()
    }

    pub fn run(&mut self) -> Result<()> {
        use crossterm::{
            event::{DisableMouseCapture, EnableMouseCapture},
            execute,
            terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
        };

        enable_raw_mode()?;
        let mut stdout = std::io::stdout();
        execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
        let mut terminal =
            ratatui::DefaultTerminal::new(ratatui::backend::CrosstermBackend::new(stdout))?;

        let result = self.run_loop(&mut terminal);

        // Restore
        execute!(std::io::stdout(), DisableMouseCapture, LeaveAlternateScreen)?;
        disable_raw_mode()?;
        terminal.show_cursor()?;

        result
    }

    fn run_loop(&mut self, terminal: &mut DefaultTerminal) -> Result<()> {
        self.last_frame = Instant::now();
        loop {
            let now = Instant::now();
            let delta = self.tick(now);

            terminal.draw(|f| {
                self.area = f.area();
                ui::draw(
                    f,
                    self.screen,
                    &self.game,
                    &self.theme,
                    self.cursor,
                    &mut self.effects,
                    delta,
                );
            })?;

            let frame = if self.is_still() { IDLE_FRAME_DURATION } else { FRAME_DURATION };
            let timeout = frame.saturating_sub(now.elapsed());
            if event::poll(timeout)? {
                while event::poll(Duration::ZERO)? {
                    match event::read()? {
                        Event::Key(key) if key.kind == KeyEventKind::Press => {
                            if !self.apply_action(key_to_action(key)) {
                                return Ok(());
                            }
                        }
                        Event::Mouse(mouse) => self.handle_mouse(mouse),
                        _ => {}
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::KeyModifiers;

    fn app() -> App {
        let config = GameConfig {
            seed: 11,
            moves: 30,
            animate: false,
            ..GameConfig::default()
        };
        let mut app = App::new(config, Theme::default());
        settle(&mut app);
        app
    }

    fn settle(app: &mut App) {
        for _ in 0..100 {
            if app.game.accepts_input() || app.game.is_game_over() {
                return;
            }
            app.game.tick(Duration::from_millis(16));
        }
    }

    #[test]
    fn test_cursor_stays_on_board() {
        let mut app = app();
        app.apply_action(Action::MoveLeft);
        app.apply_action(Action::MoveUp);
        assert_eq!(app.cursor, GridPos::new(0, 0));
        for _ in 0..20 {
            app.apply_action(Action::MoveRight);
            app.apply_action(Action::MoveDown);
        }
        assert_eq!(app.cursor, GridPos::new(7, 7));
    }

    #[test]
    fn test_tap_selects_tile_under_cursor() {
        let mut app = app();
        app.apply_action(Action::MoveRight);
        app.apply_action(Action::Tap);
        let expected = app.game.board().tile_id_at(GridPos::new(1, 0));
        assert_eq!(app.game.selected(), expected);
    }

    #[test]
    fn test_pause_blocks_cursor_and_quit_stops() {
        let mut app = app();
        assert!(app.apply_action(Action::Pause));
        assert!(app.game.is_paused());
        app.apply_action(Action::MoveRight);
        assert_eq!(app.cursor, GridPos::new(0, 0));
        assert_eq!(app.tick(Instant::now()), Duration::ZERO);
        app.apply_action(Action::Pause);
        assert!(!app.game.is_paused());
        assert!(!app.apply_action(key_to_action(crossterm::event::KeyEvent::new(
            crossterm::event::KeyCode::Char('q'),
            KeyModifiers::NONE,
        ))));
    }

    #[test]
    fn test_mouse_click_taps_cell() {
        let mut app = app();
        app.area = Rect::new(0, 0, 100, 40);
        let rect = ui::board_rect(app.area, app.game.board());
        app.handle_mouse(MouseEvent {
            kind: MouseEventKind::Down(MouseButton::Left),
            column: rect.x + ui::CELL_WIDTH * 2,
            row: rect.y + ui::CELL_HEIGHT,
            modifiers: KeyModifiers::NONE,
        });
        assert_eq!(app.cursor, GridPos::new(2, 1));
        assert_eq!(app.game.selected(), app.game.board().tile_id_at(GridPos::new(2, 1)));
    }

    #[test]
    fn test_restart_from_game_over() {
        let mut app = app();
        app.screen = Screen::GameOver;
        app.apply_action(Action::Restart);
        settle(&mut app);
        assert_eq!(app.screen, Screen::Playing);
        assert_eq!(app.game.moves_remaining(), 30);
    }
}
