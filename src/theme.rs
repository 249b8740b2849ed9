//! Colour palettes for candy kinds and UI chrome.

use crate::Palette;
use crate::tile::CandyKind;
use ratatui::style::Color;

/// One Dark based colours for the board and sidebar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Theme {
    /// Candy colours, indexed by `CandyKind::index`.
    pub candy: [Color; 6],
    /// Screen background.
    pub bg: Color,
    /// Background of an empty or idle board cell.
    pub cell_bg: Color,
    /// Grid / border.
    pub div_line: Color,
    /// Text (score, moves).
    pub main_fg: Color,
    /// Highlight / titles.
    pub title: Color,
    /// Secondary text (key hints).
    pub inactive_fg: Color,
    /// Keyboard cursor outline.
    pub cursor: Color,
    /// Background of the selected tile.
    pub selected_bg: Color,
    /// Background of the two hinted tiles.
    pub hint_bg: Color,
    /// Flash colour for blasts and celebrations.
    pub flash: Color,
}

const fn hex(rgb: u32) -> Color {
    Color::Rgb((rgb >> 16) as u8, (rgb >> 8) as u8, rgb as u8)
}

impl Default for Theme {
    fn default() -> Self {
        Self::onedark()
    }
}

impl Theme {
    /// One Dark: the same hex values the btop theme of that name uses.
    pub const fn onedark() -> Self {
        Self {
            candy: [
                hex(0xE0_6C_75), // red
                hex(0xD1_9A_66), // orange
                hex(0xE5_C0_7B), // yellow
                hex(0x98_C3_79), // green
                hex(0x61_AF_EF), // blue
                hex(0xC6_78_DD), // magenta
            ],
            bg: hex(0x28_2C_34),
            cell_bg: hex(0x31_35_3F),
            div_line: hex(0x3F_44_4F),
            main_fg: hex(0xAB_B2_BF),
            title: hex(0xE5_C0_7B),
            inactive_fg: hex(0x5C_63_70),
            cursor: hex(0xFF_FF_FF),
            selected_bg: hex(0x4B_52_63),
            hint_bg: hex(0x3E_4A_3A),
            flash: hex(0xFF_FF_FF),
        }
    }

    pub fn for_palette(palette: Palette) -> Self {
        let mut theme = Self::onedark();
        theme.apply_palette(palette);
        theme
    }

    /// Override candy (and some UI) colours for high-contrast or colorblind.
    pub fn apply_palette(&mut self, palette: Palette) {
        match palette {
            Palette::Normal => {}
            Palette::HighContrast => {
                self.candy = [
                    hex(0xFF_00_00),
                    hex(0xFF_88_00),
                    hex(0xFF_FF_00),
                    hex(0x00_FF_00),
                    hex(0x00_88_FF),
                    hex(0xFF_00_FF),
                ];
                self.bg = Color::Black;
                self.cell_bg = hex(0x12_12_12);
                self.main_fg = Color::White;
                self.selected_bg = hex(0x60_60_60);
            }
            Palette::Colorblind => {
                // Paul Tol's vibrant scheme
                self.candy = [
                    hex(0xCC_33_11),
                    hex(0xEE_77_33),
                    hex(0xBB_BB_00),
                    hex(0x00_99_88),
                    hex(0x00_77_BB),
                    hex(0xEE_33_77),
                ];
            }
        }
    }

    #[inline]
    pub fn candy_color(&self, kind: CandyKind) -> Color {
        self.candy[kind.index()]
    }
}
