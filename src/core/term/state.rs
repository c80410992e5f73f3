//! Terminal screen state
//!
//! The 2D cell grid, cursor, current attributes, scroll region and
//! alternate screen. Consumes tokens from the parser and mutates state;
//! device queries produce [`Response`] answerbacks for the session to
//! write back to the PTY.

use bitflags::bitflags;
use unicode_width::UnicodeWidthChar;

use super::parser::Token;

/// Response that needs to be sent back to the PTY
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// Cursor position report: ESC [ row ; col R
    CursorPosition(u16, u16),
    /// Device attributes response
    DeviceAttributes,
    /// Secondary device attributes response
    SecondaryDeviceAttributes,
}

impl Response {
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Response::CursorPosition(row, col) => {
                format!("\x1b[{};{}R", row, col).into_bytes()
            }
            // VT220 responses
            Response::DeviceAttributes => b"\x1b[?62;c".to_vec(),
            Response::SecondaryDeviceAttributes => b"\x1b[>1;10;0c".to_vec(),
        }
    }
}

/// Color definition
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Color {
    #[default]
    Default,
    Indexed(u8),
    Rgb(u8, u8, u8),
}

/// xterm's 16-entry base palette.
const BASE_PALETTE: [(u8, u8, u8); 16] = [
    (0x00, 0x00, 0x00),
    (0x80, 0x00, 0x00),
    (0x00, 0x80, 0x00),
    (0x80, 0x80, 0x00),
    (0x00, 0x00, 0x80),
    (0x80, 0x00, 0x80),
    (0x00, 0x80, 0x80),
    (0xc0, 0xc0, 0xc0),
    (0x80, 0x80, 0x80),
    (0xff, 0x00, 0x00),
    (0x00, 0xff, 0x00),
    (0xff, 0xff, 0x00),
    (0x00, 0x00, 0xff),
    (0xff, 0x00, 0xff),
    (0x00, 0xff, 0xff),
    (0xff, 0xff, 0xff),
];

/// Map a palette index to RGB: 0-15 from the base table, 16-231 from the
/// 6x6x6 cube, 232-255 from the 24-step grayscale ramp. Pure and stateless.
pub fn indexed_to_rgb(index: u8) -> (u8, u8, u8) {
    if index < 16 {
        BASE_PALETTE[index as usize]
    } else if index < 232 {
        let i = index - 16;
        let r = (i / 36) * 51;
        let g = ((i % 36) / 6) * 51;
        let b = (i % 6) * 51;
        (r, g, b)
    } else {
        let gray = (8 + u16::from(index - 232) * 10).min(255) as u8;
        (gray, gray, gray)
    }
}

impl Color {
    /// Concrete RGB value, or `None` for the terminal default.
    pub fn to_rgb(self) -> Option<(u8, u8, u8)> {
        match self {
            Color::Default => None,
            Color::Indexed(n) => Some(indexed_to_rgb(n)),
            Color::Rgb(r, g, b) => Some((r, g, b)),
        }
    }

    /// Convert to crossterm color (for downstream renderers)
    pub fn to_crossterm(&self) -> crossterm::style::Color {
        match self {
            Color::Default => crossterm::style::Color::Reset,
            Color::Indexed(n) => crossterm::style::Color::AnsiValue(*n),
            Color::Rgb(r, g, b) => crossterm::style::Color::Rgb {
                r: *r,
                g: *g,
                b: *b,
            },
        }
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct AttrFlags: u16 {
        const BOLD          = 0b0000_0000_0001;
        const DIM           = 0b0000_0000_0010;
        const ITALIC        = 0b0000_0000_0100;
        const UNDERLINE     = 0b0000_0000_1000;
        const BLINK         = 0b0000_0001_0000;
        const REVERSE       = 0b0000_0010_0000;
        const HIDDEN        = 0b0000_0100_0000;
        const STRIKETHROUGH = 0b0000_1000_0000;
    }
}

/// Attributes applied to newly written cells
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CellAttrs {
    pub fg: Color,
    pub bg: Color,
    pub flags: AttrFlags,
}

impl CellAttrs {
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// A single cell
#[derive(Clone, Debug, PartialEq)]
pub struct Cell {
    pub glyph: String,
    pub width: u8,
    pub attrs: CellAttrs,
}

impl Default for Cell {
    fn default() -> Self {
        Self {
            glyph: String::new(),
            width: 1,
            attrs: CellAttrs::default(),
        }
    }
}

impl Cell {
    /// An erased cell: blank glyph carrying the current background color.
    /// Real terminals erase with the background in effect, never black.
    pub fn erased(attrs: &CellAttrs) -> Self {
        Self {
            glyph: String::new(),
            width: 1,
            attrs: CellAttrs {
                fg: Color::Default,
                bg: attrs.bg,
                flags: AttrFlags::empty(),
            },
        }
    }

    pub fn continuation(attrs: &CellAttrs) -> Self {
        Self {
            glyph: String::new(),
            width: 0,
            attrs: attrs.clone(),
        }
    }

    pub fn is_continuation(&self) -> bool {
        self.width == 0
    }

    pub fn is_blank(&self) -> bool {
        self.glyph.is_empty() || self.glyph == " "
    }

    /// Get the display string (space if empty)
    pub fn display_glyph(&self) -> &str {
        if self.glyph.is_empty() {
            " "
        } else {
            &self.glyph
        }
    }

    /// Foreground/background as they should render: reverse video resolves
    /// here by swapping, the stored colors are never mutated.
    pub fn effective_colors(&self) -> (Color, Color) {
        if self.attrs.flags.contains(AttrFlags::REVERSE) {
            (self.attrs.bg, self.attrs.fg)
        } else {
            (self.attrs.fg, self.attrs.bg)
        }
    }
}

/// A single row
#[derive(Clone, Debug, PartialEq)]
pub struct Row {
    pub cells: Vec<Cell>,
}

impl Row {
    pub fn new(cols: u16) -> Self {
        Self {
            cells: vec![Cell::default(); cols as usize],
        }
    }

    /// A row of erased cells carrying the given attributes' background.
    pub fn erased(cols: u16, attrs: &CellAttrs) -> Self {
        Self {
            cells: vec![Cell::erased(attrs); cols as usize],
        }
    }

    pub fn resize(&mut self, new_cols: u16) {
        self.cells.resize(new_cols as usize, Cell::default());
    }

    pub fn clear(&mut self, attrs: &CellAttrs) {
        for cell in &mut self.cells {
            *cell = Cell::erased(attrs);
        }
    }

    pub fn is_blank(&self) -> bool {
        self.cells.iter().all(Cell::is_blank)
    }

    /// Row rendered as plain text, trailing whitespace trimmed.
    pub fn text(&self) -> String {
        let mut line = String::new();
        for cell in &self.cells {
            if !cell.is_continuation() {
                line.push_str(cell.display_glyph());
            }
        }
        line.truncate(line.trim_end().len());
        line
    }
}

/// Cursor state
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CursorState {
    pub row: u16,
    pub col: u16,
    pub visible: bool,
}

impl Default for CursorState {
    fn default() -> Self {
        Self {
            row: 0,
            col: 0,
            visible: true,
        }
    }
}

/// Primary-screen contents parked while the alternate screen is active.
#[derive(Clone, Debug)]
struct SavedScreen {
    grid: Vec<Row>,
    cursor: CursorState,
}

/// Terminal screen buffer: the cell grid plus everything needed to
/// interpret cursor movement, erasing, scrolling and the alternate screen.
pub struct ScreenBuffer {
    rows: u16,
    cols: u16,
    grid: Vec<Row>,
    cursor: CursorState,
    /// CSI s/u and ESC 7/8 slot. Position only; attributes are not
    /// restored (divergence from strict DEC, kept deliberately).
    saved_cursor: Option<(u16, u16)>,
    attrs: CellAttrs,
    scroll_top: u16,
    scroll_bottom: u16,
    tab_stops: Vec<bool>,
    saved_primary: Option<Box<SavedScreen>>,
    in_alt_screen: bool,
    auto_wrap: bool,
    title: String,
}

impl ScreenBuffer {
    pub fn new(rows: u16, cols: u16) -> Self {
        let rows = rows.max(1);
        let cols = cols.max(1);
        Self {
            rows,
            cols,
            grid: (0..rows).map(|_| Row::new(cols)).collect(),
            cursor: CursorState::default(),
            saved_cursor: None,
            attrs: CellAttrs::default(),
            scroll_top: 0,
            scroll_bottom: rows - 1,
            tab_stops: default_tab_stops(cols),
            saved_primary: None,
            in_alt_screen: false,
            auto_wrap: true,
            title: String::new(),
        }
    }

    pub fn rows(&self) -> u16 {
        self.rows
    }

    pub fn cols(&self) -> u16 {
        self.cols
    }

    pub fn cursor(&self) -> &CursorState {
        &self.cursor
    }

    pub fn attrs(&self) -> &CellAttrs {
        &self.attrs
    }

    pub fn in_alt_screen(&self) -> bool {
        self.in_alt_screen
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn cell(&self, row: u16, col: u16) -> Option<&Cell> {
        self.grid
            .get(row as usize)
            .and_then(|r| r.cells.get(col as usize))
    }

    /// Current grid, trimmed of trailing all-blank rows.
    pub fn snapshot(&self) -> Vec<Row> {
        let mut rows = self.grid.clone();
        while rows.last().map_or(false, Row::is_blank) {
            rows.pop();
        }
        rows
    }

    /// Consume one token. Device queries return an answerback.
    pub fn apply(&mut self, token: &Token) -> Option<Response> {
        match token {
            Token::Text(text) => {
                for ch in text.chars() {
                    self.print(ch);
                }
                None
            }
            Token::Control(byte) => {
                match byte {
                    b'\n' => self.line_feed(),
                    b'\r' => self.carriage_return(),
                    b'\t' => self.tab(),
                    0x08 => self.backspace(),
                    _ => {}
                }
                None
            }
            Token::Esc(byte) => {
                match byte {
                    b'7' => self.save_cursor(),
                    b'8' => self.restore_cursor(),
                    // IND - Index
                    b'D' => self.line_feed(),
                    // NEL - Next line
                    b'E' => {
                        self.carriage_return();
                        self.line_feed();
                    }
                    // RI - Reverse index
                    b'M' => self.reverse_index(),
                    // RIS - Full reset
                    b'c' => self.reset(),
                    _ => {}
                }
                None
            }
            Token::Osc(body) => {
                self.apply_osc(body);
                None
            }
            Token::Csi {
                params,
                intermediate,
                final_byte,
            } => self.apply_csi(params, *intermediate, *final_byte),
        }
    }

    // ---- character output ----

    /// Write a character at the cursor with the current attributes.
    pub fn print(&mut self, ch: char) {
        let width = ch.width().unwrap_or(0) as u16;

        if width == 0 {
            // Combining character - append to the previous cell
            self.append_to_previous_cell(ch);
            return;
        }

        // Deferred wrap: the cursor parks at `cols` until the next glyph.
        if self.cursor.col >= self.cols {
            if self.auto_wrap {
                self.cursor.col = 0;
                self.line_feed();
            } else {
                self.cursor.col = self.cols - 1;
            }
        }

        let (row, col) = (self.cursor.row as usize, self.cursor.col as usize);
        self.fix_wide_overwrite(row, col);

        let attrs = self.attrs.clone();
        let cols = self.cols as usize;

        self.grid[row].cells[col] = Cell {
            glyph: ch.to_string(),
            width: width as u8,
            attrs: attrs.clone(),
        };
        if width == 2 && col + 1 < cols {
            self.grid[row].cells[col + 1] = Cell::continuation(&attrs);
        }

        self.cursor.col = (self.cursor.col + width).min(self.cols);
    }

    fn append_to_previous_cell(&mut self, ch: char) {
        let (row, col) = (self.cursor.row as usize, self.cursor.col as usize);
        if col > 0 {
            self.grid[row].cells[col - 1].glyph.push(ch);
        }
    }

    /// Overwriting either half of a wide character blanks the other half.
    fn fix_wide_overwrite(&mut self, row: usize, col: usize) {
        let attrs = self.attrs.clone();
        let cols = self.cols as usize;

        if col > 0 && self.grid[row].cells[col].is_continuation() {
            self.grid[row].cells[col - 1] = Cell::erased(&attrs);
        }
        if self.grid[row].cells[col].width == 2 && col + 1 < cols {
            self.grid[row].cells[col + 1] = Cell::erased(&attrs);
        }
    }

    // ---- cursor motion ----

    pub fn carriage_return(&mut self) {
        self.cursor.col = 0;
    }

    /// Move down one line, scrolling the region when the cursor sits on
    /// its bottom edge.
    pub fn line_feed(&mut self) {
        if self.cursor.row == self.scroll_bottom {
            self.scroll_up(1);
        } else if self.cursor.row < self.rows - 1 {
            self.cursor.row += 1;
        }
    }

    /// Move up one line, scrolling the region down at its top edge.
    pub fn reverse_index(&mut self) {
        if self.cursor.row == self.scroll_top {
            self.scroll_down(1);
        } else {
            self.cursor_up(1);
        }
    }

    pub fn backspace(&mut self) {
        self.cursor.col = self.cursor.col.saturating_sub(1);
    }

    /// Advance to the next tab stop (capped at the last column).
    pub fn tab(&mut self) {
        let cols = self.cols as usize;
        let mut col = self.cursor.col as usize + 1;
        while col < cols && !self.tab_stops[col] {
            col += 1;
        }
        self.cursor.col = col.min(cols - 1) as u16;
    }

    pub fn cursor_up(&mut self, n: u16) {
        self.cursor.row = self.cursor.row.saturating_sub(n);
    }

    pub fn cursor_down(&mut self, n: u16) {
        self.cursor.row = (self.cursor.row + n).min(self.rows - 1);
    }

    pub fn cursor_forward(&mut self, n: u16) {
        self.cursor.col = (self.cursor.col + n).min(self.cols - 1);
    }

    pub fn cursor_back(&mut self, n: u16) {
        self.cursor.col = self.cursor.col.saturating_sub(n);
    }

    /// Set cursor position (1-indexed parameters, clamped to the grid)
    pub fn cursor_position(&mut self, row: u16, col: u16) {
        self.cursor.row = row.saturating_sub(1).min(self.rows - 1);
        self.cursor.col = col.saturating_sub(1).min(self.cols - 1);
    }

    /// CHA - Cursor Character Absolute (1-indexed)
    pub fn cursor_column_absolute(&mut self, col: u16) {
        self.cursor.col = col.saturating_sub(1).min(self.cols - 1);
    }

    /// VPA - Line Position Absolute (1-indexed)
    pub fn line_position_absolute(&mut self, row: u16) {
        self.cursor.row = row.saturating_sub(1).min(self.rows - 1);
    }

    pub fn save_cursor(&mut self) {
        self.saved_cursor = Some((self.cursor.row, self.cursor.col));
    }

    pub fn restore_cursor(&mut self) {
        if let Some((row, col)) = self.saved_cursor {
            self.cursor.row = row.min(self.rows - 1);
            self.cursor.col = col.min(self.cols - 1);
        }
    }

    // ---- scrolling ----

    /// Set scroll region (1-indexed, inclusive); zero selects the default
    /// edge. The cursor homes afterwards.
    pub fn set_scroll_region(&mut self, top: i64, bottom: i64) {
        let top = if top <= 0 { 1 } else { clamp_u16(top) };
        let bottom = if bottom <= 0 || bottom > i64::from(self.rows) {
            self.rows
        } else {
            clamp_u16(bottom)
        };
        let top = top.saturating_sub(1).min(self.rows - 1);
        let bottom = bottom.saturating_sub(1).min(self.rows - 1);
        if top < bottom {
            self.scroll_top = top;
            self.scroll_bottom = bottom;
        }
        self.cursor_position(1, 1);
    }

    pub fn scroll_region(&self) -> (u16, u16) {
        (self.scroll_top, self.scroll_bottom)
    }

    /// Scroll the region up: the top line is discarded, an erased line
    /// (current background) appears at the bottom.
    pub fn scroll_up(&mut self, n: u16) {
        let top = self.scroll_top as usize;
        let bottom = self.scroll_bottom as usize;
        for _ in 0..n {
            self.grid.remove(top);
            self.grid.insert(bottom, Row::erased(self.cols, &self.attrs));
        }
    }

    /// Scroll the region down: the bottom line is discarded, an erased
    /// line appears at the top.
    pub fn scroll_down(&mut self, n: u16) {
        let top = self.scroll_top as usize;
        let bottom = self.scroll_bottom as usize;
        for _ in 0..n {
            self.grid.remove(bottom);
            self.grid.insert(top, Row::erased(self.cols, &self.attrs));
        }
    }

    // ---- erasing ----

    /// ED - Erase in Display. Erased cells take the current background.
    pub fn erase_display(&mut self, mode: i64) {
        let row = self.cursor.row as usize;
        match mode {
            0 => {
                self.erase_line(0);
                for r in (row + 1)..self.rows as usize {
                    self.grid[r].clear(&self.attrs);
                }
            }
            1 => {
                for r in 0..row {
                    self.grid[r].clear(&self.attrs);
                }
                self.erase_line(1);
            }
            2 | 3 => {
                for r in 0..self.rows as usize {
                    self.grid[r].clear(&self.attrs);
                }
            }
            _ => {}
        }
    }

    /// EL - Erase in Line
    pub fn erase_line(&mut self, mode: i64) {
        let row = self.cursor.row as usize;
        let col = self.cursor.col as usize;
        let cols = self.cols as usize;
        let attrs = self.attrs.clone();

        match mode {
            0 => {
                for c in col..cols {
                    self.grid[row].cells[c] = Cell::erased(&attrs);
                }
            }
            1 => {
                for c in 0..=col.min(cols - 1) {
                    self.grid[row].cells[c] = Cell::erased(&attrs);
                }
            }
            2 => self.grid[row].clear(&attrs),
            _ => {}
        }
    }

    /// ICH - shift the rest of the row right, vacated cells erased.
    pub fn insert_chars(&mut self, n: u16) {
        let row = self.cursor.row as usize;
        let col = self.cursor.col as usize;
        let attrs = self.attrs.clone();
        let cells = &mut self.grid[row].cells;
        for _ in 0..n {
            if col < cells.len() {
                cells.pop();
                cells.insert(col, Cell::erased(&attrs));
            }
        }
    }

    /// DCH - shift the rest of the row left, vacated cells erased.
    pub fn delete_chars(&mut self, n: u16) {
        let row = self.cursor.row as usize;
        let col = self.cursor.col as usize;
        let attrs = self.attrs.clone();
        let cells = &mut self.grid[row].cells;
        for _ in 0..n {
            if col < cells.len() {
                cells.remove(col);
                cells.push(Cell::erased(&attrs));
            }
        }
    }

    /// ECH - erase n cells in place, no shifting.
    pub fn erase_chars(&mut self, n: u16) {
        let row = self.cursor.row as usize;
        let col = self.cursor.col as usize;
        let attrs = self.attrs.clone();
        let cells = &mut self.grid[row].cells;
        for i in 0..n as usize {
            if col + i < cells.len() {
                cells[col + i] = Cell::erased(&attrs);
            }
        }
    }

    /// IL - insert blank lines at the cursor, pushing lines out of the
    /// bottom of the scroll region. No-op outside the region.
    pub fn insert_lines(&mut self, n: u16) {
        let row = self.cursor.row;
        if row < self.scroll_top || row > self.scroll_bottom {
            return;
        }
        for _ in 0..n {
            self.grid.remove(self.scroll_bottom as usize);
            self.grid
                .insert(row as usize, Row::erased(self.cols, &self.attrs));
        }
    }

    /// DL - delete lines at the cursor, pulling blank lines in at the
    /// bottom of the scroll region. No-op outside the region.
    pub fn delete_lines(&mut self, n: u16) {
        let row = self.cursor.row;
        if row < self.scroll_top || row > self.scroll_bottom {
            return;
        }
        for _ in 0..n {
            self.grid.remove(row as usize);
            self.grid
                .insert(self.scroll_bottom as usize, Row::erased(self.cols, &self.attrs));
        }
    }

    // ---- SGR ----

    /// Apply SGR parameters left to right, each mutating the current
    /// state incrementally. Bold never promotes 30-37 to the bright row;
    /// it stays a separate attribute flag.
    pub fn apply_sgr(&mut self, params: &[i64]) {
        if params.is_empty() {
            self.attrs.reset();
            return;
        }

        let mut iter = params.iter();
        while let Some(&param) = iter.next() {
            match param {
                0 => self.attrs.reset(),
                1 => self.attrs.flags |= AttrFlags::BOLD,
                2 => self.attrs.flags |= AttrFlags::DIM,
                3 => self.attrs.flags |= AttrFlags::ITALIC,
                4 => self.attrs.flags |= AttrFlags::UNDERLINE,
                5 | 6 => self.attrs.flags |= AttrFlags::BLINK,
                7 => self.attrs.flags |= AttrFlags::REVERSE,
                8 => self.attrs.flags |= AttrFlags::HIDDEN,
                9 => self.attrs.flags |= AttrFlags::STRIKETHROUGH,

                22 => self.attrs.flags &= !(AttrFlags::BOLD | AttrFlags::DIM),
                23 => self.attrs.flags &= !AttrFlags::ITALIC,
                24 => self.attrs.flags &= !AttrFlags::UNDERLINE,
                25 => self.attrs.flags &= !AttrFlags::BLINK,
                27 => self.attrs.flags &= !AttrFlags::REVERSE,
                28 => self.attrs.flags &= !AttrFlags::HIDDEN,
                29 => self.attrs.flags &= !AttrFlags::STRIKETHROUGH,

                30..=37 => self.attrs.fg = Color::Indexed((param - 30) as u8),
                38 => {
                    if let Some(color) = extended_color(&mut iter) {
                        self.attrs.fg = color;
                    }
                }
                39 => self.attrs.fg = Color::Default,

                40..=47 => self.attrs.bg = Color::Indexed((param - 40) as u8),
                48 => {
                    if let Some(color) = extended_color(&mut iter) {
                        self.attrs.bg = color;
                    }
                }
                49 => self.attrs.bg = Color::Default,

                90..=97 => self.attrs.fg = Color::Indexed((param - 90 + 8) as u8),
                100..=107 => self.attrs.bg = Color::Indexed((param - 100 + 8) as u8),

                _ => {}
            }
        }
    }

    // ---- modes and the alternate screen ----

    /// DEC private modes. Display-invisible toggles (cursor visibility,
    /// mouse tracking, bracketed paste) are recognized so they never leak
    /// into the text stream.
    pub fn set_private_mode(&mut self, mode: i64, enable: bool) {
        match mode {
            7 => self.auto_wrap = enable,
            25 => self.cursor.visible = enable,
            47 | 1047 | 1049 => {
                if enable {
                    self.enter_alt_screen();
                } else {
                    self.exit_alt_screen();
                }
            }
            1048 => {
                if enable {
                    self.save_cursor();
                } else {
                    self.restore_cursor();
                }
            }
            // Application cursor keys, mouse tracking, bracketed paste:
            // recognized, nothing to show.
            1 | 12 | 1000 | 1002 | 1003 | 1005 | 1006 | 2004 => {}
            _ => {
                tracing::debug!(mode, enable, "unhandled private mode");
            }
        }
    }

    /// Park the current grid and cursor, then start on a cleared grid.
    /// Idempotent: entering while already in the alternate screen is a
    /// no-op.
    pub fn enter_alt_screen(&mut self) {
        if self.in_alt_screen {
            return;
        }
        self.saved_primary = Some(Box::new(SavedScreen {
            grid: self.grid.clone(),
            cursor: self.cursor,
        }));
        self.grid = (0..self.rows).map(|_| Row::new(self.cols)).collect();
        self.cursor.row = 0;
        self.cursor.col = 0;
        self.in_alt_screen = true;
    }

    /// Restore the parked grid and cursor verbatim; the alternate grid is
    /// discarded. Idempotent.
    pub fn exit_alt_screen(&mut self) {
        if !self.in_alt_screen {
            return;
        }
        if let Some(saved) = self.saved_primary.take() {
            self.grid = saved.grid;
            self.cursor = saved.cursor;
        }
        self.in_alt_screen = false;
    }

    /// RIS - reset to the power-on state, keeping dimensions.
    pub fn reset(&mut self) {
        *self = ScreenBuffer::new(self.rows, self.cols);
    }

    /// Truncate or pad to the new dimensions; existing lines are never
    /// re-wrapped.
    pub fn resize(&mut self, rows: u16, cols: u16) {
        let rows = rows.max(1);
        let cols = cols.max(1);
        resize_grid(&mut self.grid, rows, cols);
        if let Some(saved) = self.saved_primary.as_mut() {
            resize_grid(&mut saved.grid, rows, cols);
            saved.cursor.row = saved.cursor.row.min(rows - 1);
            saved.cursor.col = saved.cursor.col.min(cols - 1);
        }
        self.rows = rows;
        self.cols = cols;
        self.scroll_top = 0;
        self.scroll_bottom = rows - 1;
        self.tab_stops = default_tab_stops(cols);
        self.cursor.row = self.cursor.row.min(rows - 1);
        self.cursor.col = self.cursor.col.min(cols - 1);
    }

    // ---- dispatch ----

    fn apply_csi(
        &mut self,
        params: &[i64],
        intermediate: Option<char>,
        final_byte: char,
    ) -> Option<Response> {
        let private = intermediate == Some('?');
        let gt = intermediate == Some('>');

        let arg = |idx: usize, default: i64| params.get(idx).copied().unwrap_or(default);
        // Count arguments: missing or zero means one.
        let count = arg(0, 1).clamp(1, i64::from(u16::MAX)) as u16;

        match (private, gt, final_byte) {
            // Cursor movement
            (false, false, 'A') => self.cursor_up(count),
            (false, false, 'B') => self.cursor_down(count),
            (false, false, 'C') => self.cursor_forward(count),
            (false, false, 'D') => self.cursor_back(count),
            // CNL / CPL
            (false, false, 'E') => {
                self.cursor_down(count);
                self.carriage_return();
            }
            (false, false, 'F') => {
                self.cursor_up(count);
                self.carriage_return();
            }
            (false, false, 'G') => self.cursor_column_absolute(clamp_u16(arg(0, 1))),
            (false, false, 'H') | (false, false, 'f') => {
                self.cursor_position(clamp_u16(arg(0, 1)), clamp_u16(arg(1, 1)));
            }
            (false, false, 'd') => self.line_position_absolute(clamp_u16(arg(0, 1))),

            // Erase
            (false, false, 'J') => self.erase_display(arg(0, 0)),
            (false, false, 'K') => self.erase_line(arg(0, 0)),

            // Line operations
            (false, false, 'L') => self.insert_lines(count),
            (false, false, 'M') => self.delete_lines(count),

            // Character operations
            (false, false, '@') => self.insert_chars(count),
            (false, false, 'P') => self.delete_chars(count),
            (false, false, 'X') => self.erase_chars(count),

            // Scroll
            (false, false, 'S') => self.scroll_up(count),
            (false, false, 'T') => self.scroll_down(count),

            // Scroll region
            (false, false, 'r') => self.set_scroll_region(arg(0, 0), arg(1, 0)),

            // SGR
            (false, false, 'm') => self.apply_sgr(params),

            // Save/restore cursor
            (false, false, 's') => self.save_cursor(),
            (false, false, 'u') => self.restore_cursor(),

            // Device Status Report
            (false, false, 'n') => {
                if arg(0, 0) == 6 {
                    return Some(Response::CursorPosition(
                        self.cursor.row + 1,
                        self.cursor.col + 1,
                    ));
                }
            }

            // Device Attributes
            (false, false, 'c') => return Some(Response::DeviceAttributes),
            (false, true, 'c') => return Some(Response::SecondaryDeviceAttributes),

            // Private modes
            (true, false, 'h') => {
                for &p in params {
                    self.set_private_mode(p, true);
                }
            }
            (true, false, 'l') => {
                for &p in params {
                    self.set_private_mode(p, false);
                }
            }

            _ => {
                tracing::debug!(
                    ?params,
                    ?intermediate,
                    %final_byte,
                    "unknown CSI sequence"
                );
            }
        }

        None
    }

    /// OSC 0/1/2 set the window title; everything else is dropped.
    fn apply_osc(&mut self, body: &[u8]) {
        let body = String::from_utf8_lossy(body);
        if let Some((code, text)) = body.split_once(';') {
            if matches!(code, "0" | "1" | "2") {
                self.title = text.to_string();
            }
        }
    }
}

fn clamp_u16(value: i64) -> u16 {
    value.clamp(0, i64::from(u16::MAX)) as u16
}

fn default_tab_stops(cols: u16) -> Vec<bool> {
    (0..cols).map(|col| col % 8 == 0).collect()
}

fn resize_grid(grid: &mut Vec<Row>, rows: u16, cols: u16) {
    while grid.len() < rows as usize {
        grid.push(Row::new(cols));
    }
    grid.truncate(rows as usize);
    for row in grid.iter_mut() {
        row.resize(cols);
    }
}

fn extended_color<'a, I>(iter: &mut I) -> Option<Color>
where
    I: Iterator<Item = &'a i64>,
{
    match iter.next() {
        // 256 color: 38;5;N
        Some(5) => iter
            .next()
            .map(|&n| Color::Indexed(n.clamp(0, 255) as u8)),
        // RGB: 38;2;R;G;B
        Some(2) => {
            let r = iter.next().copied().unwrap_or(0).clamp(0, 255) as u8;
            let g = iter.next().copied().unwrap_or(0).clamp(0, 255) as u8;
            let b = iter.next().copied().unwrap_or(0).clamp(0, 255) as u8;
            Some(Color::Rgb(r, g, b))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn print_str(screen: &mut ScreenBuffer, text: &str) {
        for ch in text.chars() {
            screen.print(ch);
        }
    }

    fn glyph_at(screen: &ScreenBuffer, row: u16, col: u16) -> String {
        screen.cell(row, col).unwrap().display_glyph().to_string()
    }

    #[test]
    fn test_print_advances_cursor_monotonically() {
        let mut screen = ScreenBuffer::new(24, 80);
        for i in 1..=80u16 {
            screen.print('x');
            assert_eq!(screen.cursor().col, i);
        }
        // Parked at the edge; the next print wraps.
        assert_eq!(screen.cursor().col, 80);
        screen.print('y');
        assert_eq!(screen.cursor().row, 1);
        assert_eq!(screen.cursor().col, 1);
    }

    #[test]
    fn test_wrap_scrolls_at_region_bottom() {
        let mut screen = ScreenBuffer::new(2, 3);
        print_str(&mut screen, "abcdef");
        // Both rows full; one more glyph pushes the first row out.
        screen.print('g');
        assert_eq!(glyph_at(&screen, 0, 0), "d");
        assert_eq!(glyph_at(&screen, 1, 0), "g");
    }

    #[test]
    fn test_five_lines_into_three_rows() {
        let mut screen = ScreenBuffer::new(3, 10);
        for (i, line) in ["one", "two", "three", "four", "five"].iter().enumerate() {
            if i > 0 {
                screen.carriage_return();
                screen.line_feed();
            }
            print_str(&mut screen, line);
        }
        let rows = screen.snapshot();
        let lines: Vec<String> = rows.iter().map(Row::text).collect();
        assert_eq!(lines, vec!["three", "four", "five"]);
    }

    #[test]
    fn test_erase_uses_current_background() {
        let mut screen = ScreenBuffer::new(4, 4);
        screen.apply_sgr(&[44]);
        screen.erase_display(2);
        let cell = screen.cell(2, 2).unwrap();
        assert_eq!(cell.attrs.bg, Color::Indexed(4));
        assert_eq!(cell.attrs.fg, Color::Default);
        assert!(cell.is_blank());
    }

    #[test]
    fn test_sgr_bold_does_not_promote_to_bright() {
        let mut screen = ScreenBuffer::new(2, 10);
        screen.apply_sgr(&[1, 31]);
        screen.print('A');
        let cell = screen.cell(0, 0).unwrap();
        assert_eq!(cell.attrs.fg, Color::Indexed(1));
        assert!(cell.attrs.flags.contains(AttrFlags::BOLD));

        screen.apply_sgr(&[0]);
        screen.print('B');
        let cell = screen.cell(0, 1).unwrap();
        assert_eq!(cell.attrs.fg, Color::Default);
        assert!(!cell.attrs.flags.contains(AttrFlags::BOLD));
    }

    #[test]
    fn test_sgr_extended_colors() {
        let mut screen = ScreenBuffer::new(2, 10);
        screen.apply_sgr(&[38, 5, 196]);
        assert_eq!(screen.attrs().fg, Color::Indexed(196));
        screen.apply_sgr(&[48, 2, 10, 20, 30]);
        assert_eq!(screen.attrs().bg, Color::Rgb(10, 20, 30));
        screen.apply_sgr(&[39, 49]);
        assert_eq!(screen.attrs().fg, Color::Default);
        assert_eq!(screen.attrs().bg, Color::Default);
    }

    #[test]
    fn test_reverse_resolves_at_render_time() {
        let mut screen = ScreenBuffer::new(2, 10);
        screen.apply_sgr(&[31, 44, 7]);
        screen.print('R');
        let cell = screen.cell(0, 0).unwrap();
        // Stored colors unchanged; the swap happens in effective_colors.
        assert_eq!(cell.attrs.fg, Color::Indexed(1));
        assert_eq!(cell.attrs.bg, Color::Indexed(4));
        assert_eq!(
            cell.effective_colors(),
            (Color::Indexed(4), Color::Indexed(1))
        );
    }

    #[test]
    fn test_alt_screen_round_trip() {
        let mut screen = ScreenBuffer::new(4, 10);
        print_str(&mut screen, "hello");
        screen.enter_alt_screen();
        assert!(screen.in_alt_screen());
        print_str(&mut screen, "world");
        assert_eq!(glyph_at(&screen, 0, 0), "w");
        screen.exit_alt_screen();
        assert!(!screen.in_alt_screen());
        assert_eq!(glyph_at(&screen, 0, 0), "h");
        assert_eq!(screen.cursor().col, 5);
    }

    #[test]
    fn test_enter_alt_screen_is_idempotent() {
        let mut screen = ScreenBuffer::new(4, 10);
        print_str(&mut screen, "keep");
        screen.enter_alt_screen();
        print_str(&mut screen, "alt");
        screen.enter_alt_screen();
        // Second enter must not clear the alternate grid or re-save it.
        assert_eq!(glyph_at(&screen, 0, 0), "a");
        screen.exit_alt_screen();
        assert_eq!(glyph_at(&screen, 0, 0), "k");
        screen.exit_alt_screen();
        assert_eq!(glyph_at(&screen, 0, 0), "k");
    }

    #[test]
    fn test_save_restore_cursor_position_only() {
        let mut screen = ScreenBuffer::new(10, 10);
        screen.cursor_position(3, 4);
        screen.apply_sgr(&[31]);
        screen.save_cursor();
        screen.cursor_position(8, 8);
        screen.apply_sgr(&[0]);
        screen.restore_cursor();
        assert_eq!((screen.cursor().row, screen.cursor().col), (2, 3));
        // Attributes are deliberately not part of the saved state.
        assert_eq!(screen.attrs().fg, Color::Default);
    }

    #[test]
    fn test_scroll_region_confines_scrolling() {
        let mut screen = ScreenBuffer::new(5, 10);
        for row in 0..5 {
            screen.cursor_position(row + 1, 1);
            print_str(&mut screen, &format!("line{}", row));
        }
        // Region rows 2-4 (1-indexed), cursor at region bottom.
        screen.set_scroll_region(2, 4);
        screen.cursor_position(4, 1);
        screen.line_feed();
        let lines: Vec<String> = (0..5)
            .map(|r| {
                (0..10)
                    .map(|c| glyph_at(&screen, r, c))
                    .collect::<String>()
                    .trim_end()
                    .to_string()
            })
            .collect();
        assert_eq!(lines, vec!["line0", "line2", "line3", "", "line4"]);
    }

    #[test]
    fn test_insert_and_delete_chars() {
        let mut screen = ScreenBuffer::new(2, 6);
        print_str(&mut screen, "abcdef");
        screen.cursor_position(1, 2);
        screen.insert_chars(2);
        let line: String = (0..6).map(|c| glyph_at(&screen, 0, c)).collect();
        assert_eq!(line, "a  bcd");
        screen.delete_chars(2);
        let line: String = (0..6).map(|c| glyph_at(&screen, 0, c)).collect();
        assert_eq!(line, "abcd  ");
    }

    #[test]
    fn test_tab_stops_every_eight_columns() {
        let mut screen = ScreenBuffer::new(2, 20);
        screen.tab();
        assert_eq!(screen.cursor().col, 8);
        screen.tab();
        assert_eq!(screen.cursor().col, 16);
        screen.tab();
        assert_eq!(screen.cursor().col, 19);
    }

    #[test]
    fn test_wide_char_continuation() {
        let mut screen = ScreenBuffer::new(2, 10);
        screen.print('漢');
        assert_eq!(screen.cursor().col, 2);
        assert!(screen.cell(0, 1).unwrap().is_continuation());
        // Overwriting the right half blanks the left half.
        screen.cursor_position(1, 2);
        screen.print('x');
        assert!(screen.cell(0, 0).unwrap().is_blank());
    }

    #[test]
    fn test_resize_truncates_and_pads() {
        let mut screen = ScreenBuffer::new(4, 10);
        print_str(&mut screen, "0123456789");
        screen.resize(2, 5);
        assert_eq!(screen.rows(), 2);
        assert_eq!(screen.cols(), 5);
        let line: String = (0..5).map(|c| glyph_at(&screen, 0, c)).collect();
        assert_eq!(line, "01234");
        screen.resize(3, 8);
        assert_eq!(screen.snapshot().len(), 1);
    }

    #[test]
    fn test_device_status_report() {
        let mut screen = ScreenBuffer::new(10, 10);
        screen.cursor_position(5, 7);
        let response = screen.apply(&Token::Csi {
            params: vec![6],
            intermediate: None,
            final_byte: 'n',
        });
        assert_eq!(response, Some(Response::CursorPosition(5, 7)));
        assert_eq!(
            Response::CursorPosition(5, 7).to_bytes(),
            b"\x1b[5;7R".to_vec()
        );
    }

    #[test]
    fn test_osc_sets_title() {
        let mut screen = ScreenBuffer::new(2, 10);
        screen.apply(&Token::Osc(b"0;my session".to_vec()));
        assert_eq!(screen.title(), "my session");
        screen.apply(&Token::Osc(b"52;c;base64junk".to_vec()));
        assert_eq!(screen.title(), "my session");
    }

    #[test]
    fn test_palette_mapping() {
        assert_eq!(indexed_to_rgb(1), (0x80, 0x00, 0x00));
        assert_eq!(indexed_to_rgb(9), (0xff, 0x00, 0x00));
        // Cube corner: 16 is black, 231 is white-ish (255,255,255).
        assert_eq!(indexed_to_rgb(16), (0, 0, 0));
        assert_eq!(indexed_to_rgb(231), (255, 255, 255));
        // Grayscale ramp.
        assert_eq!(indexed_to_rgb(232), (8, 8, 8));
        assert_eq!(indexed_to_rgb(255), (238, 238, 238));
        assert_eq!(Color::Default.to_rgb(), None);
    }
}
