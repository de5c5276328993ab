//! Terminal heatmap sink

use std::io::{self, Stdout, Write};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use crossterm::{
    cursor,
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute, queue,
    style::{Color, Print, ResetColor, SetForegroundColor},
    terminal::{self, Clear, ClearType, EnterAlternateScreen, LeaveAlternateScreen},
};

use crate::spectral::SpectrogramView;

use super::colors::{heat_rgb, normalize};
use super::snapshot::save_snapshot;
use super::{SinkEvent, SpectrogramSink};

/// Rows reserved around the heatmap: one header, one label footer.
const CHROME_ROWS: u16 = 2;

/// Live heatmap in the terminal's alternate screen.
///
/// Cells are `█` glyphs colored on the heat ramp, downsampled to the
/// terminal grid with low frequencies at the bottom. `q`, `Esc`, or
/// `Ctrl+C` cancel the session. The terminal is restored on drop.
pub struct TerminalSink {
    stdout: Stdout,
    title: String,
    session_dir: PathBuf,
}

impl TerminalSink {
    pub fn new(title: String, session_dir: PathBuf) -> Result<Self> {
        let mut stdout = io::stdout();
        terminal::enable_raw_mode()?;
        execute!(stdout, EnterAlternateScreen, cursor::Hide)?;
        Ok(Self {
            stdout,
            title,
            session_dir,
        })
    }
}

impl SpectrogramSink for TerminalSink {
    fn render(&mut self, view: &SpectrogramView<'_>) -> Result<()> {
        let (cols, rows) = terminal::size()?;
        if rows <= CHROME_ROWS || cols < 8 {
            return Ok(());
        }
        let grid_rows = (rows - CHROME_ROWS) as usize;
        let grid_cols = cols as usize;
        let width = view.matrix.width();
        let height = view.matrix.height();
        if width == 0 || height == 0 {
            return Ok(());
        }

        let header = format!(
            "{}  {:.0}-{:.0} Hz  [q] quit",
            self.title, view.min_freq, view.max_freq
        );
        queue!(
            self.stdout,
            cursor::MoveTo(0, 0),
            ResetColor,
            Print(truncate_pad(&header, grid_cols)),
        )?;

        // Heatmap rows; terminal row 1 shows the highest displayed bin.
        for row in 0..grid_rows {
            queue!(self.stdout, cursor::MoveTo(0, (row + 1) as u16))?;
            let bin = ((grid_rows - 1 - row) * height) / grid_rows;
            let mut last_color: Option<(u8, u8, u8)> = None;
            for col in 0..grid_cols {
                let x = (col * width) / grid_cols;
                let t = normalize(view.matrix.column(x)[bin], view.floor, view.ceiling);
                let rgb = heat_rgb(t);
                if last_color != Some(rgb) {
                    let (r, g, b) = rgb;
                    queue!(self.stdout, SetForegroundColor(Color::Rgb { r, g, b }))?;
                    last_color = Some(rgb);
                }
                queue!(self.stdout, Print('█'))?;
            }
        }

        queue!(
            self.stdout,
            cursor::MoveTo(0, rows - 1),
            ResetColor,
            Print(label_line(view.labels, grid_cols)),
            Clear(ClearType::UntilNewLine),
        )?;
        self.stdout.flush()?;
        Ok(())
    }

    fn export_snapshot(&mut self, view: &SpectrogramView<'_>, index: u32) -> Result<()> {
        let path = self.session_dir.join(format!("snapshot_{}.png", index));
        save_snapshot(view, &path)
    }

    fn poll(&mut self, timeout: Duration) -> Result<SinkEvent> {
        if event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    let ctrl_c = key.code == KeyCode::Char('c')
                        && key.modifiers.contains(KeyModifiers::CONTROL);
                    if ctrl_c || matches!(key.code, KeyCode::Char('q') | KeyCode::Esc) {
                        return Ok(SinkEvent::Cancelled);
                    }
                }
            }
        }
        Ok(SinkEvent::Continue)
    }
}

impl Drop for TerminalSink {
    fn drop(&mut self) {
        let _ = execute!(self.stdout, cursor::Show, LeaveAlternateScreen);
        let _ = terminal::disable_raw_mode();
    }
}

/// Truncate or pad `text` to exactly `width` cells.
fn truncate_pad(text: &str, width: usize) -> String {
    let mut out: String = text.chars().take(width).collect();
    while out.chars().count() < width {
        out.push(' ');
    }
    out
}

/// Spread time labels across `width` columns, oldest at the left
/// edge and newest ending at the right edge.
fn label_line(labels: &[String], width: usize) -> String {
    let mut line = vec![' '; width];
    if labels.is_empty() || width < 8 {
        return line.into_iter().collect();
    }
    let slots = (width / 10).max(1).min(labels.len());
    for s in 0..slots {
        let (label_idx, x) = if slots == 1 {
            (labels.len() - 1, 0)
        } else {
            (
                s * (labels.len() - 1) / (slots - 1),
                s * (width - 8) / (slots - 1),
            )
        };
        for (i, ch) in labels[label_idx].chars().enumerate() {
            if x + i < width {
                line[x + i] = ch;
            }
        }
    }
    line.into_iter().collect()
}
