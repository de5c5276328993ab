//! Visualization sinks
//!
//! The pipeline talks to its display through `SpectrogramSink`: draw
//! the current view, export periodic snapshots, and run the event loop
//! for one tick. `TerminalSink` renders a live heatmap into the
//! terminal; `NullSink` is the headless stand-in that still writes
//! snapshots when given a session directory.

mod colors;
mod snapshot;
mod terminal;

pub use snapshot::save_snapshot;
pub use terminal::TerminalSink;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;

use crate::spectral::SpectrogramView;

/// What a poll tick observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkEvent {
    Continue,
    Cancelled,
}

/// Where the pipeline sends the display state.
pub trait SpectrogramSink {
    /// Draw the current sliding buffer.
    fn render(&mut self, view: &SpectrogramView<'_>) -> Result<()>;

    /// Write periodic snapshot `index` for this view.
    fn export_snapshot(&mut self, view: &SpectrogramView<'_>, index: u32) -> Result<()>;

    /// Run the event loop for one tick, waiting at most `timeout`.
    fn poll(&mut self, timeout: Duration) -> Result<SinkEvent>;
}

/// Headless sink: renders nothing and never cancels.
pub struct NullSink {
    session_dir: Option<PathBuf>,
    pub exported: Vec<u32>,
}

impl NullSink {
    pub fn new(session_dir: Option<PathBuf>) -> Self {
        Self {
            session_dir,
            exported: Vec::new(),
        }
    }
}

impl SpectrogramSink for NullSink {
    fn render(&mut self, _view: &SpectrogramView<'_>) -> Result<()> {
        Ok(())
    }

    fn export_snapshot(&mut self, view: &SpectrogramView<'_>, index: u32) -> Result<()> {
        if let Some(dir) = &self.session_dir {
            save_snapshot(view, &dir.join(format!("snapshot_{}.png", index)))?;
        }
        self.exported.push(index);
        Ok(())
    }

    fn poll(&mut self, timeout: Duration) -> Result<SinkEvent> {
        std::thread::sleep(timeout);
        Ok(SinkEvent::Continue)
    }
}
