//! Interactive progress display.
//!
//! Presentation only: the coordinator hands a [`ProgressSnapshot`] to a
//! [`ProgressDisplay`] every tick. Non-interactive runs use
//! [`HiddenProgress`] and behave identically otherwise.

use std::io::{self, IsTerminal, Write};

use crossterm::cursor::MoveUp;
use crossterm::queue;
use crossterm::style::Print;
use crossterm::terminal::{Clear, ClearType};
use tracing::warn;

/// Width of the bar between the brackets.
const BAR_WIDTH: usize = 10;

/// Progress of one lane at a tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaneProgress {
    /// Lane index.
    pub lane: usize,
    /// Jobs the lane has completed.
    pub completed: usize,
    /// Jobs assigned to the lane.
    pub total: usize,
    /// Human-readable lane status.
    pub status: String,
}

/// Session-wide progress at a tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressSnapshot {
    /// Jobs completed across all lanes.
    pub completed: usize,
    /// Jobs in the session.
    pub total: usize,
    /// Per-lane breakdown.
    pub lanes: Vec<LaneProgress>,
}

impl ProgressSnapshot {
    /// Lines drawn for this snapshot: overall first, then one per lane.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        let mut lines = Vec::with_capacity(self.lanes.len() + 1);
        lines.push(format!(
            "{} Session rendering... [Dataset: {}/{}]",
            render_bar(self.completed, self.total),
            self.completed,
            self.total
        ));
        lines.extend(self.lanes.iter().map(|lane| {
            format!(
                "{} {}/{} {}",
                render_bar(lane.completed, lane.total),
                lane.completed,
                lane.total,
                lane.status
            )
        }));
        lines
    }
}

/// Sink for per-tick progress snapshots.
pub trait ProgressDisplay: Send {
    /// Redraw with the latest snapshot.
    fn update(&mut self, snapshot: &ProgressSnapshot);

    /// Draw the final state and release the display.
    fn finish(&mut self, snapshot: &ProgressSnapshot) {
        self.update(snapshot);
    }
}

/// Display that draws nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct HiddenProgress;

impl ProgressDisplay for HiddenProgress {
    fn update(&mut self, _snapshot: &ProgressSnapshot) {}
}

/// Multi-line display redrawn in place by moving the cursor back over the
/// previous frame.
///
/// Drawing stops after the first write error; the session itself carries on.
#[derive(Debug)]
pub struct TerminalProgress<W: Write + Send> {
    out: W,
    drawn_lines: usize,
    broken: bool,
}

impl<W: Write + Send> TerminalProgress<W> {
    /// Draw to `out`.
    pub fn new(out: W) -> Self {
        Self {
            out,
            drawn_lines: 0,
            broken: false,
        }
    }

    /// Consume the display and return the writer.
    pub fn into_inner(self) -> W {
        self.out
    }

    fn draw(&mut self, lines: &[String]) -> io::Result<()> {
        if let Ok(up) = u16::try_from(self.drawn_lines) {
            if up > 0 {
                queue!(self.out, MoveUp(up))?;
            }
        }
        for line in lines {
            queue!(
                self.out,
                Clear(ClearType::CurrentLine),
                Print(line),
                Print("\n")
            )?;
        }
        self.out.flush()
    }
}

impl<W: Write + Send> ProgressDisplay for TerminalProgress<W> {
    fn update(&mut self, snapshot: &ProgressSnapshot) {
        if self.broken {
            return;
        }
        let lines = snapshot.lines();
        match self.draw(&lines) {
            Ok(()) => self.drawn_lines = lines.len(),
            Err(err) => {
                warn!(%err, "progress display disabled after write failure");
                self.broken = true;
            }
        }
    }
}

/// Whether bars will actually be drawn: requested and stderr is a terminal.
///
/// While this holds, stderr belongs to the display and log output has to go
/// somewhere else.
#[must_use]
pub fn terminal_enabled(requested: bool) -> bool {
    requested && io::stderr().is_terminal()
}

/// Pick a display: bars on an interactive stderr, nothing otherwise.
#[must_use]
pub fn for_stderr(enabled: bool) -> Box<dyn ProgressDisplay> {
    if terminal_enabled(enabled) {
        Box::new(TerminalProgress::new(io::stderr()))
    } else {
        Box::new(HiddenProgress)
    }
}

/// Render `[####------]` for `completed` out of `total`.
#[must_use]
pub fn render_bar(completed: usize, total: usize) -> String {
    let filled = if total == 0 {
        BAR_WIDTH
    } else {
        (completed.min(total) * BAR_WIDTH) / total
    };
    format!(
        "[{}{}]",
        "#".repeat(filled),
        "-".repeat(BAR_WIDTH - filled)
    )
}
