use std::io::{self, IsTerminal, Write};
use std::sync::Mutex;
use std::time::Instant;

use crossterm::QueueableCommand;
use crossterm::cursor::MoveToColumn;
use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};
use crossterm::terminal::{Clear, ClearType};

use crate::app::{ProgressEvent, ProgressSink, ProgressSinkKind};

pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn event(&self, _event: ProgressEvent) {}
}

/// Rewrites a single status line on stderr. When stderr is not a terminal
/// each event is printed on its own line instead.
pub struct ConsoleProgress {
    kind: ProgressSinkKind,
    started: Instant,
    interactive: bool,
    state: Mutex<bool>,
}

impl ConsoleProgress {
    pub fn new(kind: ProgressSinkKind) -> Self {
        Self {
            kind,
            started: Instant::now(),
            interactive: io::stderr().is_terminal(),
            state: Mutex::new(false),
        }
    }

    /// Ends the status line so later output starts on a fresh line.
    pub fn finish(&self) {
        let Ok(mut dirty) = self.state.lock() else {
            return;
        };
        if *dirty {
            let _ = writeln!(io::stderr());
            *dirty = false;
        }
    }

    fn render(&self, event: &ProgressEvent) -> io::Result<()> {
        let (phase, detail) = parse_phase(&event.message);
        let elapsed = event.elapsed.unwrap_or_else(|| self.started.elapsed());
        let label = match self.kind {
            ProgressSinkKind::Build => "build",
            ProgressSinkKind::Query => "query",
        };
        let mut stderr = io::stderr().lock();
        if self.interactive {
            stderr
                .queue(MoveToColumn(0))?
                .queue(Clear(ClearType::CurrentLine))?
                .queue(SetForegroundColor(Color::Cyan))?
                .queue(Print(format!("[{label} {:>6.1}s] ", elapsed.as_secs_f64())))?
                .queue(SetForegroundColor(phase_color(phase)))?
                .queue(Print(format!("{phase:<8}")))?
                .queue(ResetColor)?
                .queue(Print(truncate(detail, 100)))?;
            stderr.flush()
        } else {
            writeln!(
                stderr,
                "[{label} {:>6.1}s] {phase:<8}{detail}",
                elapsed.as_secs_f64()
            )
        }
    }
}

impl ProgressSink for ConsoleProgress {
    fn event(&self, event: ProgressEvent) {
        if self.render(&event).is_ok() && self.interactive {
            if let Ok(mut dirty) = self.state.lock() {
                *dirty = true;
            }
        }
    }
}

impl Drop for ConsoleProgress {
    fn drop(&mut self) {
        self.finish();
    }
}

/// Splits `phase=<Phase>; <detail>` messages. Messages without a phase
/// are reported under `-`.
pub fn parse_phase(message: &str) -> (&str, &str) {
    match message
        .strip_prefix("phase=")
        .and_then(|rest| rest.split_once(';'))
    {
        Some((phase, detail)) => (phase.trim(), detail.trim()),
        None => ("-", message.trim()),
    }
}

fn phase_color(phase: &str) -> Color {
    match phase {
        "Fetch" => Color::Blue,
        "Resolve" => Color::Magenta,
        "Merge" => Color::Yellow,
        "Store" => Color::Green,
        _ => Color::White,
    }
}

fn truncate(value: &str, max: usize) -> String {
    if value.chars().count() <= max {
        return value.to_string();
    }
    let mut out: String = value.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_prefix() {
        assert_eq!(
            parse_phase("phase=Fetch; downloading https://example.org"),
            ("Fetch", "downloading https://example.org")
        );
        assert_eq!(parse_phase("plain message"), ("-", "plain message"));
    }

    #[test]
    fn long_details_are_truncated() {
        assert_eq!(truncate("abcdef", 4), "abc…");
        assert_eq!(truncate("abc", 4), "abc");
    }
}
