// Copyright (c) The teststream Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The pluggable extension point invoked once per decoded event.

use crate::errors::HandlerError;
use crate::event::TestEvent;
use crate::execution::Execution;
use owo_colors::OwoColorize;
use std::io::Write;

/// Receives each event as it's folded into the [`Execution`], in arrival
/// order.
///
/// A handler sees the event that was just folded and the `Execution` it was
/// folded into, so it can render incrementally (e.g. one dot per completed
/// test) without re-deriving state the scanner already computed. Returning
/// an error aborts the scan; the partial `Execution` is still returned to
/// the caller.
pub trait Handler {
    /// Called once per decoded event, after it has been folded into
    /// `execution`.
    fn on_event(&mut self, event: &TestEvent, execution: &Execution) -> Result<(), HandlerError>;

    /// Called once per line of stderr content, which is never folded into
    /// `Execution` directly as an event (it becomes a run error instead).
    fn on_run_error(&mut self, _line: &str) -> Result<(), HandlerError> {
        Ok(())
    }
}

/// A [`Handler`] that prints one colored character per completed test: a
/// dot for a pass, `F` for a fail, `S` for a skip. Package-level and
/// in-progress events produce no output.
pub struct DotsCompact<W> {
    out: W,
    column: usize,
    width: usize,
}

impl<W: Write> DotsCompact<W> {
    /// Creates a new renderer writing to `out`, wrapping at `width` columns.
    pub fn new(out: W, width: usize) -> Self {
        Self {
            out,
            column: 0,
            width: width.max(1),
        }
    }

    fn emit(&mut self, glyph: &str) -> Result<(), HandlerError> {
        write!(self.out, "{glyph}").map_err(HandlerError::new)?;
        self.column += 1;
        if self.column >= self.width {
            writeln!(self.out).map_err(HandlerError::new)?;
            self.column = 0;
        }
        Ok(())
    }
}

impl<W: Write> Handler for DotsCompact<W> {
    fn on_event(&mut self, event: &TestEvent, _execution: &Execution) -> Result<(), HandlerError> {
        if event.is_package_level() || !event.action.is_terminal() {
            return Ok(());
        }
        match event.action {
            crate::event::Action::Pass => self.emit(&".".to_string()),
            crate::event::Action::Fail => self.emit(&format!("{}", "F".red())),
            crate::event::Action::Skip => self.emit(&format!("{}", "S".yellow())),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::decode_line;

    fn event(line: &str) -> TestEvent {
        match decode_line(line, 1).unwrap() {
            crate::event::DecodedLine::Event(event) => event,
            crate::event::DecodedLine::Raw(_) => panic!("expected an event"),
        }
    }

    #[test]
    fn prints_a_dot_per_pass_and_wraps() {
        let mut buf = Vec::new();
        {
            let mut handler = DotsCompact::new(&mut buf, 2);
            let execution = Execution::new();
            for _ in 0..3 {
                handler
                    .on_event(
                        &event(
                            r#"{"time":"2024-01-01T00:00:00Z","action":"pass","package":"p","test":"T","elapsed":0.0}"#,
                        ),
                        &execution,
                    )
                    .unwrap();
            }
        }
        assert_eq!(String::from_utf8(buf).unwrap(), "..\n.");
    }

    #[test]
    fn package_level_events_produce_no_glyph() {
        let mut buf = Vec::new();
        {
            let mut handler = DotsCompact::new(&mut buf, 80);
            let execution = Execution::new();
            handler
                .on_event(
                    &event(r#"{"time":"2024-01-01T00:00:00Z","action":"pass","package":"p","elapsed":0.0}"#),
                    &execution,
                )
                .unwrap();
        }
        assert!(buf.is_empty());
    }
}
