// Copyright (c) The teststream Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Renders the end-of-run human-readable summary block.

use crate::errors::ConfigError;
use crate::execution::Execution;
use owo_colors::OwoColorize;
use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::str::FromStr;

/// A section of the summary that can be selectively omitted.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub enum SummarySection {
    /// The list of skipped tests.
    Skipped,
    /// The list of failed tests and their captured output.
    Failed,
    /// The list of run errors.
    Errors,
    /// The captured output attached to each failed test.
    Output,
}

impl FromStr for SummarySection {
    type Err = SummarySectionParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input {
            "skipped" => Ok(Self::Skipped),
            "failed" => Ok(Self::Failed),
            "errors" => Ok(Self::Errors),
            "output" => Ok(Self::Output),
            other => Err(SummarySectionParseError(other.to_owned())),
        }
    }
}

/// Error parsing a [`SummarySection`] from a string.
#[derive(Clone, Debug, thiserror::Error)]
#[error("unrecognized summary section `{0}` (expected one of: skipped, failed, errors, output)")]
pub struct SummarySectionParseError(String);

/// Which sections to omit from the rendered summary. Default: none omitted.
#[derive(Clone, Debug, Default)]
pub struct SummaryConfig {
    omit: BTreeSet<SummarySection>,
    color: bool,
}

impl SummaryConfig {
    /// Builds a config from the names of sections to omit, validating each
    /// against the known set at construction time.
    pub fn new(omit: impl IntoIterator<Item = impl AsRef<str>>) -> Result<Self, ConfigError> {
        let mut parsed = BTreeSet::new();
        for raw in omit {
            let raw = raw.as_ref();
            let section = SummarySection::from_str(raw).map_err(|_| ConfigError::UnrecognizedValue {
                option: "summary-kind",
                input: raw.to_owned(),
                known: vec!["skipped", "failed", "errors", "output"],
            })?;
            parsed.insert(section);
        }
        Ok(Self {
            omit: parsed,
            color: false,
        })
    }

    /// Enables ANSI styling of the rendered output. Styling never changes
    /// the underlying text, only the escape sequences wrapped around it.
    pub fn with_color(mut self, color: bool) -> Self {
        self.color = color;
        self
    }

    fn omits(&self, section: SummarySection) -> bool {
        self.omit.contains(&section)
    }
}

/// Renders the summary block for `execution` per `config`.
pub fn render(execution: &Execution, config: &SummaryConfig) -> String {
    let mut out = String::new();

    let total = execution.total();
    let skipped = execution.skipped().len();
    let failed = execution.failed().len();
    let errors = execution.errors().len();

    write!(out, "DONE {total} tests").unwrap();
    if skipped > 0 {
        write!(out, ", {skipped} skipped").unwrap();
    }
    if failed > 0 {
        write!(out, ", {failed} failures").unwrap();
    }
    if errors > 0 {
        write!(out, ", {errors} errors").unwrap();
    }
    writeln!(out, " in {:.3}s", execution.elapsed().as_secs_f64()).unwrap();

    if !config.omits(SummarySection::Failed) {
        for (package, test) in execution.failed() {
            let name = format!("{package}::{}", test.name);
            if config.color {
                writeln!(out, "{}", name.red().bold()).unwrap();
            } else {
                writeln!(out, "{name}").unwrap();
            }
            if !config.omits(SummarySection::Output) {
                for line in test.output_text().lines() {
                    writeln!(out, "    {line}").unwrap();
                }
            }
        }
    }

    if !config.omits(SummarySection::Skipped) {
        for (package, test) in execution.skipped() {
            writeln!(out, "SKIP {package}::{}", test.name).unwrap();
        }
    }

    if !config.omits(SummarySection::Errors) {
        for error in execution.errors() {
            let text = error.text.trim_end_matches('\n');
            if error.looks_like_compile_failure && config.color {
                writeln!(out, "{}", text.red()).unwrap();
            } else {
                writeln!(out, "{text}").unwrap();
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::decode_line;

    fn event(line: &str) -> crate::event::TestEvent {
        match decode_line(line, 1).unwrap() {
            crate::event::DecodedLine::Event(event) => event,
            crate::event::DecodedLine::Raw(_) => panic!("expected an event"),
        }
    }

    #[test]
    fn rejects_unknown_section_names() {
        let err = SummaryConfig::new(["bogus"]).unwrap_err();
        assert!(matches!(err, ConfigError::UnrecognizedValue { .. }));
    }

    #[test]
    fn done_line_omits_zero_counts() {
        let execution = Execution::new();
        let config = SummaryConfig::new(Vec::<&str>::new()).unwrap();
        let rendered = render(&execution, &config);
        assert_eq!(rendered, "DONE 0 tests in 0.000s\n");
    }

    #[test]
    fn failed_test_output_is_indented_and_listed_once() {
        let mut execution = Execution::new();
        execution.add(&event(
            r#"{"time":"2024-01-01T00:00:00Z","action":"run","package":"p","test":"T"}"#,
        ));
        execution.add(&event(
            r#"{"time":"2024-01-01T00:00:00Z","action":"output","package":"p","test":"T","output":"boom\n"}"#,
        ));
        execution.add(&event(
            r#"{"time":"2024-01-01T00:00:00Z","action":"fail","package":"p","test":"T","elapsed":0.0}"#,
        ));

        let config = SummaryConfig::new(Vec::<&str>::new()).unwrap();
        let rendered = render(&execution, &config);
        assert!(rendered.contains("p::T"));
        assert!(rendered.contains("    boom"));
        assert_eq!(rendered.matches("p::T").count(), 1);
    }

    #[test]
    fn omitting_failed_suppresses_the_section() {
        let mut execution = Execution::new();
        execution.add(&event(
            r#"{"time":"2024-01-01T00:00:00Z","action":"fail","package":"p","test":"T","elapsed":0.0}"#,
        ));

        let config = SummaryConfig::new(["failed"]).unwrap();
        let rendered = render(&execution, &config);
        assert!(!rendered.contains("p::T"));
    }
}
