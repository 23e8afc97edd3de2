// Copyright (c) The teststream Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The line-delimited JSON wire format and its incremental decoder.

use crate::errors::MalformedStreamError;
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// The action reported by a single [`TestEvent`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// A test or package started running.
    Run,
    /// A test was paused (e.g. parallel subtests yielding to each other).
    Pause,
    /// A paused test resumed.
    Cont,
    /// A test or package passed.
    Pass,
    /// A benchmark result was reported.
    Bench,
    /// A test or package failed.
    Fail,
    /// A fragment of captured output.
    Output,
    /// A test or package was skipped.
    Skip,
}

impl Action {
    /// True for the three actions that terminate a test or package.
    pub fn is_terminal(self) -> bool {
        matches!(self, Action::Pass | Action::Fail | Action::Skip)
    }
}

/// One line of the input JSON stream.
///
/// Fields follow the wire format described in the data model: `package` is
/// always present and non-empty, `test` is empty for package-level events,
/// and `elapsed`/`output` are only present on the actions that carry them.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TestEvent {
    /// Timestamp of emission, when the producer sent one. Plain `go test
    /// -json` output omits this field entirely rather than defaulting it.
    #[serde(default)]
    pub time: Option<DateTime<FixedOffset>>,
    /// What happened.
    pub action: Action,
    /// Fully-qualified package identifier.
    pub package: String,
    /// Test identifier; empty for a package-level event, containing `/` for
    /// a subtest.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub test: String,
    /// Seconds elapsed, present on terminal actions.
    #[serde(default, skip_serializing_if = "Option::is_none", with = "elapsed_secs")]
    pub elapsed: Option<Duration>,
    /// Raw text fragment, only present for `output` events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

impl TestEvent {
    /// True if `test` contains a `/`, i.e. this event is about a subtest.
    pub fn is_subtest(&self) -> bool {
        self.test.contains('/')
    }

    /// True if `test` is empty, i.e. this event is about the package itself.
    pub fn is_package_level(&self) -> bool {
        self.test.is_empty()
    }
}

mod elapsed_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub(super) fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(duration) => serializer.serialize_f64(duration.as_secs_f64()),
            None => serializer.serialize_none(),
        }
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        let secs = Option::<f64>::deserialize(deserializer)?;
        Ok(secs.map(Duration::from_secs_f64))
    }
}

/// The result of decoding one line of the stream.
#[derive(Clone, Debug)]
pub enum DecodedLine {
    /// The line decoded into a well-formed event.
    Event(TestEvent),
    /// The line wasn't valid JSON at all; it's surfaced as raw content so
    /// the caller can treat it as a run error rather than a fatal decode
    /// failure.
    Raw(String),
}

/// Decodes a single line of the event stream.
///
/// A line that isn't JSON at all is not an error — it comes back as
/// [`DecodedLine::Raw`]. A line that *is* syntactically JSON but doesn't
/// match the `TestEvent` shape is a [`MalformedStreamError`], per the
/// decoder's contract: forward-compatible with unknown fields, but not with
/// unknown shapes.
pub fn decode_line(line: &str, line_number: usize) -> Result<DecodedLine, MalformedStreamError> {
    if serde_json::from_str::<serde_json::Value>(line).is_err() {
        return Ok(DecodedLine::Raw(line.to_string()));
    }

    serde_json::from_str::<TestEvent>(line)
        .map(DecodedLine::Event)
        .map_err(|source| MalformedStreamError {
            line_number,
            line: line.to_string(),
            source,
        })
}
