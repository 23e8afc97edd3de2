// Copyright (c) The teststream Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced while decoding, scanning, and emitting test events.

use std::io;
use thiserror::Error;

/// An error that occurs while decoding a single line of the event stream.
///
/// This is only ever returned for a line that *is* syntactically JSON but
/// whose shape doesn't match [`TestEvent`](crate::event::TestEvent) — an
/// unparseable line is not an error, it's a run error (see
/// [`Execution`](crate::execution::Execution)).
#[derive(Debug, Error)]
#[error("malformed test event on line {line_number}: {source}")]
pub struct MalformedStreamError {
    /// The 1-based line number within the stream.
    pub line_number: usize,
    /// The raw line that failed to decode as a `TestEvent`.
    pub line: String,
    /// The underlying JSON error.
    #[source]
    pub source: serde_json::Error,
}

/// An error returned by a [`Handler`](crate::handler::Handler) while
/// processing an event.
#[derive(Debug, Error)]
#[error("handler failed while processing event")]
pub struct HandlerError {
    #[source]
    source: Box<dyn std::error::Error + Send + Sync + 'static>,
}

impl HandlerError {
    /// Wraps an arbitrary handler error.
    pub fn new(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self {
            source: Box::new(source),
        }
    }
}

/// An error returned by [`Scanner::scan`](crate::scan::Scanner::scan).
///
/// A `ScanError` is always accompanied by the partial [`Execution`] built up
/// to the point of failure — see the return type of `scan`.
///
/// [`Execution`]: crate::execution::Execution
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ScanError {
    /// A line on stdout didn't decode into a `TestEvent`.
    #[error(transparent)]
    Decode(#[from] MalformedStreamError),

    /// Reading from stdout or stderr failed.
    #[error("I/O error reading from child process")]
    Io(#[source] io::Error),

    /// The handler returned an error while processing an event.
    #[error(transparent)]
    Handler(#[from] HandlerError),

    /// The scan was canceled before both streams were drained.
    #[error("scan canceled")]
    Canceled,
}

/// An error returned while constructing a [`JunitConfig`](crate::junit::JunitConfig)
/// or [`SummaryConfig`](crate::summary::SummaryConfig) from caller-supplied options.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// An enum value wasn't one of the recognized options.
    #[error("unrecognized value `{input}` for {option} (known values: {})", known.join(", "))]
    UnrecognizedValue {
        /// The name of the option being configured, e.g. `testsuite-name`.
        option: &'static str,
        /// The value the caller supplied.
        input: String,
        /// The values that would have been accepted.
        known: Vec<&'static str>,
    },
}

/// An error that occurs while writing a JUnit report.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum JunitEmitError {
    /// Serializing the report to XML failed.
    #[error("error serializing JUnit report")]
    Serialize(#[from] quick_junit::SerializeError),

    /// Writing the serialized report to its destination failed.
    #[error("error writing JUnit report")]
    Io(#[from] io::Error),
}
