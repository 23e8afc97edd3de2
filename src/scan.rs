// Copyright (c) The teststream Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Drives the decoder and handler over a child process's stdout/stderr.

use crate::errors::ScanError;
use crate::event::{decode_line, DecodedLine};
use crate::execution::{Execution, RunError};
use crate::handler::Handler;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

/// A line-looks-like-a-compile-failure heuristic: `path:line:` (or
/// `path:line:col:`) followed by `: `.
fn looks_like_compile_failure(line: &str) -> bool {
    let mut parts = line.splitn(4, ':');
    let Some(_path) = parts.next() else {
        return false;
    };
    let Some(rest) = parts.next() else {
        return false;
    };
    rest.chars().next().is_some_and(|c| c.is_ascii_digit())
}

/// Drives `stdout` and `stderr` to completion, folding every decoded event
/// into an [`Execution`] and invoking `handler` once per event, in stdout
/// arrival order.
///
/// One task alternates between two ready line futures via `tokio::select!`,
/// so there is exactly one mutator of `Execution` and the handler is never
/// called concurrently with itself.
pub async fn scan<Out, ErrStream, H>(
    stdout: Out,
    stderr: ErrStream,
    mut handler: H,
    mut cancel: impl std::future::Future<Output = ()> + Unpin,
) -> (Execution, Result<(), ScanError>)
where
    Out: AsyncRead + Unpin,
    ErrStream: AsyncRead + Unpin,
    H: Handler,
{
    let mut stdout = BufReader::new(stdout).lines();
    let mut stderr = BufReader::new(stderr).lines();

    let mut execution = Execution::new();
    let started = Instant::now();
    let mut out_done = false;
    let mut err_done = false;
    let mut current_package: Option<String> = None;
    let mut line_number = 0usize;

    let result = loop {
        if out_done && err_done {
            break Ok(());
        }

        tokio::select! {
            biased;

            () = &mut cancel => {
                break Err(ScanError::Canceled);
            }

            res = stdout.next_line(), if !out_done => {
                match res {
                    Ok(Some(line)) => {
                        line_number += 1;
                        match decode_line(&line, line_number) {
                            Ok(DecodedLine::Event(event)) => {
                                tracing::trace!(package = %event.package, test = %event.test, action = ?event.action, "decoded event");
                                execution.add(&event);
                                if !event.package.is_empty() {
                                    current_package = Some(event.package.clone());
                                }
                                if let Err(source) = handler.on_event(&event, &execution) {
                                    break Err(ScanError::Handler(source));
                                }
                            }
                            Ok(DecodedLine::Raw(text)) => {
                                tracing::debug!(%text, "non-JSON line on stdout treated as run error");
                                execution.add_run_error(
                                    current_package.as_deref(),
                                    RunError {
                                        looks_like_compile_failure: looks_like_compile_failure(&text),
                                        text,
                                    },
                                );
                            }
                            Err(decode_error) => {
                                tracing::warn!(error = %decode_error, "malformed test event, aborting scan");
                                break Err(ScanError::Decode(decode_error));
                            }
                        }
                    }
                    Ok(None) => out_done = true,
                    Err(source) => break Err(ScanError::Io(source)),
                }
            }

            res = stderr.next_line(), if !err_done => {
                match res {
                    Ok(Some(line)) => {
                        execution.add_run_error(
                            current_package.as_deref(),
                            RunError {
                                looks_like_compile_failure: looks_like_compile_failure(&line),
                                text: line,
                            },
                        );
                    }
                    Ok(None) => err_done = true,
                    Err(source) => break Err(ScanError::Io(source)),
                }
            }
        }
    };

    execution.set_elapsed(started.elapsed());
    (execution, result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::HandlerError;
    use crate::event::TestEvent;
    use std::future::pending;

    struct NullHandler;
    impl Handler for NullHandler {
        fn on_event(&mut self, _event: &TestEvent, _execution: &Execution) -> Result<(), HandlerError> {
            Ok(())
        }
    }

    struct FailingHandler;
    impl Handler for FailingHandler {
        fn on_event(&mut self, _event: &TestEvent, _execution: &Execution) -> Result<(), HandlerError> {
            Err(HandlerError::new(std::io::Error::other("boom")))
        }
    }

    #[tokio::test]
    async fn drains_interleaved_stdout_and_stderr() {
        let stdout = concat!(
            r#"{"time":"2024-01-01T00:00:00Z","action":"run","package":"p","test":"T"}"#,
            "\n",
            r#"{"time":"2024-01-01T00:00:00Z","action":"pass","package":"p","test":"T","elapsed":0.0}"#,
            "\n",
        );
        let stderr = "warning: unused import\n";

        let (execution, result) = scan(
            stdout.as_bytes(),
            stderr.as_bytes(),
            NullHandler,
            pending(),
        )
        .await;

        result.unwrap();
        assert_eq!(execution.total(), 1);
        assert_eq!(execution.errors().len(), 1);
    }

    #[tokio::test]
    async fn handler_error_aborts_but_keeps_partial_execution() {
        let stdout = concat!(
            r#"{"time":"2024-01-01T00:00:00Z","action":"pass","package":"p","test":"T","elapsed":0.0}"#,
            "\n",
        );

        let (execution, result) = scan(
            stdout.as_bytes(),
            "".as_bytes(),
            FailingHandler,
            pending(),
        )
        .await;

        assert!(matches!(result, Err(ScanError::Handler(_))));
        assert_eq!(execution.total(), 1);
    }

    #[tokio::test]
    async fn malformed_line_aborts_the_scan() {
        let stdout = concat!(
            r#"{"time":"2024-01-01T00:00:00Z","action":"run","package":"p","test":5}"#,
            "\n",
        );

        let (_execution, result) = scan(
            stdout.as_bytes(),
            "".as_bytes(),
            NullHandler,
            pending(),
        )
        .await;

        assert!(matches!(result, Err(ScanError::Decode(_))));
    }
}
