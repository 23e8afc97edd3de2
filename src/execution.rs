// Copyright (c) The teststream Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The in-memory aggregate built up by folding a [`TestEvent`] stream.

use crate::event::{Action, TestEvent};
use chrono::{DateTime, FixedOffset};
use indexmap::IndexMap;
use std::collections::BTreeSet;
use std::time::Duration;

/// The terminal action a test or package reached, if any.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TerminalStatus {
    /// Passed.
    Pass,
    /// Failed.
    Fail,
    /// Skipped.
    Skip,
}

impl TerminalStatus {
    fn from_action(action: Action) -> Option<Self> {
        match action {
            Action::Pass => Some(Self::Pass),
            Action::Fail => Some(Self::Fail),
            Action::Skip => Some(Self::Skip),
            _ => None,
        }
    }
}

/// A single test, possibly nested via `/` separators.
#[derive(Clone, Debug)]
pub struct TestCase {
    /// The fully-qualified test name within its package, e.g. `A/B`.
    pub name: String,
    /// True if `name` contains a `/`.
    pub is_subtest: bool,
    /// Time elapsed as reported by the terminal event, if any.
    pub elapsed: Option<Duration>,
    /// The terminal action this test reached, if it reached one.
    pub terminal: Option<TerminalStatus>,
    /// Output fragments, preserved byte-for-byte in arrival order.
    pub output: Vec<String>,
}

impl TestCase {
    fn new(name: String) -> Self {
        let is_subtest = name.contains('/');
        Self {
            name,
            is_subtest,
            elapsed: None,
            terminal: None,
            output: Vec::new(),
        }
    }

    /// True if this test never reached a terminal action. An unterminated
    /// test is classified as failed.
    pub fn is_unterminated(&self) -> bool {
        self.terminal.is_none()
    }

    /// This test's own status, ignoring any subtests.
    fn own_failed(&self) -> bool {
        matches!(self.terminal, Some(TerminalStatus::Fail)) || self.is_unterminated()
    }

    /// Concatenates this test's output fragments.
    pub fn output_text(&self) -> String {
        self.output.concat()
    }
}

/// A run error: a line of content received outside the structured event
/// stream, or a synthesized record for a build failure.
#[derive(Clone, Debug)]
pub struct RunError {
    /// The error text, verbatim.
    pub text: String,
    /// True if the text looks like a compiler diagnostic (`path:line:col: `).
    pub looks_like_compile_failure: bool,
}

/// A unit of test organization containing zero or more tests.
#[derive(Clone, Debug)]
pub struct Package {
    /// The fully-qualified package name.
    pub name: String,
    tests: IndexMap<String, TestCase>,
    /// Time elapsed as reported by the terminal package-level event, if any.
    pub elapsed: Option<Duration>,
    /// The terminal action the package itself reached, if any.
    pub terminal: Option<TerminalStatus>,
    /// The timestamp of the first event observed for this package.
    pub start_time: Option<DateTime<FixedOffset>>,
    /// Package-level output fragments (from `output` events with an empty
    /// `test` field).
    pub output: Vec<String>,
    /// Run errors attached to this package.
    pub run_errors: Vec<RunError>,
}

impl Package {
    fn new(name: String) -> Self {
        Self {
            name,
            tests: IndexMap::new(),
            elapsed: None,
            terminal: None,
            start_time: None,
            output: Vec::new(),
            run_errors: Vec::new(),
        }
    }

    /// Tests in this package, in first-`run`-seen (insertion) order.
    pub fn tests(&self) -> impl Iterator<Item = &TestCase> {
        self.tests.values()
    }

    /// Looks up a test by its fully-qualified name.
    pub fn test(&self, name: &str) -> Option<&TestCase> {
        self.tests.get(name)
    }

    fn test_mut(&mut self, name: &str) -> &mut TestCase {
        self.tests
            .entry(name.to_owned())
            .or_insert_with(|| TestCase::new(name.to_owned()))
    }

    /// True if `name` is failed: its own terminal action is `fail` (or it's
    /// unterminated), or any of its subtests is failed.
    pub fn is_test_failed(&self, name: &str) -> bool {
        let Some(test) = self.tests.get(name) else {
            return false;
        };
        if test.own_failed() {
            return true;
        }
        let prefix = format!("{name}/");
        self.tests
            .keys()
            .any(|other| other.starts_with(&prefix) && self.is_test_failed(other))
    }

    /// True if this package is failed: its own terminal action is `fail` (or
    /// it's unterminated), or any of its tests is failed.
    pub fn is_failed(&self) -> bool {
        let own_failed = matches!(self.terminal, Some(TerminalStatus::Fail) | None);
        own_failed || self.tests.keys().any(|name| self.is_test_failed(name))
    }

    /// True if `test` has subtests and captured no output of its own, making
    /// it a pure container whose failure is already reported through its
    /// failing descendant and which should not be counted as a leaf test.
    pub fn is_container_test(&self, test: &TestCase) -> bool {
        let prefix = format!("{}/", test.name);
        let has_subtests = self.tests.keys().any(|other| other.starts_with(&prefix));
        has_subtests && test.output.is_empty()
    }

    /// Leaf tests: tests that are not themselves a pure container for
    /// subtests. This is the count that matches what the JUnit emitter
    /// actually emits as `<testcase>` elements.
    pub fn leaf_tests(&self) -> impl Iterator<Item = &TestCase> {
        self.tests.values().filter(|test| !self.is_container_test(test))
    }

    /// Root (non-subtest) tests that are failed, not including subtests that
    /// are only reachable through another failed test.
    fn top_level_failed_tests(&self) -> impl Iterator<Item = &TestCase> {
        self.tests
            .values()
            .filter(|test| !test.is_subtest && self.is_test_failed(&test.name))
    }

    /// Root (non-subtest) tests that are skipped and not failed.
    fn top_level_skipped_tests(&self) -> impl Iterator<Item = &TestCase> {
        self.tests.values().filter(|test| {
            !test.is_subtest
                && test.terminal == Some(TerminalStatus::Skip)
                && !self.is_test_failed(&test.name)
        })
    }
}

/// The full aggregate model of a single test run: a mapping from package
/// name to [`Package`], plus run-level metadata.
#[derive(Clone, Debug, Default)]
pub struct Execution {
    packages: IndexMap<String, Package>,
    elapsed: Duration,
    event_count: usize,
    build_failed_packages: BTreeSet<String>,
    no_package_errors: Vec<RunError>,
}

impl Execution {
    /// Creates an empty execution.
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds a single event into the model. This is the only mutating
    /// operation; every other method is a pure view over the result.
    pub fn add(&mut self, event: &TestEvent) {
        self.event_count += 1;

        let package = self.package_mut(&event.package);
        if package.start_time.is_none() {
            if let Some(time) = event.time {
                package.start_time = Some(time);
            }
        }

        match event.action {
            Action::Run => {
                if !event.is_package_level() {
                    let _ = package.test_mut(&event.test);
                }
            }
            Action::Output => {
                let fragment = event.output.clone().unwrap_or_default();
                if event.is_package_level() {
                    package.output.push(fragment);
                } else {
                    package.test_mut(&event.test).output.push(fragment);
                }
            }
            Action::Pass | Action::Fail | Action::Skip => {
                let status = TerminalStatus::from_action(event.action)
                    .expect("pass/fail/skip always map to a terminal status");
                if event.is_package_level() {
                    package.terminal = Some(status);
                    package.elapsed = event.elapsed;
                    if status == TerminalStatus::Fail {
                        tracing::debug!(package = %event.package, "package transitioned to failed");
                    }
                    self.finalize_package_if_build_failure(&event.package);
                } else {
                    let test = package.test_mut(&event.test);
                    test.terminal = Some(status);
                    test.elapsed = event.elapsed;
                }
            }
            Action::Pause | Action::Cont | Action::Bench => {
                // No-op for aggregation; the event is still counted above.
            }
        }
    }

    /// Records a line of stderr content as a run error, attached to
    /// `current_package` if one is known, or to the run-level "no package"
    /// bucket otherwise. Never drops a line.
    pub fn add_run_error(&mut self, current_package: Option<&str>, error: RunError) {
        match current_package.and_then(|name| self.packages.get_mut(name)) {
            Some(package) => package.run_errors.push(error),
            None => self.no_package_errors.push(error),
        }
    }

    fn finalize_package_if_build_failure(&mut self, name: &str) {
        let package = self.packages.get_mut(name).expect("package must exist");
        if package.terminal != Some(TerminalStatus::Fail) || !package.tests.is_empty() {
            return;
        }
        let text = package.output.concat();
        package.run_errors.push(RunError {
            text,
            looks_like_compile_failure: false,
        });
        self.build_failed_packages.insert(name.to_owned());
    }

    fn package_mut(&mut self, name: &str) -> &mut Package {
        self.packages
            .entry(name.to_owned())
            .or_insert_with(|| Package::new(name.to_owned()))
    }

    /// Sets the total wall-clock elapsed time of the stream. Called by the
    /// scanner once both streams are drained; not derivable from the event
    /// stream itself.
    pub fn set_elapsed(&mut self, elapsed: Duration) {
        self.elapsed = elapsed;
    }

    /// Looks up a package by name.
    pub fn package(&self, name: &str) -> Option<&Package> {
        self.packages.get(name)
    }

    /// All packages, in first-seen order.
    pub fn packages(&self) -> impl Iterator<Item = &Package> {
        self.packages.values()
    }

    /// Package names that were classified as build failures (a terminal
    /// `fail` with zero child tests).
    pub fn build_failed_packages(&self) -> impl Iterator<Item = &str> {
        self.build_failed_packages.iter().map(String::as_str)
    }

    /// Total wall-clock elapsed time of the stream.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Count of raw events folded, including no-op actions.
    pub fn event_count(&self) -> usize {
        self.event_count
    }

    /// Count of executed leaf tests. Pure container tests (parents with
    /// subtests and no output of their own) are excluded to avoid
    /// double-counting, matching the testcases the JUnit emitter produces.
    pub fn total(&self) -> usize {
        self.packages.values().map(|p| p.leaf_tests().count()).sum()
    }

    /// Failed tests, in deterministic `(package, test)` order, restricted to
    /// root tests (a subtest's failure is represented via its failed
    /// ancestor, not duplicated).
    pub fn failed(&self) -> Vec<(&str, &TestCase)> {
        let mut out = Vec::new();
        for package in self.packages.values() {
            for test in package.top_level_failed_tests() {
                out.push((package.name.as_str(), test));
            }
        }
        out
    }

    /// Skipped tests, in deterministic `(package, test)` order.
    pub fn skipped(&self) -> Vec<(&str, &TestCase)> {
        let mut out = Vec::new();
        for package in self.packages.values() {
            for test in package.top_level_skipped_tests() {
                out.push((package.name.as_str(), test));
            }
        }
        out
    }

    /// All run errors, in package-insertion order, with the "no package"
    /// bucket surfaced last.
    pub fn errors(&self) -> Vec<&RunError> {
        let mut out: Vec<&RunError> = self
            .packages
            .values()
            .flat_map(|p| p.run_errors.iter())
            .collect();
        out.extend(self.no_package_errors.iter());
        out
    }
}
