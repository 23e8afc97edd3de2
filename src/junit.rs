// Copyright (c) The teststream Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Serializes an [`Execution`] into a JUnit-style XML report.

use crate::errors::{ConfigError, JunitEmitError};
use crate::execution::{Execution, Package, TerminalStatus};
use indexmap::IndexMap;
use quick_junit::{NonSuccessKind, Report, TestCase, TestCaseStatus, TestSuite};
use std::io::Write;
use std::str::FromStr;

/// How a fully-qualified package (or test) name is rendered into the
/// corresponding JUnit attribute.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NamingPolicy {
    /// Last path segment only, e.g. `mypkg` for `example.com/foo/mypkg`.
    Short,
    /// Name relative to a configured root, falling back to `Full` if no
    /// root was configured or the name doesn't share its prefix.
    Relative,
    /// The fully qualified name, unchanged.
    Full,
}

impl FromStr for NamingPolicy {
    type Err = NamingPolicyParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input {
            "short" => Ok(Self::Short),
            "relative" => Ok(Self::Relative),
            "full" => Ok(Self::Full),
            other => Err(NamingPolicyParseError(other.to_owned())),
        }
    }
}

/// Error parsing a [`NamingPolicy`] from a string.
#[derive(Clone, Debug, thiserror::Error)]
#[error("unrecognized naming policy `{0}` (expected one of: short, relative, full)")]
pub struct NamingPolicyParseError(String);

fn apply_policy(policy: NamingPolicy, name: &str, relative_root: Option<&str>) -> String {
    match policy {
        NamingPolicy::Full => name.to_owned(),
        NamingPolicy::Short => name.rsplit('/').next().unwrap_or(name).to_owned(),
        NamingPolicy::Relative => match relative_root {
            Some(root) => name
                .strip_prefix(root)
                .map(|rest| rest.trim_start_matches('/').to_owned())
                .unwrap_or_else(|| name.to_owned()),
            None => name.to_owned(),
        },
    }
}

/// Configuration for the JUnit emitter: the naming policy for testsuite
/// names and testcase classnames, plus the report's root `<testsuites name=
/// "...">` value.
#[derive(Clone, Debug)]
pub struct JunitConfig {
    report_name: String,
    testsuite_name: NamingPolicy,
    testcase_classname: NamingPolicy,
    relative_root: Option<String>,
}

impl JunitConfig {
    /// Builds a config, validating `testsuite_name` and `testcase_classname`
    /// against the known policy names at construction time.
    pub fn new(
        report_name: impl Into<String>,
        testsuite_name: &str,
        testcase_classname: &str,
        relative_root: Option<String>,
    ) -> Result<Self, ConfigError> {
        let testsuite_name =
            NamingPolicy::from_str(testsuite_name).map_err(|_| ConfigError::UnrecognizedValue {
                option: "testsuite-name",
                input: testsuite_name.to_owned(),
                known: vec!["short", "relative", "full"],
            })?;
        let testcase_classname = NamingPolicy::from_str(testcase_classname).map_err(|_| {
            ConfigError::UnrecognizedValue {
                option: "testcase-classname",
                input: testcase_classname.to_owned(),
                known: vec!["short", "relative", "full"],
            }
        })?;
        Ok(Self {
            report_name: report_name.into(),
            testsuite_name,
            testcase_classname,
            relative_root,
        })
    }
}

fn status_for(status: Option<TerminalStatus>) -> TestCaseStatus {
    match status {
        Some(TerminalStatus::Pass) | None => TestCaseStatus::success(),
        Some(TerminalStatus::Fail) => TestCaseStatus::non_success(NonSuccessKind::Failure),
        Some(TerminalStatus::Skip) => TestCaseStatus::skipped(),
    }
}

/// Builds one `TestSuite` for `package`, with one `TestCase` per root test
/// (subtests are nested by name and counted under their own case; a parent
/// that only contains subtests and ran no assertions of its own is skipped
/// to avoid double-counting).
fn build_testsuite(config: &JunitConfig, package: &Package) -> TestSuite {
    let name = apply_policy(
        config.testsuite_name,
        &package.name,
        config.relative_root.as_deref(),
    );
    let mut suite = TestSuite::new(name);
    if let Some(start_time) = package.start_time {
        suite.set_timestamp(start_time);
    }
    if let Some(elapsed) = package.elapsed {
        suite.set_time(elapsed);
    }

    for test in package.tests() {
        // A parent test with its own subtests present and no captured
        // output of its own is a pure container; its failure is already
        // reported through its failing descendant's testcase.
        if package.is_container_test(test) {
            continue;
        }

        // `is_test_failed` already folds in descendant failures, so this
        // takes priority over the test's own terminal action: a `skip`
        // whose subtest failed is still reported as a failure here.
        let is_failure = package.is_test_failed(&test.name);
        let mut status = if is_failure {
            // Covers an explicit `fail`, an unterminated test, and a
            // propagated descendant failure.
            TestCaseStatus::non_success(NonSuccessKind::Failure)
        } else {
            status_for(test.terminal)
        };
        if is_failure && !test.output.is_empty() {
            status.set_message(test.output_text());
        }

        let classname = apply_policy(
            config.testcase_classname,
            &package.name,
            config.relative_root.as_deref(),
        );
        let mut testcase = TestCase::new(test.name.clone(), status);
        testcase.set_classname(classname);
        if let Some(elapsed) = test.elapsed {
            testcase.set_time(elapsed);
        }
        suite.add_test_case(testcase);
    }

    suite
}

/// Builds the suite representing a build failure: a package whose terminal
/// action was `fail` with zero child tests. This carries the compiler output
/// as the suite's `<system-err>` and marks one suite-level error, with no
/// `<testcase>` children — a build failure isn't a test, so it must not be
/// countable as one by a CI consumer tallying testcases.
fn build_error_testsuite(config: &JunitConfig, package: &Package) -> TestSuite {
    let name = apply_policy(
        config.testsuite_name,
        &package.name,
        config.relative_root.as_deref(),
    );
    let mut suite = TestSuite::new(name);
    if let Some(start_time) = package.start_time {
        suite.set_timestamp(start_time);
    }
    if let Some(elapsed) = package.elapsed {
        suite.set_time(elapsed);
    }

    let text: String = package
        .run_errors
        .iter()
        .map(|error| error.text.as_str())
        .collect();
    suite.errors = 1;
    suite.set_system_err(text);
    suite
}

/// Serializes `execution` as a JUnit XML document, written to `writer`.
pub fn emit(
    execution: &Execution,
    config: &JunitConfig,
    writer: impl Write,
) -> Result<(), JunitEmitError> {
    let build_failed: std::collections::HashSet<&str> = execution.build_failed_packages().collect();

    let mut report = Report::new(config.report_name.clone());
    let mut suites: IndexMap<&str, TestSuite> = IndexMap::new();

    for package in execution.packages() {
        if build_failed.contains(package.name.as_str()) {
            suites.insert(package.name.as_str(), build_error_testsuite(config, package));
        } else if package.tests().next().is_some() {
            suites.insert(package.name.as_str(), build_testsuite(config, package));
        }
    }

    report
        .set_time(execution.elapsed())
        .add_test_suites(suites.into_values());

    report.serialize(writer)?;
    Ok(())
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

    fn config() -> JunitConfig {
        JunitConfig::new("teststream", "full", "full", None).unwrap()
    }

    #[test]
    fn rejects_unknown_naming_policy() {
        let err = JunitConfig::new("r", "bogus", "full", None).unwrap_err();
        assert!(matches!(err, ConfigError::UnrecognizedValue { .. }));
    }

    #[test]
    fn empty_execution_emits_zero_tests() {
        let execution = Execution::new();
        let mut buf = Vec::new();
        emit(&execution, &config(), &mut buf).unwrap();
        let xml = String::from_utf8(buf).unwrap();
        assert!(xml.contains("testsuites"));
    }

    #[test]
    fn build_failure_emits_a_suite_level_error_with_zero_testcases() {
        let mut execution = Execution::new();
        execution.add(&event(
            r#"{"time":"2024-01-01T00:00:00Z","action":"output","package":"p","output":"syntax error\n"}"#,
        ));
        execution.add(&event(
            r#"{"time":"2024-01-01T00:00:00Z","action":"fail","package":"p","elapsed":0.0}"#,
        ));

        let mut buf = Vec::new();
        emit(&execution, &config(), &mut buf).unwrap();
        let xml = String::from_utf8(buf).unwrap();
        assert!(xml.contains("syntax error"));
        assert!(xml.contains("errors=\"1\""));
        assert!(!xml.contains("<testcase"));
    }

    #[test]
    fn passing_and_failing_tests_are_both_emitted() {
        let mut execution = Execution::new();
        execution.add(&event(
            r#"{"time":"2024-01-01T00:00:00Z","action":"run","package":"p","test":"A"}"#,
        ));
        execution.add(&event(
            r#"{"time":"2024-01-01T00:00:00Z","action":"pass","package":"p","test":"A","elapsed":0.1}"#,
        ));
        execution.add(&event(
            r#"{"time":"2024-01-01T00:00:00Z","action":"run","package":"p","test":"B"}"#,
        ));
        execution.add(&event(
            r#"{"time":"2024-01-01T00:00:00Z","action":"fail","package":"p","test":"B","elapsed":0.1}"#,
        ));

        let mut buf = Vec::new();
        emit(&execution, &config(), &mut buf).unwrap();
        let xml = String::from_utf8(buf).unwrap();
        assert!(xml.contains("name=\"A\""));
        assert!(xml.contains("name=\"B\""));
        assert!(xml.contains("failures=\"1\""));
    }
}
