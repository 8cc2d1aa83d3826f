use std::time::Duration;

use pretty_assertions::assert_eq;

use super::{decide, surfaced_error, ErrorClass, RetryDecision, RetryMode};
use crate::{
    error::{
        CommandError,
        Error,
        ErrorKind,
        NO_WRITES_PERFORMED,
        RETRYABLE_WRITE_ERROR,
        TRANSIENT_TRANSACTION_ERROR,
    },
    operation::Retryability,
};

fn network_error() -> Error {
    ErrorKind::from(std::io::ErrorKind::ConnectionReset).into()
}

fn command_error(code: i32, labels: &[&str]) -> Error {
    Error::new(
        ErrorKind::Command(CommandError {
            code,
            code_name: String::new(),
            message: "error".to_string(),
            topology_version: None,
        }),
        Some(labels.iter().map(|label| label.to_string())),
    )
}

#[test]
fn classification() {
    assert_eq!(
        ErrorClass::of(&network_error(), Retryability::Write, false),
        ErrorClass::RetryableNetwork
    );
    // not primary
    assert_eq!(
        ErrorClass::of(&command_error(10107, &[]), Retryability::Read, false),
        ErrorClass::RetryableServer
    );
    // Writes are retryable only when labeled.
    assert_eq!(
        ErrorClass::of(&command_error(10107, &[]), Retryability::Write, false),
        ErrorClass::NonRetryable
    );
    assert_eq!(
        ErrorClass::of(
            &command_error(10107, &[RETRYABLE_WRITE_ERROR]),
            Retryability::Write,
            false
        ),
        ErrorClass::RetryableServer
    );
    assert_eq!(
        ErrorClass::of(&command_error(11000, &[]), Retryability::Read, false),
        ErrorClass::NonRetryable
    );
    assert_eq!(
        ErrorClass::of(
            &command_error(251, &[TRANSIENT_TRANSACTION_ERROR]),
            Retryability::None,
            true
        ),
        ErrorClass::TransientTransaction
    );
    assert_eq!(
        ErrorClass::of(
            &Error::invalid_response("bad frame"),
            Retryability::Read,
            false
        ),
        ErrorClass::Fatal
    );
    assert_eq!(
        ErrorClass::of(
            &Error::from(ErrorKind::Authentication {
                message: "bad credentials".to_string(),
            }),
            Retryability::Read,
            false
        ),
        ErrorClass::Fatal
    );
    assert_eq!(
        ErrorClass::of(&Error::timeout("expired"), Retryability::Read, false),
        ErrorClass::NonRetryable
    );
}

#[test]
fn first_attempt_retries_retryable_errors() {
    for retryability in [Retryability::Read, Retryability::Write] {
        for class in [ErrorClass::RetryableNetwork, ErrorClass::RetryableServer] {
            assert_eq!(
                decide(1, retryability, class, None, true, RetryMode::Once),
                RetryDecision::Retry,
                "{retryability:?} {class:?}"
            );
        }
    }
}

#[test]
fn second_attempt_surfaces_original() {
    assert_eq!(
        decide(
            2,
            Retryability::Write,
            ErrorClass::RetryableNetwork,
            None,
            true,
            RetryMode::Once
        ),
        RetryDecision::SurfaceOriginal
    );
    assert_eq!(
        decide(
            2,
            Retryability::Read,
            ErrorClass::RetryableServer,
            None,
            true,
            RetryMode::Once
        ),
        RetryDecision::SurfaceOriginal
    );
    // A second error that retrying would not fix describes the operation better.
    assert_eq!(
        decide(
            2,
            Retryability::Write,
            ErrorClass::NonRetryable,
            None,
            true,
            RetryMode::Once
        ),
        RetryDecision::Surface
    );
}

#[test]
fn never_retries_unretryable_classes() {
    for class in [
        ErrorClass::NonRetryable,
        ErrorClass::TransientTransaction,
        ErrorClass::Fatal,
    ] {
        assert_eq!(
            decide(
                1,
                Retryability::Write,
                class,
                Some(Duration::from_secs(10)),
                true,
                RetryMode::Context
            ),
            RetryDecision::Surface
        );
    }
}

#[test]
fn disabled_retries_surface() {
    assert_eq!(
        decide(
            1,
            Retryability::None,
            ErrorClass::RetryableNetwork,
            None,
            true,
            RetryMode::None
        ),
        RetryDecision::Surface
    );
    assert_eq!(
        decide(
            1,
            Retryability::Write,
            ErrorClass::RetryableNetwork,
            None,
            true,
            RetryMode::None
        ),
        RetryDecision::Surface
    );
}

#[test]
fn unacknowledged_writes_are_not_retried() {
    assert_eq!(
        decide(
            1,
            Retryability::Write,
            ErrorClass::RetryableNetwork,
            None,
            false,
            RetryMode::Once
        ),
        RetryDecision::Surface
    );
    // Reads do not care about the write concern.
    assert_eq!(
        decide(
            1,
            Retryability::Read,
            ErrorClass::RetryableNetwork,
            None,
            false,
            RetryMode::Once
        ),
        RetryDecision::Retry
    );
}

#[test]
fn timeout_budget_governs_attempts() {
    let remaining = Some(Duration::from_millis(500));
    for attempt in [1, 2, 5, 20] {
        assert_eq!(
            decide(
                attempt,
                Retryability::Read,
                ErrorClass::RetryableServer,
                remaining,
                true,
                RetryMode::Context
            ),
            RetryDecision::Retry
        );
    }
    assert_eq!(
        decide(
            3,
            Retryability::Read,
            ErrorClass::RetryableServer,
            Some(Duration::ZERO),
            true,
            RetryMode::Context
        ),
        RetryDecision::TimedOut
    );
    // Without a deadline the budget rule degrades to a single retry.
    assert_eq!(
        decide(
            2,
            Retryability::Read,
            ErrorClass::RetryableServer,
            None,
            true,
            RetryMode::Context
        ),
        RetryDecision::SurfaceOriginal
    );
}

#[test]
fn at_most_two_attempts_without_timeout() {
    let mut attempts = 0;
    loop {
        attempts += 1;
        let decision = decide(
            attempts,
            Retryability::Write,
            ErrorClass::RetryableNetwork,
            None,
            true,
            RetryMode::Once,
        );
        if decision != RetryDecision::Retry {
            break;
        }
    }
    assert_eq!(attempts, 2);
}

#[test]
fn retry_mode_follows_retryability_and_deadline() {
    assert_eq!(RetryMode::new(Retryability::None, true), RetryMode::None);
    assert_eq!(RetryMode::new(Retryability::Write, false), RetryMode::Once);
    assert_eq!(RetryMode::new(Retryability::Read, true), RetryMode::Context);
}

#[test]
fn no_writes_performed_keeps_first_error() {
    let first = command_error(91, &[RETRYABLE_WRITE_ERROR]);
    let second = command_error(262, &[NO_WRITES_PERFORMED]);
    assert_eq!(surfaced_error(Some(first), second).code(), Some(91));

    let first = command_error(91, &[RETRYABLE_WRITE_ERROR]);
    let second = command_error(11000, &[]);
    assert_eq!(surfaced_error(Some(first), second).code(), Some(11000));

    assert_eq!(
        surfaced_error(None, command_error(2, &[NO_WRITES_PERFORMED])).code(),
        Some(2)
    );
}
