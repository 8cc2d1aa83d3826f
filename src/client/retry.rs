//! Whether a failed attempt is tried again.
//!
//! The decision is a pure function of the attempt number, the operation's retryability, the class
//! of the error, the remaining client timeout budget and the write concern, so the executor only
//! has to act on the [`RetryDecision`] it gets back.

#[cfg(test)]
mod test;

use std::time::Duration;

use crate::{
    error::{Error, ErrorKind, NO_WRITES_PERFORMED, TRANSIENT_TRANSACTION_ERROR},
    operation::Retryability,
};

/// What kind of failure an attempt ended with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ErrorClass {
    /// The connection failed before a reply was read.
    RetryableNetwork,

    /// The server answered with an error it publishes as safe to retry.
    RetryableServer,

    /// The server answered with an error that retrying would not fix.
    NonRetryable,

    /// The error happened inside a transaction and the whole transaction must be retried by the
    /// caller.
    TransientTransaction,

    /// The exchange itself cannot be trusted. The connection is discarded.
    Fatal,
}

impl ErrorClass {
    pub(crate) fn of(error: &Error, retryability: Retryability, in_transaction: bool) -> Self {
        match error.kind.as_ref() {
            ErrorKind::InvalidResponse { .. }
            | ErrorKind::Authentication { .. }
            | ErrorKind::BsonDeserialization(..)
            | ErrorKind::BsonSerialization(..) => return Self::Fatal,
            ErrorKind::Timeout { .. } | ErrorKind::Cancelled | ErrorKind::Shutdown => {
                return Self::NonRetryable
            }
            _ => {}
        }

        if in_transaction && error.contains_label(TRANSIENT_TRANSACTION_ERROR) {
            return Self::TransientTransaction;
        }
        if error.is_network_error() {
            return Self::RetryableNetwork;
        }
        match retryability {
            Retryability::Read if error.is_read_retryable() => Self::RetryableServer,
            Retryability::Write if error.is_write_retryable() => Self::RetryableServer,
            _ => Self::NonRetryable,
        }
    }

    pub(crate) fn is_retryable(self) -> bool {
        matches!(self, Self::RetryableNetwork | Self::RetryableServer)
    }
}

/// How many attempts an operation gets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RetryMode {
    /// Retries are disabled.
    None,

    /// At most one retry.
    Once,

    /// Retry while the client timeout has budget left. Without a deadline this is `Once`.
    Context,
}

impl RetryMode {
    pub(crate) fn new(retryability: Retryability, has_deadline: bool) -> Self {
        match retryability {
            Retryability::None => Self::None,
            _ if has_deadline => Self::Context,
            _ => Self::Once,
        }
    }
}

/// What the executor does after an attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RetryDecision {
    /// Select a server again and resend, reusing the transaction number of a write.
    Retry,

    /// Return the error of the attempt that just failed.
    Surface,

    /// Return the error of the first attempt.
    SurfaceOriginal,

    /// The client timeout expired before another attempt could start.
    TimedOut,
}

/// Decides what follows the failure of attempt number `attempt` (starting at 1).
pub(crate) fn decide(
    attempt: u32,
    retryability: Retryability,
    class: ErrorClass,
    remaining: Option<Duration>,
    write_acknowledged: bool,
    mode: RetryMode,
) -> RetryDecision {
    if !class.is_retryable() {
        return RetryDecision::Surface;
    }
    // A retry was already spent; the first error describes what went wrong.
    let exhausted = if attempt > 1 {
        RetryDecision::SurfaceOriginal
    } else {
        RetryDecision::Surface
    };

    if retryability == Retryability::None || mode == RetryMode::None {
        return exhausted;
    }
    if retryability == Retryability::Write && !write_acknowledged {
        return exhausted;
    }

    match (mode, remaining) {
        (RetryMode::Context, Some(remaining)) if remaining.is_zero() => RetryDecision::TimedOut,
        (RetryMode::Context, Some(_)) => RetryDecision::Retry,
        _ if attempt == 1 => RetryDecision::Retry,
        _ => RetryDecision::SurfaceOriginal,
    }
}

/// Picks the error to return when a retried operation fails for a reason that is not itself
/// retryable. A second attempt that performed no writes says nothing about the operation, so the
/// first error is returned in that case.
pub(crate) fn surfaced_error(first: Option<Error>, latest: Error) -> Error {
    match first {
        Some(first) if latest.contains_label(NO_WRITES_PERFORMED) => first,
        _ => latest,
    }
}

/// The error returned when the client timeout runs out between attempts.
pub(crate) fn timed_out(last: Error) -> Error {
    Error::timeout("the operation timed out before it could be retried").with_source(last)
}
