//! Error types for the scheduler core.

use thiserror::Error;

use crate::config::Tunable;
use crate::request::RequestHandle;
use crate::scheduler::SchedulerState;

/// Result type alias for scheduler operations.
pub type SchedResult<T> = Result<T, SchedError>;

/// Error variants for scheduler operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SchedError {
    /// The operation is not valid in the scheduler's current lifecycle state.
    #[error("Scheduler not active: state is {state}")]
    NotActive {
        /// The state the scheduler was in.
        state: SchedulerState,
    },

    /// `init` was called on a scheduler that already left `Uninitialized`.
    #[error("Scheduler already initialized")]
    AlreadyInitialized,

    /// A tunable value is outside its accepted range.
    #[error("Tunable {tunable} out of range: {value} (max {max})")]
    ConfigOutOfRange {
        /// The tunable being set.
        tunable: Tunable,
        /// The rejected value, signed so negative input can be reported.
        value: i128,
        /// The largest accepted value.
        max: u64,
    },

    /// No tunable exists with the given name.
    #[error("Unknown tunable: {0}")]
    UnknownTunable(String),

    /// The text supplied for a tunable is not a decimal number.
    #[error("Invalid value for {tunable}: {input:?}")]
    InvalidValue {
        /// The tunable being set.
        tunable: Tunable,
        /// The text that failed to parse.
        input: String,
    },

    /// The handle does not refer to a request resident in any queue.
    #[error("Request not queued: {0}")]
    UnknownRequest(RequestHandle),

    /// Requests were still queued when the scheduler was torn down.
    ///
    /// Raised as a panic by [`crate::Scheduler::destroy`], never returned.
    #[error("Teardown invariant violated: {pending} request(s) still queued")]
    TeardownInvariantViolated {
        /// Number of requests left in the queues.
        pending: usize,
    },

    /// The request arena could not be allocated.
    #[error("Allocation failed: could not reserve {requested} request slots")]
    AllocationFailed {
        /// Number of slots requested.
        requested: usize,
    },

    /// A configuration could not be read, parsed, or accepted.
    #[error("Invalid config: {reason}")]
    InvalidConfig {
        /// Description of the failure.
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sched_result_alias() {
        let ok: SchedResult<i32> = Ok(7);
        assert!(ok.is_ok());

        let err: SchedResult<i32> = Err(SchedError::AlreadyInitialized);
        assert!(err.is_err());
    }

    #[test]
    fn test_not_active_display() {
        let err = SchedError::NotActive {
            state: SchedulerState::Destroyed,
        };
        assert_eq!(format!("{}", err), "Scheduler not active: state is Destroyed");
    }

    #[test]
    fn test_config_out_of_range_display() {
        let err = SchedError::ConfigOutOfRange {
            tunable: Tunable::FifoBatch,
            value: 1 << 40,
            max: i32::MAX as u64,
        };
        let msg = format!("{}", err);
        assert!(msg.contains("fifo_batch"));
        assert!(msg.contains("2147483647"));
    }

    #[test]
    fn test_teardown_display() {
        let err = SchedError::TeardownInvariantViolated { pending: 3 };
        assert_eq!(
            format!("{}", err),
            "Teardown invariant violated: 3 request(s) still queued"
        );
    }

    #[test]
    fn test_invalid_value_display() {
        let err = SchedError::InvalidValue {
            tunable: Tunable::WritesStarved,
            input: "abc".to_string(),
        };
        assert_eq!(format!("{}", err), "Invalid value for writes_starved: \"abc\"");
    }
}
