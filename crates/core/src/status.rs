//! Status helper enums mapping to SMALLINT lookup tables, plus the task
//! lifecycle rules that hang off [`TaskStatus`].
//!
//! Each enum variant's discriminant matches the seed data order (1-based)
//! in the corresponding `*_statuses` database table.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Status ID type matching SMALLINT/SMALLSERIAL in the database.
pub type StatusId = i16;

macro_rules! define_status_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $val:expr ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[repr(i16)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $( $(#[$vmeta])* $variant = $val ),+
        }

        impl $name {
            /// Return the database status ID.
            pub fn id(self) -> StatusId {
                self as StatusId
            }

            /// Look up a variant by its database status ID.
            pub fn from_id(id: StatusId) -> Option<Self> {
                match id {
                    $( x if x == $val => Some(Self::$variant), )+
                    _ => None,
                }
            }
        }

        impl From<$name> for StatusId {
            fn from(value: $name) -> Self {
                value as StatusId
            }
        }

        impl TryFrom<StatusId> for $name {
            type Error = CoreError;

            fn try_from(id: StatusId) -> Result<Self, CoreError> {
                Self::from_id(id).ok_or_else(|| {
                    CoreError::Internal(format!("Unknown {} id {id}", stringify!($name)))
                })
            }
        }
    };
}

define_status_enum! {
    /// Task execution status.
    #[derive(Serialize, Deserialize)]
    #[serde(rename_all = "lowercase")]
    TaskStatus {
        Pending = 1,
        Running = 2,
        Success = 3,
        Failed = 4,
        Error = 5,
        Timeout = 6,
        Canceled = 7,
        Stopped = 8,
        /// A freshly created retry of an earlier task, not yet dispatched.
        Retrying = 9,
    }
}

/// Every status in seed order.
pub const ALL_TASK_STATUSES: [TaskStatus; 9] = [
    TaskStatus::Pending,
    TaskStatus::Running,
    TaskStatus::Success,
    TaskStatus::Failed,
    TaskStatus::Error,
    TaskStatus::Timeout,
    TaskStatus::Canceled,
    TaskStatus::Stopped,
    TaskStatus::Retrying,
];

impl TaskStatus {
    /// Wire / seed name of the status.
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Success => "success",
            TaskStatus::Failed => "failed",
            TaskStatus::Error => "error",
            TaskStatus::Timeout => "timeout",
            TaskStatus::Canceled => "canceled",
            TaskStatus::Stopped => "stopped",
            TaskStatus::Retrying => "retrying",
        }
    }

    /// No status update is accepted once a task reaches one of these.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Success
                | TaskStatus::Failed
                | TaskStatus::Error
                | TaskStatus::Timeout
                | TaskStatus::Canceled
                | TaskStatus::Stopped
        )
    }

    /// Terminal statuses that count as an unsuccessful run for automatic
    /// retry purposes. Operator-driven endings (canceled, stopped) do not.
    pub fn is_failure(self) -> bool {
        matches!(
            self,
            TaskStatus::Failed | TaskStatus::Error | TaskStatus::Timeout
        )
    }

    /// Statuses a task may sit in while waiting for a worker.
    pub fn is_awaiting_dispatch(self) -> bool {
        matches!(self, TaskStatus::Pending | TaskStatus::Retrying)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ALL_TASK_STATUSES
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| CoreError::Validation(format!("Unknown task status: {s}")))
    }
}

// ---------------------------------------------------------------------------
// Timestamp stamping
// ---------------------------------------------------------------------------

/// Which lifecycle timestamps a status change should set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatusStamps {
    pub start: bool,
    pub end: bool,
}

/// Decide the timestamps to stamp when a task moves to `next`.
///
/// Start is stamped on the first transition into `running`, end on the
/// first transition into any terminal status. Existing stamps are never
/// overwritten.
pub fn stamps_for(next: TaskStatus, has_start: bool, has_end: bool) -> StatusStamps {
    StatusStamps {
        start: next == TaskStatus::Running && !has_start,
        end: next.is_terminal() && !has_end,
    }
}

// ---------------------------------------------------------------------------
// Retry policy
// ---------------------------------------------------------------------------

/// Whether a finished task may be resubmitted automatically.
///
/// `retryable` is the schedule's opt-out: `None` means the schedule never
/// said, which keeps the default of retrying; only an explicit `false`
/// disables it.
pub fn auto_retry_eligible(
    status: TaskStatus,
    retry_count: i32,
    max_retry: i32,
    retryable: Option<bool>,
) -> bool {
    status.is_failure() && retryable != Some(false) && retry_count < max_retry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_round_trip_through_from_id() {
        for status in ALL_TASK_STATUSES {
            assert_eq!(TaskStatus::from_id(status.id()), Some(status));
        }
        assert_eq!(TaskStatus::from_id(0), None);
        assert_eq!(TaskStatus::from_id(10), None);
    }

    #[test]
    fn try_from_reaches_the_error_variant() {
        assert_eq!(TaskStatus::try_from(5).unwrap(), TaskStatus::Error);
        assert!(matches!(
            TaskStatus::try_from(42),
            Err(CoreError::Internal(msg)) if msg.contains("TaskStatus")
        ));
    }

    #[test]
    fn names_parse_back() {
        assert_eq!("canceled".parse::<TaskStatus>().unwrap(), TaskStatus::Canceled);
        assert!("cancelled".parse::<TaskStatus>().is_err());
    }

    #[test]
    fn serde_uses_lowercase_names() {
        let json = serde_json::to_string(&TaskStatus::Timeout).unwrap();
        assert_eq!(json, "\"timeout\"");
        let parsed: TaskStatus = serde_json::from_str("\"stopped\"").unwrap();
        assert_eq!(parsed, TaskStatus::Stopped);
    }

    #[test]
    fn terminal_set() {
        let terminal: Vec<_> = ALL_TASK_STATUSES
            .into_iter()
            .filter(|s| s.is_terminal())
            .collect();
        assert_eq!(terminal.len(), 6);
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());
        assert!(!TaskStatus::Retrying.is_terminal());
    }

    #[test]
    fn start_stamped_only_on_first_run() {
        assert!(stamps_for(TaskStatus::Running, false, false).start);
        assert!(!stamps_for(TaskStatus::Running, true, false).start);
        assert!(!stamps_for(TaskStatus::Success, false, false).start);
    }

    #[test]
    fn end_stamped_only_on_first_terminal() {
        assert!(stamps_for(TaskStatus::Failed, true, false).end);
        assert!(!stamps_for(TaskStatus::Failed, true, true).end);
        assert!(!stamps_for(TaskStatus::Running, false, false).end);
    }

    #[test]
    fn retry_respects_ceiling_and_opt_out() {
        assert!(auto_retry_eligible(TaskStatus::Failed, 0, 3, None));
        assert!(auto_retry_eligible(TaskStatus::Timeout, 2, 3, Some(true)));
        assert!(!auto_retry_eligible(TaskStatus::Error, 3, 3, None));
        assert!(!auto_retry_eligible(TaskStatus::Failed, 0, 3, Some(false)));
        assert!(!auto_retry_eligible(TaskStatus::Canceled, 0, 3, None));
        assert!(!auto_retry_eligible(TaskStatus::Success, 0, 3, None));
    }
}
