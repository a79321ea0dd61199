use std::fmt;

use serde::Serialize;

/// Progress of a single batch. Only ever moves forward:
/// `NotStarted` -> `InProgress` -> `Completed`.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum BatchStatus {
    #[default]
    NotStarted,
    InProgress,
    Completed,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        use BatchStatus::*;

        match self {
            NotStarted => "not_started",
            InProgress => "in_progress",
            Completed => "completed",
        }
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// Statuses go out in job reports as their snake_case names.
impl Serialize for BatchStatus {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}
