use crate::types::states::BatchStatus;

/// Derives a job's overall status from its batches' statuses.
///
/// No batches, or all not started, is `NotStarted`; all completed is
/// `Completed`; anything else is `InProgress`. Order does not matter.
pub fn aggregate<I>(statuses: I) -> BatchStatus
where
    I: IntoIterator<Item = BatchStatus>,
{
    let (mut all_not_started, mut all_completed) = (true, true);

    for status in statuses {
        all_not_started &= status == BatchStatus::NotStarted;
        all_completed &= status == BatchStatus::Completed;
    }

    // An empty input leaves both flags set; not started wins.
    match (all_not_started, all_completed) {
        (true, _) => BatchStatus::NotStarted,
        (false, true) => BatchStatus::Completed,
        (false, false) => BatchStatus::InProgress,
    }
}
