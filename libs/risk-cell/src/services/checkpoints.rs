use chrono::{DateTime, Duration, Utc};

/// The most recent recompute checkpoint that `now` has passed without an
/// assessment since, if any.
///
/// A checkpoint of `h` hours fires once `now >= start - h`, while the
/// appointment is still ahead. When several are overdue only the closest one
/// to the appointment is returned, since one recomputation covers them all.
pub fn due_checkpoint(
    start: DateTime<Utc>,
    last_computed: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    checkpoints_hours: &[i64],
) -> Option<i64> {
    if now >= start {
        return None;
    }

    checkpoints_hours
        .iter()
        .copied()
        .filter(|hours| {
            let fires_at = start
                .checked_sub_signed(Duration::hours(*hours))
                .unwrap_or(DateTime::<Utc>::MIN_UTC);
            now >= fires_at && last_computed.map_or(true, |at| at < fires_at)
        })
        .min()
}
