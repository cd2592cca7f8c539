use chrono::{DateTime, Duration, Utc};

use doctor_cell::{AvailableSlot, DoctorCalendar};
use shared_config::{SchedulingConfig, TieBreak};

/// Nearest bookable replacements for a rejected request.
///
/// Same-day slots come first, ordered by distance from the requested start
/// (ties broken by `config.tie_break`). Remaining places are filled from the
/// following days in chronological order, up to `alternative_search_days`.
/// Slots starting before `not_before` are never offered.
pub fn nearest_alternatives(
    calendar: &DoctorCalendar,
    requested_start: DateTime<Utc>,
    duration_minutes: u32,
    not_before: Option<DateTime<Utc>>,
    config: &SchedulingConfig,
) -> Vec<AvailableSlot> {
    let wanted = config.alternative_count;
    if wanted == 0 || duration_minutes == 0 {
        return Vec::new();
    }
    let bookable = |slot: &AvailableSlot| not_before.map_or(true, |t| slot.start_time >= t);

    let day = requested_start.date_naive();
    let mut same_day: Vec<AvailableSlot> = calendar
        .slots_of(day, duration_minutes)
        .filter(|s| bookable(s) && s.start_time != requested_start)
        .collect();
    same_day.sort_by_key(|s| proximity_key(s.start_time, requested_start, config.tie_break));

    let mut alternatives: Vec<AvailableSlot> = same_day.into_iter().take(wanted).collect();

    let mut offset = 1;
    while alternatives.len() < wanted && offset <= config.alternative_search_days as i64 {
        let Some(next_day) = day.checked_add_signed(Duration::days(offset)) else {
            break;
        };
        alternatives.extend(
            calendar
                .slots_of(next_day, duration_minutes)
                .filter(|s| bookable(s))
                .take(wanted - alternatives.len()),
        );
        offset += 1;
    }

    alternatives
}

fn proximity_key(start: DateTime<Utc>, requested: DateTime<Utc>, tie_break: TieBreak) -> (i64, i64) {
    let distance = (start - requested).num_minutes().abs();
    let side = match tie_break {
        TieBreak::Earlier => start.timestamp(),
        TieBreak::Later => -start.timestamp(),
    };
    (distance, side)
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_models::AppointmentStatus;
    use shared_utils::test_utils::{appointment, at, reference_monday, TestDoctor, TestPatient};

    fn starts(slots: &[AvailableSlot]) -> Vec<DateTime<Utc>> {
        slots.iter().map(|s| s.start_time).collect()
    }

    #[test]
    fn equidistant_slots_follow_tie_break() {
        let doctor = TestDoctor::single_window();
        let patient = TestPatient::new_patient();
        let day = reference_monday();
        let booked = appointment(&doctor, &patient, at(day, 9, 15), 15, AppointmentStatus::Confirmed, at(day, 6, 0));
        let calendar = DoctorCalendar::new(doctor, vec![booked]);

        let mut config = SchedulingConfig {
            alternative_count: 2,
            ..SchedulingConfig::default()
        };
        let earlier = nearest_alternatives(&calendar, at(day, 9, 15), 15, None, &config);
        assert_eq!(starts(&earlier), vec![at(day, 9, 0), at(day, 9, 30)]);

        config.tie_break = TieBreak::Later;
        let later = nearest_alternatives(&calendar, at(day, 9, 15), 15, None, &config);
        assert_eq!(starts(&later), vec![at(day, 9, 30), at(day, 9, 0)]);
    }

    #[test]
    fn full_day_spills_into_next_working_day() {
        let doctor = TestDoctor::single_window();
        let patient = TestPatient::new_patient();
        let day = reference_monday();
        let taken: Vec<_> = [0, 15, 30, 45]
            .iter()
            .map(|m| appointment(&doctor, &patient, at(day, 9, *m), 15, AppointmentStatus::Confirmed, at(day, 6, 0)))
            .collect();
        let calendar = DoctorCalendar::new(doctor, taken);

        let config = SchedulingConfig::default();
        let alternatives = nearest_alternatives(&calendar, at(day, 9, 0), 15, None, &config);
        let next_monday = day + Duration::days(7);
        assert_eq!(
            starts(&alternatives),
            vec![at(next_monday, 9, 0), at(next_monday, 9, 15), at(next_monday, 9, 30)]
        );
    }

    #[test]
    fn past_slots_are_not_offered() {
        let calendar = DoctorCalendar::new(TestDoctor::single_window(), Vec::new());
        let day = reference_monday();
        let config = SchedulingConfig::default();

        let alternatives = nearest_alternatives(&calendar, at(day, 9, 0), 15, Some(at(day, 9, 20)), &config);
        assert_eq!(starts(&alternatives), vec![at(day, 9, 30), at(day, 9, 45), at(day + Duration::days(7), 9, 0)]);
    }
}
