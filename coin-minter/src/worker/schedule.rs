use chrono::{DateTime, Days, NaiveTime, TimeZone, Utc};

/// The first instant strictly after `now` whose UTC time of day is `at`.
pub fn next_run_after(now: DateTime<Utc>, at: NaiveTime) -> DateTime<Utc> {
	let today = Utc.from_utc_datetime(&now.date_naive().and_time(at));

	if today > now {
		today
	} else {
		today.checked_add_days(Days::new(1)).unwrap_or(today)
	}
}
