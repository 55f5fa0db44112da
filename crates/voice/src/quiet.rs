//! Quiet-hour arithmetic in the user's local timezone.
//!
//! `start == end` means quiet hours are disabled. `start < end` covers a
//! same-day window; `start > end` wraps past midnight.

use chrono::{DateTime, Duration, TimeZone, Timelike, Utc};
use chrono_tz::Tz;

/// Resolve a zone name, falling back to UTC for anything unknown.
pub fn parse_tz(name: &str) -> Tz {
    name.trim().parse().unwrap_or(chrono_tz::UTC)
}

pub fn in_quiet_hours(now: DateTime<Utc>, tz: Tz, start: u8, end: u8) -> bool {
    if start == end {
        return false;
    }
    let hour = now.with_timezone(&tz).hour() as u8;
    if start < end {
        start <= hour && hour < end
    } else {
        hour >= start || hour < end
    }
}

/// The next instant (UTC) at which the quiet window ends in the user's
/// local time. Collisions at the window boundary push one minute past.
pub fn next_non_quiet_time(now: DateTime<Utc>, tz: Tz, start: u8, end: u8) -> DateTime<Utc> {
    if start == end {
        return now + Duration::minutes(1);
    }

    let local_now = now.with_timezone(&tz);
    let mut local_target = local_now
        .date_naive()
        .and_hms_opt(u32::from(end), 0, 0)
        .unwrap_or(local_now.naive_local());

    let hour = local_now.hour() as u8;
    if start < end {
        if hour >= end {
            local_target += Duration::days(1);
        }
    } else if hour >= start {
        local_target += Duration::days(1);
    } else if hour < end && local_target <= local_now.naive_local() {
        local_target += Duration::days(1);
    }

    let mut resolved = tz
        .from_local_datetime(&local_target)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(now + Duration::minutes(1));
    if resolved <= now {
        resolved += Duration::minutes(1);
    }
    resolved
}
