use chrono::TimeDelta;

/// Time of day as an offset from midnight.
pub fn clock(hours: u32, minutes: u32) -> TimeDelta {
    TimeDelta::seconds(i64::from(hours) * 3600 + i64::from(minutes) * 60)
}

/// Latest representable time of the simulated day.
pub fn end_of_day() -> TimeDelta {
    clock(23, 59) + TimeDelta::seconds(59)
}

/// Parses `"9:05 am"`, `"10:30 AM"` or 24h `"13:45"` into a time of day.
pub fn parse_clock(raw: &str) -> Option<TimeDelta> {
    let mut parts = raw.split_whitespace();
    let hm = parts.next()?;

    let (h, m) = hm.split_once(':')?;
    let mut hours: u32 = h.parse().ok()?;
    let minutes: u32 = m.get(..2)?.parse().ok()?;
    // "10:30am" carries the meridiem in the same token
    let meridiem = match m.get(2..).filter(|rest| !rest.is_empty()) {
        Some(rest) => Some(rest.to_string()),
        None => parts.next().map(str::to_string),
    }
    .map(|m| m.trim_end_matches('.').to_ascii_lowercase());
    if minutes > 59 {
        return None;
    }

    match meridiem.as_deref() {
        Some("am") | Some("a.m") => {
            if hours == 0 || hours > 12 {
                return None;
            }
            if hours == 12 {
                hours = 0;
            }
        }
        Some("pm") | Some("p.m") => {
            if hours == 0 || hours > 12 {
                return None;
            }
            if hours < 12 {
                hours += 12;
            }
        }
        Some(_) => return None,
        None if hours > 23 => return None,
        None => {}
    }

    Some(clock(hours, minutes))
}

/// `HH:MM:SS` rendering of a time of day.
pub fn format_clock(time: TimeDelta) -> String {
    let total = time.num_seconds().max(0);
    format!(
        "{:02}:{:02}:{:02}",
        total / 3600,
        (total % 3600) / 60,
        total % 60
    )
}

pub fn round_to(value: f64, digits: u32) -> f64 {
    let factor = 10f64.powi(digits as i32);
    (value * factor).round() / factor
}

/// Driving time for `distance` at `speed` distance units per hour.
pub fn travel_time(distance: f64, speed: f64) -> TimeDelta {
    let millis = (distance / speed * 3_600_000.0).round() as i64;
    TimeDelta::milliseconds(millis)
}
