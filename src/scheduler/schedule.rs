use chrono::{DateTime, Datelike, Duration, NaiveTime, TimeZone, Timelike, Utc, Weekday};

/// Wall-clock firing rule, always evaluated in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    /// Once a day at `hour:00`.
    Daily { hour: u32 },
    /// At `00:00` and every `hours` after it, i.e. hours divisible by `hours`.
    EveryHours { hours: u32 },
    /// Once a week on `weekday` at `hour:00`.
    Weekly { weekday: Weekday, hour: u32 },
}

impl Schedule {
    /// First firing time strictly after `now`.
    pub fn next_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let today = now.date_naive();
        let at_hour = |days: i64, hour: u32| {
            let time = NaiveTime::from_hms_opt(hour.min(23), 0, 0).unwrap_or(NaiveTime::MIN);
            Utc.from_utc_datetime(&(today + Duration::days(days)).and_time(time))
        };

        match *self {
            Schedule::Daily { hour } => {
                let candidate = at_hour(0, hour);
                if candidate > now {
                    candidate
                } else {
                    at_hour(1, hour)
                }
            }
            Schedule::EveryHours { hours } => {
                let step = hours.clamp(1, 24);
                let next_hour = (now.hour() / step + 1) * step;
                if next_hour < 24 {
                    at_hour(0, next_hour)
                } else {
                    at_hour(1, 0)
                }
            }
            Schedule::Weekly { weekday, hour } => {
                let ahead = (7 + weekday.num_days_from_monday() as i64
                    - now.weekday().num_days_from_monday() as i64)
                    % 7;
                let candidate = at_hour(ahead, hour);
                if candidate > now {
                    candidate
                } else {
                    at_hour(ahead + 7, hour)
                }
            }
        }
    }

    /// How long to sleep from `now` until the next firing.
    pub fn delay_from(&self, now: DateTime<Utc>) -> std::time::Duration {
        (self.next_after(now) - now)
            .to_std()
            .unwrap_or(std::time::Duration::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn daily_rolls_over_after_the_hour() {
        let nightly = Schedule::Daily { hour: 2 };
        assert_eq!(
            nightly.next_after(at("2026-03-10T01:59:00Z")),
            at("2026-03-10T02:00:00Z")
        );
        assert_eq!(
            nightly.next_after(at("2026-03-10T02:00:00Z")),
            at("2026-03-11T02:00:00Z")
        );
    }

    #[test]
    fn every_hours_aligns_to_midnight() {
        let triage = Schedule::EveryHours { hours: 4 };
        assert_eq!(
            triage.next_after(at("2026-03-10T05:30:00Z")),
            at("2026-03-10T08:00:00Z")
        );
        assert_eq!(
            triage.next_after(at("2026-03-10T20:00:00Z")),
            at("2026-03-11T00:00:00Z")
        );

        let audit = Schedule::EveryHours { hours: 6 };
        assert_eq!(
            audit.next_after(at("2026-03-10T12:00:00Z")),
            at("2026-03-10T18:00:00Z")
        );
    }

    #[test]
    fn weekly_targets_the_next_sunday() {
        let retention = Schedule::Weekly {
            weekday: Weekday::Sun,
            hour: 3,
        };
        // 2026-03-10 is a Tuesday.
        assert_eq!(
            retention.next_after(at("2026-03-10T10:00:00Z")),
            at("2026-03-15T03:00:00Z")
        );
        assert_eq!(
            retention.next_after(at("2026-03-15T02:00:00Z")),
            at("2026-03-15T03:00:00Z")
        );
        assert_eq!(
            retention.next_after(at("2026-03-15T03:00:00Z")),
            at("2026-03-22T03:00:00Z")
        );
    }
}
