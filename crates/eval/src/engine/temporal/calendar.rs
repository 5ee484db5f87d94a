use crate::consts::GREGORIAN_SWITCHOVER;

pub(crate) const MILLIS_PER_DAY: i64 = 86_400_000;
const UNIX_EPOCH_JDN: i64 = 2_440_588;

/// How calendar fields map to days on the time line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CalendarPolicy {
    /// Gregorian rules extended backwards without a switchover.
    #[default]
    ProlepticGregorian,
    /// Julian calendar before the Gregorian switchover, Gregorian from it on.
    JulianGregorian,
}

/// Broken down local date; `year` is astronomical (1 BC is 0).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CivilDate {
    pub year: i64,
    pub month: u32,
    pub day: u32,
}

// Howard Hinnant's days_from_civil.
fn gregorian_to_days(year: i64, month: u32, day: u32) -> i64 {
    let y = if month <= 2 { year - 1 } else { year };
    let era = y.div_euclid(400);
    let yoe = y - era * 400;
    let m = i64::from(month);
    let mp = if m > 2 { m - 3 } else { m + 9 };
    let doy = (153 * mp + 2) / 5 + i64::from(day) - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}

fn gregorian_from_days(days: i64) -> CivilDate {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
    let year = yoe + era * 400 + i64::from(month <= 2);
    CivilDate { year, month, day }
}

fn julian_to_days(year: i64, month: u32, day: u32) -> i64 {
    let a = (14 - i64::from(month)).div_euclid(12);
    let y = year + 4800 - a;
    let m = i64::from(month) + 12 * a - 3;
    let jdn = i64::from(day) + (153 * m + 2).div_euclid(5) + 365 * y + y.div_euclid(4) - 32_083;
    jdn - UNIX_EPOCH_JDN
}

fn julian_from_days(days: i64) -> CivilDate {
    let c = days + UNIX_EPOCH_JDN + 32_082;
    let d = (4 * c + 3).div_euclid(1461);
    let e = c - (1461 * d).div_euclid(4);
    let m = (5 * e + 2).div_euclid(153);
    let day = (e - (153 * m + 2).div_euclid(5) + 1) as u32;
    let month = (m + 3 - 12 * m.div_euclid(10)) as u32;
    let year = d - 4800 + m.div_euclid(10);
    CivilDate { year, month, day }
}

fn switchover_days() -> i64 {
    let (y, m, d) = GREGORIAN_SWITCHOVER;
    gregorian_to_days(y, m, d)
}

fn before_switchover(year: i64, month: u32, day: u32) -> bool {
    let (y, m, d) = GREGORIAN_SWITCHOVER;
    (year, month, day) < (y, m, d)
}

impl CalendarPolicy {
    pub fn is_leap_year(self, year: i64) -> bool {
        let gregorian = year % 4 == 0 && (year % 100 != 0 || year % 400 == 0);
        match self {
            CalendarPolicy::ProlepticGregorian => gregorian,
            CalendarPolicy::JulianGregorian if year < GREGORIAN_SWITCHOVER.0 => {
                year.rem_euclid(4) == 0
            }
            CalendarPolicy::JulianGregorian => gregorian,
        }
    }

    pub fn days_in_month(self, year: i64, month: u32) -> u32 {
        match month {
            1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
            4 | 6 | 9 | 11 => 30,
            2 if self.is_leap_year(year) => 29,
            2 => 28,
            _ => 0,
        }
    }

    /// Days since 1970-01-01 of a calendar date; `None` when the date does not
    /// exist under this policy.
    pub(crate) fn to_days(self, date: CivilDate) -> Option<i64> {
        let CivilDate { year, month, day } = date;
        if !(1..=12).contains(&month) || day == 0 || day > self.days_in_month(year, month) {
            return None;
        }
        match self {
            CalendarPolicy::ProlepticGregorian => Some(gregorian_to_days(year, month, day)),
            CalendarPolicy::JulianGregorian => {
                if before_switchover(year, month, day) {
                    let days = julian_to_days(year, month, day);
                    // 1582-10-05 ..= 1582-10-14 were skipped by the reform.
                    (days < switchover_days()).then_some(days)
                } else {
                    Some(gregorian_to_days(year, month, day))
                }
            }
        }
    }

    pub(crate) fn from_days(self, days: i64) -> CivilDate {
        match self {
            CalendarPolicy::JulianGregorian if days < switchover_days() => julian_from_days(days),
            _ => gregorian_from_days(days),
        }
    }
}

/// Splits local milliseconds into days since the epoch and milliseconds of the day.
pub(crate) fn split_millis(local_millis: i64) -> (i64, i64) {
    (
        local_millis.div_euclid(MILLIS_PER_DAY),
        local_millis.rem_euclid(MILLIS_PER_DAY),
    )
}
