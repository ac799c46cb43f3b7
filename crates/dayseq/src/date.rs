use crate::{Error, Result};
use chrono::{Datelike, FixedOffset, NaiveDate, Offset, Utc};
use core::{fmt, str::FromStr};

/// The calendar day a counter belongs to, rendered as `YYYYMMDD`.
///
/// Only years `0..=9999` are representable so that the rendered key is always
/// exactly eight digits.
///
/// # Example
///
/// ```
/// use chrono::NaiveDate;
/// use dayseq::DateKey;
///
/// let date = NaiveDate::from_ymd_opt(2024, 3, 7).unwrap();
/// let key = DateKey::try_from(date).unwrap();
/// assert_eq!(key.to_string(), "20240307");
/// assert_eq!("20240307".parse::<DateKey>().unwrap(), key);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DateKey(NaiveDate);

impl DateKey {
    /// The number of characters in a rendered key.
    pub const LEN: usize = 8;

    /// Returns the calendar date behind this key.
    pub fn date(self) -> NaiveDate {
        self.0
    }
}

impl TryFrom<NaiveDate> for DateKey {
    type Error = Error;

    fn try_from(date: NaiveDate) -> Result<Self> {
        if !(0..=9999).contains(&date.year()) {
            return Err(Error::InvalidDateKey {
                input: date.to_string(),
            });
        }
        Ok(Self(date))
    }
}

impl FromStr for DateKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidDateKey {
            input: s.to_owned(),
        };
        if s.len() != Self::LEN || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let year = s[0..4].parse().map_err(|_| invalid())?;
        let month = s[4..6].parse().map_err(|_| invalid())?;
        let day = s[6..8].parse().map_err(|_| invalid())?;
        NaiveDate::from_ymd_opt(year, month, day)
            .map(Self)
            .ok_or_else(invalid)
    }
}

impl fmt::Display for DateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}{:02}{:02}",
            self.0.year(),
            self.0.month(),
            self.0.day()
        )
    }
}

/// A source of "today's" calendar date.
///
/// Allocators never read the system clock directly, so tests can pin the date
/// and exercise day rollover deterministically.
///
/// # Example
///
/// ```
/// use chrono::NaiveDate;
/// use dayseq::DateSource;
///
/// struct Christmas;
/// impl DateSource for Christmas {
///     fn today(&self) -> NaiveDate {
///         NaiveDate::from_ymd_opt(2024, 12, 25).unwrap()
///     }
/// }
///
/// assert_eq!(Christmas.today().to_string(), "2024-12-25");
/// ```
pub trait DateSource {
    /// Returns the current calendar date in the source's timezone.
    fn today(&self) -> NaiveDate;
}

impl<T: DateSource + ?Sized> DateSource for &T {
    fn today(&self) -> NaiveDate {
        (**self).today()
    }
}

impl<T: DateSource + ?Sized> DateSource for std::sync::Arc<T> {
    fn today(&self) -> NaiveDate {
        (**self).today()
    }
}

/// The wall clock, read in an explicit fixed UTC offset.
///
/// The day boundary is where the configured offset says it is, never the
/// host's implicit local timezone.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LocalClock {
    offset: FixedOffset,
}

impl Default for LocalClock {
    /// A clock whose days begin at midnight UTC.
    fn default() -> Self {
        Self::utc()
    }
}

impl LocalClock {
    /// Creates a clock for the given offset east of UTC.
    pub const fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }

    /// Creates a clock whose days begin at midnight UTC.
    pub fn utc() -> Self {
        Self::new(Utc.fix())
    }

    /// Parses an offset such as `+08:00`, `-0530` or `Z`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUtcOffset`] when `s` is not a valid offset of
    /// at most 23:59.
    pub fn parse_offset(s: &str) -> Result<FixedOffset> {
        let invalid = || Error::InvalidUtcOffset {
            input: s.to_owned(),
        };
        let s = s.trim();
        if s.eq_ignore_ascii_case("z") || s.eq_ignore_ascii_case("utc") {
            return Ok(Utc.fix());
        }
        let (sign, rest) = match s.as_bytes().first() {
            Some(b'+') => (1, &s[1..]),
            Some(b'-') => (-1, &s[1..]),
            _ => return Err(invalid()),
        };
        // Only `HH:MM` and `HHMM`.
        if !rest.is_ascii() {
            return Err(invalid());
        }
        let (hh, mm) = match rest.as_bytes() {
            [_, _, b':', _, _] => (&rest[0..2], &rest[3..5]),
            [_, _, _, _] => (&rest[0..2], &rest[2..4]),
            _ => return Err(invalid()),
        };
        if !hh.bytes().chain(mm.bytes()).all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let hours: i32 = hh.parse().map_err(|_| invalid())?;
        let minutes: i32 = mm.parse().map_err(|_| invalid())?;
        if hours > 23 || minutes > 59 {
            return Err(invalid());
        }
        FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).ok_or_else(invalid)
    }

    /// Returns the configured offset.
    pub fn offset(&self) -> FixedOffset {
        self.offset
    }
}

impl DateSource for LocalClock {
    fn today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.offset).date_naive()
    }
}

/// A date source pinned to one day.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FixedDate(pub NaiveDate);

impl DateSource for FixedDate {
    fn today(&self) -> NaiveDate {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn renders_zero_padded() {
        let key = DateKey::try_from(ymd(987, 1, 2)).unwrap();
        assert_eq!(key.to_string(), "09870102");
        assert_eq!(key.to_string().len(), DateKey::LEN);
    }

    #[test]
    fn rejects_years_outside_four_digits() {
        assert!(DateKey::try_from(ymd(10_000, 1, 1)).is_err());
        assert!(DateKey::try_from(ymd(-1, 1, 1)).is_err());
    }

    #[test]
    fn parses_valid_keys() {
        let key: DateKey = "20240229".parse().unwrap();
        assert_eq!(key.date(), ymd(2024, 2, 29));
    }

    #[test]
    fn rejects_malformed_keys() {
        for input in ["2024030", "202403071", "2024-3-7", "20230229", "20241301", "+2024030"] {
            assert!(
                matches!(input.parse::<DateKey>(), Err(Error::InvalidDateKey { .. })),
                "accepted {input:?}"
            );
        }
    }

    #[test]
    fn parses_offsets() {
        assert_eq!(LocalClock::parse_offset("+08:00").unwrap().local_minus_utc(), 8 * 3600);
        assert_eq!(LocalClock::parse_offset("-0530").unwrap().local_minus_utc(), -(5 * 3600 + 30 * 60));
        assert_eq!(LocalClock::parse_offset("Z").unwrap().local_minus_utc(), 0);
        assert!(LocalClock::parse_offset("08:00").is_err());
        assert!(LocalClock::parse_offset("+24:00").is_err());
        assert!(LocalClock::parse_offset("+8").is_err());
    }

    #[test]
    fn rejects_misplaced_separators() {
        for input in ["+0:800", "+08:0:0", "+080:0", "+08:00:", "+8:00", "+08::0", "+0800:", "+aé0"] {
            assert!(
                matches!(LocalClock::parse_offset(input), Err(Error::InvalidUtcOffset { .. })),
                "accepted {input:?}"
            );
        }
        assert_eq!(LocalClock::parse_offset("-08:30").unwrap().local_minus_utc(), -(8 * 3600 + 30 * 60));
    }

    #[test]
    fn clocks_in_different_offsets_may_disagree_by_one_day() {
        let east = LocalClock::new(FixedOffset::east_opt(14 * 3600).unwrap()).today();
        let west = LocalClock::new(FixedOffset::west_opt(12 * 3600).unwrap()).today();
        let diff = (east - west).num_days();
        assert!((0..=2).contains(&diff), "unexpected difference {diff}");
    }

    #[test]
    fn fixed_date_is_stable() {
        let source = FixedDate(ymd(2024, 3, 7));
        assert_eq!(source.today(), source.today());
        assert_eq!((&source).today(), ymd(2024, 3, 7));
    }
}
