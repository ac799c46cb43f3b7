use crate::{DateKey, Error, Result};
use core::{fmt, str::FromStr};
use std::sync::Arc;

/// The deployment-wide tag every serial starts with, e.g. an organization
/// code.
///
/// A prefix is non-empty, at most [`Prefix::MAX_LEN`] bytes of printable
/// ASCII without whitespace, and does not end in a digit. The last rule keeps
/// the boundary between prefix and date stamp unambiguous when parsing.
///
/// # Example
///
/// ```
/// use dayseq::Prefix;
///
/// let prefix = Prefix::new("ORG").unwrap();
/// assert_eq!(prefix.as_str(), "ORG");
/// assert!(Prefix::new("").is_err());
/// assert!(Prefix::new("Q2").is_err());
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Prefix(Arc<str>);

impl Prefix {
    /// Upper bound on the prefix length in bytes.
    pub const MAX_LEN: usize = 32;

    /// Validates and wraps a prefix.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPrefix`] naming the violated rule.
    pub fn new(prefix: impl AsRef<str>) -> Result<Self> {
        let prefix = prefix.as_ref();
        let reason = if prefix.is_empty() {
            Some("prefix must not be empty")
        } else if prefix.len() > Self::MAX_LEN {
            Some("prefix is longer than 32 bytes")
        } else if !prefix.bytes().all(|b| b.is_ascii_graphic()) {
            Some("prefix must be printable ASCII without whitespace")
        } else if prefix.bytes().last().is_some_and(|b| b.is_ascii_digit()) {
            Some("prefix must not end in a digit")
        } else {
            None
        };
        match reason {
            Some(reason) => Err(Error::InvalidPrefix { reason }),
            None => Ok(Self(Arc::from(prefix))),
        }
    }

    /// Returns the prefix text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Prefix {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A day-scoped serial: `<PREFIX><YYYYMMDD><NNN>`.
///
/// The counter is padded to a minimum of [`Serial::MIN_COUNTER_WIDTH`]
/// digits. Larger counters render in full, so `1000` follows `999`.
///
/// # Example
///
/// ```
/// use dayseq::{DateKey, Prefix, Serial};
///
/// let key: DateKey = "20240307".parse().unwrap();
/// let serial = Serial::new(Prefix::new("ORG").unwrap(), key, 1);
/// assert_eq!(serial.to_string(), "ORG20240307001");
///
/// let parsed: Serial = "ORG202403071234".parse().unwrap();
/// assert_eq!(parsed.counter(), 1234);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Serial {
    prefix: Prefix,
    date_key: DateKey,
    counter: u64,
}

impl Serial {
    /// Minimum rendered width of the counter.
    pub const MIN_COUNTER_WIDTH: usize = 3;

    /// Assembles a serial from its parts.
    pub fn new(prefix: Prefix, date_key: DateKey, counter: u64) -> Self {
        Self {
            prefix,
            date_key,
            counter,
        }
    }

    pub fn prefix(&self) -> &Prefix {
        &self.prefix
    }

    pub fn date_key(&self) -> DateKey {
        self.date_key
    }

    pub fn counter(&self) -> u64 {
        self.counter
    }
}

impl fmt::Display for Serial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{:0width$}",
            self.prefix,
            self.date_key,
            self.counter,
            width = Self::MIN_COUNTER_WIDTH
        )
    }
}

impl FromStr for Serial {
    type Err = Error;

    /// Parses the canonical rendering produced by [`fmt::Display`].
    ///
    /// Counters of zero and over-padded counters such as `0001` are rejected,
    /// as no allocator ever renders them.
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidSerial {
            input: s.to_owned(),
        };
        let split = s
            .bytes()
            .rposition(|b| !b.is_ascii_digit())
            .map(|i| i + 1)
            .ok_or_else(invalid)?;
        let (prefix, digits) = s.split_at(split);
        if digits.len() < DateKey::LEN + Self::MIN_COUNTER_WIDTH {
            return Err(invalid());
        }
        let prefix = Prefix::new(prefix).map_err(|_| invalid())?;
        let (date, counter) = digits.split_at(DateKey::LEN);
        let date_key = date.parse().map_err(|_| invalid())?;
        if counter.len() > Self::MIN_COUNTER_WIDTH && counter.starts_with('0') {
            return Err(invalid());
        }
        let counter: u64 = counter.parse().map_err(|_| invalid())?;
        if counter == 0 {
            return Err(invalid());
        }
        Ok(Self::new(prefix, date_key, counter))
    }
}
