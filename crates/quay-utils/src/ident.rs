use bstr::{BStr, BString, ByteSlice, ByteVec};
use chrono::Local;

use crate::error::UtilError;
use crate::Result;

/// A point in time as stored in commit and tag headers: seconds since
/// the Unix epoch plus the author's UTC offset in minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestamp {
    pub seconds: i64,
    pub offset_minutes: i32,
}

impl Timestamp {
    pub fn new(seconds: i64, offset_minutes: i32) -> Self {
        Self {
            seconds,
            offset_minutes,
        }
    }

    /// Current wall-clock time with the local UTC offset.
    pub fn now() -> Self {
        let now = Local::now();
        let offset_secs = now.offset().local_minus_utc();
        Self {
            seconds: now.timestamp(),
            offset_minutes: offset_secs / 60,
        }
    }

    /// Parse the raw on-disk form: `"<epoch-seconds> <±HHMM>"`.
    pub fn parse_raw(input: &str) -> Result<Self> {
        let mut parts = input.split_whitespace();
        let secs = parts
            .next()
            .and_then(|s| s.parse::<i64>().ok())
            .ok_or_else(|| UtilError::IdentParse(format!("bad timestamp: {input:?}")))?;
        let tz = parts.next().unwrap_or("+0000");

        let (sign, digits) = match tz.as_bytes().first() {
            Some(b'-') => (-1, &tz[1..]),
            Some(b'+') => (1, &tz[1..]),
            _ => (1, tz),
        };
        let raw: i32 = digits
            .parse()
            .map_err(|_| UtilError::IdentParse(format!("bad timezone: {tz:?}")))?;
        let offset_minutes = sign * ((raw / 100) * 60 + raw % 100);

        Ok(Self {
            seconds: secs,
            offset_minutes,
        })
    }

    /// The `±HHMM` decimal form of the offset.
    fn offset_decimal(&self) -> i32 {
        let sign = if self.offset_minutes < 0 { -1 } else { 1 };
        let abs = self.offset_minutes.abs();
        sign * ((abs / 60) * 100 + abs % 60)
    }
}

/// Author or committer identity with a timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub name: BString,
    pub email: BString,
    pub when: Timestamp,
}

impl Identity {
    /// Parse the canonical form: `Name <email> <epoch> <±HHMM>`.
    ///
    /// Names may contain spaces, so the split keys off the last `<…>` pair.
    pub fn parse(input: &BStr) -> Result<Self> {
        let bytes = input.as_bytes();

        let close = bytes
            .iter()
            .rposition(|&b| b == b'>')
            .ok_or_else(|| UtilError::IdentParse("missing '>' in identity".into()))?;
        let open = bytes[..close]
            .iter()
            .rposition(|&b| b == b'<')
            .ok_or_else(|| UtilError::IdentParse("missing '<' in identity".into()))?;

        let name = bytes[..open].trim();
        let email = &bytes[open + 1..close];
        let when_str = std::str::from_utf8(bytes[close + 1..].trim())
            .map_err(|_| UtilError::IdentParse("non-UTF-8 timestamp in identity".into()))?;

        Ok(Self {
            name: BString::from(name),
            email: BString::from(email),
            when: Timestamp::parse_raw(when_str)?,
        })
    }

    /// Serialize to the canonical form: `Name <email> <epoch> <±HHMM>`.
    pub fn to_bytes(&self) -> BString {
        let mut out = BString::new(Vec::new());
        out.push_str(&self.name);
        out.push_str(b" <");
        out.push_str(&self.email);
        out.push_str(b"> ");
        out.push_str(
            format!("{} {:+05}", self.when.seconds, self.when.offset_decimal()).as_bytes(),
        );
        out
    }
}
