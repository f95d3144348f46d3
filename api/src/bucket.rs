//! Bucket-size grammar and timestamp truncation for aggregated queries.
//!
//! A bucket is written as `<positive integer><unit>` with unit `m` (minutes)
//! or `h` (hours), e.g. `5m` or `2h`. Anything else means "no bucketing" and
//! the query is answered in raw mode. Bins are aligned to local midnight of
//! 2000-01-01 in the configured timezone.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use chrono_tz::Tz;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketUnit {
    Minute,
    Hour,
}

impl BucketUnit {
    fn minutes(self) -> u32 {
        match self {
            BucketUnit::Minute => 1,
            BucketUnit::Hour => 60,
        }
    }

    fn suffix(self) -> char {
        match self {
            BucketUnit::Minute => 'm',
            BucketUnit::Hour => 'h',
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bucket {
    unit: BucketUnit,
    size: u32,
}

impl Bucket {
    /// Parses a bucket string, returning `None` for anything outside the grammar.
    pub fn parse(input: &str) -> Option<Self> {
        let trimmed = input.trim();
        let digits_end = trimmed
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(trimmed.len());
        if digits_end == 0 {
            return None;
        }

        let (digits, rest) = trimmed.split_at(digits_end);
        let mut unit = rest.trim_start().chars();
        let unit = match (unit.next(), unit.next()) {
            (Some(c), None) => c.to_ascii_lowercase(),
            _ => return None,
        };

        let unit = match unit {
            'm' => BucketUnit::Minute,
            'h' => BucketUnit::Hour,
            _ => return None,
        };

        let size: u32 = digits.parse().ok()?;
        if size == 0 {
            return None;
        }

        // Width has to fit the database interval argument
        checked_minutes(unit, size)?;
        Some(Bucket { unit, size })
    }

    /// Bucket width in minutes. `parse` only admits widths that fit an `i32`.
    pub fn minutes(&self) -> i32 {
        checked_minutes(self.unit, self.size).unwrap_or(i32::MAX)
    }

    pub fn width(&self) -> Duration {
        Duration::minutes(i64::from(self.minutes()))
    }

    /// Start of the bucket containing `ts`.
    ///
    /// Bins are laid out on the wall clock of `tz` and the bin start is
    /// mapped back to UTC with the reading's own offset, so the result is
    /// never later than `ts` and never more than one width earlier. Around
    /// a DST change this splits a local bin by offset instead of guessing
    /// which occurrence of an ambiguous or missing local time was meant.
    /// `PgStore` computes the same key in SQL.
    pub fn truncate(&self, ts: DateTime<Utc>, tz: Tz) -> DateTime<Utc> {
        let local = ts.with_timezone(&tz).naive_local();
        let origin = bin_origin();

        let width_ms = self.width().num_milliseconds();
        let elapsed_ms = (local - origin).num_milliseconds();
        let start = origin + Duration::milliseconds(elapsed_ms.div_euclid(width_ms) * width_ms);

        ts - (local - start)
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.size, self.unit.suffix())
    }
}

fn checked_minutes(unit: BucketUnit, size: u32) -> Option<i32> {
    size.checked_mul(unit.minutes())
        .and_then(|m| i32::try_from(m).ok())
}

fn bin_origin() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2000, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}
