//! Timestamp precision of imported data

use crate::error::{CoreError, Result};
use crate::types::Timestamp;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Unit of the timestamps found in the source data.
///
/// Remote writes are always nanosecond based; the precision decides how far a
/// source timestamp is scaled before it reaches a `Point`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Precision {
    #[serde(rename = "s")]
    Seconds,
    #[serde(rename = "ms")]
    Millis,
    #[serde(rename = "us")]
    Micros,
    #[default]
    #[serde(rename = "ns", alias = "")]
    Nanos,
}

impl Precision {
    /// Nanoseconds per unit of this precision
    pub fn multiplier(&self) -> i64 {
        match self {
            Precision::Seconds => 1_000_000_000,
            Precision::Millis => 1_000_000,
            Precision::Micros => 1_000,
            Precision::Nanos => 1,
        }
    }

    /// Short name used on the wire (`precision=` query parameter)
    pub fn as_str(&self) -> &'static str {
        match self {
            Precision::Seconds => "s",
            Precision::Millis => "ms",
            Precision::Micros => "us",
            Precision::Nanos => "ns",
        }
    }

    /// Scale a timestamp expressed in this precision to nanoseconds
    pub fn to_nanos(&self, timestamp: i64) -> Result<Timestamp> {
        timestamp
            .checked_mul(self.multiplier())
            .ok_or_else(|| CoreError::TimestampOverflow {
                timestamp,
                precision: self.as_str().to_string(),
            })
    }

    /// Express a nanosecond timestamp in this precision (truncating)
    pub fn from_nanos(&self, nanos: Timestamp) -> i64 {
        nanos / self.multiplier()
    }
}

impl FromStr for Precision {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "s" => Ok(Precision::Seconds),
            "ms" => Ok(Precision::Millis),
            "us" => Ok(Precision::Micros),
            "ns" | "" => Ok(Precision::Nanos),
            other => Err(CoreError::InvalidPrecision(other.to_string())),
        }
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_precision() {
        assert_eq!("s".parse::<Precision>().unwrap(), Precision::Seconds);
        assert_eq!("ms".parse::<Precision>().unwrap(), Precision::Millis);
        assert_eq!("us".parse::<Precision>().unwrap(), Precision::Micros);
        assert_eq!("ns".parse::<Precision>().unwrap(), Precision::Nanos);
        assert_eq!("".parse::<Precision>().unwrap(), Precision::Nanos);

        let err = "h".parse::<Precision>().unwrap_err();
        assert!(err.to_string().contains("only support (s, ms, us, ns)"));
    }

    #[test]
    fn test_scale_to_nanos() {
        let ts = 1234567890;
        assert_eq!(Precision::Seconds.to_nanos(ts).unwrap(), 1234567890000000000);
        assert_eq!(Precision::Millis.to_nanos(ts).unwrap(), 1234567890000000);
        assert_eq!(Precision::Micros.to_nanos(ts).unwrap(), 1234567890000);
        assert_eq!(Precision::Nanos.to_nanos(ts).unwrap(), 1234567890);
    }

    #[test]
    fn test_scale_overflow() {
        assert!(Precision::Seconds.to_nanos(i64::MAX).is_err());
        assert_eq!(Precision::Nanos.to_nanos(i64::MAX).unwrap(), i64::MAX);
    }

    #[test]
    fn test_from_nanos() {
        let nanos = 1278010080000000000;
        assert_eq!(Precision::Seconds.from_nanos(nanos), 1278010080);
        assert_eq!(Precision::Millis.from_nanos(nanos), 1278010080000);
        assert_eq!(Precision::Nanos.from_nanos(nanos), nanos);
    }

    #[test]
    fn test_display_round_trip() {
        for p in [Precision::Seconds, Precision::Millis, Precision::Micros, Precision::Nanos] {
            assert_eq!(p.to_string().parse::<Precision>().unwrap(), p);
        }
    }
}
