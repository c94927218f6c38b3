use crate::{UuidError, UuidResult};
use chrono::{DateTime, NaiveDate, Utc};
use std::{fmt, str::FromStr};
use uuid::Uuid;

const PREFIX: &str = "IPD";
const SUFFIX_LEN: usize = 6;

/// Human-facing admission reference.
///
/// Format: `IPD-YYYYMMDD-XXXXXX`, where the date is the admission day (UTC) and the suffix is
/// six uppercase hex characters taken from a fresh random UUID. Uniqueness across the whole
/// store is checked by the caller; generation alone only makes collisions unlikely.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AdmissionNumber(String);

impl AdmissionNumber {
    pub fn generate(admitted_at: DateTime<Utc>) -> Self {
        let random = Uuid::new_v4().simple().to_string();
        let suffix = random[..SUFFIX_LEN].to_ascii_uppercase();
        Self(format!(
            "{PREFIX}-{}-{suffix}",
            admitted_at.format("%Y%m%d")
        ))
    }

    /// Validates an admission number supplied from outside (CLI, search, storage).
    pub fn parse(input: &str) -> UuidResult<Self> {
        let invalid = || {
            UuidError::InvalidInput(format!(
                "admission number must look like IPD-YYYYMMDD-XXXXXX, got '{input}'"
            ))
        };

        let mut parts = input.split('-');
        let (Some(prefix), Some(date), Some(suffix), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid());
        };

        if prefix != PREFIX {
            return Err(invalid());
        }
        NaiveDate::parse_from_str(date, "%Y%m%d").map_err(|_| invalid())?;
        if date.len() != 8 {
            return Err(invalid());
        }
        if suffix.len() != SUFFIX_LEN
            || !suffix
                .bytes()
                .all(|b| matches!(b, b'0'..=b'9' | b'A'..=b'F'))
        {
            return Err(invalid());
        }

        Ok(Self(input.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AdmissionNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for AdmissionNumber {
    type Err = UuidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for AdmissionNumber {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for AdmissionNumber {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}
