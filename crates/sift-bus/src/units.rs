//! Duration and file-size string grammar.
//!
//! Both grammars are `<number><unit>` with an optional space before the
//! unit, a strictly positive (possibly fractional) value, and nothing
//! trailing. Durations accept `ns`, `us`, `ms`, `s`, `m`, `h`; file sizes
//! accept `B`, `KiB`, `MiB`, `GiB`, `TiB`.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UnitParseError {
    #[error("'{0}' is not of the form <number><unit>")]
    Malformed(String),
    #[error("value must be strictly positive in '{0}'")]
    NonPositive(String),
    #[error("missing unit suffix in '{0}' (known: {1})")]
    MissingUnit(String, &'static str),
    #[error("unknown unit '{unit}' in '{input}' (known: {known})")]
    UnknownUnit {
        input: String,
        unit: String,
        known: &'static str,
    },
}

const DURATION_UNITS: &str = "ns, us, ms, s, m, h";
const FILESIZE_UNITS: &str = "B, KiB, MiB, GiB, TiB";

/// Splits the numeric prefix from the unit suffix.
fn split_value(input: &str) -> Result<(f64, &str), UnitParseError> {
    let s = input.trim();
    let digits_end = s
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(s.len());
    let (num, suffix) = s.split_at(digits_end);
    let value: f64 = num
        .parse()
        .map_err(|_| UnitParseError::Malformed(input.to_string()))?;
    if value <= 0.0 {
        return Err(UnitParseError::NonPositive(input.to_string()));
    }
    let suffix = suffix.trim_start();
    if suffix.chars().any(char::is_whitespace) {
        return Err(UnitParseError::Malformed(input.to_string()));
    }
    Ok((value, suffix))
}

/// Parses a duration string like `300ms` or `2.5s`.
pub fn parse_duration(input: &str) -> Result<Duration, UnitParseError> {
    let (value, suffix) = split_value(input)?;
    if suffix.is_empty() {
        return Err(UnitParseError::MissingUnit(
            input.to_string(),
            DURATION_UNITS,
        ));
    }
    let nanos = match suffix {
        "ns" => value,
        "us" => value * 1e3,
        "ms" => value * 1e6,
        "s" => value * 1e9,
        "m" => value * 1e9 * 60.0,
        "h" => value * 1e9 * 60.0 * 60.0,
        _ => {
            return Err(UnitParseError::UnknownUnit {
                input: input.to_string(),
                unit: suffix.to_string(),
                known: DURATION_UNITS,
            })
        }
    };
    Ok(Duration::from_nanos(nanos as u64))
}

/// Parses a file-size string like `300KiB` or `2.5MiB`.
pub fn parse_filesize(input: &str) -> Result<u64, UnitParseError> {
    let (value, suffix) = split_value(input)?;
    if suffix.is_empty() {
        return Err(UnitParseError::MissingUnit(
            input.to_string(),
            FILESIZE_UNITS,
        ));
    }
    let bytes = match suffix {
        "B" => value,
        "KiB" => value * 1024.0,
        "MiB" => value * 1024.0 * 1024.0,
        "GiB" => value * 1024.0 * 1024.0 * 1024.0,
        "TiB" => value * 1024.0 * 1024.0 * 1024.0 * 1024.0,
        _ => {
            return Err(UnitParseError::UnknownUnit {
                input: input.to_string(),
                unit: suffix.to_string(),
                known: FILESIZE_UNITS,
            })
        }
    };
    Ok(bytes as u64)
}
