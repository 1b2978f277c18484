//! SMPTE-style timecode conversion.
//!
//! Input accepts one to four colon-separated fields:
//!
//! | fields        | seconds                         |
//! |---------------|---------------------------------|
//! | `S`           | `S`                             |
//! | `S:F`         | `S + F/12`                      |
//! | `M:S:F`       | `M*60 + S + F/12`               |
//! | `H:M:S:F`     | `H*3600 + M*60 + S + F/12`      |
//!
//! The frame field counts twelfths of a second.

use crate::error::{ButterError, ButterResult};

/// Frames per second of the frame field.
pub const FRAME_RATE: f64 = 12.0;

pub fn smpte_to_seconds(timecode: &str) -> ButterResult<f64> {
    let parts = timecode
        .trim()
        .split(':')
        .map(|p| {
            p.trim()
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite() && *v >= 0.0)
                .ok_or_else(|| ButterError::invalid(format!("bad timecode field '{}' in '{}'", p, timecode)))
        })
        .collect::<ButterResult<Vec<f64>>>()?;

    match parts.as_slice() {
        [s] => Ok(*s),
        [s, f] => Ok(s + f / FRAME_RATE),
        [m, s, f] => Ok(m * 60.0 + s + f / FRAME_RATE),
        [h, m, s, f] => Ok(h * 3600.0 + m * 60.0 + s + f / FRAME_RATE),
        _ => Err(ButterError::invalid(format!("timecode '{}' has more than 4 fields", timecode))),
    }
}

/// `HH:MM:SS`, seconds truncated. Hours keep counting past 24.
pub fn seconds_to_smpte(seconds: f64) -> ButterResult<String> {
    if !seconds.is_finite() || seconds < 0.0 {
        return Err(ButterError::invalid(format!("cannot format {} seconds", seconds)));
    }
    let total = seconds.trunc() as u64;
    Ok(format!("{:02}:{:02}:{:02}", total / 3600, (total % 3600) / 60, total % 60))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_field_counts() {
        assert_eq!(smpte_to_seconds("42.5").unwrap(), 42.5);
        assert_eq!(smpte_to_seconds("10:6").unwrap(), 10.5);
        assert_eq!(smpte_to_seconds("2:03:0").unwrap(), 123.0);
        assert_eq!(smpte_to_seconds("01:00:00:03").unwrap(), 3600.25);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(smpte_to_seconds("").is_err());
        assert!(smpte_to_seconds("a:b").is_err());
        assert!(smpte_to_seconds("1:2:3:4:5").is_err());
        assert!(smpte_to_seconds("-1").is_err());
    }

    #[test]
    fn test_format() {
        assert_eq!(seconds_to_smpte(0.0).unwrap(), "00:00:00");
        assert_eq!(seconds_to_smpte(3725.9).unwrap(), "01:02:05");
        assert_eq!(seconds_to_smpte(90000.0).unwrap(), "25:00:00");
        assert!(seconds_to_smpte(f64::NAN).is_err());
    }
}
