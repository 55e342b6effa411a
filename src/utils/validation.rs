use crate::utils::error::{LunchError, Result};
use chrono::NaiveTime;
use std::collections::HashSet;

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

pub fn validate_positive_number(field_name: &str, value: u64, min_value: u64) -> Result<()> {
    if value < min_value {
        return Err(LunchError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: format!("Value must be at least {}", min_value),
        });
    }
    Ok(())
}

pub fn validate_non_empty_string(field_name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(LunchError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: "Value cannot be empty or whitespace-only".to_string(),
        });
    }
    Ok(())
}

pub fn validate_range<T: PartialOrd + std::fmt::Display + Copy>(
    field_name: &str,
    value: T,
    min: T,
    max: T,
) -> Result<()> {
    if value < min || value > max {
        return Err(LunchError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: format!("Value must be between {} and {}", min, max),
        });
    }
    Ok(())
}

/// `earlier` must be strictly before `later` within the same day.
pub fn validate_time_order(
    field_name: &str,
    earlier: NaiveTime,
    later: NaiveTime,
) -> Result<()> {
    if earlier >= later {
        return Err(LunchError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: format!("{} >= {}", earlier.format("%H:%M"), later.format("%H:%M")),
            reason: "Times must be in increasing order".to_string(),
        });
    }
    Ok(())
}

pub fn validate_unique_ids<'a, I>(field_name: &str, ids: I) -> Result<()>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen = HashSet::new();
    for id in ids {
        validate_non_empty_string(field_name, id)?;
        if !seen.insert(id) {
            return Err(LunchError::InvalidConfigValueError {
                field: field_name.to_string(),
                value: id.to_string(),
                reason: "Duplicate id".to_string(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_positive_number() {
        assert!(validate_positive_number("scheduler.tick_seconds", 30, 1).is_ok());
        assert!(validate_positive_number("scheduler.tick_seconds", 0, 1).is_err());
    }

    #[test]
    fn test_validate_time_order() {
        let nine = NaiveTime::from_hms_opt(9, 0, 0).unwrap();
        let noon = NaiveTime::from_hms_opt(12, 0, 0).unwrap();
        assert!(validate_time_order("window", nine, noon).is_ok());
        assert!(validate_time_order("window", noon, nine).is_err());
        assert!(validate_time_order("window", nine, nine).is_err());
    }

    #[test]
    fn test_validate_unique_ids() {
        assert!(validate_unique_ids("users", ["a", "b"]).is_ok());
        assert!(validate_unique_ids("users", ["a", "a"]).is_err());
        assert!(validate_unique_ids("users", ["a", " "]).is_err());
    }

    #[test]
    fn test_validate_range() {
        assert!(validate_range("scoring.jitter_range", 30, 1, 1000).is_ok());
        assert!(validate_range("scoring.jitter_range", 0, 1, 1000).is_err());
    }
}
