//! Environment variable helpers.

use std::str::FromStr;

use super::ConfigError;

/// Read a variable, treating empty values as unset.
pub(super) fn var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Read and parse a variable.
///
/// Returns `Ok(None)` when the variable is unset.
pub(super) fn parse<T>(key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match var(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidValue {
                key,
                message: format!("'{raw}': {e}"),
            }),
        None => Ok(None),
    }
}
