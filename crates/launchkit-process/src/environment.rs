//! Child environment construction.
//!
//! Policy: the caller's overrides are merged onto a copy of this process's
//! environment and win on key collisions. Inherited variables are never
//! dropped, so a helper always sees `PATH`, `HOME` and friends.

use std::collections::BTreeMap;
use std::ffi::OsString;

/// Merge `overrides` onto `base`, overrides taking precedence.
///
/// The result is sorted by key so the child environment is deterministic.
pub fn merge_environment<I, K, V>(
    base: I,
    overrides: &BTreeMap<String, String>,
) -> BTreeMap<OsString, OsString>
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<OsString>,
    V: Into<OsString>,
{
    let mut merged: BTreeMap<OsString, OsString> = base
        .into_iter()
        .map(|(key, value)| (key.into(), value.into()))
        .collect();

    for (key, value) in overrides {
        merged.insert(OsString::from(key), OsString::from(value));
    }

    merged
}

/// Merge `overrides` onto the current process environment.
///
/// Uses `vars_os` so non-UTF-8 inherited values pass through untouched.
pub fn inherited_environment(overrides: &BTreeMap<String, String>) -> BTreeMap<OsString, OsString> {
    merge_environment(std::env::vars_os(), overrides)
}

/// Reject keys the OS cannot represent in an environment block.
pub fn validate_environment_key(key: &str) -> Result<(), String> {
    if key.is_empty() {
        return Err("environment variable name cannot be empty".to_string());
    }
    if key.contains('=') || key.contains('\0') {
        return Err(format!("invalid environment variable name: {:?}", key));
    }
    Ok(())
}
