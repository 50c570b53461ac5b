//! Dotted version comparison.
//!
//! Release versions are plain dot-separated integers (`1.345.1`). They are
//! compared component by component from the left; the first unequal pair
//! decides. When one sequence runs out while all shared components are equal,
//! the candidate is **not** newer, so `1.2` vs `1.2.1` is not an update.
//!
//! Unknown versions fail open: a missing or empty version on either side
//! means an update is eligible.

use crate::core::UpdateError;
use std::cmp::Ordering;

/// Returns `true` if `candidate` is newer than `current`.
///
/// # Rules
///
/// - `None` or empty on either side ⇒ `true`
/// - first differing component larger in `candidate` ⇒ `true`
/// - first differing component smaller in `candidate` ⇒ `false`
/// - one side exhausted with equal prefix ⇒ `false`
///
/// # Errors
///
/// Returns [`UpdateError::MalformedVersion`] if either string contains a
/// component that is not an unsigned integer.
///
/// # Examples
///
/// ```rust,no_run
/// use binguard_cli::upgrade::version_check::is_newer;
///
/// assert!(is_newer(Some("1.342.2"), Some("1.345.1")).unwrap());
/// assert!(!is_newer(Some("2.0.0"), Some("1.9.9")).unwrap());
/// assert!(is_newer(None, Some("1.0.0")).unwrap());
/// ```
pub fn is_newer(current: Option<&str>, candidate: Option<&str>) -> Result<bool, UpdateError> {
    let (Some(current), Some(candidate)) = (non_empty(current), non_empty(candidate)) else {
        return Ok(true);
    };

    let current = parse_components(current)?;
    let candidate = parse_components(candidate)?;
    Ok(candidate_is_newer(&current, &candidate))
}

/// Check that `version` is a dotted sequence of unsigned integers.
///
/// Versions that pass can be persisted and compared by [`is_newer`] later.
///
/// # Errors
///
/// Returns [`UpdateError::MalformedVersion`] for an empty string, a prerelease
/// suffix such as `2.0.0-rc` or any other non-numeric component.
pub fn validate_version(version: &str) -> Result<(), UpdateError> {
    parse_components(version.trim()).map(|_| ())
}

fn non_empty(version: Option<&str>) -> Option<&str> {
    version.map(str::trim).filter(|v| !v.is_empty())
}

fn parse_components(version: &str) -> Result<Vec<u64>, UpdateError> {
    version
        .split('.')
        .map(|part| {
            part.parse::<u64>().map_err(|_| UpdateError::MalformedVersion {
                version: version.to_string(),
            })
        })
        .collect()
}

fn candidate_is_newer(current: &[u64], candidate: &[u64]) -> bool {
    for (cur, cand) in current.iter().zip(candidate) {
        match cand.cmp(cur) {
            Ordering::Greater => return true,
            Ordering::Less => return false,
            Ordering::Equal => {}
        }
    }
    false
}
