//! Constant-time comparisons.
//!
//! Used wherever key material received from a peer is compared against
//! expected values.

use subtle::{Choice, ConstantTimeEq};

/// Constant-time comparison of byte slices.
///
/// Returns `true` if slices are equal, `false` otherwise.
/// Execution time depends only on slice length, not content.
#[must_use]
pub fn ct_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    a.ct_eq(b).into()
}

/// Reports whether `needle` occurs anywhere in `haystack`.
///
/// Every window is compared; timing depends only on the two lengths.
#[must_use]
pub fn ct_contains(haystack: &[u8], needle: &[u8]) -> bool {
    if needle.is_empty() || needle.len() > haystack.len() {
        return false;
    }

    let mut found = Choice::from(0u8);
    for window in haystack.windows(needle.len()) {
        found |= window.ct_eq(needle);
    }
    found.into()
}
