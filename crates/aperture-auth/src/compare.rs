//! Constant-time secret comparison

use aperture_const::COMPARE_STACK_THRESHOLD;
use subtle::{Choice, ConstantTimeEq};

/// Compare a configured secret with an untrusted candidate
///
/// The candidate is encoded as UTF-8 and copied into a buffer the length of `expected`,
/// zero-padded or truncated, so the comparison always touches `expected.len()` bytes.
/// The length check is folded in with a constant-time equality instead of an early
/// return. Secrets up to [`COMPARE_STACK_THRESHOLD`] bytes use a stack buffer; longer
/// ones allocate a buffer sized by the secret, never by the candidate.
///
/// # Example
///
/// ```
/// use aperture_auth::compare::compare_key;
///
/// assert!(compare_key(b"s3cret", "s3cret"));
/// assert!(!compare_key(b"s3cret", "s3cre"));
/// ```
pub fn compare_key(expected: &[u8], candidate: &str) -> bool {
    let candidate = candidate.as_bytes();
    let lengths_match = (expected.len() as u64).ct_eq(&(candidate.len() as u64));

    let contents_match = if expected.len() <= COMPARE_STACK_THRESHOLD {
        let mut buffer = [0u8; COMPARE_STACK_THRESHOLD];
        contents_equal(expected, candidate, &mut buffer[..expected.len()])
    } else {
        let mut buffer = vec![0u8; expected.len()];
        contents_equal(expected, candidate, &mut buffer)
    };

    (lengths_match & contents_match).into()
}

fn contents_equal(expected: &[u8], candidate: &[u8], buffer: &mut [u8]) -> Choice {
    for (index, slot) in buffer.iter_mut().enumerate() {
        *slot = candidate.get(index).copied().unwrap_or(0);
    }
    buffer.ct_eq(expected)
}
