//! Browser token generation

use aperture_const::BROWSER_TOKEN_BYTES;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::Rng;

/// Generate a random browser token
///
/// 256 bits from the thread-local CSPRNG, encoded as unpadded URL-safe base64 so the
/// token can be placed in a query string without escaping.
pub fn generate_browser_token() -> String {
    let mut bytes = [0u8; BROWSER_TOKEN_BYTES];
    rand::rng().fill(&mut bytes[..]);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_shape() {
        let token = generate_browser_token();
        assert_eq!(token.len(), 43);
        assert!(token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_tokens_differ() {
        assert_ne!(generate_browser_token(), generate_browser_token());
    }
}
