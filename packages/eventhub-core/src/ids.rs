//! Identifier, token and slug generation.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::distributions::Alphanumeric;
use rand::{Rng, RngCore};

/// Number of random bytes behind a share or e-mail token.
const TOKEN_BYTES: usize = 24;

/// Length of an event short code.
pub const SHORT_CODE_LEN: usize = 7;

/// Generate a unique row ID (UUID v4, simple form).
pub fn generate_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Generate an opaque URL-safe token (share tokens, e-mail links).
///
/// 24 random bytes from the thread-local CSPRNG, base64url without padding
/// (32 characters).
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Generate a base62 short code for event links.
pub fn generate_short_code() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SHORT_CODE_LEN)
        .map(char::from)
        .collect()
}

/// Turn a display name into a URL slug.
///
/// Lowercases, folds common Latin accents, and joins alphanumeric runs with
/// single hyphens. Returns `"item"` when nothing usable remains.
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut pending_dash = false;

    for c in input.chars().flat_map(char::to_lowercase) {
        let c = fold_accent(c);
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c);
        } else {
            pending_dash = true;
        }
    }

    slug.truncate(80);
    let slug = slug.trim_end_matches('-').to_string();
    if slug.is_empty() {
        "item".to_string()
    } else {
        slug
    }
}

/// Map accented Latin letters onto their ASCII base letter.
pub fn fold_accent(c: char) -> char {
    match c {
        'á' | 'à' | 'ä' | 'â' | 'ã' => 'a',
        'é' | 'è' | 'ë' | 'ê' => 'e',
        'í' | 'ì' | 'ï' | 'î' => 'i',
        'ó' | 'ò' | 'ö' | 'ô' | 'õ' => 'o',
        'ú' | 'ù' | 'ü' | 'û' => 'u',
        'ñ' => 'n',
        'ç' => 'c',
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_token_shape() {
        let token = generate_token();
        assert_eq!(token.len(), 32);
        assert!(token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_tokens_do_not_repeat() {
        let tokens: HashSet<String> = (0..1000).map(|_| generate_token()).collect();
        assert_eq!(tokens.len(), 1000);
    }

    #[test]
    fn test_short_code() {
        let code = generate_short_code();
        assert_eq!(code.len(), SHORT_CODE_LEN);
        assert!(code.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Hackathon Lima 2025!"), "hackathon-lima-2025");
        assert_eq!(slugify("  Innovación & Tecnología  "), "innovacion-tecnologia");
        assert_eq!(slugify("AWS User Group — Perú"), "aws-user-group-peru");
        assert_eq!(slugify("!!!"), "item");
    }
}
