//! Webhook signature verification (spec.md §4.6): HMAC-SHA256 for GitHub's
//! `x-hub-signature-256` header, constant-time token comparison for
//! GitLab's `X-Gitlab-Token` header.

use ring::hmac;

/// `header` is the full `sha256=<hex>` value GitHub sends. Returns `false`
/// on any malformed input rather than erroring -- an attacker-controlled
/// header is just another way to fail verification.
pub fn verify_github_signature(secret: &str, body: &[u8], header: &str) -> bool {
    let Some(hex_digest) = header.strip_prefix("sha256=") else {
        return false;
    };
    let Ok(expected) = hex_decode(hex_digest) else {
        return false;
    };

    let key = hmac::Key::new(hmac::HMAC_SHA256, secret.as_bytes());
    hmac::verify(&key, body, &expected).is_ok()
}

/// GitLab sends the configured secret verbatim; `ring::constant_time`
/// guards against timing side-channels during comparison.
pub fn verify_gitlab_token(secret: &str, header: &str) -> bool {
    ring::constant_time::verify_slices(secret.as_bytes(), header.as_bytes()).is_ok()
}

fn hex_decode(s: &str) -> Result<Vec<u8>, ()> {
    if s.len() % 2 != 0 {
        return Err(());
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).map_err(|_| ()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn github_signature_round_trips_through_ring() {
        let secret = "topsecret";
        let body = b"{\"ref\":\"refs/heads/main\"}";
        let key = hmac::Key::new(hmac::HMAC_SHA256, secret.as_bytes());
        let tag = hmac::sign(&key, body);
        let header = format!("sha256={}", tag.as_ref().iter().map(|b| format!("{b:02x}")).collect::<String>());

        assert!(verify_github_signature(secret, body, &header));
        assert!(!verify_github_signature("wrong", body, &header));
    }

    #[test]
    fn github_signature_rejects_missing_prefix() {
        assert!(!verify_github_signature("secret", b"body", "deadbeef"));
    }

    #[test]
    fn gitlab_token_must_match_exactly() {
        assert!(verify_gitlab_token("my-token", "my-token"));
        assert!(!verify_gitlab_token("my-token", "not-it"));
    }
}
