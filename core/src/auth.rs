use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Fallback header for clients that cannot set `Authorization`.
pub const TOKEN_HEADER: &str = "x-mcp-token";

/// Pre-dispatch token check shared by the transports.
///
/// With no expected token configured every request passes. Otherwise the
/// bearer credential is consulted first and the custom header only when no
/// bearer credential was sent.
#[derive(Clone, Default)]
pub struct AuthGate {
    expected: Option<[u8; 32]>,
}

impl std::fmt::Debug for AuthGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthGate")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

impl AuthGate {
    pub fn new(expected: Option<&str>) -> Self {
        let expected = expected
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(digest);
        Self { expected }
    }

    pub fn disabled() -> Self {
        Self { expected: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.expected.is_some()
    }

    /// `authorization` is the raw `Authorization` header value and
    /// `token_header` the raw value of [`TOKEN_HEADER`], when present.
    pub fn check(&self, authorization: Option<&str>, token_header: Option<&str>) -> bool {
        let Some(expected) = &self.expected else {
            return true;
        };

        if let Some(bearer) = authorization.and_then(bearer_token) {
            return tokens_match(expected, bearer);
        }
        match token_header {
            Some(token) => tokens_match(expected, token.trim()),
            None => false,
        }
    }
}

/// Extracts the credential from `Bearer <token>`; the scheme is matched
/// case-insensitively.
pub fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

// Compares fixed-length digests, never the raw tokens.
fn tokens_match(expected: &[u8; 32], presented: &str) -> bool {
    let presented = digest(presented);
    expected[..].ct_eq(&presented[..]).into()
}

fn digest(token: &str) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&Sha256::digest(token.as_bytes()));
    out
}
