//! Prefix-tagged redemption tokens.
//!
//! Tokens travel as opaque strings in two disjoint namespaces: a `first_*`
//! token establishes eligibility, a `final_*` token resolves to a
//! destination. They are decoded into [`Token`] once at the boundary so the
//! rest of the service matches on the variant instead of re-checking string
//! prefixes.

use rand::RngCore;

pub const FIRST_PREFIX: &str = "first_";
pub const FINAL_PREFIX: &str = "final_";

/// Deep links carry the token as `...startapp=<token>`.
const DEEP_LINK_MARKER: &str = "startapp=";

/// A decoded redemption token.
///
/// The payload keeps its full wire form (prefix included), since that is the
/// value stored and compared everywhere downstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    First(String),
    Final(String),
}

impl Token {
    /// Decode a presented token, accepting both the bare form and the
    /// `...startapp=<token>` deep-link encoding.
    ///
    /// Returns `None` for anything outside the two token namespaces.
    pub fn parse(raw: &str) -> Option<Token> {
        let value = normalize(raw);
        if value.len() > FIRST_PREFIX.len() && value.starts_with(FIRST_PREFIX) {
            Some(Token::First(value.to_string()))
        } else if value.len() > FINAL_PREFIX.len() && value.starts_with(FINAL_PREFIX) {
            Some(Token::Final(value.to_string()))
        } else {
            None
        }
    }

    /// The wire form of the token.
    pub fn as_str(&self) -> &str {
        match self {
            Token::First(s) | Token::Final(s) => s,
        }
    }
}

/// Strip everything up to and including `startapp=`; bare values pass
/// through unchanged.
pub fn normalize(raw: &str) -> &str {
    match raw.find(DEEP_LINK_MARKER) {
        Some(idx) => &raw[idx + DEEP_LINK_MARKER.len()..],
        None => raw,
    }
}

/// Mint a fresh first-class token.
pub fn generate_first() -> String {
    generate(FIRST_PREFIX)
}

/// Mint a fresh final-class token.
pub fn generate_final() -> String {
    generate(FINAL_PREFIX)
}

fn generate(prefix: &str) -> String {
    let mut bytes = [0u8; 5];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("{prefix}{}", hex::encode(bytes))
}
