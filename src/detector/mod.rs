pub mod response;

pub use response::{ReturnKind, ReturnValue};

/// Terms that suggest credentials, session material or crypto leaking out of
/// a return value. Matched case-insensitively as substrings.
pub const SENSITIVE_TERMS: [&str; 16] = [
    "crypt", "hash", "salt", "pwd", "pass", "password", "session", "secret", "key", "cipher",
    "md5", "encrypt", "security", "token", "consumer", "auth",
];

/// Distinct sensitive terms found in `text`, in vocabulary order.
pub fn sensitive_terms(text: &str) -> Vec<&'static str> {
    let lower = text.to_lowercase();
    SENSITIVE_TERMS
        .iter()
        .copied()
        .filter(|term| lower.contains(term))
        .collect()
}
