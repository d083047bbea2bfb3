//! Device identity normalisation
//!
//! Scanners report the same hardware address as `aa-bb-cc-dd-ee-ff`,
//! `AABBCCDDEEFF` or `aa:bb:cc:dd:ee:ff`. Rows are keyed by the
//! upper-case colon form. Anything that is not a 48-bit address is kept
//! verbatim (trimmed).

/// Normalise an identity. Returns `None` for blank input.
pub fn normalize_identity(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let digits: String = trimmed
        .chars()
        .filter(|c| !matches!(c, ':' | '-' | '.'))
        .collect();

    if digits.len() == 12 && digits.chars().all(|c| c.is_ascii_hexdigit()) {
        let upper = digits.to_ascii_uppercase();
        let pairs: Vec<&str> = (0..6).map(|i| &upper[i * 2..i * 2 + 2]).collect();
        return Some(pairs.join(":"));
    }

    Some(trimmed.to_string())
}
