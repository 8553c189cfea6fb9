// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Contact identity normalization to E.164.

use std::sync::LazyLock;

use regex::Regex;

static E164: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"^\+[1-9][0-9]{7,14}$").ok());

/// Normalizes a phone number to E.164, or `None` if it cannot be one.
///
/// Separators (spaces, dashes, dots, parentheses) are dropped and a `00`
/// international prefix becomes `+`. Bare 10-digit numbers and 11-digit
/// numbers starting with `1` are read as North American.
pub fn normalize_identity(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let has_plus = trimmed.starts_with('+');
    let mut digits = String::with_capacity(trimmed.len());
    for (i, c) in trimmed.chars().enumerate() {
        match c {
            '0'..='9' => digits.push(c),
            ' ' | '-' | '.' | '(' | ')' => {}
            '+' if i == 0 => {}
            _ => return None,
        }
    }

    let candidate = if has_plus {
        format!("+{digits}")
    } else if let Some(rest) = digits.strip_prefix("00") {
        format!("+{rest}")
    } else if digits.len() == 10 {
        format!("+1{digits}")
    } else if digits.len() == 11 && digits.starts_with('1') {
        format!("+{digits}")
    } else {
        return None;
    };

    E164
        .as_ref()
        .is_some_and(|re| re.is_match(&candidate))
        .then_some(candidate)
}

/// The key a contact is stored and looked up under: its E.164 form, or the
/// trimmed input when it is not a phone number.
pub fn contact_key(raw: &str) -> String {
    normalize_identity(raw).unwrap_or_else(|| raw.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formatted_numbers_normalize() {
        assert_eq!(normalize_identity("+1 (555) 000-1111").as_deref(), Some("+15550001111"));
        assert_eq!(normalize_identity("555.000.1111").as_deref(), Some("+15550001111"));
        assert_eq!(normalize_identity("15550001111").as_deref(), Some("+15550001111"));
        assert_eq!(normalize_identity("0044 20 7946 0958").as_deref(), Some("+442079460958"));
    }

    #[test]
    fn garbage_is_rejected() {
        assert_eq!(normalize_identity(""), None);
        assert_eq!(normalize_identity("call me"), None);
        assert_eq!(normalize_identity("+0123456789"), None);
        assert_eq!(normalize_identity("12345"), None);
        assert_eq!(normalize_identity("+1234567890123456"), None);
        assert_eq!(normalize_identity("555-0001111 ext 4"), None);
    }

    #[test]
    fn already_normalized_is_unchanged() {
        assert_eq!(normalize_identity("+15550002222").as_deref(), Some("+15550002222"));
    }

    #[test]
    fn contact_key_falls_back_to_trimmed_input() {
        assert_eq!(contact_key("(555) 000-1111"), "+15550001111");
        assert_eq!(contact_key(" 15550001111 "), "+15550001111");
        assert_eq!(contact_key("  whatsapp:alice "), "whatsapp:alice");
    }
}
