/// Field normalization applied when a user identity is built
///
/// - Usernames and emails: trimmed and lowercased
/// - Person names: whitespace collapsed, each word title-cased
/// - Free text such as phone numbers: whitespace collapsed only

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref WHITESPACE_RUN: Regex = Regex::new(r"\s+").unwrap();
}

/// Trim and lowercase (usernames, emails)
pub fn lowercase(value: &str) -> String {
    value.trim().to_lowercase()
}

/// Trim and collapse internal whitespace runs to a single space
pub fn spaces_only(value: &str) -> String {
    WHITESPACE_RUN.replace_all(value.trim(), " ").into_owned()
}

/// Collapse whitespace and capitalize the first letter of each word,
/// lowercasing the rest. Hyphen and apostrophe start a new word.
pub fn title_case(value: &str) -> String {
    let collapsed = spaces_only(value);
    let mut out = String::with_capacity(collapsed.len());
    let mut start_of_word = true;

    for c in collapsed.chars() {
        if start_of_word {
            out.extend(c.to_uppercase());
        } else {
            out.extend(c.to_lowercase());
        }
        start_of_word = c == ' ' || c == '-' || c == '\'';
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercases_and_trims() {
        assert_eq!(lowercase("  JDoe@Example.COM "), "jdoe@example.com");
    }

    #[test]
    fn collapses_whitespace() {
        assert_eq!(spaces_only("  +51   999\t123  "), "+51 999 123");
    }

    #[test]
    fn title_cases_names() {
        assert_eq!(title_case("jOHN   doe"), "John Doe");
        assert_eq!(title_case("jean-pierre"), "Jean-Pierre");
        assert_eq!(title_case("o'brien"), "O'Brien");
        assert_eq!(title_case("   "), "");
    }

    #[test]
    fn title_case_handles_non_ascii() {
        assert_eq!(title_case("ÁLVARO núñez"), "Álvaro Núñez");
    }
}
