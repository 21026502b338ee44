use std::sync::LazyLock;

use regex::Regex;

/// Identifier pattern for template ids. Template ids double as the name of
/// the per-template side table, so anything outside this set is rejected
/// before it can be interpolated into a statement.
pub static TEMPLATE_ID_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9_]+$").unwrap());

/// Loose email shape check used before handing a recipient to the mail provider.
pub static EMAIL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap());

/// Returns true if `value` is a safe template/table identifier.
pub fn is_valid_template_id(value: &str) -> bool {
    TEMPLATE_ID_REGEX.is_match(value)
}

/// Returns true if `value` looks like a deliverable email address.
pub fn is_valid_email(value: &str) -> bool {
    EMAIL_REGEX.is_match(value)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("nossa_historia", true)]
    #[case("template2", true)]
    #[case("a", true)]
    #[case("", false)]
    #[case("Nossa_Historia", false)]
    #[case("drop_table; --", false)]
    #[case("intentions where 1=1", false)]
    #[case("nossa-historia", false)]
    #[case("tbl\"", false)]
    fn test_template_id_validation(#[case] input: &str, #[case] expected: bool) {
        assert_eq!(is_valid_template_id(input), expected, "input: {input:?}");
    }

    #[rstest]
    #[case("ana@example.com", true)]
    #[case("first.last+tag@sub.example.com.br", true)]
    #[case("no-at-sign.example.com", false)]
    #[case("missing@tld", false)]
    #[case("spaces in@example.com", false)]
    #[case("", false)]
    fn test_email_validation(#[case] input: &str, #[case] expected: bool) {
        assert_eq!(is_valid_email(input), expected, "input: {input:?}");
    }
}
