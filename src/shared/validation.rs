use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Regex for validating slug fields (category slug, product slug)
    /// Must be lowercase alphanumeric with single hyphens between segments
    /// - Valid: "mens-shoes", "tv4k", "summer-sale-2024"
    /// - Invalid: "-shoes", "shoes-", "mens--shoes", "Shoes", "mens_shoes"
    pub static ref SLUG_REGEX: Regex = Regex::new(r"^[a-z0-9]+(?:-[a-z0-9]+)*$").unwrap();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slug_regex_valid() {
        assert!(SLUG_REGEX.is_match("mens-shoes"));
        assert!(SLUG_REGEX.is_match("tv4k"));
        assert!(SLUG_REGEX.is_match("summer-sale-2024"));
        assert!(SLUG_REGEX.is_match("a"));
        assert!(SLUG_REGEX.is_match("abc123"));
        assert!(SLUG_REGEX.is_match("a-b-c"));
    }

    #[test]
    fn test_slug_regex_invalid() {
        assert!(!SLUG_REGEX.is_match("-shoes")); // starts with hyphen
        assert!(!SLUG_REGEX.is_match("shoes-")); // ends with hyphen
        assert!(!SLUG_REGEX.is_match("mens--shoes")); // double hyphen
        assert!(!SLUG_REGEX.is_match("Shoes")); // uppercase
        assert!(!SLUG_REGEX.is_match("mens_shoes")); // underscore
        assert!(!SLUG_REGEX.is_match("")); // empty
        assert!(!SLUG_REGEX.is_match("mens shoes")); // space
    }
}
