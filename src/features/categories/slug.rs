//! Slug derivation for categories. User-supplied slugs are validated
//! against [`SLUG_REGEX`](crate::shared::validation::SLUG_REGEX); derived
//! slugs are generated here and always satisfy it.

use std::collections::HashSet;

use crate::shared::constants::MAX_SLUG_LENGTH;

/// Derive a URL-safe slug from a display name: lowercase, ASCII
/// alphanumerics kept, every other run collapsed to one hyphen, capped at
/// the column width. Falls back to `"category"` when nothing survives.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_was_hyphen = true; // suppresses leading hyphens
    for c in name.chars().flat_map(|c| c.to_lowercase()) {
        if c.is_ascii_alphanumeric() {
            slug.push(c);
            last_was_hyphen = false;
        } else if !last_was_hyphen {
            slug.push('-');
            last_was_hyphen = true;
        }
    }

    while slug.ends_with('-') {
        slug.pop();
    }
    if slug.len() > MAX_SLUG_LENGTH {
        // Only ASCII reaches the buffer, so the cut is a char boundary.
        slug.truncate(MAX_SLUG_LENGTH);
        while slug.ends_with('-') {
            slug.pop();
        }
    }
    if slug.is_empty() {
        slug.push_str("category");
    }
    slug
}

/// Pick `base` if it is still free, otherwise the first free `base-2`,
/// `base-3`, ... candidate. Candidates never exceed the column width; the
/// base is shortened to make room for the suffix when needed.
pub fn disambiguate(base: &str, existing: &HashSet<String>) -> String {
    if !existing.contains(base) {
        return base.to_string();
    }

    let mut n: u32 = 2;
    loop {
        let suffix = format!("-{}", n);
        let room = MAX_SLUG_LENGTH.saturating_sub(suffix.len());
        let head: &str = &base[..base.len().min(room)];
        let head = head.trim_end_matches('-');
        let candidate = format!("{}{}", head, suffix);
        if !existing.contains(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::validation::SLUG_REGEX;

    #[test]
    fn test_slugify_basic() {
        assert_eq!(slugify("Electronics"), "electronics");
        assert_eq!(slugify("Men's Shoes"), "men-s-shoes");
        assert_eq!(slugify(" TV & Audio "), "tv-audio");
        assert_eq!(slugify("Summer Sale 2024"), "summer-sale-2024");
    }

    #[test]
    fn test_slugify_collapses_separator_runs() {
        assert_eq!(slugify("--Big  Sale!!"), "big-sale");
        assert_eq!(slugify("a___b"), "a-b");
    }

    #[test]
    fn test_slugify_falls_back_when_nothing_survives() {
        assert_eq!(slugify(""), "category");
        assert_eq!(slugify("!!!"), "category");
        assert_eq!(slugify("???"), "category");
    }

    #[test]
    fn test_slugify_truncates_long_names() {
        let name = "x".repeat(3 * MAX_SLUG_LENGTH);
        let slug = slugify(&name);
        assert_eq!(slug.len(), MAX_SLUG_LENGTH);
        assert!(SLUG_REGEX.is_match(&slug));
    }

    #[test]
    fn test_slugify_output_always_matches_slug_regex() {
        for name in ["Electronics", "Men's Shoes", "  ", "Café & Bar", "a-b-c"] {
            assert!(SLUG_REGEX.is_match(&slugify(name)), "name: {:?}", name);
        }
    }

    #[test]
    fn test_disambiguate_keeps_free_base() {
        let existing = HashSet::from(["shoes-2".to_string()]);
        assert_eq!(disambiguate("shoes", &existing), "shoes");
    }

    #[test]
    fn test_disambiguate_picks_first_free_suffix() {
        let existing = HashSet::from(["shoes".to_string()]);
        assert_eq!(disambiguate("shoes", &existing), "shoes-2");

        let existing = HashSet::from(["shoes".to_string(), "shoes-2".to_string()]);
        assert_eq!(disambiguate("shoes", &existing), "shoes-3");

        let existing = HashSet::from(["shoes".to_string(), "shoes-3".to_string()]);
        assert_eq!(disambiguate("shoes", &existing), "shoes-2");
    }

    #[test]
    fn test_disambiguate_respects_length_cap() {
        let base = "y".repeat(MAX_SLUG_LENGTH);
        let existing = HashSet::from([base.clone()]);
        let candidate = disambiguate(&base, &existing);
        assert_eq!(candidate.len(), MAX_SLUG_LENGTH);
        assert!(candidate.ends_with("-2"));
        assert!(SLUG_REGEX.is_match(&candidate));
    }
}
