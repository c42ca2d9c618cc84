//! Mention ID ordering
//!
//! Upstream mention IDs are decimal snowflakes: newer mentions have larger IDs.
//! Both the watermark and the oldest-first processing order depend on comparing
//! them, so the comparison is an explicit, configurable policy rather than an
//! incidental `String` ordering.

use std::cmp::Ordering;
use strum::{AsRefStr, Display, EnumString};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, EnumString, AsRefStr, Display)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum IdOrdering {
    /// Plain string comparison. Chronological only while IDs share a length.
    #[default]
    Lexicographic,
    /// Shorter digit strings sort first, then lexicographic. Chronological for
    /// any pair of canonical (no leading zero) decimal IDs.
    Numeric,
}

impl IdOrdering {
    pub fn compare(&self, a: &str, b: &str) -> Ordering {
        match self {
            IdOrdering::Lexicographic => a.cmp(b),
            IdOrdering::Numeric => a.len().cmp(&b.len()).then_with(|| a.cmp(b)),
        }
    }

    /// Largest ID under this ordering, or None for an empty input
    pub fn max<'a, I>(&self, ids: I) -> Option<&'a str>
    where
        I: IntoIterator<Item = &'a str>,
    {
        ids.into_iter().max_by(|a, b| self.compare(a, b))
    }

    /// Sort oldest first
    pub fn sort<T, F>(&self, items: &mut [T], id: F)
    where
        F: Fn(&T) -> &str,
    {
        items.sort_by(|a, b| self.compare(id(a), id(b)));
    }

    /// Check the precondition the ordering relies on: a non-empty decimal ID.
    pub fn check(&self, id: &str) -> bool {
        !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit())
    }
}

/// True when every ID has the same length. Lexicographic ordering is only
/// chronological under this condition.
pub fn uniform_length<'a, I>(ids: I) -> bool
where
    I: IntoIterator<Item = &'a str>,
{
    let mut iter = ids.into_iter();
    match iter.next() {
        Some(first) => iter.all(|id| id.len() == first.len()),
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_parse_from_config_string() {
        assert_eq!(IdOrdering::from_str("numeric").unwrap(), IdOrdering::Numeric);
        assert_eq!(
            IdOrdering::from_str("Lexicographic").unwrap(),
            IdOrdering::Lexicographic
        );
        assert!(IdOrdering::from_str("chronological").is_err());
        assert_eq!(IdOrdering::Numeric.as_ref(), "numeric");
    }

    #[test]
    fn test_orderings_agree_on_equal_length() {
        for ordering in [IdOrdering::Lexicographic, IdOrdering::Numeric] {
            assert_eq!(ordering.max(["100", "102", "101"]), Some("102"));
            assert_eq!(ordering.compare("100", "101"), Ordering::Less);
        }
    }

    #[test]
    fn test_orderings_differ_on_mixed_length() {
        // "99" is older than "100" but sorts after it as a plain string
        assert_eq!(IdOrdering::Lexicographic.max(["99", "100"]), Some("99"));
        assert_eq!(IdOrdering::Numeric.max(["99", "100"]), Some("100"));
    }

    #[test]
    fn test_max_of_empty_is_none() {
        assert_eq!(IdOrdering::Numeric.max(std::iter::empty()), None);
    }

    #[test]
    fn test_sort_oldest_first() {
        let mut ids = vec!["1003", "998", "1001"];
        IdOrdering::Numeric.sort(&mut ids, |s| *s);
        assert_eq!(ids, vec!["998", "1001", "1003"]);
    }

    #[test]
    fn test_precondition() {
        let ordering = IdOrdering::default();
        assert!(ordering.check("1790000000000000000"));
        assert!(!ordering.check(""));
        assert!(!ordering.check("abc"));
        assert!(!ordering.check("12 3"));

        assert!(uniform_length(["100", "200"]));
        assert!(!uniform_length(["99", "100"]));
        assert!(uniform_length(std::iter::empty()));
    }
}
