//! Keyword spam filter for free-text messages.
//!
//! The denylist is configuration data; the server swaps in a new filter when
//! the config file changes.

use crate::config::SpamConfig;

#[derive(Debug, Clone, Default)]
pub struct SpamFilter {
    /// Lowercased keywords.
    keywords: Vec<String>,
}

impl SpamFilter {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            keywords: keywords
                .into_iter()
                .map(|k| k.as_ref().trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }

    pub fn from_config(config: &SpamConfig) -> Self {
        Self::new(&config.keywords)
    }

    /// First denylisted keyword contained in `text`, if any.
    pub fn find_match(&self, text: &str) -> Option<&str> {
        let haystack = text.to_lowercase();
        self.keywords
            .iter()
            .find(|k| haystack.contains(k.as_str()))
            .map(String::as_str)
    }

    pub fn is_spam(&self, text: &str) -> bool {
        self.find_match(text).is_some()
    }

    pub fn len(&self) -> usize {
        self.keywords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_denylist_catches_winner_message() {
        let filter = SpamFilter::from_config(&SpamConfig::default());
        assert_eq!(
            filter.find_match("You are a WINNER! Claim your FREE MONEY now!"),
            Some("winner")
        );
    }

    #[test]
    fn test_case_insensitive_substring() {
        let filter = SpamFilter::new(["Casino"]);
        assert!(filter.is_spam("best CASINOS online"));
        assert!(!filter.is_spam("Is lavender safe for cats?"));
    }

    #[test]
    fn test_blank_keywords_ignored() {
        let filter = SpamFilter::new(["", "  ", "lottery"]);
        assert_eq!(filter.len(), 1);
        assert!(!filter.is_spam("hello"));
    }
}
