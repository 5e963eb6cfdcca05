//! Duplicate detection on trimmed title and canonical URL.

use crate::models::Article;
use std::collections::HashSet;
use std::sync::Mutex;

#[derive(Debug, Default)]
struct Seen {
    titles: HashSet<String>,
    urls: HashSet<String>,
}

/// Both sets sit behind one lock so the check-and-insert is atomic.
#[derive(Debug, Default)]
pub struct DuplicateChecker {
    seen: Mutex<Seen>,
}

impl DuplicateChecker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the article and return true if neither its title nor its URL
    /// were seen before. Blank titles are only checked by URL.
    pub fn is_valid(&self, article: &Article) -> bool {
        let title = article.title.trim();
        let url = article.url.trim();
        let mut seen = match self.seen.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if (!title.is_empty() && seen.titles.contains(title)) || seen.urls.contains(url) {
            return false;
        }
        if !title.is_empty() {
            seen.titles.insert(title.to_string());
        }
        seen.urls.insert(url.to_string());
        true
    }

    pub fn flush(&self) {
        let mut seen = match self.seen.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        seen.titles.clear();
        seen.urls.clear();
    }

    pub fn len(&self) -> usize {
        self.seen.lock().map(|s| s.urls.len()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn article(url: &str, title: &str) -> Article {
        Article {
            url: url.into(),
            visited_url: url.into(),
            scraped_from: "https://feed.example".into(),
            fake: false,
            title: title.into(),
            text: String::new(),
            summary: String::new(),
            description: None,
            authors: vec![],
            images: vec![],
            keywords: vec![],
            publish_date: None,
            lang: None,
        }
    }

    #[test]
    fn test_same_pair_accepted_once() {
        let checker = DuplicateChecker::new();
        let a = article("https://x.example/1", "Title");
        assert!(checker.is_valid(&a));
        assert!(!checker.is_valid(&a));
        assert_eq!(checker.len(), 1);
    }

    #[test]
    fn test_title_or_url_alone_is_a_duplicate() {
        let checker = DuplicateChecker::new();
        assert!(checker.is_valid(&article("https://x.example/1", "Title")));
        assert!(!checker.is_valid(&article("https://x.example/2", "  Title ")));
        assert!(!checker.is_valid(&article(" https://x.example/1", "Other")));
        assert!(checker.is_valid(&article("https://x.example/3", "Third")));
    }

    #[test]
    fn test_blank_titles_are_checked_by_url_only() {
        let checker = DuplicateChecker::new();
        assert!(checker.is_valid(&article("https://x.example/1", "")));
        assert!(checker.is_valid(&article("https://x.example/2", "   ")));
        assert!(!checker.is_valid(&article("https://x.example/2", "")));
        assert_eq!(checker.len(), 2);
    }

    #[test]
    fn test_flush_forgets_everything() {
        let checker = DuplicateChecker::new();
        let a = article("https://x.example/1", "Title");
        assert!(checker.is_valid(&a));
        checker.flush();
        assert!(checker.is_valid(&a));
    }
}
