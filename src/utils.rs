//! Small helpers shared across the crate: URL key normalisation, log-friendly
//! truncation and filesystem checks for the backup file.

use std::io;
use std::path::Path;
use tokio::fs;
use tracing::{info, instrument};
use url::Url;

/// Truncate a string for logging purposes.
///
/// Long strings are cut at the nearest char boundary below `max` bytes and
/// suffixed with `"…(+N bytes)"`.
///
/// ```ignore
/// assert_eq!(truncate_for_log("short", 100), "short");
/// ```
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…(+{} bytes)", &s[..cut], s.len() - cut)
}

/// Parse a link, tolerating registry-style entries that carry no scheme.
pub fn parse_lenient(url: &str) -> Option<Url> {
    let trimmed = url.trim();
    Url::parse(trimmed)
        .ok()
        .filter(|u| u.has_host())
        .or_else(|| Url::parse(&format!("http://{trimmed}")).ok())
}

/// Host part of a link (`https://www.foo.com/a` -> `www.foo.com`).
pub fn maintain_netloc(url: &str) -> String {
    parse_lenient(url)
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_default()
}

/// Path part of a link, percent-decoded when possible.
pub fn maintain_path(url: &str) -> String {
    match Url::parse(url.trim()) {
        Ok(u) => urlencoding::decode(u.path())
            .map(|p| p.into_owned())
            .unwrap_or_else(|_| u.path().to_string()),
        Err(_) => String::new(),
    }
}

/// Strip scheme, a leading `www.` and trailing slashes.
pub fn remove_prefix(url: &str) -> String {
    let mut s = url.trim();
    for scheme in ["https://", "http://"] {
        if let Some(rest) = s.strip_prefix(scheme) {
            s = rest;
            break;
        }
    }
    let s = s.strip_prefix("www.").unwrap_or(s);
    s.trim_end_matches('/').to_lowercase()
}

/// Make sure the directory holding `path` exists.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn ensure_parent_dir(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => {
            fs::create_dir_all(dir).await?;
            info!(dir = %dir.display(), "Backup directory ready");
            Ok(())
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_for_log_short_string() {
        assert_eq!(truncate_for_log("Hello, world!", 100), "Hello, world!");
    }

    #[test]
    fn test_truncate_for_log_long_string() {
        let s = "a".repeat(500);
        let result = truncate_for_log(&s, 100);
        assert!(result.starts_with(&"a".repeat(100)));
        assert!(result.contains("…(+400 bytes)"));
    }

    #[test]
    fn test_truncate_for_log_respects_char_boundaries() {
        let s = "é".repeat(10);
        let result = truncate_for_log(&s, 3);
        assert!(result.starts_with('é'));
        assert!(result.contains("(+18 bytes)"));
    }

    #[test]
    fn test_remove_prefix() {
        assert_eq!(remove_prefix("https://www.Example.com/"), "example.com");
        assert_eq!(remove_prefix("http://example.com/news/"), "example.com/news");
        assert_eq!(remove_prefix("archive.today"), "archive.today");
    }

    #[test]
    fn test_maintain_netloc_with_and_without_scheme() {
        assert_eq!(maintain_netloc("https://www.foo.com/a/b"), "www.foo.com");
        assert_eq!(maintain_netloc("foo.com/politics"), "foo.com");
        assert_eq!(maintain_netloc(""), "");
    }

    #[test]
    fn test_maintain_path_decodes() {
        assert_eq!(
            maintain_path("https://web.archive.org/web/2019/https%3A%2F%2Fexample.com%2Fstory"),
            "/web/2019/https://example.com/story"
        );
        assert_eq!(maintain_path("not a url"), "");
    }

    #[tokio::test]
    async fn test_ensure_parent_dir_creates_missing_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("nested/deeper/backup.json");
        ensure_parent_dir(&target).await.unwrap();
        assert!(dir.path().join("nested/deeper").is_dir());
    }
}
