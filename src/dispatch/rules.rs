//! Operator acceptance rules applied after dedup.
//!
//! Rules run in a fixed order and the first one that fails drops the article.
//! A dropped article is a policy decision, not an error.

use crate::errors::AppResult;
use crate::models::Article;
use regex::Regex;
use serde::Deserialize;
use tracing::debug;

/// Rule settings as written in the config file.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RuleSettings {
    pub min_title_len: usize,
    pub min_body_len: usize,
    pub min_path_len: usize,
    pub url_blacklist: Vec<String>,
    pub title_blacklist: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    TitleTooShort,
    BodyTooShort,
    PathTooShort,
    UrlBlacklisted,
    TitleBlacklisted,
}

#[derive(Debug, Clone, Default)]
pub struct ArticleRules {
    min_title_len: usize,
    min_body_len: usize,
    min_path_len: usize,
    url_blacklist: Vec<Regex>,
    title_blacklist: Vec<Regex>,
}

impl ArticleRules {
    pub fn from_settings(settings: &RuleSettings) -> AppResult<Self> {
        let compile = |patterns: &[String]| -> AppResult<Vec<Regex>> {
            patterns.iter().map(|p| Regex::new(p).map_err(Into::into)).collect()
        };
        Ok(Self {
            min_title_len: settings.min_title_len,
            min_body_len: settings.min_body_len,
            min_path_len: settings.min_path_len,
            url_blacklist: compile(&settings.url_blacklist)?,
            title_blacklist: compile(&settings.title_blacklist)?,
        })
    }

    pub fn check(&self, article: &Article) -> Result<(), Rejection> {
        if article.title.trim().chars().count() < self.min_title_len {
            return Err(Rejection::TitleTooShort);
        }
        if article.text.trim().chars().count() < self.min_body_len {
            return Err(Rejection::BodyTooShort);
        }
        if article.path().chars().count() < self.min_path_len {
            return Err(Rejection::PathTooShort);
        }
        if self.url_blacklist.iter().any(|re| re.is_match(&article.url)) {
            return Err(Rejection::UrlBlacklisted);
        }
        if self.title_blacklist.iter().any(|re| re.is_match(&article.title)) {
            return Err(Rejection::TitleBlacklisted);
        }
        Ok(())
    }

    pub fn pass_checks(&self, article: &Article) -> bool {
        match self.check(article) {
            Ok(()) => true,
            Err(rejection) => {
                debug!(url = %article.url, ?rejection, "Article dropped by rules");
                false
            }
        }
    }
}
