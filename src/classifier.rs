//! Link acceptance by source trust label.
//!
//! | label      | accept when                         |
//! |------------|-------------------------------------|
//! | High       | `!fake`                             |
//! | Low        | `fake`                              |
//! | Mixed      | `fake && archived`                  |
//! | Archive    | `fake && !archived`                 |
//! | unlabelled | never                               |
//!
//! The table is applied twice: once before fetching (with `archived = false`)
//! and once after an archive mirror revealed the canonical URL.

use crate::reliability::{ReliabilityIndex, TrustLabel};

// TODO: confirm with the dataset owners whether Mixed sources should also be
// accepted when discovered directly rather than only through an archive mirror.
pub fn accepts(label: Option<TrustLabel>, fake: bool, archived: bool) -> bool {
    match label {
        Some(TrustLabel::High) => !fake,
        Some(TrustLabel::Low) => fake,
        Some(TrustLabel::Mixed) => fake && archived,
        Some(TrustLabel::Archive) => fake && !archived,
        None => false,
    }
}

#[derive(Debug, Clone)]
pub struct LinkClassifier {
    index: ReliabilityIndex,
}

impl LinkClassifier {
    pub fn new(index: ReliabilityIndex) -> Self {
        Self { index }
    }

    /// Check performed when a link enters the dispatcher.
    pub fn pre_fetch(&self, url: &str, fake: bool) -> bool {
        self.is_valid(url, fake, false)
    }

    pub fn is_valid(&self, url: &str, fake: bool, archived: bool) -> bool {
        accepts(self.index.label(url), fake, archived)
    }
}
