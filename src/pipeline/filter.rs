//! Mention filters drop suggested entities that are not worth resolving.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

use crate::model::SuggestedEntity;

/// Decides whether a suggested entity should enter resolution.
pub trait MentionFilter: Send + Sync {
    /// `Some(reason)` when the mention is rejected.
    fn rejection(&self, suggested: &SuggestedEntity) -> Option<String>;

    fn accepts(&self, suggested: &SuggestedEntity) -> bool {
        self.rejection(suggested).is_none()
    }
}

/// Keep only the suggestions `filter` accepts, in order.
pub fn filter_mentions(
    filter: &dyn MentionFilter,
    suggested: Vec<SuggestedEntity>,
) -> Vec<SuggestedEntity> {
    suggested.into_iter().filter(|s| filter.accepts(s)).collect()
}

const PRONOUNS_AND_STOP_WORDS: &[&str] = &[
    "i", "me", "my", "mine", "we", "us", "our", "ours", "you", "your", "yours", "he", "him",
    "his", "she", "her", "hers", "it", "its", "they", "them", "their", "theirs", "this", "that",
    "these", "those", "who", "whom", "which", "what", "someone", "somebody", "something",
    "anyone", "everyone", "nobody", "the", "a", "an", "here", "there", "user", "assistant",
];

/// Rejects names that are too short, pronouns and stop words, or contain no
/// letters at all.
#[derive(Debug, Clone)]
pub struct BasicMentionFilter {
    min_length: usize,
    stop_words: BTreeSet<String>,
}

impl Default for BasicMentionFilter {
    fn default() -> Self {
        Self::new(2)
    }
}

impl BasicMentionFilter {
    pub fn new(min_length: usize) -> Self {
        Self {
            min_length,
            stop_words: PRONOUNS_AND_STOP_WORDS
                .iter()
                .map(|w| w.to_string())
                .collect(),
        }
    }

    /// Reject additional words (case-insensitive).
    pub fn with_stop_words<I, S>(mut self, words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.stop_words
            .extend(words.into_iter().map(|w| w.as_ref().trim().to_lowercase()));
        self
    }
}

impl MentionFilter for BasicMentionFilter {
    fn rejection(&self, suggested: &SuggestedEntity) -> Option<String> {
        let name = suggested.name.trim();
        if name.chars().count() < self.min_length {
            return Some(format!("shorter than {} characters", self.min_length));
        }
        if self.stop_words.contains(&name.to_lowercase()) {
            return Some("pronoun or stop word".to_string());
        }
        if !name.chars().any(char::is_alphabetic) {
            return Some("no letters".to_string());
        }
        None
    }
}

/// Wraps another filter, counting and logging its decisions.
pub struct ObservableMentionFilter<F> {
    inner: F,
    accepted: AtomicUsize,
    rejected: AtomicUsize,
}

impl<F: MentionFilter> ObservableMentionFilter<F> {
    pub fn new(inner: F) -> Self {
        Self {
            inner,
            accepted: AtomicUsize::new(0),
            rejected: AtomicUsize::new(0),
        }
    }

    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::Relaxed)
    }

    pub fn rejected(&self) -> usize {
        self.rejected.load(Ordering::Relaxed)
    }
}

impl<F: MentionFilter> MentionFilter for ObservableMentionFilter<F> {
    fn rejection(&self, suggested: &SuggestedEntity) -> Option<String> {
        let rejection = self.inner.rejection(suggested);
        match &rejection {
            Some(reason) => {
                self.rejected.fetch_add(1, Ordering::Relaxed);
                debug!(mention = %suggested.name, reason = %reason, "Mention rejected");
            }
            None => {
                self.accepted.fetch_add(1, Ordering::Relaxed);
            }
        }
        rejection
    }
}
