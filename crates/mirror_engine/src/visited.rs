use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};

/// URLs claimed for download in one session.
///
/// `try_claim` is the only way in: the membership test and the insert happen
/// under one lock, so concurrent claims of the same URL see exactly one winner.
#[derive(Debug, Default)]
pub struct VisitedSet {
    claimed: Mutex<HashSet<String>>,
}

impl VisitedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` and records `url` if nobody claimed it before.
    pub fn try_claim(&self, url: &str) -> bool {
        let mut claimed = self.claimed.lock().unwrap_or_else(PoisonError::into_inner);
        if claimed.contains(url) {
            return false;
        }
        claimed.insert(url.to_string())
    }

    pub fn contains(&self, url: &str) -> bool {
        self.claimed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(url)
    }

    pub fn len(&self) -> usize {
        self.claimed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sorted copy of every claimed URL.
    pub fn snapshot(&self) -> Vec<String> {
        let claimed = self.claimed.lock().unwrap_or_else(PoisonError::into_inner);
        let mut urls: Vec<String> = claimed.iter().cloned().collect();
        urls.sort_unstable();
        urls
    }
}
