//! Eviction policies.

use serde::{Deserialize, Serialize};

/// Victim selection when the cache is over budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EvictionPolicy {
    /// Least recently used.
    #[default]
    Lru,
    /// Least frequently used; ties go to the least recently used.
    Lfu,
    /// Oldest insertion.
    Fifo,
}

impl EvictionPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lru => "lru",
            Self::Lfu => "lfu",
            Self::Fifo => "fifo",
        }
    }

    /// Pick the entry to evict.
    ///
    /// Sequence numbers come from one monotonic counter, so ordering is total.
    pub(crate) fn victim<'a, I>(self, candidates: I) -> Option<&'a str>
    where
        I: Iterator<Item = Candidate<'a>>,
    {
        let chosen = match self {
            Self::Lru => candidates.min_by_key(|c| c.last_used_seq),
            Self::Lfu => candidates.min_by_key(|c| (c.hit_count, c.last_used_seq)),
            Self::Fifo => candidates.min_by_key(|c| c.inserted_seq),
        };
        chosen.map(|c| c.key)
    }
}

impl std::fmt::Display for EvictionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a policy ranks an entry by.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Candidate<'a> {
    pub key: &'a str,
    pub inserted_seq: u64,
    pub last_used_seq: u64,
    pub hit_count: u64,
}
