//! Line — `<prefix>_<index>` records and the sequence a container must emit.

use std::fmt;

/// One emitted line. The prefix may itself contain underscores; the index is
/// whatever follows the last one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Line {
    pub prefix: String,
    pub index: u64,
}

impl Line {
    pub fn new(prefix: impl Into<String>, index: u64) -> Self {
        Self {
            prefix: prefix.into(),
            index,
        }
    }

    /// `None` for anything that is not `<non-empty prefix>_<decimal index>`.
    pub fn parse(text: &str) -> Option<Self> {
        let (prefix, index) = text.rsplit_once('_')?;
        if prefix.is_empty() || index.is_empty() || !index.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        Some(Self::new(prefix, index.parse().ok()?))
    }
}

impl fmt::Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.prefix, self.index)
    }
}

/// The ordered lines one container is configured to emit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedSequence {
    prefix: String,
    iterations: u64,
}

impl ExpectedSequence {
    pub fn new(prefix: impl Into<String>, iterations: u64) -> Self {
        Self {
            prefix: prefix.into(),
            iterations,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn len(&self) -> u64 {
        self.iterations
    }

    pub fn is_empty(&self) -> bool {
        self.iterations == 0
    }

    pub fn line(&self, index: u64) -> Option<String> {
        (index < self.iterations).then(|| format!("{}_{}", self.prefix, index))
    }

    pub fn lines(&self) -> impl Iterator<Item = String> + '_ {
        (0..self.iterations).map(move |i| format!("{}_{}", self.prefix, i))
    }

    /// Whether `text` is one of this sequence's lines.
    pub fn contains(&self, text: &str) -> bool {
        Line::parse(text).is_some_and(|l| {
            l.prefix == self.prefix && l.index < self.iterations && l.to_string() == text
        })
    }
}
