use std::collections::{HashMap, HashSet, VecDeque};
use std::time::{Duration, Instant};

/// Recent words from one word-stream source, bounded by age and count.
#[derive(Debug)]
pub struct PhraseWindow {
    words: VecDeque<(String, Instant)>,
    capacity: usize,
    max_age: Duration,
}

impl PhraseWindow {
    pub fn new(capacity: usize, max_age: Duration) -> Self {
        let capacity = capacity.max(1);
        Self {
            words: VecDeque::with_capacity(capacity),
            capacity,
            max_age,
        }
    }

    /// Append one word. Expired words go first, then the oldest beyond capacity.
    pub fn push(&mut self, word: String, now: Instant) {
        self.expire(now);
        self.words.push_back((word, now));
        while self.words.len() > self.capacity {
            self.words.pop_front();
        }
    }

    /// Drop words older than the window from the front.
    pub fn expire(&mut self, now: Instant) {
        while let Some((_, at)) = self.words.front() {
            if now.saturating_duration_since(*at) > self.max_age {
                self.words.pop_front();
            } else {
                break;
            }
        }
    }

    /// Remaining words joined by single spaces, after expiring stale ones.
    pub fn phrase(&mut self, now: Instant) -> String {
        self.expire(now);
        self.words
            .iter()
            .map(|(w, _)| w.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

/// Rebuilds phrases from word-by-word sources; passes other sources through.
#[derive(Debug)]
pub struct PhraseAggregator {
    windows: HashMap<String, PhraseWindow>,
    word_sources: HashSet<String>,
    capacity: usize,
    max_age: Duration,
}

impl PhraseAggregator {
    pub fn new(
        word_sources: impl IntoIterator<Item = impl Into<String>>,
        capacity: usize,
        max_age: Duration,
    ) -> Self {
        Self {
            windows: HashMap::new(),
            word_sources: word_sources.into_iter().map(Into::into).collect(),
            capacity,
            max_age,
        }
    }

    pub fn is_word_stream(&self, source: &str) -> bool {
        self.word_sources.contains(source)
    }

    /// Feed one event's content and return the phrase to match against.
    ///
    /// Word-stream sources: content is split on whitespace, lowercased and
    /// appended to the source's window; the result is the whole window.
    /// Other sources: the content itself, trimmed and lowercased.
    pub fn ingest(&mut self, source: &str, content: &str, now: Instant) -> String {
        if !self.is_word_stream(source) {
            return content.trim().to_lowercase();
        }
        let window = self
            .windows
            .entry(source.to_owned())
            .or_insert_with(|| PhraseWindow::new(self.capacity, self.max_age));
        for word in content.split_whitespace() {
            window.push(word.to_lowercase(), now);
        }
        window.phrase(now)
    }

    /// Current phrase for a word-stream source. Empty if nothing is buffered.
    pub fn recent_phrase(&mut self, source: &str, now: Instant) -> String {
        self.windows
            .get_mut(source)
            .map(|w| w.phrase(now))
            .unwrap_or_default()
    }
}
