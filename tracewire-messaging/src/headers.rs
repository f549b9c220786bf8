use std::borrow::Cow;

use tracewire::propagation::{Extractor, Injector};

/// An ordered list of record header entries.
///
/// Unlike a map, record headers keep every entry in write order and admit
/// the same key more than once, matching what message brokers put on the
/// wire. [`Injector::set`] appends, and [`Extractor::get`] returns the
/// value written last, so re-injecting into a forwarded record shadows
/// the inbound `traceparent` without erasing it.
///
/// Keys are matched exactly. The propagators in `tracewire` read and
/// write lowercase field names, so carriers that copy headers verbatim
/// interoperate without any case folding.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RecordHeaders {
    entries: Vec<(String, String)>,
}

impl RecordHeaders {
    /// Create an empty header list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry, keeping any existing entries with the same key.
    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.push((key.into(), value.into()));
    }

    /// The value of the last entry with this exact key, if any.
    pub fn last(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .rev()
            .find(|(entry_key, _)| entry_key == key)
            .map(|(_, value)| value.as_str())
    }

    /// Number of entries, counting repeated keys once per entry.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over `(key, value)` entries in write order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }
}

impl Injector for RecordHeaders {
    fn set(&mut self, key: &str, value: String) {
        self.entries.push((key.to_string(), value));
    }
}

impl Extractor for RecordHeaders {
    fn get(&self, key: &str) -> Option<Cow<'_, str>> {
        self.last(key).map(Cow::Borrowed)
    }

    fn keys(&self) -> Vec<Cow<'_, str>> {
        self.entries
            .iter()
            .map(|(key, _)| Cow::Borrowed(key.as_str()))
            .collect()
    }
}
