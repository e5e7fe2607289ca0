//! Event counting over captured target output.
//!
//! The target prints one line per participant event. We only look at
//! aggregate volume: how many lines carry each marker, regardless of which
//! participant emitted them or in what order.

use std::collections::BTreeMap;

use memchr::memmem::Finder;
use serde::{Deserialize, Serialize};

/// Named event counters derived from marker lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CounterName {
    Deaths,
    Meals,
    Sleeps,
    Thinks,
}

impl CounterName {
    pub const ALL: [CounterName; 4] = [Self::Deaths, Self::Meals, Self::Sleeps, Self::Thinks];

    /// Lower-case substring that marks a line as this event.
    pub fn marker(self) -> &'static str {
        match self {
            Self::Deaths => "died",
            Self::Meals => "is eating",
            Self::Sleeps => "is sleeping",
            Self::Thinks => "is thinking",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Deaths => "deaths",
            Self::Meals => "meals",
            Self::Sleeps => "sleeps",
            Self::Thinks => "thinks",
        }
    }
}

impl std::fmt::Display for CounterName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A total mapping from every [`CounterName`] to a count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Counters(BTreeMap<CounterName, usize>);

impl Default for Counters {
    fn default() -> Self {
        Self(CounterName::ALL.iter().map(|name| (*name, 0)).collect())
    }
}

impl Counters {
    pub fn new(deaths: usize, meals: usize, sleeps: usize, thinks: usize) -> Self {
        let mut counters = Self::default();
        counters.set(CounterName::Deaths, deaths);
        counters.set(CounterName::Meals, meals);
        counters.set(CounterName::Sleeps, sleeps);
        counters.set(CounterName::Thinks, thinks);
        counters
    }

    pub fn get(&self, name: CounterName) -> usize {
        self.0.get(&name).copied().unwrap_or(0)
    }

    pub fn set(&mut self, name: CounterName, value: usize) {
        self.0.insert(name, value);
    }

    fn increment(&mut self, name: CounterName) {
        *self.0.entry(name).or_insert(0) += 1;
    }

    pub fn iter(&self) -> impl Iterator<Item = (CounterName, usize)> + '_ {
        self.0.iter().map(|(name, count)| (*name, *count))
    }
}

/// Strategy for turning raw stdout into counters.
///
/// Callers only depend on this trait so the matching rules can change
/// (substring, structured line parsing) without touching them.
pub trait CounterExtractor {
    fn extract(&self, stdout: &str) -> Counters;
}

/// Counts lines containing each marker substring, case-insensitively.
pub struct SubstringExtractor {
    finders: Vec<(CounterName, Finder<'static>)>,
}

impl Default for SubstringExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl SubstringExtractor {
    pub fn new() -> Self {
        let finders = CounterName::ALL
            .iter()
            .map(|name| (*name, Finder::new(name.marker())))
            .collect();
        Self { finders }
    }
}

impl CounterExtractor for SubstringExtractor {
    fn extract(&self, stdout: &str) -> Counters {
        let mut counters = Counters::default();
        let lowered = stdout.to_lowercase();
        for line in lowered.lines() {
            for (name, finder) in &self.finders {
                if finder.find(line.as_bytes()).is_some() {
                    counters.increment(*name);
                }
            }
        }
        counters
    }
}
