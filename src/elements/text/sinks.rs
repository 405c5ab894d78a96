//! Frequency sinks and result helpers.

use super::filters::TermFrequency;
use crate::element::Sink;
use crate::error::Result;
use crate::pipeline::Collector;
use std::collections::{BTreeMap, HashMap};

/// Counts occurrences of each word.
///
/// Counts accumulate locally and are merged into the container once the
/// stream ends.
pub struct TermCounter {
    counts: HashMap<String, usize>,
    target: Collector<HashMap<String, usize>>,
}

impl TermCounter {
    /// Create a counter writing into `target`.
    pub fn new(target: Collector<HashMap<String, usize>>) -> Self {
        Self {
            counts: HashMap::new(),
            target,
        }
    }
}

impl Sink for TermCounter {
    type Input = String;

    fn consume(&mut self, word: String) -> Result<()> {
        *self.counts.entry(word).or_insert(0) += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        let mut target = self.target.lock();
        for (term, count) in self.counts.drain() {
            *target.entry(term).or_insert(0) += count;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        super::TERM_COUNTER
    }
}

/// Groups terms by their final frequency.
///
/// Each term appears once, under the highest count seen for it. Lists are
/// sorted alphabetically.
pub struct FrequencyTermInverter {
    latest: HashMap<String, usize>,
    target: Collector<BTreeMap<usize, Vec<String>>>,
}

impl FrequencyTermInverter {
    /// Create an inverter writing into `target`.
    pub fn new(target: Collector<BTreeMap<usize, Vec<String>>>) -> Self {
        Self {
            latest: HashMap::new(),
            target,
        }
    }
}

impl Sink for FrequencyTermInverter {
    type Input = TermFrequency;

    fn consume(&mut self, item: TermFrequency) -> Result<()> {
        let frequency = self.latest.entry(item.term).or_insert(0);
        *frequency = (*frequency).max(item.frequency);
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        let mut target = self.target.lock();
        for (term, frequency) in self.latest.drain() {
            target.entry(frequency).or_default().push(term);
        }
        for terms in target.values_mut() {
            terms.sort_unstable();
            terms.dedup();
        }
        target.retain(|_, terms| !terms.is_empty());
        Ok(())
    }

    fn name(&self) -> &str {
        super::FREQUENCY_TERM_INVERTER
    }
}

/// The `n` highest frequencies with their terms, most frequent first.
pub fn most_common(inverted: &BTreeMap<usize, Vec<String>>, n: usize) -> Vec<(usize, &[String])> {
    inverted
        .iter()
        .rev()
        .filter(|(_, terms)| !terms.is_empty())
        .take(n)
        .map(|(frequency, terms)| (*frequency, terms.as_slice()))
        .collect()
}

/// Invert a word count map into frequency groups.
pub fn invert_counts(counts: &HashMap<String, usize>) -> BTreeMap<usize, Vec<String>> {
    let mut inverted: BTreeMap<usize, Vec<String>> = BTreeMap::new();
    for (term, count) in counts {
        inverted.entry(*count).or_default().push(term.clone());
    }
    for terms in inverted.values_mut() {
        terms.sort_unstable();
    }
    inverted
}

/// Render terms as `{ a, b, c }`.
pub fn format_terms(terms: &[String]) -> String {
    if terms.is_empty() {
        return "{ }".to_string();
    }
    format!("{{ {} }}", terms.join(", "))
}
