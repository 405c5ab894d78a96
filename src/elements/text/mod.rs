//! Built-in text-processing stages.
//!
//! A line source, word-level transforms and frequency sinks, registered under
//! the names below by [`register_builtins`].
//!
//! # Example
//!
//! ```rust
//! use filterflow::elements::text::{self, TextOptions};
//! use filterflow::pipeline::StageRegistry;
//!
//! let mut registry = StageRegistry::new();
//! text::register_builtins(&mut registry, &TextOptions::default().with_stop_words(["the"]))?;
//! assert!(registry.contains(text::STOP_WORD_REMOVER));
//! # Ok::<(), filterflow::Error>(())
//! ```

mod filters;
mod sinks;
mod source;

pub use filters::{
    NonAlphanumericWordRemover, NumericOnlyWordRemover, StopWordRemover, TermFrequency,
    TermFrequencyCounter, TextPreprocessor, ToLowerCase, Tokenizer, WordTokenizer,
};
pub use sinks::{FrequencyTermInverter, TermCounter, format_terms, invert_counts, most_common};
pub use source::TextStreamer;

use crate::error::Result;
use crate::pipeline::StageRegistry;
use std::collections::HashSet;
use std::sync::Arc;

/// Line source over a file or string.
pub const TEXT_STREAMER: &str = "text-streamer";
/// Whitespace tokenizer.
pub const TOKENIZER: &str = "tokenizer";
/// Word-boundary tokenizer.
pub const WORD_TOKENIZER: &str = "word-tokenizer";
/// Lowercasing transform.
pub const TO_LOWER_CASE: &str = "to-lower-case-transformer";
/// Drops words with non-word characters.
pub const NON_ALPHANUMERIC_WORD_REMOVER: &str = "non-alphanumeric-word-remover";
/// Drops all-digit words.
pub const NUMERIC_ONLY_WORD_REMOVER: &str = "numeric-only-word-remover";
/// Combined word filter and lowercaser.
pub const TEXT_PREPROCESSOR: &str = "text-preprocessor";
/// Stop-word filter.
pub const STOP_WORD_REMOVER: &str = "stop-word-remover";
/// Running term counter.
pub const TERM_FREQUENCY_COUNTER: &str = "term-frequency-counter";
/// Word count sink.
pub const TERM_COUNTER: &str = "term-counter";
/// Frequency-grouping sink.
pub const FREQUENCY_TERM_INVERTER: &str = "frequency-term-inverter";

/// Assembly run by the command-line front end.
pub const DEFAULT_ASSEMBLY: [&str; 6] = [
    TEXT_STREAMER,
    TOKENIZER,
    TEXT_PREPROCESSOR,
    STOP_WORD_REMOVER,
    TERM_FREQUENCY_COUNTER,
    FREQUENCY_TERM_INVERTER,
];

const ENGLISH_STOP_WORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "all", "am", "an", "and", "any", "are",
    "as", "at", "be", "because", "been", "before", "being", "below", "between", "both", "but",
    "by", "can", "could", "did", "do", "does", "doing", "down", "during", "each", "few", "for",
    "from", "further", "had", "has", "have", "having", "he", "her", "here", "hers", "herself",
    "him", "himself", "his", "how", "i", "if", "in", "into", "is", "it", "its", "itself", "just",
    "me", "more", "most", "my", "myself", "no", "nor", "not", "now", "of", "off", "on", "once",
    "only", "or", "other", "our", "ours", "ourselves", "out", "over", "own", "same", "she",
    "should", "so", "some", "such", "than", "that", "the", "their", "theirs", "them",
    "themselves", "then", "there", "these", "they", "this", "those", "through", "to", "too",
    "under", "until", "up", "very", "was", "we", "were", "what", "when", "where", "which",
    "while", "who", "whom", "why", "will", "with", "would", "you", "your", "yours", "yourself",
    "yourselves",
];

/// Options captured by the built-in stage constructors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextOptions {
    /// Words dropped by `stop-word-remover`, lowercase.
    pub stop_words: HashSet<String>,
}

impl Default for TextOptions {
    fn default() -> Self {
        Self {
            stop_words: ENGLISH_STOP_WORDS.iter().map(|w| w.to_string()).collect(),
        }
    }
}

impl TextOptions {
    /// Replace the stop-word list.
    pub fn with_stop_words<I, S>(mut self, words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.stop_words = words
            .into_iter()
            .map(|w| w.as_ref().to_lowercase())
            .collect();
        self
    }
}

/// Register every built-in text stage.
pub fn register_builtins(registry: &mut StageRegistry, options: &TextOptions) -> Result<()> {
    registry.register_source(TEXT_STREAMER, TextStreamer::open)?;

    registry.register_parallel_transform(TOKENIZER, None, || Ok(Tokenizer))?;
    registry.register_transform(WORD_TOKENIZER, || Ok(WordTokenizer))?;
    registry.register_transform(TO_LOWER_CASE, || Ok(ToLowerCase))?;
    registry.register_transform(NON_ALPHANUMERIC_WORD_REMOVER, || {
        Ok(NonAlphanumericWordRemover)
    })?;
    registry.register_transform(NUMERIC_ONLY_WORD_REMOVER, || Ok(NumericOnlyWordRemover))?;
    registry.register_parallel_transform(TEXT_PREPROCESSOR, None, || Ok(TextPreprocessor))?;

    let stop_words = Arc::new(options.stop_words.clone());
    registry.register_parallel_transform(STOP_WORD_REMOVER, None, move || {
        Ok(StopWordRemover::from_shared(Arc::clone(&stop_words)))
    })?;
    registry.register_transform(TERM_FREQUENCY_COUNTER, || {
        Ok(TermFrequencyCounter::default())
    })?;

    registry.register_sink(TERM_COUNTER, |target| Ok(TermCounter::new(target)))?;
    registry.register_sink(FREQUENCY_TERM_INVERTER, |target| {
        Ok(FrequencyTermInverter::new(target))
    })?;

    tracing::debug!("registered {} built-in text stages", registry.len());
    Ok(())
}
