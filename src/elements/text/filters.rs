//! Word-level transforms.

use crate::element::{Output, Transform};
use crate::error::Result;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// ASCII word character: letter, digit or underscore.
fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Non-empty and made only of word characters.
pub(crate) fn is_word(token: &str) -> bool {
    !token.is_empty() && token.chars().all(is_word_char)
}

/// Non-empty and made only of ASCII digits.
pub(crate) fn is_numeric(token: &str) -> bool {
    !token.is_empty() && token.bytes().all(|b| b.is_ascii_digit())
}

/// Splits lines on runs of whitespace.
#[derive(Debug, Default, Clone, Copy)]
pub struct Tokenizer;

impl Transform for Tokenizer {
    type Input = String;
    type Output = String;

    fn transform(&mut self, line: String) -> Result<Output<String>> {
        Ok(line.split_whitespace().map(str::to_string).collect())
    }

    fn name(&self) -> &str {
        super::TOKENIZER
    }
}

/// Splits lines at word boundaries.
///
/// Each maximal run of word characters is one token, and so is each run of
/// anything else (spaces, punctuation), which later filters drop.
#[derive(Debug, Default, Clone, Copy)]
pub struct WordTokenizer;

impl Transform for WordTokenizer {
    type Input = String;
    type Output = String;

    fn transform(&mut self, line: String) -> Result<Output<String>> {
        let mut tokens = Vec::new();
        let mut start = 0;
        let mut current = None;
        for (i, c) in line.char_indices() {
            let word = is_word_char(c);
            if current.is_some_and(|w| w != word) {
                tokens.push(line[start..i].to_string());
                start = i;
            }
            current = Some(word);
        }
        if start < line.len() {
            tokens.push(line[start..].to_string());
        }
        Ok(Output::multiple(tokens))
    }

    fn name(&self) -> &str {
        super::WORD_TOKENIZER
    }
}

/// Lowercases every word.
#[derive(Debug, Default, Clone, Copy)]
pub struct ToLowerCase;

impl Transform for ToLowerCase {
    type Input = String;
    type Output = String;

    fn transform(&mut self, word: String) -> Result<Output<String>> {
        Ok(Output::single(word.to_lowercase()))
    }

    fn name(&self) -> &str {
        super::TO_LOWER_CASE
    }
}

/// Drops words containing anything but letters, digits and underscores.
#[derive(Debug, Default, Clone, Copy)]
pub struct NonAlphanumericWordRemover;

impl Transform for NonAlphanumericWordRemover {
    type Input = String;
    type Output = String;

    fn transform(&mut self, word: String) -> Result<Output<String>> {
        Ok(if is_word(&word) {
            Output::single(word)
        } else {
            Output::none()
        })
    }

    fn name(&self) -> &str {
        super::NON_ALPHANUMERIC_WORD_REMOVER
    }
}

/// Drops words made only of digits.
#[derive(Debug, Default, Clone, Copy)]
pub struct NumericOnlyWordRemover;

impl Transform for NumericOnlyWordRemover {
    type Input = String;
    type Output = String;

    fn transform(&mut self, word: String) -> Result<Output<String>> {
        Ok(if is_numeric(&word) {
            Output::none()
        } else {
            Output::single(word)
        })
    }

    fn name(&self) -> &str {
        super::NUMERIC_ONLY_WORD_REMOVER
    }
}

/// Keeps alphanumeric, non-numeric words and lowercases them.
///
/// Equivalent to `non-alphanumeric-word-remover`, `numeric-only-word-remover`
/// and `to-lower-case-transformer` in one stage.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextPreprocessor;

impl Transform for TextPreprocessor {
    type Input = String;
    type Output = String;

    fn transform(&mut self, word: String) -> Result<Output<String>> {
        Ok(if is_word(&word) && !is_numeric(&word) {
            Output::single(word.to_lowercase())
        } else {
            Output::none()
        })
    }

    fn name(&self) -> &str {
        super::TEXT_PREPROCESSOR
    }
}

/// Drops stop words, compared case-insensitively.
///
/// Replicas share one word set.
#[derive(Debug, Clone)]
pub struct StopWordRemover {
    stop_words: Arc<HashSet<String>>,
}

impl StopWordRemover {
    /// Create a remover for `words`.
    pub fn new<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::from_shared(Arc::new(
            words
                .into_iter()
                .map(|w| w.as_ref().to_lowercase())
                .collect(),
        ))
    }

    pub(crate) fn from_shared(stop_words: Arc<HashSet<String>>) -> Self {
        Self { stop_words }
    }

    fn is_stop_word(&self, word: &str) -> bool {
        if word.chars().any(char::is_uppercase) {
            self.stop_words.contains(&word.to_lowercase())
        } else {
            self.stop_words.contains(word)
        }
    }
}

impl Transform for StopWordRemover {
    type Input = String;
    type Output = String;

    fn transform(&mut self, word: String) -> Result<Output<String>> {
        Ok(if self.is_stop_word(&word) {
            Output::none()
        } else {
            Output::single(word)
        })
    }

    fn name(&self) -> &str {
        super::STOP_WORD_REMOVER
    }
}

/// A term with its running count.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TermFrequency {
    /// The term.
    pub term: String,
    /// Occurrences of `term` seen so far, including this one.
    pub frequency: usize,
}

impl TermFrequency {
    /// Pair a term with a count.
    pub fn new(term: impl Into<String>, frequency: usize) -> Self {
        Self {
            term: term.into(),
            frequency,
        }
    }
}

impl fmt::Display for TermFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.term, self.frequency)
    }
}

/// Emits each word with the number of times it has been seen so far.
///
/// Stateful, so never replicated.
#[derive(Debug, Default)]
pub struct TermFrequencyCounter {
    counts: HashMap<String, usize>,
}

impl Transform for TermFrequencyCounter {
    type Input = String;
    type Output = TermFrequency;

    fn transform(&mut self, word: String) -> Result<Output<TermFrequency>> {
        let count = self.counts.entry(word.clone()).or_insert(0);
        *count += 1;
        Ok(Output::single(TermFrequency::new(word, *count)))
    }

    fn name(&self) -> &str {
        super::TERM_FREQUENCY_COUNTER
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run<T: Transform<Input = String>>(mut stage: T, items: &[&str]) -> Vec<T::Output> {
        items
            .iter()
            .flat_map(|item| stage.transform(item.to_string()).unwrap())
            .collect()
    }

    #[test]
    fn test_tokenizer_splits_whitespace() {
        let out = run(Tokenizer, &["  the cat\tsat ", "", "on  the mat"]);
        assert_eq!(out, vec!["the", "cat", "sat", "on", "the", "mat"]);
    }

    #[test]
    fn test_word_tokenizer_boundaries() {
        let out = run(WordTokenizer, &["It's a dog-eat-dog world."]);
        assert_eq!(
            out,
            vec!["It", "'", "s", " ", "a", " ", "dog", "-", "eat", "-", "dog", " ", "world", "."]
        );
        assert!(run(WordTokenizer, &[""]).is_empty());
    }

    #[test]
    fn test_lower_case() {
        assert_eq!(run(ToLowerCase, &["The", "CAT"]), vec!["the", "cat"]);
    }

    #[test]
    fn test_non_alphanumeric_remover() {
        let out = run(
            NonAlphanumericWordRemover,
            &["word", "snake_case", "42", "it's", "-", "", "naïve"],
        );
        assert_eq!(out, vec!["word", "snake_case", "42"]);
    }

    #[test]
    fn test_numeric_only_remover() {
        let out = run(NumericOnlyWordRemover, &["1984", "r2d2", "word", "3.14"]);
        assert_eq!(out, vec!["r2d2", "word", "3.14"]);
    }

    #[test]
    fn test_text_preprocessor() {
        let out = run(TextPreprocessor, &["The", "2024", "cat's", "R2D2", "---"]);
        assert_eq!(out, vec!["the", "r2d2"]);
    }

    #[test]
    fn test_stop_word_remover_case_insensitive() {
        let remover = StopWordRemover::new(["a", "am", "an", "and", "at", "on", "or", "so", "the"]);
        let out = run(remover, &["The", "cat", "sat", "ON", "the", "mat", "so", "soon"]);
        assert_eq!(out, vec!["cat", "sat", "mat", "soon"]);
    }

    #[test]
    fn test_term_frequency_counter() {
        let out = run(
            TermFrequencyCounter::default(),
            &["I", "felt", "happy", "because", "I", "saw", "happy"],
        );
        let rendered: Vec<String> = out.iter().map(ToString::to_string).collect();
        assert_eq!(
            rendered,
            vec!["I:1", "felt:1", "happy:1", "because:1", "I:2", "saw:1", "happy:2"]
        );
    }
}
