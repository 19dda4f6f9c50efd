use crate::types::{Sentiment, SentimentOracle};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

static NOISE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(@[A-Za-z0-9]+)|([^0-9A-Za-z \t])|(\w+://\S+)").expect("noise pattern is valid")
});

/// Strips mentions, URLs and non-alphanumeric characters, collapsing whitespace.
pub fn clean_text(text: &str) -> String {
    NOISE
        .replace_all(text, " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Polarity and subjectivity of a scored word.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LexiconEntry {
    pub polarity: f64,
    pub subjectivity: f64,
}

const NEGATIONS: &[&str] = &[
    "not", "never", "no", "nothing", "neither", "nor", "dont", "isnt", "wasnt", "cant",
];

const INTENSIFIERS: &[(&str, f64)] = &[
    ("very", 1.3),
    ("really", 1.3),
    ("extremely", 1.5),
    ("incredibly", 1.4),
    ("so", 1.2),
    ("super", 1.3),
    ("quite", 1.1),
    ("slightly", 0.5),
    ("somewhat", 0.7),
];

const WORDS: &[(&str, f64, f64)] = &[
    ("amazing", 0.6, 0.9),
    ("awesome", 1.0, 1.0),
    ("awful", -1.0, 1.0),
    ("bad", -0.7, 0.67),
    ("beautiful", 0.85, 1.0),
    ("best", 1.0, 0.3),
    ("boring", -1.0, 1.0),
    ("broken", -0.4, 0.4),
    ("brilliant", 0.9, 1.0),
    ("cool", 0.35, 0.65),
    ("disappointing", -0.6, 0.7),
    ("excellent", 1.0, 1.0),
    ("exciting", 0.3, 0.8),
    ("fail", -0.5, 0.3),
    ("fantastic", 0.4, 0.9),
    ("fine", 0.42, 0.5),
    ("fun", 0.3, 0.2),
    ("glad", 0.5, 1.0),
    ("good", 0.7, 0.6),
    ("great", 0.8, 0.75),
    ("happy", 0.8, 1.0),
    ("hate", -0.8, 0.9),
    ("horrible", -1.0, 1.0),
    ("important", 0.4, 1.0),
    ("interesting", 0.5, 0.5),
    ("love", 0.5, 0.6),
    ("lovely", 0.5, 0.75),
    ("nice", 0.6, 1.0),
    ("perfect", 1.0, 1.0),
    ("poor", -0.4, 0.6),
    ("sad", -0.5, 1.0),
    ("scary", -0.5, 1.0),
    ("slow", -0.3, 0.39),
    ("strong", 0.43, 0.73),
    ("stupid", -0.8, 1.0),
    ("terrible", -1.0, 1.0),
    ("thanks", 0.2, 0.2),
    ("ugly", -0.7, 1.0),
    ("useful", 0.3, 0.0),
    ("weak", -0.38, 0.63),
    ("wonderful", 1.0, 1.0),
    ("worst", -1.0, 1.0),
    ("wrong", -0.5, 0.9),
];

/// Lexicon-based sentiment oracle.
///
/// Every lexicon word found in the cleaned text contributes its polarity and
/// subjectivity. A directly preceding intensifier scales both, a preceding
/// negation flips and halves the polarity. Contributions are averaged.
#[derive(Debug, Clone)]
pub struct LexiconSentiment {
    words: HashMap<String, LexiconEntry>,
    intensifiers: HashMap<String, f64>,
}

impl Default for LexiconSentiment {
    fn default() -> Self {
        let words = WORDS
            .iter()
            .map(|(word, polarity, subjectivity)| {
                (
                    word.to_string(),
                    LexiconEntry {
                        polarity: *polarity,
                        subjectivity: *subjectivity,
                    },
                )
            })
            .collect();
        let intensifiers = INTENSIFIERS.iter().map(|(word, factor)| (word.to_string(), *factor)).collect();
        Self { words, intensifiers }
    }
}

impl LexiconSentiment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a lexicon word.
    pub fn with_word(mut self, word: &str, polarity: f64, subjectivity: f64) -> Self {
        self.words.insert(word.to_lowercase(), LexiconEntry { polarity, subjectivity });
        self
    }

    fn assess(&self, tokens: &[String]) -> Vec<LexiconEntry> {
        let mut assessments = Vec::new();
        for (i, token) in tokens.iter().enumerate() {
            let Some(entry) = self.words.get(token) else {
                continue;
            };
            let mut entry = *entry;
            let previous = i.checked_sub(1).map(|j| tokens[j].as_str());

            if let Some(factor) = previous.and_then(|p| self.intensifiers.get(p)) {
                entry.polarity *= factor;
                entry.subjectivity *= factor;
            }
            let negated = tokens[..i]
                .iter()
                .rev()
                .take(2)
                .any(|t| NEGATIONS.contains(&t.as_str()));
            if negated {
                entry.polarity *= -0.5;
            }

            assessments.push(LexiconEntry {
                polarity: entry.polarity.clamp(-1.0, 1.0),
                subjectivity: entry.subjectivity.clamp(0.0, 1.0),
            });
        }
        assessments
    }
}

impl SentimentOracle for LexiconSentiment {
    fn score(&self, text: &str) -> Sentiment {
        let tokens: Vec<String> = clean_text(text)
            .split(' ')
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase)
            .collect();
        let assessments = self.assess(&tokens);
        if assessments.is_empty() {
            return Sentiment::NEUTRAL;
        }

        let n = assessments.len() as f64;
        let polarity = assessments.iter().map(|a| a.polarity).sum::<f64>() / n;
        let subjectivity = assessments.iter().map(|a| a.subjectivity).sum::<f64>() / n;
        Sentiment::clamped(polarity, subjectivity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_text_drops_mentions_urls_and_punctuation() {
        let cleaned = clean_text("RT @user: Check https://x.co/abc out!!");
        assert_eq!(cleaned, "RT Check out");
        for illegal in ["@", ":", ".", "_", "\\"] {
            assert!(!cleaned.contains(illegal), "{:?} left in {:?}", illegal, cleaned);
        }
    }

    #[test]
    fn test_clean_text_handles_escaped_links_and_underscores() {
        let cleaned = clean_text(r"RT @some_user_screen_name https:\\t.co/1234");
        for illegal in ["@", "\\", ":", ".", "_"] {
            assert!(!cleaned.contains(illegal), "{:?} left in {:?}", illegal, cleaned);
        }
    }

    #[test]
    fn test_clean_text_collapses_whitespace() {
        assert_eq!(clean_text("  a \t\t b\n\nc  "), "a b c");
        assert_eq!(clean_text(""), "");
    }

    #[test]
    fn test_positive_text_scores_positive() {
        let sentiment = LexiconSentiment::new().score("This is a very happy and amazing text example");
        assert!(sentiment.polarity > 0.0);
        assert!(sentiment.subjectivity > 0.0 && sentiment.subjectivity <= 1.0);
    }

    #[test]
    fn test_negation_flips_polarity() {
        let oracle = LexiconSentiment::new();
        assert!(oracle.score("this is good").polarity > 0.0);
        assert!(oracle.score("this is not good").polarity < 0.0);
    }

    #[test]
    fn test_intensifier_is_clamped() {
        let sentiment = LexiconSentiment::new().score("extremely awesome");
        assert_eq!(sentiment.polarity, 1.0);
        assert_eq!(sentiment.subjectivity, 1.0);
    }

    #[test]
    fn test_empty_and_unscored_text_is_neutral() {
        let oracle = LexiconSentiment::new();
        assert_eq!(oracle.score(""), Sentiment::NEUTRAL);
        assert_eq!(oracle.score("@someone https://t.co/xyz"), Sentiment::NEUTRAL);
        assert_eq!(oracle.score("the cat sat"), Sentiment::NEUTRAL);
    }

    #[test]
    fn test_custom_words_are_used() {
        let oracle = LexiconSentiment::new().with_word("Rusty", -0.2, 0.4);
        let sentiment = oracle.score("rusty");
        assert!((sentiment.polarity + 0.2).abs() < 1e-9);
        assert!((sentiment.subjectivity - 0.4).abs() < 1e-9);
    }
}
