use rand::seq::IndexedRandom;
use thiserror::Error;

use crate::Sentiment;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PhraseError {
    #[error("phrase list is empty")]
    EmptyList,
    #[error("phrase #{0} is empty")]
    EmptyPhrase(usize),
}

/// A fixed, non-empty list of non-empty phrases.
#[derive(Debug, Clone)]
pub struct Phrases(Vec<String>);

impl Phrases {
    pub fn new<T: Into<String>>(phrases: impl IntoIterator<Item = T>) -> Result<Self, PhraseError> {
        let phrases: Vec<String> = phrases.into_iter().map(Into::into).collect();

        if phrases.is_empty() {
            return Err(PhraseError::EmptyList);
        }
        if let Some(idx) = phrases.iter().position(|phrase| phrase.is_empty()) {
            return Err(PhraseError::EmptyPhrase(idx));
        }

        Ok(Self(phrases))
    }

    pub fn random(&self) -> &str {
        // Never empty, see `Phrases::new`
        self.0
            .choose(&mut rand::rng())
            .map(String::as_str)
            .unwrap_or_default()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

pub struct OptionPicker {
    positive: Phrases,
    negative: Phrases,
}

impl OptionPicker {
    pub fn new(positive: Phrases, negative: Phrases) -> Self {
        Self { positive, negative }
    }

    pub fn random_positive(&self) -> &str {
        self.positive.random()
    }

    pub fn random_negative(&self) -> &str {
        self.negative.random()
    }

    pub fn random(&self, sentiment: Sentiment) -> &str {
        self.phrases(sentiment).random()
    }

    pub fn phrases(&self, sentiment: Sentiment) -> &Phrases {
        match sentiment {
            Sentiment::Positive => &self.positive,
            Sentiment::Negative => &self.negative,
        }
    }
}

impl Default for OptionPicker {
    fn default() -> Self {
        Self {
            positive: Phrases(
                [
                    "I said something positive!",
                    "I'm freaking sunshine and rainbows!",
                    "Happy happy joy joy!",
                    "Joy to the world!",
                    "Lovin' life!",
                ]
                .map(String::from)
                .to_vec(),
            ),
            negative: Phrases(
                [
                    "Whah whah",
                    "I'm positively negative",
                    "Leave me alone!",
                    "It's the end of the world as we know it!",
                    "Woe is me...",
                ]
                .map(String::from)
                .to_vec(),
            ),
        }
    }
}
