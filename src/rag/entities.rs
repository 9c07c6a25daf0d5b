//! Entity extraction for the knowledge graph.
//!
//! Extractors return named things grouped into five categories. The indexing
//! pipeline turns them into graph nodes and links them to the chunk they were
//! found in.

use crate::llm::{extract_json_block, LLMClient};
use crate::types::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Entities found in one span of text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedEntities {
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub technologies: Vec<String>,
    #[serde(default)]
    pub companies: Vec<String>,
    #[serde(default)]
    pub concepts: Vec<String>,
}

impl ExtractedEntities {
    pub fn is_empty(&self) -> bool {
        self.authors.is_empty()
            && self.topics.is_empty()
            && self.technologies.is_empty()
            && self.companies.is_empty()
            && self.concepts.is_empty()
    }

    pub fn total(&self) -> usize {
        self.authors.len()
            + self.topics.len()
            + self.technologies.len()
            + self.companies.len()
            + self.concepts.len()
    }
}

#[async_trait]
pub trait EntityExtractor: Send + Sync {
    async fn extract(&self, text: &str) -> Result<ExtractedEntities>;
}

// ============= Heuristic extractor =============

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "as", "at", "but", "by", "for", "from", "how", "however", "if", "in", "into",
    "is", "it", "its", "of", "on", "or", "our", "that", "the", "their", "these", "they", "this",
    "those", "to", "we", "what", "when", "where", "which", "while", "with", "both", "each", "many",
    "most", "some", "such", "unlike", "compared", "figure", "table", "section", "there",
];

const COMPANY_SUFFIXES: &[&str] = &["Inc", "Corp", "Corporation", "Labs", "Ltd", "LLC", "GmbH"];

const KNOWN_COMPANIES: &[&str] = &[
    "Google", "DeepMind", "OpenAI", "Meta", "Microsoft", "Amazon", "Apple", "Nvidia", "NVIDIA",
    "IBM", "Baidu", "Alibaba", "Hugging Face",
];

const TOPIC_PHRASES: &[&str] = &[
    "time-series forecasting",
    "time series forecasting",
    "forecasting",
    "machine learning",
    "deep learning",
    "natural language processing",
    "computer vision",
    "reinforcement learning",
    "speech recognition",
    "machine translation",
    "anomaly detection",
    "sequence modeling",
    "representation learning",
    "information retrieval",
];

/// Rule-based extractor: acronyms become technologies, capitalized phrases
/// become concepts (or companies when they look like one), and a fixed list
/// of research areas is matched as topics.
#[derive(Debug, Clone, Default)]
pub struct HeuristicEntityExtractor;

impl HeuristicEntityExtractor {
    pub fn new() -> Self {
        Self
    }

    fn is_acronym(word: &str) -> bool {
        let letters = word.chars().filter(|c| c.is_ascii_alphabetic()).count();
        letters >= 2
            && word.len() <= 8
            && word
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '-')
    }

    fn is_capitalized(word: &str) -> bool {
        let mut chars = word.chars();
        match chars.next() {
            Some(first) => first.is_uppercase() && chars.any(|c| c.is_lowercase()),
            None => false,
        }
    }

    fn clean(word: &str) -> &str {
        word.trim_matches(|c: char| !c.is_alphanumeric() && c != '-')
    }

    fn extract_sync(&self, text: &str) -> ExtractedEntities {
        let mut technologies = BTreeSet::new();
        let mut companies = BTreeSet::new();
        let mut concepts = BTreeSet::new();
        let mut topics = BTreeSet::new();

        let lower = text.to_lowercase();
        for phrase in TOPIC_PHRASES {
            if lower.contains(phrase) {
                topics.insert(title_case(phrase));
            }
        }
        // "time-series forecasting" already implies "forecasting"
        if topics.len() > 1 {
            let longer: Vec<String> = topics.iter().cloned().collect();
            topics.retain(|t: &String| {
                !longer
                    .iter()
                    .any(|other| other != t && other.to_lowercase().contains(&t.to_lowercase()))
            });
        }

        for sentence in text.split(|c: char| c == '.' || c == '!' || c == '?' || c == '\n') {
            let words: Vec<&str> = sentence.split_whitespace().collect();
            let mut phrase: Vec<&str> = Vec::new();

            let mut flush = |phrase: &mut Vec<&str>| {
                if phrase.is_empty() {
                    return;
                }
                let name = phrase.join(" ");
                phrase.clear();
                if STOPWORDS.contains(&name.to_lowercase().as_str()) || name.chars().count() < 3 {
                    return;
                }
                let last = name.split_whitespace().last().unwrap_or("");
                if COMPANY_SUFFIXES.contains(&last) || KNOWN_COMPANIES.contains(&name.as_str()) {
                    companies.insert(name);
                } else {
                    concepts.insert(name);
                }
            };

            for raw in &words {
                let word = Self::clean(raw);
                if word.is_empty() {
                    flush(&mut phrase);
                    continue;
                }
                if Self::is_acronym(word) {
                    flush(&mut phrase);
                    technologies.insert(word.to_string());
                    continue;
                }
                if Self::is_capitalized(word) && !STOPWORDS.contains(&word.to_lowercase().as_str())
                {
                    phrase.push(word);
                    // phrases end at punctuation inside the sentence
                    if raw.ends_with(',') || raw.ends_with(';') || raw.ends_with(':') {
                        flush(&mut phrase);
                    }
                } else {
                    flush(&mut phrase);
                }
            }
            flush(&mut phrase);
        }

        // Companies found by name also show up as concepts
        concepts.retain(|c| !companies.contains(c));

        ExtractedEntities {
            authors: Vec::new(),
            topics: topics.into_iter().collect(),
            technologies: technologies.into_iter().collect(),
            companies: companies.into_iter().collect(),
            concepts: concepts.into_iter().collect(),
        }
    }
}

fn title_case(phrase: &str) -> String {
    phrase
        .split(' ')
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[async_trait]
impl EntityExtractor for HeuristicEntityExtractor {
    async fn extract(&self, text: &str) -> Result<ExtractedEntities> {
        Ok(self.extract_sync(text))
    }
}

// ============= LLM extractor =============

const EXTRACTION_SYSTEM_PROMPT: &str = "You extract named entities from technical articles. \
Reply with a single JSON object with the keys \"authors\", \"topics\", \"technologies\", \
\"companies\" and \"concepts\", each an array of short strings. Do not add commentary.";

/// Asks an LLM for the entity JSON and falls back to the heuristic extractor
/// when the model is unreachable or replies with something unparsable.
pub struct LlmEntityExtractor {
    client: Arc<dyn LLMClient>,
    fallback: HeuristicEntityExtractor,
}

impl LlmEntityExtractor {
    pub fn new(client: Arc<dyn LLMClient>) -> Self {
        Self {
            client,
            fallback: HeuristicEntityExtractor::new(),
        }
    }

    pub fn parse_reply(reply: &str) -> Option<ExtractedEntities> {
        serde_json::from_str(extract_json_block(reply)).ok()
    }
}

#[async_trait]
impl EntityExtractor for LlmEntityExtractor {
    async fn extract(&self, text: &str) -> Result<ExtractedEntities> {
        let prompt = format!("Article excerpt:\n\n{}", text);
        match self
            .client
            .generate_with_system(EXTRACTION_SYSTEM_PROMPT, &prompt)
            .await
        {
            Ok(reply) => match Self::parse_reply(&reply) {
                Some(entities) => Ok(entities),
                None => {
                    tracing::warn!(
                        model = self.client.model_name(),
                        "Unparsable entity reply, using heuristic extraction"
                    );
                    self.fallback.extract(text).await
                }
            },
            Err(e) => {
                tracing::warn!("Entity extraction LLM call failed: {}", e);
                self.fallback.extract(text).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_heuristic_extracts_categories() {
        let extractor = HeuristicEntityExtractor::new();
        let entities = extractor
            .extract(
                "Transformers were introduced by Google researchers. Unlike an RNN or LSTM, \
                 the Transformer relies on Self Attention for time-series forecasting.",
            )
            .await
            .unwrap();

        assert!(entities.technologies.contains(&"RNN".to_string()));
        assert!(entities.technologies.contains(&"LSTM".to_string()));
        assert!(entities.companies.contains(&"Google".to_string()));
        assert!(entities.concepts.contains(&"Transformers".to_string()));
        assert!(entities.concepts.contains(&"Self Attention".to_string()));
        assert_eq!(entities.topics, vec!["Time-series Forecasting".to_string()]);
    }

    #[tokio::test]
    async fn test_heuristic_ignores_stopwords() {
        let extractor = HeuristicEntityExtractor::new();
        let entities = extractor.extract("The model is small. It works.").await.unwrap();
        assert!(entities.concepts.is_empty());
    }

    #[test]
    fn test_parse_llm_reply() {
        let reply = "```json\n{\"topics\": [\"Forecasting\"], \"technologies\": [\"RNN\"]}\n```";
        let parsed = LlmEntityExtractor::parse_reply(reply).unwrap();
        assert_eq!(parsed.topics, vec!["Forecasting"]);
        assert!(parsed.authors.is_empty());
        assert!(LlmEntityExtractor::parse_reply("no json here").is_none());
    }
}
