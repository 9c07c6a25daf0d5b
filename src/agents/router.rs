use crate::types::{AppError, DirectRoute, Intent, Result};

/// Kinds of small talk the orchestrator answers without doing research.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CasualKind {
    Greeting,
    Farewell,
    Thanks,
    Acknowledgement,
    AboutAssistant,
}

const GREETINGS: &[&str] = &[
    "hi", "hello", "hey", "heya", "hiya", "howdy", "greetings", "yo", "morning", "evening",
    "good morning", "good afternoon", "good evening",
];

const FAREWELLS: &[&str] = &[
    "bye", "goodbye", "bye bye", "see you", "see ya", "see you later", "cya", "good night",
    "farewell", "later",
];

const THANKS: &[&str] = &["thanks", "thank you", "thx", "ty", "cheers", "much appreciated"];

const ACKNOWLEDGEMENTS: &[&str] = &[
    "ok", "okay", "k", "cool", "great", "nice", "awesome", "perfect", "got it", "sounds good",
    "sure", "yes", "no", "yep", "nope", "alright", "makes sense", "understood",
];

const ABOUT_ASSISTANT: &[&str] = &[
    "who are you",
    "what are you",
    "what can you do",
    "how are you",
    "how are you doing",
    "what is your name",
    "what's your name",
    "whats your name",
    "help",
    "how do you work",
    "what do you do",
];

/// Words that may trail a greeting or thanks without making it a question.
const FILLER: &[&str] = &[
    "there", "you", "so", "much", "very", "again", "all", "everyone", "folks", "team", "friend",
    "buddy", "sage", "assistant", "a", "lot", "for", "that", "the", "help", "mate",
];

const COMPARISON_MARKERS: &[&str] = &[
    "compare",
    "compared",
    "comparing",
    "comparison",
    "versus",
    "vs",
    "difference between",
    "differences between",
    "pros and cons",
    "trade-offs",
    "tradeoffs",
    "trade offs",
];

const CONNECTORS: &[&str] = &[
    "and then",
    "then",
    "based on",
    "after that",
    "followed by",
    "as well as",
    "step by step",
    "in addition",
];

const RESEARCH_VERBS: &[&str] = &[
    "research",
    "investigate",
    "analyze",
    "analyse",
    "survey",
    "literature review",
    "review the literature",
    "in depth",
    "in-depth",
    "comprehensive",
    "evaluate",
    "assess",
    "synthesize",
];

const SUMMARIZE_MARKERS: &[&str] = &[
    "summarize",
    "summarise",
    "summary of",
    "tl;dr",
    "tldr",
    "sum up",
    "condense",
];

const KNOWLEDGE_BASE_MARKERS: &[&str] = &[
    "knowledge base",
    "indexed",
    "our documents",
    "my documents",
    "the documents",
    "ingested",
    "in the corpus",
    "from the index",
    "my notes",
    "our notes",
];

/// Lowercased words; apostrophes and hyphens stay inside a word so "what's"
/// and "time-series" are one token each.
pub(crate) fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric() && c != '\'' && c != '-' && c != ';')
        .map(|w| w.trim_matches(|c: char| c == '\'' || c == '-' || c == ';'))
        .filter(|w| !w.is_empty())
        .map(String::from)
        .collect()
}

/// True when `phrase` occurs in `words` on word boundaries.
pub(crate) fn contains_phrase(words: &[String], phrase: &str) -> bool {
    let needle: Vec<&str> = phrase.split_whitespace().collect();
    if needle.is_empty() || needle.len() > words.len() {
        return false;
    }
    words
        .windows(needle.len())
        .any(|window| window.iter().zip(&needle).all(|(w, n)| w == n))
}

pub(crate) fn contains_any(words: &[String], phrases: &[&str]) -> bool {
    phrases.iter().any(|p| contains_phrase(words, p))
}

/// Deterministic intent classifier.
///
/// A pure function of the query text: the same text always yields the same
/// intent, with no model calls involved.
#[derive(Debug, Clone)]
pub struct IntentClassifier {
    long_query_words: usize,
}

impl Default for IntentClassifier {
    fn default() -> Self {
        Self {
            long_query_words: 25,
        }
    }
}

impl IntentClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queries with at least this many words are treated as multi-step.
    pub fn with_long_query_words(mut self, words: usize) -> Self {
        self.long_query_words = words.max(1);
        self
    }

    /// Small-talk category of `text`, if it is small talk at all.
    pub fn casual_kind(&self, text: &str) -> Option<CasualKind> {
        let words = tokenize(text);
        if words.is_empty() {
            return None;
        }
        let phrase = words.join(" ");

        let categories: [(&[&str], CasualKind); 5] = [
            (ABOUT_ASSISTANT, CasualKind::AboutAssistant),
            (GREETINGS, CasualKind::Greeting),
            (FAREWELLS, CasualKind::Farewell),
            (THANKS, CasualKind::Thanks),
            (ACKNOWLEDGEMENTS, CasualKind::Acknowledgement),
        ];

        for (phrases, kind) in categories {
            if phrases.contains(&phrase.as_str()) {
                return Some(kind);
            }
        }

        // "hello there", "thanks so much", "hi sage, good morning"
        if words.len() <= 6 {
            for (phrases, kind) in categories {
                if kind == CasualKind::AboutAssistant || kind == CasualKind::Acknowledgement {
                    continue;
                }
                for p in phrases.iter() {
                    let lead: Vec<&str> = p.split_whitespace().collect();
                    if words.len() < lead.len() || words[..lead.len()] != lead[..] {
                        continue;
                    }
                    let rest = &words[lead.len()..];
                    let trailing_ok = rest.iter().all(|w| {
                        FILLER.contains(&w.as_str())
                            || GREETINGS.contains(&w.as_str())
                            || THANKS.contains(&w.as_str())
                    });
                    if trailing_ok {
                        return Some(kind);
                    }
                }
            }
        }
        None
    }

    fn is_multi_step(&self, text: &str, words: &[String]) -> bool {
        if contains_any(words, COMPARISON_MARKERS)
            || contains_any(words, CONNECTORS)
            || contains_any(words, RESEARCH_VERBS)
        {
            return true;
        }
        text.matches('?').count() >= 2 || words.len() >= self.long_query_words
    }

    pub fn classify(&self, text: &str) -> Result<Intent> {
        let words = tokenize(text);
        if words.is_empty() {
            return Err(AppError::Classification(
                "query contains no words".to_string(),
            ));
        }

        if self.casual_kind(text).is_some() {
            return Ok(Intent::Casual);
        }
        if self.is_multi_step(text, &words) {
            return Ok(Intent::MultiStepResearch);
        }

        let route = if contains_any(&words, SUMMARIZE_MARKERS) {
            DirectRoute::Summarization
        } else if contains_any(&words, KNOWLEDGE_BASE_MARKERS) {
            DirectRoute::Retrieval
        } else {
            DirectRoute::ToolUse
        };
        Ok(Intent::SingleTool(route))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_casual_phrases() {
        let classifier = IntentClassifier::new();
        for text in ["hello", "Hi there!", "thanks so much", "Bye", "ok", "Who are you?"] {
            assert_eq!(classifier.classify(text).unwrap(), Intent::Casual, "{}", text);
        }
        assert_eq!(
            classifier.casual_kind("good morning sage"),
            Some(CasualKind::Greeting)
        );
        assert_eq!(
            classifier.casual_kind("what can you do"),
            Some(CasualKind::AboutAssistant)
        );
    }

    #[test]
    fn test_comparison_is_multi_step() {
        let classifier = IntentClassifier::new();
        assert_eq!(
            classifier
                .classify("Compare transformer and RNN architectures for time-series forecasting")
                .unwrap(),
            Intent::MultiStepResearch
        );
        assert_eq!(
            classifier.classify("LSTM vs GRU").unwrap(),
            Intent::MultiStepResearch
        );
    }

    #[test]
    fn test_single_tool_routes() {
        let classifier = IntentClassifier::new();
        assert_eq!(
            classifier.classify("What is a recurrent neural network?").unwrap(),
            Intent::SingleTool(DirectRoute::ToolUse)
        );
        assert_eq!(
            classifier
                .classify("What does our knowledge base say about attention?")
                .unwrap(),
            Intent::SingleTool(DirectRoute::Retrieval)
        );
        assert_eq!(
            classifier
                .classify("Summarize: Transformers replaced recurrence with attention.")
                .unwrap(),
            Intent::SingleTool(DirectRoute::Summarization)
        );
    }

    #[test]
    fn test_greeting_with_question_is_not_casual() {
        let classifier = IntentClassifier::new();
        assert_ne!(
            classifier.classify("hello, what is an LSTM?").unwrap(),
            Intent::Casual
        );
    }

    #[test]
    fn test_empty_and_punctuation_rejected() {
        let classifier = IntentClassifier::new();
        for text in ["", "   ", "?!...", "--"] {
            assert!(matches!(
                classifier.classify(text),
                Err(AppError::Classification(_))
            ));
        }
    }

    #[test]
    fn test_classification_is_deterministic() {
        let classifier = IntentClassifier::new();
        let text = "Find recent papers on graph neural networks";
        let first = classifier.classify(text).unwrap();
        for _ in 0..10 {
            assert_eq!(classifier.classify(text).unwrap(), first);
        }
    }
}
