use crate::error::IngestError;
use crate::traits::TopicClassifier;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TopicKeywords {
    pub topic: String,
    pub keywords: Vec<String>,
}

/// First-match keyword router. Topics are tried in declaration order and the
/// first one with any keyword contained in the question wins.
#[derive(Debug, Clone)]
pub struct KeywordClassifier {
    topics: Vec<TopicKeywords>,
}

impl Default for KeywordClassifier {
    fn default() -> Self {
        Self::new(vec![
            topic("ethics", &["ethics", "bribery", "inclusion", "code of conduct"]),
            topic(
                "technical support",
                &["support", "helpdesk", "issue", "it", "problem"],
            ),
        ])
    }
}

fn topic(name: &str, keywords: &[&str]) -> TopicKeywords {
    TopicKeywords {
        topic: name.to_string(),
        keywords: keywords.iter().map(|keyword| keyword.to_string()).collect(),
    }
}

impl KeywordClassifier {
    pub fn new(topics: Vec<TopicKeywords>) -> Self {
        let topics = topics
            .into_iter()
            .map(|entry| TopicKeywords {
                topic: entry.topic.trim().to_lowercase(),
                keywords: entry
                    .keywords
                    .into_iter()
                    .map(|keyword| keyword.to_lowercase())
                    .filter(|keyword| !keyword.is_empty())
                    .collect(),
            })
            .collect();
        Self { topics }
    }

    /// Loads `[{"topic": "...", "keywords": ["..."]}]`, keeping file order.
    pub fn from_json_file(path: &Path) -> Result<Self, IngestError> {
        let raw = std::fs::read_to_string(path)?;
        let topics: Vec<TopicKeywords> = serde_json::from_str(&raw)?;
        Ok(Self::new(topics))
    }

    pub fn topics(&self) -> &[TopicKeywords] {
        &self.topics
    }
}

impl TopicClassifier for KeywordClassifier {
    fn classify(&self, question: &str) -> Option<&str> {
        let lowered = question.to_lowercase();
        self.topics
            .iter()
            .find(|entry| {
                entry
                    .keywords
                    .iter()
                    .any(|keyword| lowered.contains(keyword.as_str()))
            })
            .map(|entry| entry.topic.as_str())
    }
}
