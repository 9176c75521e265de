use crate::directory::{ExpertDirectory, ExpertRecord};
use crate::error::ChatError;
use crate::memory::{Session, MEMORY_CAPACITY};
use crate::models::{Reply, ReplyKind};
use crate::prompt::{assemble, PromptInput};
use crate::traits::{Generator, Retriever, TopicClassifier};
use chrono::{Local, NaiveDateTime};
use tracing::{debug, info, warn};

pub const DEFAULT_TOP_K: usize = 4;

pub const GREETINGS: [&str; 7] = [
    "hi",
    "hello",
    "hej",
    "hey",
    "good morning",
    "good evening",
    "good afternoon",
];

pub const GREETING_REPLY: &str = "Hi! 👋 Hope you're having a great day. \
     I'm here to help you with anything about the company.";

/// Full-match greeting check, ignoring case and surrounding or repeated whitespace.
pub fn is_greeting(question: &str) -> bool {
    let normalized = question
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    GREETINGS.contains(&normalized.as_str())
}

pub fn contact_block(expert: &ExpertRecord) -> String {
    format!(
        "\n\n📇 You can also contact **{}**, {} for further help:\n📧 {}",
        expert.name, expert.role, expert.email
    )
}

/// Drives one question through greeting detection or the
/// retrieve → assemble → generate → route pipeline.
pub struct Assistant<R, G, C>
where
    R: Retriever,
    G: Generator,
    C: TopicClassifier,
{
    retriever: R,
    generator: G,
    classifier: C,
    experts: ExpertDirectory,
    top_k: usize,
    clock: fn() -> NaiveDateTime,
}

fn local_now() -> NaiveDateTime {
    Local::now().naive_local()
}

impl<R, G, C> Assistant<R, G, C>
where
    R: Retriever,
    G: Generator,
    C: TopicClassifier,
{
    pub fn new(retriever: R, generator: G, classifier: C, experts: ExpertDirectory) -> Self {
        Self {
            retriever,
            generator,
            classifier,
            experts,
            top_k: DEFAULT_TOP_K,
            clock: local_now,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_clock(mut self, clock: fn() -> NaiveDateTime) -> Self {
        self.clock = clock;
        self
    }

    pub fn experts(&self) -> &ExpertDirectory {
        &self.experts
    }

    /// Answers `question` and records the exchange in `session`. On error
    /// the session is left unchanged.
    pub async fn respond(&self, session: &mut Session, question: &str) -> Result<Reply, ChatError> {
        let reply = if is_greeting(question) {
            debug!("greeting short-circuit");
            Reply {
                kind: ReplyKind::Greeting,
                text: GREETING_REPLY.to_string(),
            }
        } else {
            Reply {
                kind: ReplyKind::Answer,
                text: self.answer(session, question).await?,
            }
        };

        session.record_exchange(question, &reply.text);
        Ok(reply)
    }

    async fn answer(&self, session: &Session, question: &str) -> Result<String, ChatError> {
        let chunks = self.retriever.retrieve(question, self.top_k).await?;
        info!(hits = chunks.len(), "retrieved context");

        let memory = session.memory().recent(MEMORY_CAPACITY);
        let prompt = assemble(&PromptInput {
            chunks: &chunks,
            question,
            memory: &memory,
            experts: &self.experts,
            current_time: (self.clock)(),
        });

        let mut response = self.generator.generate(&prompt).await.map_err(|error| {
            warn!(error = %error, "generation failed");
            ChatError::Generation(error)
        })?;

        if let Some(topic) = self.classifier.classify(question) {
            match self.experts.get(topic) {
                Some(expert) => {
                    info!(topic, expert = %expert.name, "routing to expert");
                    response.push_str(&contact_block(expert));
                }
                None => debug!(topic, "classified topic has no expert"),
            }
        }

        Ok(response)
    }
}
