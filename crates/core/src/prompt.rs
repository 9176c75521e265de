use crate::directory::ExpertDirectory;
use crate::models::{MemoryEntry, RetrievedChunk};
use chrono::NaiveDateTime;
use std::fmt;

pub const TIME_FORMAT: &str = "%A, %B %d, %Y at %H:%M";

const PREAMBLE: &str = "You are an expert assistant helping employees at a company by answering \
questions about the company and its policies, tools, and projects.

Your task is to answer the question based on the information provided.
First, read the information and then answer the question.

If you need more information, ask for more.
If you don't know the answer, say \"I don't have information about this from company data\".";

/// Everything the generator gets to see for one question.
pub struct PromptInput<'a> {
    pub chunks: &'a [RetrievedChunk],
    pub question: &'a str,
    pub memory: &'a [MemoryEntry],
    pub experts: &'a ExpertDirectory,
    pub current_time: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptText(String);

impl PromptText {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for PromptText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn assemble(input: &PromptInput<'_>) -> PromptText {
    let time = input.current_time.format(TIME_FORMAT);
    let info = format_chunks(input.chunks);
    let chat_context = format_memory(input.memory);
    let experts = format_experts(input.experts);

    PromptText(format!(
        "{PREAMBLE}\n\n\
         The current date and time is: {time}\n\
         Do not mention the date or time unless the user specifically asks \
         about the date, time, day, or schedule.\n\n\
         Here is the company info:\n{info}\n\n\
         Recent chat context (if relevant):\n{chat_context}\n\n\
         Experts available and their contact and emails:\n{experts}\n\n\
         Question: {question}\n",
        question = input.question,
    ))
}

pub fn format_chunks(chunks: &[RetrievedChunk]) -> String {
    chunks
        .iter()
        .map(|hit| format!("[From {}]\n{}", hit.chunk.source, hit.chunk.text.trim()))
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn format_memory(memory: &[MemoryEntry]) -> String {
    let mut context = String::new();
    for entry in memory {
        context.push_str(&format!(
            "Previous question: {}\nPrevious answer: {}\n\n",
            entry.question, entry.answer
        ));
    }
    context.trim().to_string()
}

pub fn format_experts(experts: &ExpertDirectory) -> String {
    experts
        .iter()
        .map(|(topic, record)| {
            format!(
                "- {} ({}), email: {} — topic: {}",
                record.name,
                record.role,
                record.email,
                title_case(topic)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Upper-cases the first letter of every alphabetic run and lower-cases the rest.
pub fn title_case(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut previous_is_letter = false;

    for ch in text.chars() {
        if ch.is_alphabetic() {
            if previous_is_letter {
                result.extend(ch.to_lowercase());
            } else {
                result.extend(ch.to_uppercase());
            }
            previous_is_letter = true;
        } else {
            result.push(ch);
            previous_is_letter = false;
        }
    }

    result
}
