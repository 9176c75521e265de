use crate::error::IngestError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

const PLACEHOLDER: &str = "N/A";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExpertRecord {
    pub name: String,
    pub role: String,
    pub email: String,
}

/// One row of the expert contact table. `topic` may list several
/// comma-separated topics.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExpertRow {
    #[serde(rename = "Name", default)]
    pub name: Option<String>,
    #[serde(rename = "Role", default)]
    pub role: Option<String>,
    #[serde(rename = "Email", default)]
    pub email: Option<String>,
    #[serde(rename = "Topic", default)]
    pub topic: Option<String>,
}

/// Topic to contact mapping. Listing order follows first insertion; a later
/// row for the same topic replaces the record in place.
#[derive(Debug, Clone, Default)]
pub struct ExpertDirectory {
    entries: Vec<(String, ExpertRecord)>,
    positions: HashMap<String, usize>,
}

pub fn normalize_topic(topic: &str) -> String {
    topic.trim().to_lowercase()
}

fn field_or_placeholder(value: Option<&str>) -> String {
    match value.map(str::trim) {
        Some(trimmed) if !trimmed.is_empty() => trimmed.to_string(),
        _ => PLACEHOLDER.to_string(),
    }
}

impl ExpertDirectory {
    pub fn insert(&mut self, topic: &str, record: ExpertRecord) {
        let key = normalize_topic(topic);
        if key.is_empty() {
            return;
        }

        match self.positions.get(&key) {
            Some(&position) => self.entries[position].1 = record,
            None => {
                self.positions.insert(key.clone(), self.entries.len());
                self.entries.push((key, record));
            }
        }
    }

    pub fn get(&self, topic: &str) -> Option<&ExpertRecord> {
        self.positions
            .get(&normalize_topic(topic))
            .map(|&position| &self.entries[position].1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ExpertRecord)> {
        self.entries
            .iter()
            .map(|(topic, record)| (topic.as_str(), record))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub fn build_directory<I>(rows: I) -> ExpertDirectory
where
    I: IntoIterator<Item = ExpertRow>,
{
    let mut directory = ExpertDirectory::default();

    for row in rows {
        let Some(topics) = row.topic.as_deref() else {
            continue;
        };

        let record = ExpertRecord {
            name: field_or_placeholder(row.name.as_deref()),
            role: field_or_placeholder(row.role.as_deref()),
            email: field_or_placeholder(row.email.as_deref()),
        };

        for topic in topics.split(',') {
            directory.insert(topic, record.clone());
        }
    }

    directory
}

/// Reads a CSV with `Name, Role, Email, Topic` headers.
pub fn load_directory_csv(path: &Path) -> Result<ExpertDirectory, IngestError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::Headers)
        .flexible(true)
        .from_path(path)?;

    let rows = reader
        .deserialize::<ExpertRow>()
        .collect::<Result<Vec<_>, _>>()?;

    let directory = build_directory(rows);
    tracing::info!(path = %path.display(), topics = directory.len(), "loaded expert directory");
    Ok(directory)
}
