//! Email records as they flow through the curate stage
//!
//! Records are read from the Clean stage's JSON array, numbered in ingestion
//! order, and enriched in place (hash, signature, topic, score). They are never
//! written back; only the shortlist leaves this crate.

use crate::dedup::minhash::MinHashSignature;
use crate::error::{CurateError, Result};
use crate::scoring::{paragraph_count, richness_score, Topic};
use serde::Deserialize;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// One object of the cleaned-emails artifact
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CleanedEmail {
    #[serde(rename = "Message-ID", alias = "message_id", default)]
    pub message_id: Option<String>,

    #[serde(rename = "Sender", alias = "sender", default)]
    pub sender: Option<String>,

    #[serde(rename = "To", alias = "to", default)]
    pub to: Option<String>,

    #[serde(rename = "Subject", alias = "subject", default)]
    pub subject: Option<String>,

    #[serde(rename = "Body", alias = "body", default)]
    pub body: Option<String>,

    #[serde(rename = "Date", alias = "date", default)]
    pub date: Option<String>,
}

#[derive(Debug, Clone)]
pub struct EmailRecord {
    /// Position in the cleaned artifact; the tie-breaker everywhere
    pub id: usize,
    pub message_id: Option<String>,
    pub subject: String,
    pub body: String,
    pub recipients: String,
    pub sent_date: Option<String>,
    pub topic: Topic,
    pub body_length: usize,
    pub paragraph_count: usize,
    pub richness_score: u64,
    pub content_hash: Option<String>,
    pub minhash_signature: Option<MinHashSignature>,
}

impl EmailRecord {
    pub fn new(id: usize, subject: impl Into<String>, body: impl Into<String>) -> Self {
        let body = body.into();
        let body_length = body.chars().count();
        let paragraphs = paragraph_count(&body);
        let richness = richness_score(&body);
        Self {
            id,
            message_id: None,
            subject: subject.into(),
            body,
            recipients: String::new(),
            sent_date: None,
            topic: Topic::Other,
            body_length,
            paragraph_count: paragraphs,
            richness_score: richness,
            content_hash: None,
            minhash_signature: None,
        }
    }

    pub fn from_cleaned(id: usize, email: CleanedEmail) -> Self {
        let mut record = Self::new(
            id,
            email.subject.unwrap_or_default(),
            email.body.unwrap_or_default(),
        );
        record.message_id = email
            .message_id
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty());
        record.recipients = email.to.unwrap_or_default();
        record.sent_date = email.date;
        record
    }

    pub fn with_recipients(mut self, recipients: impl Into<String>) -> Self {
        self.recipients = recipients.into();
        self
    }

    pub fn with_message_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = Some(message_id.into());
        self
    }

    /// True when `self` should be kept over `other` as a duplicate-group
    /// representative: longer body, then more paragraphs, then earlier ingestion.
    pub fn is_richer_than(&self, other: &EmailRecord) -> bool {
        (self.body_length, self.paragraph_count, std::cmp::Reverse(self.id))
            > (other.body_length, other.paragraph_count, std::cmp::Reverse(other.id))
    }
}

/// Load the cleaned-emails JSON array, numbering records in file order.
pub fn load_cleaned(path: &Path) -> Result<Vec<EmailRecord>> {
    let file = File::open(path)?;
    let emails: Vec<CleanedEmail> = serde_json::from_reader(BufReader::new(file)).map_err(|e| {
        CurateError::invalid_input(format!(
            "{} is not a JSON array of emails: {}",
            path.display(),
            e
        ))
    })?;

    Ok(emails
        .into_iter()
        .enumerate()
        .map(|(id, email)| EmailRecord::from_cleaned(id, email))
        .collect())
}
