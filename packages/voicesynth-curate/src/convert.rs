//! Convert stage: mailbox JSON export → JSONL with only mail header/body fields
//!
//! A JSON array input is streamed element by element, never loaded whole.
//! Inputs ending in `.jsonl` are read line by line.

use crate::error::{CurateError, Result};
use serde::de::{Deserializer, SeqAccess, Visitor};
use serde_json::{Map, Value};
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use tracing::{debug, info};

/// Fields kept in the converted output
pub const SAFE_FIELDS: &[&str] = &[
    "Subject", "subject",
    "Body", "body", "Text", "text", "Content", "content",
    "From", "from", "Sender", "sender", "emailFrom", "email_from",
    "To", "to", "Recipient", "recipient", "Recipients", "recipients",
    "Cc", "cc", "CC",
    "Bcc", "bcc", "BCC",
    "Date", "date", "sent", "sentAt", "created_at", "createdAt",
    "Message-ID", "Message-Id", "MessageId", "message_id", "messageId",
    "Auto-Submitted", "auto-submitted",
    "X-Autoreply", "x-autoreply",
    "X-Auto-Response-Suppress", "x-auto-response-suppress",
    "Precedence", "precedence",
    "Reply-To", "reply-to", "replyTo",
];

/// Attachments, raw MIME and routing headers; never kept
pub const BLOCKED_FIELDS: &[&str] = &[
    "attachments", "Attachments", "files", "Files", "media", "Media",
    "images", "Images", "inline_images", "inlineImages",
    "raw", "Raw", "mimeContent", "mime_content", "payload", "Payload",
    "X-Originating-IP", "x-originating-ip", "Received", "received",
    "X-Mailer", "x-mailer", "X-Original-To", "x-original-to",
    "Delivered-To", "delivered-to", "Return-Path", "return-path",
];

const BLOB_MIN_CHARS: usize = 1000;
const BLOB_SAMPLE_CHARS: usize = 100;
const ATTACHMENT_KEYS: [&str; 4] = ["filename", "content", "data", "base64"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConvertStats {
    pub total: usize,
    pub kept: usize,
}

/// Strip a record down to whitelisted, non-null, non-binary fields.
pub fn filter_record(record: Map<String, Value>) -> Map<String, Value> {
    record
        .into_iter()
        .filter(|(key, value)| {
            let key = key.as_str();
            !BLOCKED_FIELDS.contains(&key)
                && SAFE_FIELDS.contains(&key)
                && !value.is_null()
                && !is_encoded_blob(value)
                && !is_attachment_list(value)
        })
        .collect()
}

/// Long strings without any word or sentence separator near the start
fn is_encoded_blob(value: &Value) -> bool {
    let Value::String(s) = value else {
        return false;
    };
    s.chars().count() > BLOB_MIN_CHARS
        && !s
            .chars()
            .take(BLOB_SAMPLE_CHARS)
            .any(|c| matches!(c, ' ' | '\n' | '.' | ','))
}

fn is_attachment_list(value: &Value) -> bool {
    match value {
        Value::Array(items) => match items.first() {
            Some(Value::Object(first)) => ATTACHMENT_KEYS.iter().any(|k| first.contains_key(*k)),
            _ => false,
        },
        _ => false,
    }
}

/// Convert `input` into JSONL at `output`.
pub fn convert_file(input: &Path, output: &Path, strip_fields: bool) -> Result<ConvertStats> {
    let reader = BufReader::new(File::open(input)?);
    let mut writer = BufWriter::new(File::create(output)?);
    let mut stats = ConvertStats::default();

    let is_jsonl = input
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("jsonl"));

    let mut sink = |item: Value| -> Result<()> {
        stats.total += 1;
        let Value::Object(mut record) = item else {
            debug!(position = stats.total, "Skipping non-object entry");
            return Ok(());
        };
        if strip_fields {
            record = filter_record(record);
        }
        if record.is_empty() {
            return Ok(());
        }
        serde_json::to_writer(&mut writer, &record)?;
        writer.write_all(b"\n")?;
        stats.kept += 1;
        Ok(())
    };

    if is_jsonl {
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            sink(serde_json::from_str(&line)?)?;
        }
    } else {
        let mut de = serde_json::Deserializer::from_reader(reader);
        (&mut de)
            .deserialize_seq(StreamVisitor { sink: &mut sink })
            .map_err(|e| {
                CurateError::invalid_input(format!(
                    "{} is not a JSON array: {}",
                    input.display(),
                    e
                ))
            })?;
        de.end()?;
    }

    writer.flush()?;
    info!(total = stats.total, kept = stats.kept, "Converted records");
    Ok(stats)
}

/// Feeds each array element to the sink as it is parsed
struct StreamVisitor<'a, F> {
    sink: &'a mut F,
}

impl<'de, F> Visitor<'de> for StreamVisitor<'_, F>
where
    F: FnMut(Value) -> Result<()>,
{
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("an array of email objects")
    }

    fn visit_seq<A>(self, mut seq: A) -> std::result::Result<(), A::Error>
    where
        A: SeqAccess<'de>,
    {
        while let Some(item) = seq.next_element::<Value>()? {
            (self.sink)(item).map_err(serde::de::Error::custom)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn as_map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn test_filter_keeps_safe_fields_only() {
        let record = as_map(json!({
            "Subject": "Hi",
            "Body": "Hello there",
            "Received": "from mx",
            "X-Custom": "dropped",
            "Date": null
        }));
        let filtered = filter_record(record);
        let keys: Vec<_> = filtered.keys().cloned().collect();
        assert_eq!(keys, vec!["Body", "Subject"]);
    }

    #[test]
    fn test_filter_drops_blobs_and_attachment_lists() {
        let blob = "A".repeat(1500);
        let prose = format!("Hello, {}", "word ".repeat(300));
        let record = as_map(json!({
            "Body": blob,
            "Text": prose,
            "To": [{"filename": "a.pdf"}],
            "Cc": ["bob@x.com"]
        }));
        let filtered = filter_record(record);
        assert!(!filtered.contains_key("Body"));
        assert!(filtered.contains_key("Text"));
        assert!(!filtered.contains_key("To"));
        assert!(filtered.contains_key("Cc"));
    }

    #[test]
    fn test_convert_array_to_jsonl() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("emails_raw.json");
        let output = dir.path().join("emails.jsonl");
        std::fs::write(
            &input,
            r#"[{"Subject": "One", "Body": "first", "raw": "MIME"},
                {"attachments": []},
                {"Subject": "Two", "Body": "second"}]"#,
        )
        .unwrap();

        let stats = convert_file(&input, &output, true).unwrap();
        assert_eq!(stats, ConvertStats { total: 3, kept: 2 });

        let text = std::fs::read_to_string(&output).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], r#"{"Body":"first","Subject":"One"}"#);
    }

    #[test]
    fn test_convert_without_filter_keeps_everything() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("in.json");
        let output = dir.path().join("out.jsonl");
        std::fs::write(&input, r#"[{"X-Custom": 1}]"#).unwrap();

        let stats = convert_file(&input, &output, false).unwrap();
        assert_eq!(stats.kept, 1);
    }

    #[test]
    fn test_convert_jsonl_input() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("export.jsonl");
        let output = dir.path().join("emails.jsonl");
        std::fs::write(&input, "{\"Subject\": \"a\"}\n\n{\"Subject\": \"b\"}\n").unwrap();

        let stats = convert_file(&input, &output, true).unwrap();
        assert_eq!(stats, ConvertStats { total: 2, kept: 2 });
    }

    #[test]
    fn test_convert_rejects_object_input() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("in.json");
        std::fs::write(&input, r#"{"Subject": "x"}"#).unwrap();
        let result = convert_file(&input, &dir.path().join("out.jsonl"), true);
        assert!(matches!(result, Err(CurateError::InvalidInput(_))));
    }
}
