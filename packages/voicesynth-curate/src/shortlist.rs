//! Shortlist CSV writer
//!
//! RFC 4180 quoting, CRLF row terminators. Subjects are flattened to one line;
//! bodies keep their line breaks inside quoted fields.

use crate::error::Result;
use crate::record::EmailRecord;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

pub const COLUMNS: [&str; 9] = [
    "id",
    "message_id",
    "subject",
    "body",
    "to",
    "topic",
    "body_length",
    "paragraph_count",
    "richness_score",
];

/// Quote a field when it contains a delimiter, quote or line break.
pub fn escape_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Write the shortlist; `id` is the row's position in the shortlist.
pub fn write_shortlist<W: Write>(writer: &mut W, records: &[EmailRecord]) -> Result<()> {
    write_row(writer, COLUMNS.iter().map(|c| c.to_string()))?;

    for (row, record) in records.iter().enumerate() {
        let subject = record.subject.replace("\r\n", " ").replace(['\n', '\r'], " ");
        write_row(
            writer,
            [
                row.to_string(),
                record.message_id.clone().unwrap_or_default(),
                subject,
                record.body.clone(),
                record.recipients.clone(),
                record.topic.to_string(),
                record.body_length.to_string(),
                record.paragraph_count.to_string(),
                record.richness_score.to_string(),
            ],
        )?;
    }

    Ok(())
}

pub fn write_shortlist_file(path: &Path, records: &[EmailRecord]) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    write_shortlist(&mut writer, records)?;
    writer.flush()?;
    Ok(())
}

fn write_row<W: Write>(writer: &mut W, fields: impl IntoIterator<Item = String>) -> Result<()> {
    let line = fields
        .into_iter()
        .map(|f| escape_field(&f))
        .collect::<Vec<_>>()
        .join(",");
    writer.write_all(line.as_bytes())?;
    writer.write_all(b"\r\n")?;
    Ok(())
}
