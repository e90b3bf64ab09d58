//! Style-candidate filter applied before deduplication

use crate::record::EmailRecord;

/// Subjects containing any of these are transactional mail, not writing samples
pub const BORING_KEYWORDS: &[&str] = &[
    "invoice",
    "receipt",
    "password",
    "notification",
    "digest",
    "calendar",
    "invite",
    "zoom",
    "meeting rescheduled",
    "reminder",
    "unsubscribe",
    "terms and conditions",
    "login code",
    "reset your password",
    "security alert",
];

const AUTOMATED_RECIPIENTS: &[&str] = &["no-reply@", "noreply@", "notification"];

/// True when the record is worth reviewing as a writing sample.
pub fn is_style_candidate(record: &EmailRecord, min_chars: usize) -> bool {
    let subject = record.subject.trim().to_lowercase();
    if subject.is_empty() || BORING_KEYWORDS.iter().any(|kw| subject.contains(kw)) {
        return false;
    }

    if record.body.trim().chars().count() < min_chars {
        return false;
    }

    let recipients = record.recipients.to_lowercase();
    !AUTOMATED_RECIPIENTS.iter().any(|p| recipients.contains(p))
}
