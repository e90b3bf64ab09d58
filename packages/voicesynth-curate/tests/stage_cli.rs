//! Stage tool contract: artifacts on disk, one JSON stats line on stdout

use serde_json::{json, Value};
use std::process::Command;
use tempfile::TempDir;

fn stage_tool() -> Command {
    Command::new(env!("CARGO_BIN_EXE_voicesynth-stage"))
}

fn stats_line(stdout: &[u8]) -> Value {
    let text = String::from_utf8_lossy(stdout);
    let line = text
        .lines()
        .find(|l| l.starts_with('{'))
        .expect("no stats line on stdout");
    serde_json::from_str(line).unwrap()
}

#[test]
fn test_convert_reports_counts() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("emails_raw.json");
    let output = dir.path().join("emails.jsonl");
    std::fs::write(
        &input,
        json!([
            {"Subject": "a", "Body": "one", "Received": "mx"},
            {"Payload": "binary"}
        ])
        .to_string(),
    )
    .unwrap();

    let result = stage_tool()
        .args(["convert"])
        .arg(&input)
        .arg("--out")
        .arg(&output)
        .arg("--json-stats")
        .output()
        .unwrap();

    assert!(result.status.success());
    assert_eq!(stats_line(&result.stdout), json!({"total": 2, "kept": 1}));
    assert_eq!(std::fs::read_to_string(&output).unwrap().lines().count(), 1);
}

#[test]
fn test_curate_writes_shortlist() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("cleaned_emails.json");
    let output = dir.path().join("style_shortlist.csv");
    let body = |tag: &str| (0..50).map(|i| format!("{tag}{i}")).collect::<Vec<_>>().join(" ");
    std::fs::write(
        &input,
        json!([
            {"Message-ID": "<1@x>", "Subject": "Client kickoff", "To": "a@x.com", "Body": body("k")},
            {"Message-ID": "<2@x>", "Subject": "Client kickoff", "To": "a@x.com", "Body": body("k")},
            {"Message-ID": "<3@x>", "Subject": "Password reset", "To": "a@x.com", "Body": body("p")},
            {"Message-ID": "<4@x>", "Subject": "Workshop agenda", "To": "b@x.com", "Body": body("w")}
        ])
        .to_string(),
    )
    .unwrap();

    let result = stage_tool()
        .arg("curate")
        .arg(&input)
        .arg("--out")
        .arg(&output)
        .args(["--per-topic", "5", "--min-chars", "100", "--json-stats"])
        .output()
        .unwrap();

    assert!(result.status.success());
    let stats = stats_line(&result.stdout);
    assert_eq!(stats["total_input"], 4);
    assert_eq!(stats["filtered_out"], 1);
    assert_eq!(stats["exact_dupes_removed"], 1);
    assert_eq!(stats["shortlisted"], 2);

    let csv = std::fs::read_to_string(&output).unwrap();
    let rows: Vec<_> = csv.split("\r\n").filter(|r| !r.is_empty()).collect();
    assert_eq!(rows.len(), 3);
    assert!(rows[0].starts_with("id,message_id,subject,body,to,topic"));
    assert!(rows[1].starts_with("0,<1@x>,Client kickoff,"));
    assert!(rows[2].starts_with("1,<4@x>,Workshop agenda,"));
}

#[test]
fn test_curate_rejects_bad_threshold() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("cleaned_emails.json");
    std::fs::write(&input, "[]").unwrap();

    let result = stage_tool()
        .arg("curate")
        .arg(&input)
        .arg("--out")
        .arg(dir.path().join("out.csv"))
        .args(["--dedupe-threshold", "1.5"])
        .output()
        .unwrap();

    assert!(!result.status.success());
    let stderr = String::from_utf8_lossy(&result.stderr);
    assert!(stderr.contains("dedupe_threshold"));
}
