use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn qgen_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("qgen");
    path
}

fn paragraph(topic: &str, n: usize) -> String {
    format!(
        "{} paragraph {}: the reading explains how coupon rates, yields to maturity and \
         duration interact when market rates change, and why a portfolio manager would \
         prefer one measure over another when hedging interest rate exposure.",
        topic, n
    )
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let fixed_income = root.join("materials").join("Fixed Income");
    fs::create_dir_all(&fixed_income).unwrap();
    let body: Vec<String> = (0..12).map(|i| paragraph("Bond", i)).collect();
    fs::write(fixed_income.join("reading-45-duration.txt"), body.join("\n\n")).unwrap();
    fs::write(
        fixed_income.join("reading-46-credit.md"),
        "# Credit risk\n\nCredit spreads widen when default probabilities rise.",
    )
    .unwrap();
    fs::write(fixed_income.join("notes.docx"), "ignored").unwrap();

    // Folder exists but holds nothing extractable.
    fs::create_dir_all(root.join("materials").join("Economics")).unwrap();

    let config_content = format!(
        r#"[sources]
root = "{root}/materials"

[retrieval]
strategy = "local"
seed = 7

[generation]
provider = "disabled"

[batch]
delay_ms = 0
max_count = 5

[db]
path = "{root}/data/qgen.sqlite"

[server]
bind = "127.0.0.1:7341"
"#,
        root = root.display()
    );

    let config_path = config_dir.join("qgen.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_qgen(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = qgen_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run qgen binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_qgen(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data").join("qgen.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_qgen(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_qgen(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_topics_lists_all_ten_areas() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_qgen(&config_path, &["topics"]);
    assert!(success, "topics failed: stdout={}, stderr={}", stdout, stderr);

    for topic in [
        "Ethical and Professional Standards",
        "Quantitative Methods",
        "Economics",
        "Financial Statement Analysis",
        "Corporate Issuers",
        "Equity Investments",
        "Fixed Income",
        "Derivatives",
        "Alternative Investments",
        "Portfolio Management",
    ] {
        assert!(stdout.contains(topic), "missing topic {}: {}", topic, stdout);
    }

    let fixed_income = stdout
        .lines()
        .find(|l| l.starts_with("Fixed Income"))
        .unwrap();
    let cols: Vec<&str> = fixed_income.split_whitespace().collect();
    // "Fixed", "Income", files, questions
    assert_eq!(cols[2], "2", "unexpected row: {}", fixed_income);
    assert_eq!(cols[3], "0", "unexpected row: {}", fixed_income);
}

#[test]
fn test_chunk_dry_run() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_qgen(&config_path, &["chunk", "fixed-income"]);
    assert!(success, "chunk failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("reading-45-duration.txt"));
    assert!(stdout.contains("reading-46-credit.md"));
    assert!(stdout.contains("documents: 2"));
}

#[test]
fn test_chunk_subtopic_hint_filters_files() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, _, success) = run_qgen(
        &config_path,
        &["chunk", "Fixed Income", "--subtopic", "reading-46"],
    );
    assert!(success);
    assert!(stdout.contains("documents: 1"));
    assert!(!stdout.contains("reading-45-duration.txt"));
}

#[test]
fn test_generate_with_disabled_provider_reports_attempt_errors() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_qgen(
        &config_path,
        &[
            "generate",
            "--topic",
            "Fixed Income",
            "--difficulty",
            "beginner",
            "--count",
            "2",
            "--no-delay",
        ],
    );
    assert!(success, "generate failed: stdout={}, stderr={}", stdout, stderr);

    let result: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(result["requested"], 2);
    assert_eq!(result["accepted"].as_array().unwrap().len(), 0);
    assert_eq!(result["errors"].as_array().unwrap().len(), 2);
    assert_eq!(result["cancelled"], false);
    assert!(result.get("aborted").is_none());
    assert!(!result["source_files"].as_array().unwrap().is_empty());
}

#[test]
fn test_generate_invalid_topic_fails() {
    let (_tmp, config_path) = setup_test_env();

    let (_, stderr, success) = run_qgen(
        &config_path,
        &["generate", "--topic", "Astrology", "--difficulty", "beginner"],
    );
    assert!(!success);
    assert!(stderr.contains("invalid topic"), "stderr: {}", stderr);
}

#[test]
fn test_generate_invalid_difficulty_fails() {
    let (_tmp, config_path) = setup_test_env();

    let (_, stderr, success) = run_qgen(
        &config_path,
        &["generate", "--topic", "Economics", "--difficulty", "expert"],
    );
    assert!(!success);
    assert!(stderr.contains("difficulty"), "stderr: {}", stderr);
}

#[test]
fn test_generate_count_above_max_fails() {
    let (_tmp, config_path) = setup_test_env();

    let (_, stderr, success) = run_qgen(
        &config_path,
        &[
            "generate",
            "--topic",
            "Fixed Income",
            "--difficulty",
            "advanced",
            "--count",
            "6",
        ],
    );
    assert!(!success);
    assert!(stderr.contains("count must be between 1 and 5"), "stderr: {}", stderr);
}

#[test]
fn test_generate_topic_without_material_aborts() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_qgen(
        &config_path,
        &[
            "generate",
            "--topic",
            "Economics",
            "--difficulty",
            "intermediate",
            "--count",
            "3",
            "--no-delay",
        ],
    );
    assert!(!success);
    assert!(stderr.contains("batch aborted"), "stderr: {}", stderr);

    let result: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(result["errors"].as_array().unwrap().len(), 1);
    assert!(result["aborted"]
        .as_str()
        .unwrap()
        .contains("no source material"));
}

#[test]
fn test_index_requires_embedding_provider() {
    let (_tmp, config_path) = setup_test_env();

    let (_, stderr, success) = run_qgen(&config_path, &["index", "all"]);
    assert!(!success);
    assert!(stderr.contains("Embedding provider is disabled"), "stderr: {}", stderr);
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, success) = run_qgen(&tmp.path().join("nope.toml"), &["topics"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}
