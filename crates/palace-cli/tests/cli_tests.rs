//! CLI integration tests using assert_cmd.

use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use tempfile::TempDir;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SOURCE: &str = "European capitals: Paris is the capital of France, Rome is the capital of Italy. Average speed is distance divided by time, v = d/t.";

const PAYLOAD: &str = r#"```json
{
  "summary": "Capitals and speed.",
  "patterns": ["capitals", "speed"],
  "formulas": [{"expression": "v = d/t", "description": "average speed as \frac{d}{t}"}],
  "quiz": [
    {"question": "Capital of Italy?", "options": ["Paris", "London", "Rome", "Berlin"], "correctAnswer": "C", "difficulty": "easy"},
    {"question": "Missing options", "correctAnswer": "A"}
  ],
  "numericals": [
    {"relatedFormula": "v = d/t", "problems": [
      {"question": "d=100 m, t=20 s. v?", "options": ["5 m/s", "2 m/s"], "correctAnswer": "5", "difficulty": "medium"}
    ]}
  ],
  "roadmap": [{"step": 1, "title": "Memorize capitals", "description": "Flashcards"}]
}
```"#;

const QUIZ_PAYLOAD: &str = r#"[
  {"question": "Capital of France?", "options": ["Paris", "Rome"], "correctAnswer": "paris", "difficulty": "easy"},
  {"question": "Unit of speed?", "options": ["m/s", "kg"], "correctAnswer": "A"}
]"#;

fn palace() -> Command {
    #[allow(deprecated)]
    let mut cmd = Command::cargo_bin("palace").unwrap();
    cmd.env_remove("RUST_LOG")
        .env_remove("PALACE_GEMINI_KEY")
        .env_remove("PALACE_OPENAI_KEY")
        .env_remove("PALACE_ANTHROPIC_KEY");
    cmd
}

/// Config pointing at two OpenAI-compatible backends on `server_uri`,
/// storing records under `dir`.
fn write_config(dir: &Path, server_uri: &str) -> std::path::PathBuf {
    let config = format!(
        r#"
attempt_timeout_secs = 10
max_retries = 0
retry_delay_ms = 1
parallelism = 2
store_dir = "{store}"

[[backends]]
name = "primary"
type = "openai"
model = "gpt-4.1-mini"
api_key = "test-key"
base_url = "{server_uri}/primary"

[[backends]]
name = "fallback"
type = "openai"
model = "gpt-4.1-nano"
api_key = "test-key"
base_url = "{server_uri}/fallback"
"#,
        store = dir.join("store").display().to_string().replace('\\', "/"),
    );
    let path = dir.join("palace.toml");
    std::fs::write(&path, config).unwrap();
    path
}

fn chat_reply(content: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(serde_json::json!({
        "choices": [{"message": {"role": "assistant", "content": content}, "index": 0}],
        "model": "gpt-4.1-nano",
        "usage": {"prompt_tokens": 100, "completion_tokens": 50, "total_tokens": 150}
    }))
}

/// Primary always fails; fallback answers analysis and quiz prompts.
async fn mount_backends(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/primary/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/fallback/v1/chat/completions"))
        .and(body_string_contains("Generate EXACTLY"))
        .respond_with(chat_reply(QUIZ_PAYLOAD))
        .with_priority(1)
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/fallback/v1/chat/completions"))
        .respond_with(chat_reply(PAYLOAD))
        .mount(server)
        .await;
}

async fn run(mut cmd: Command) -> std::process::Output {
    tokio::task::spawn_blocking(move || cmd.output().unwrap())
        .await
        .unwrap()
}

#[test]
fn help_output() {
    palace()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("cascade of generative backends"));
}

#[test]
fn version_output() {
    palace()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("palace"));
}

#[test]
fn init_creates_config() {
    let dir = TempDir::new().unwrap();

    palace()
        .current_dir(dir.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Created palace.toml"));

    assert!(dir.path().join("palace.toml").exists());
}

#[test]
fn init_skips_existing() {
    let dir = TempDir::new().unwrap();

    palace().current_dir(dir.path()).arg("init").assert().success();

    palace()
        .current_dir(dir.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("already exists"));
}

#[test]
fn backends_follow_priority_order() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("palace.toml");
    std::fs::write(
        &config,
        r#"
[[backends]]
name = "cloud"
type = "gemini"
model = "gemini-2.5-flash-lite"
api_key = "k"

[[backends]]
name = "local"
type = "ollama"
model = "llama3.1:8b"
priority = 0
"#,
    )
    .unwrap();

    let output = palace()
        .current_dir(dir.path())
        .env("HOME", dir.path())
        .arg("backends")
        .arg("--config")
        .arg(&config)
        .output()
        .unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("gemini-2.5-flash-lite"));
    let cloud = stdout.find("cloud").unwrap();
    let local = stdout.find("local").unwrap();
    assert!(cloud < local, "equal priorities keep declaration order");
}

#[test]
fn backends_without_config() {
    let dir = TempDir::new().unwrap();

    palace()
        .current_dir(dir.path())
        .env("HOME", dir.path())
        .arg("backends")
        .assert()
        .success()
        .stdout(predicate::str::contains("No backends configured"));
}

#[test]
fn analyze_nonexistent_input() {
    let dir = TempDir::new().unwrap();

    palace()
        .current_dir(dir.path())
        .env("HOME", dir.path())
        .arg("analyze")
        .arg("--input")
        .arg("no_such_file.txt")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error"))
        .stderr(predicate::str::contains("failed to read"));
}

#[tokio::test(flavor = "multi_thread")]
async fn analyze_short_input_never_reaches_a_backend() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(chat_reply(PAYLOAD))
        .expect(0)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), &server.uri());
    let input = dir.path().join("empty.txt");
    std::fs::write(&input, "   \n  ").unwrap();

    let mut cmd = palace();
    cmd.current_dir(dir.path())
        .arg("analyze")
        .arg("--config")
        .arg(&config)
        .arg("--input")
        .arg(&input);
    let output = run(cmd).await;

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("source text is empty or too short"), "{stderr}");
    assert!(!dir.path().join("store").exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn analyze_falls_back_and_stores_record() {
    let server = MockServer::start().await;
    mount_backends(&server).await;

    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), &server.uri());
    let input = dir.path().join("geography.txt");
    std::fs::write(&input, SOURCE).unwrap();

    let mut cmd = palace();
    cmd.current_dir(dir.path())
        .arg("analyze")
        .arg("--config")
        .arg(&config)
        .arg("--input")
        .arg(&input)
        .arg("--json");
    let output = run(cmd).await;
    assert!(
        output.status.success(),
        "{}",
        String::from_utf8_lossy(&output.stderr)
    );

    let record: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(record["title"], "geography");
    assert_eq!(record["sourceText"], SOURCE);

    let analysis = &record["analysis"];
    assert_eq!(analysis["quiz"].as_array().unwrap().len(), 1);
    assert_eq!(analysis["quiz"][0]["correctAnswer"], "Rome");
    assert_eq!(analysis["numericals"][0]["problems"][0]["correctAnswer"], "5 m/s");
    assert_eq!(
        analysis["formulas"][0]["description"],
        r"average speed as \frac{d}{t}"
    );

    // The record is readable back through `show` and `list`.
    let id = record["id"].as_str().unwrap().to_string();
    let mut cmd = palace();
    cmd.current_dir(dir.path())
        .arg("show")
        .arg("--config")
        .arg(&config)
        .arg("--id")
        .arg(&id);
    let shown = run(cmd).await;
    assert!(shown.status.success());
    let shown: Value = serde_json::from_slice(&shown.stdout).unwrap();
    assert_eq!(shown, record);

    let mut cmd = palace();
    cmd.current_dir(dir.path())
        .arg("list")
        .arg("--config")
        .arg(&config);
    let listed = run(cmd).await;
    assert!(String::from_utf8_lossy(&listed.stdout).contains("geography"));
}

#[tokio::test(flavor = "multi_thread")]
async fn regenerate_quiz_for_stored_record() {
    let server = MockServer::start().await;
    mount_backends(&server).await;

    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), &server.uri());
    let input = dir.path().join("geography.txt");
    std::fs::write(&input, SOURCE).unwrap();

    let mut cmd = palace();
    cmd.current_dir(dir.path())
        .args(["analyze", "--json", "--config"])
        .arg(&config)
        .arg("--input")
        .arg(&input);
    let output = run(cmd).await;
    let record: Value = serde_json::from_slice(&output.stdout).unwrap();
    let id = record["id"].as_str().unwrap().to_string();

    let mut cmd = palace();
    cmd.current_dir(dir.path())
        .arg("regenerate-quiz")
        .arg("--config")
        .arg(&config)
        .arg("--id")
        .arg(&id);
    let output = run(cmd).await;
    assert!(
        output.status.success(),
        "{}",
        String::from_utf8_lossy(&output.stderr)
    );

    let quiz: Value = serde_json::from_slice(&output.stdout).unwrap();
    let quiz = quiz.as_array().unwrap();
    assert_eq!(quiz.len(), 2);
    assert_eq!(quiz[0]["correctAnswer"], "Paris");
    assert_eq!(quiz[1]["correctAnswer"], "m/s");
}

#[tokio::test(flavor = "multi_thread")]
async fn ingest_reports_per_file_outcomes() {
    let server = MockServer::start().await;
    mount_backends(&server).await;

    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), &server.uri());
    let docs = dir.path().join("docs");
    std::fs::create_dir(&docs).unwrap();
    std::fs::write(docs.join("capitals.txt"), SOURCE).unwrap();
    std::fs::write(docs.join("speed.txt"), SOURCE).unwrap();
    std::fs::write(docs.join("blank.txt"), "").unwrap();
    std::fs::write(docs.join("ignored.md"), SOURCE).unwrap();

    let mut cmd = palace();
    cmd.current_dir(dir.path())
        .arg("ingest")
        .arg("--config")
        .arg(&config)
        .arg("--dir")
        .arg(&docs);
    let output = run(cmd).await;

    // One blank file fails the run, the others are still stored.
    assert!(!output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("capitals.txt"));
    assert!(stdout.contains("speed.txt"));
    assert!(stdout.contains("blank.txt"));
    assert!(!stdout.contains("ignored.md"));
    assert!(String::from_utf8_lossy(&output.stderr).contains("1 of 3 files failed"));

    let stored = std::fs::read_dir(dir.path().join("store")).unwrap().count();
    assert_eq!(stored, 2);
}

#[test]
fn show_unknown_record_fails() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), "http://127.0.0.1:9");

    palace()
        .current_dir(dir.path())
        .arg("show")
        .arg("--config")
        .arg(&config)
        .arg("--id")
        .arg("00000000-0000-4000-8000-000000000000")
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}
