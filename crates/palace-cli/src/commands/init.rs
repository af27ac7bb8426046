//! The `palace init` command.

use anyhow::Result;

pub fn execute() -> Result<()> {
    if std::path::Path::new("palace.toml").exists() {
        println!("palace.toml already exists, skipping.");
    } else {
        std::fs::write("palace.toml", SAMPLE_CONFIG)?;
        println!("Created palace.toml");
    }

    println!("\nNext steps:");
    println!("  1. Set PALACE_GEMINI_KEY (or edit the api_key entries in palace.toml)");
    println!("  2. Run: palace backends");
    println!("  3. Run: palace analyze --input notes.txt");

    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# palace configuration

attempt_timeout_secs = 60
max_retries = 2
retry_delay_ms = 1000
parallelism = 4
store_dir = "./palace-data"

# Backends are tried in order (or by explicit `priority`, lowest first).

[[backends]]
name = "gemini-flash-lite"
type = "gemini"
model = "gemini-2.5-flash-lite"
api_key = "${GEMINI_API_KEY}"

[[backends]]
name = "gemini-flash"
type = "gemini"
model = "gemini-2.5-flash"
api_key = "${GEMINI_API_KEY}"

[[backends]]
name = "local"
type = "ollama"
model = "llama3.1:8b"
base_url = "http://localhost:11434"
"#;
