//! Structured payload recovery from free-form backend text.
//!
//! Generative backends reliably bracket their structured output but decorate
//! it with markdown fences and prose, and mathematical notation often leaks
//! unescaped backslashes into string literals. Recovery is:
//!
//! 1. strip literal code-fence markers,
//! 2. slice from the first opening bracket to the last closing bracket,
//! 3. parse directly,
//! 4. otherwise double every backslash that does not start a valid escape
//!    and parse once more.
//!
//! The slice heuristic assumes surrounding prose has no stray brackets of
//! the same kind.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::RecoveryError;

/// Which JSON container the caller expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerKind {
    Object,
    Array,
}

impl ContainerKind {
    fn open(self) -> char {
        match self {
            ContainerKind::Object => '{',
            ContainerKind::Array => '[',
        }
    }

    fn close(self) -> char {
        match self {
            ContainerKind::Object => '}',
            ContainerKind::Array => ']',
        }
    }
}

impl fmt::Display for ContainerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContainerKind::Object => write!(f, "object"),
            ContainerKind::Array => write!(f, "array"),
        }
    }
}

/// A validated JSON value recovered from backend text.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedPayload {
    pub value: Value,
    /// Whether the backslash sanitization pass was needed.
    pub sanitized: bool,
}

/// Recover a JSON container of the expected kind from `text`.
pub fn recover(text: &str, expected: ContainerKind) -> Result<ParsedPayload, RecoveryError> {
    let cleaned = strip_code_fences(text);
    let slice = locate_payload(&cleaned, expected)
        .ok_or(RecoveryError::NoStructuredPayload { expected })?;

    // `\b` and `\f` escapes are legal JSON but in generated text they are
    // LaTeX commands (\frac, \beta) that lost their escaping.
    if !has_control_escapes(slice) {
        if let Ok(value) = serde_json::from_str::<Value>(slice) {
            return Ok(ParsedPayload {
                value,
                sanitized: false,
            });
        }
    }

    let repaired = sanitize_backslashes(slice);
    debug!(
        payload_len = slice.len(),
        "direct parse rejected, retrying with sanitized backslashes"
    );

    match serde_json::from_str::<Value>(&repaired) {
        Ok(value) => Ok(ParsedPayload {
            value,
            sanitized: true,
        }),
        Err(e) => Err(RecoveryError::UnrecoverablePayload {
            reason: e.to_string(),
            original: text.to_string(),
        }),
    }
}

/// Remove literal markdown fence markers, keeping everything else.
pub fn strip_code_fences(text: &str) -> String {
    text.replace("```json", "").replace("```", "").trim().to_string()
}

/// Slice from the first `open` to the last `close`, inclusive.
fn locate_payload(text: &str, expected: ContainerKind) -> Option<&str> {
    let start = text.find(expected.open())?;
    let end = text.rfind(expected.close())?;
    // Brackets are ASCII, so both offsets are char boundaries.
    (end > start).then(|| &text[start..=end])
}

/// Double every backslash that does not begin a valid JSON escape.
///
/// `\"`, `\\`, `\/`, `\n`, `\r`, `\t` and `\uXXXX` are kept. `\b` and `\f`
/// are treated as the start of a LaTeX command and doubled.
pub fn sanitize_backslashes(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len() + 16);
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c != '\\' {
            out.push(c);
            i += 1;
            continue;
        }

        match chars.get(i + 1) {
            Some('"' | '\\' | '/' | 'n' | 'r' | 't') => {
                out.push(c);
                out.push(chars[i + 1]);
                i += 2;
            }
            Some('u') if is_unicode_escape(&chars[i + 2..]) => {
                out.push(c);
                out.push('u');
                i += 2;
            }
            _ => {
                out.push_str("\\\\");
                i += 1;
            }
        }
    }

    out
}

fn is_unicode_escape(rest: &[char]) -> bool {
    rest.len() >= 4 && rest[..4].iter().all(|c| c.is_ascii_hexdigit())
}

/// Whether `text` contains an unescaped `\b` or `\f` sequence.
fn has_control_escapes(text: &str) -> bool {
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('b' | 'f') => return true,
                _ => continue,
            }
        }
    }
    false
}
