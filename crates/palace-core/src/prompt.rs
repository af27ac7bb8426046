//! Prompt construction for the analysis and quiz-regeneration requests.

/// Default system prompt for every backend.
pub const SYSTEM_PROMPT: &str = "You are an expert teacher. You turn study material into structured, accurate study aids. Respond ONLY with valid JSON, without markdown fences or commentary.";

/// Default number of questions requested when regenerating a quiz.
pub const DEFAULT_QUIZ_SIZE: usize = 5;

/// Prompt asking for a full analysis object.
pub fn analysis_prompt(source_text: &str, max_chars: usize) -> String {
    format!(
        r#"Analyze the following study material and return a single valid JSON object.

STRUCTURE REQUIREMENTS:
1. "summary": a clear, concise explanation of the material.
2. "patterns": key concepts or keywords, as an array of strings.
3. "formulas": key mathematical formulas, each {{ "expression": "E = mc^2", "description": "..." }}.
4. "quiz": exactly 5 conceptual multiple-choice questions.
   - Difficulty: 2 easy, 2 medium, 1 hard.
   - "correctAnswer" MUST be exactly one of the option strings, never a letter.
5. "numericals": if formulas were found, one set per formula, each with exactly
   6 numerical problems (1 easy, 4 medium, 1 hard). If there are no formulas, [].
6. "roadmap": ordered learning steps.
7. "diagram": optional Mermaid source for a concept map, or omit the field.

Escape every backslash in strings (write \\frac, not \frac).

JSON FORMAT:
{{
  "summary": "...",
  "patterns": ["concept1", "concept2"],
  "formulas": [{{ "expression": "...", "description": "..." }}],
  "quiz": [
    {{ "question": "...", "options": ["...", "...", "...", "..."], "correctAnswer": "...", "difficulty": "medium", "explanation": "..." }}
  ],
  "numericals": [
    {{ "relatedFormula": "F = m*a", "problems": [ ...same structure as quiz... ] }}
  ],
  "roadmap": [{{ "step": 1, "title": "...", "description": "..." }}],
  "diagram": "graph TD; ..."
}}

Content:
{}
"#,
        truncate_chars(source_text, max_chars)
    )
}

/// Prompt asking for an array of fresh quiz questions.
pub fn quiz_prompt(source_text: &str, max_chars: usize, count: usize) -> String {
    format!(
        r#"Generate EXACTLY {count} multiple-choice questions about the text below.

Rules:
- "correctAnswer" MUST exactly match one option string.
- No A/B/C/D letters.
- "difficulty" is one of "easy", "medium", "hard".
- Return ONLY a JSON array (no explanation, no markdown).

Format:
[
  {{
    "question": "Question text",
    "options": ["Option 1", "Option 2", "Option 3", "Option 4"],
    "correctAnswer": "Option 1",
    "difficulty": "medium",
    "explanation": "Short explanation"
  }}
]

Text:
{}
"#,
        truncate_chars(source_text, max_chars)
    )
}

/// The first `max_chars` characters of `text`.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
