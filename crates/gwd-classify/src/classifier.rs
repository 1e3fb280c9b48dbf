use std::sync::LazyLock;

use gwd_core::{Category, Complexity};
use regex::Regex;
use sha2::{Digest, Sha256};

/// Stable 64-bit hash over a normalized command, used as the history-lookup
/// key. "Normalized" means lowercased, whitespace-collapsed, flag values
/// stripped (so `-p "foo"` and `-p "bar"` hash identically — only the shape
/// of the invocation matters for history lookup, not the payload).
pub type Fingerprint = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub category: Category,
    pub complexity: Complexity,
    pub name_hash: Fingerprint,
}

static TRIVIAL_COMMAND: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(echo|ls|pwd|cat|true|false)\b").unwrap());

static PROMPT_FLAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?:-p|--prompt)\s+"([^"]*)"|(?:-p|--prompt)\s+'([^']*)'"#).unwrap());

static LLM_TOOL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(claude|anthropic|gpt)\b").unwrap());

static FILE_PATH: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?:\.\.?/|/)?[\w.-]+\.\w{1,5}\b").unwrap());

const CODE_KEYWORDS: &[&str] = &["write", "create", "implement", "function", "class"];
const DATA_KEYWORDS: &[&str] = &["analyze", "compare", "summarize", "list"];
const LONG_FORM_KEYWORDS: &[&str] = &["story", "essay", "chapter"];
const DATA_PROCESSING_TOOLS: &[&str] = &[
    "jq", "awk", "sed", "grep", "sort", "cut", "csvtool", "python", "python3", "pandas",
];

/// Classify a raw command string per spec §4.3's ordered rule table: first
/// match wins.
pub fn classify(command: &str) -> Classification {
    let name_hash = fingerprint(command);

    if TRIVIAL_COMMAND.is_match(command) {
        return Classification {
            category: Category::General,
            complexity: Complexity::Trivial,
            name_hash,
        };
    }

    if LLM_TOOL.is_match(command) {
        let prompt = extract_prompt(command).unwrap_or_else(|| command.to_string());
        let (category, complexity) = classify_prompt(&prompt);
        return Classification {
            category,
            complexity,
            name_hash,
        };
    }

    if FILE_PATH.is_match(command)
        && DATA_PROCESSING_TOOLS
            .iter()
            .any(|tool| word_present(command, tool))
    {
        return Classification {
            category: Category::File,
            complexity: Complexity::Low,
            name_hash,
        };
    }

    Classification {
        category: Category::Unknown,
        complexity: Complexity::Medium,
        name_hash,
    }
}

/// Whether `command` invokes an LLM-class CLI (`claude`, `anthropic`, `gpt`).
/// Used by the timeout estimator to pick the stall-timeout floor (spec
/// §4.4: 30s for these, 5s for plain shell commands).
pub fn is_llm_command(command: &str) -> bool {
    LLM_TOOL.is_match(command)
}

fn extract_prompt(command: &str) -> Option<String> {
    let caps = PROMPT_FLAG.captures(command)?;
    caps.get(1)
        .or_else(|| caps.get(2))
        .map(|m| m.as_str().to_string())
}

fn classify_prompt(prompt: &str) -> (Category, Complexity) {
    let lower = prompt.to_lowercase();

    if is_arithmetic_prompt(prompt) {
        return (Category::Calculation, Complexity::Trivial);
    }

    let code_hits = CODE_KEYWORDS.iter().filter(|k| lower.contains(*k)).count();
    if code_hits > 0 {
        let complexity = if code_hits >= 2 && prompt.len() > 200 {
            Complexity::High
        } else {
            Complexity::Medium
        };
        return (Category::Code, complexity);
    }

    if DATA_KEYWORDS.iter().any(|k| lower.contains(k)) {
        return (Category::Data, Complexity::Medium);
    }

    if LONG_FORM_KEYWORDS.iter().any(|k| lower.contains(k))
        || lower.contains("5000 words")
        || extract_word_count(&lower).is_some_and(|n| n >= 1000)
    {
        return (Category::General, Complexity::Extreme);
    }

    (Category::General, Complexity::Low)
}

/// A prompt counts as "arithmetic" when it is short, mentions a number, and
/// contains an arithmetic operator — e.g. `"What is 2+2? Just the number."`.
/// A literal "contains only arithmetic tokens" reading would reject that
/// exact spec example, so this takes the operator-plus-digit signal instead
/// of requiring the whole string to be numeric.
fn is_arithmetic_prompt(prompt: &str) -> bool {
    if prompt.chars().count() > 40 {
        return false;
    }
    let has_digit = prompt.chars().any(|c| c.is_ascii_digit());
    let has_operator = prompt.chars().any(|c| matches!(c, '+' | '-' | '*' | '/' | '='));
    has_digit && has_operator
}

fn extract_word_count(lower: &str) -> Option<u64> {
    static WORD_COUNT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d[\d,]*)\s*words?\b").unwrap());
    let caps = WORD_COUNT.captures(lower)?;
    caps.get(1)?.as_str().replace(',', "").parse().ok()
}

fn word_present(haystack: &str, word: &str) -> bool {
    let lower = haystack.to_lowercase();
    lower
        .split(|c: char| !c.is_alphanumeric())
        .any(|tok| tok == word)
}

/// Normalize the command (lowercase, collapse whitespace, strip flag
/// values) then hash with SHA-256, truncated to the first 8 bytes.
fn fingerprint(command: &str) -> Fingerprint {
    let normalized = normalize(command);
    let digest = Sha256::digest(normalized.as_bytes());
    u64::from_be_bytes(digest[0..8].try_into().unwrap())
}

fn normalize(command: &str) -> String {
    static FLAG_VALUE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r#"(--?[A-Za-z][\w-]*)(\s+(?:"[^"]*"|'[^']*'|\S+))?"#).unwrap());
    let stripped = FLAG_VALUE.replace_all(command, |caps: &regex::Captures| caps[1].to_string());
    let lower = stripped.to_lowercase();
    lower.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn echo_is_general_trivial() {
        let c = classify("echo Docker Test");
        assert_eq!(c.category, Category::General);
        assert_eq!(c.complexity, Complexity::Trivial);
    }

    #[test]
    fn simple_arithmetic_via_claude() {
        let c = classify(r#"claude -p "What is 2+2? Just the number.""#);
        assert_eq!(c.category, Category::Calculation);
        assert_eq!(c.complexity, Complexity::Trivial);
    }

    #[test]
    fn code_keyword_is_medium_by_default() {
        let c = classify(r#"claude -p "write a function that reverses a string""#);
        assert_eq!(c.category, Category::Code);
        assert_eq!(c.complexity, Complexity::Medium);
    }

    #[test]
    fn two_code_keywords_and_long_prompt_is_high() {
        let long_tail = "x".repeat(210);
        let prompt = format!("write and implement a class that does {long_tail}");
        let command = format!(r#"claude -p "{prompt}""#);
        let c = classify(&command);
        assert_eq!(c.category, Category::Code);
        assert_eq!(c.complexity, Complexity::High);
    }

    #[test]
    fn data_keyword_is_data_medium() {
        let c = classify(r#"claude -p "analyze this dataset and summarize trends""#);
        assert_eq!(c.category, Category::Data);
        assert_eq!(c.complexity, Complexity::Medium);
    }

    #[test]
    fn long_form_keyword_is_general_extreme() {
        let c = classify(r#"claude -p "write a short story about a dragon""#);
        assert_eq!(c.category, Category::General);
        assert_eq!(c.complexity, Complexity::Extreme);
    }

    #[test]
    fn numeric_word_count_is_general_extreme() {
        let c = classify(r#"claude -p "write an essay of 2000 words""#);
        assert_eq!(c.category, Category::General);
        assert_eq!(c.complexity, Complexity::Extreme);
    }

    #[test]
    fn plain_llm_prompt_falls_back_to_general_low() {
        let c = classify(r#"claude -p "hello there""#);
        assert_eq!(c.category, Category::General);
        assert_eq!(c.complexity, Complexity::Low);
    }

    #[test]
    fn file_with_data_tool_is_file_low() {
        let c = classify("awk '{print $1}' report.csv");
        assert_eq!(c.category, Category::File);
        assert_eq!(c.complexity, Complexity::Low);
    }

    #[test]
    fn unrecognized_command_defaults_to_unknown_medium() {
        let c = classify("some-bespoke-internal-tool --flag");
        assert_eq!(c.category, Category::Unknown);
        assert_eq!(c.complexity, Complexity::Medium);
    }

    #[test]
    fn fingerprint_is_stable_across_flag_value_changes() {
        let a = classify(r#"claude -p "one thing""#).name_hash;
        let b = classify(r#"claude -p "a totally different thing""#).name_hash;
        assert_eq!(a, b, "fingerprint should hash the invocation shape, not the payload");
    }

    #[test]
    fn fingerprint_is_case_and_whitespace_insensitive() {
        let a = classify("ECHO   hello").name_hash;
        let b = classify("echo hello").name_hash;
        assert_eq!(a, b);
    }
}
