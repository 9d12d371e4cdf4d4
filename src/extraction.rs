//! Best-effort parsing of structured data out of free-form model output.
//!
//! The text generator is not guaranteed to return valid JSON, so nothing in
//! here ever fails: anything that cannot be parsed becomes an empty object.

use serde_json::{Map, Value};
use tracing::debug;

use crate::selections::SelectionSet;

/// Directives that hand the remaining choices over to the director. A clause
/// must open or close with one of these to count.
const AUTO_FILL_DIRECTIVES: &[&str] = &[
    "let jhonny decide",
    "let johnny decide",
    "let the director decide",
    "let the system decide",
    "jhonny decides",
    "surprise me",
    "dealer's choice",
    "auto everything",
    "auto for the rest",
    "auto for everything",
    "you decide the rest",
    "you choose the rest",
    "you pick the rest",
    "the rest is up to you",
    "decide the rest",
    "fill in the rest",
];

const NEGATIONS: &[&str] = &["not", "don't", "dont", "do not", "never", "no", "won't", "shouldn't"];

/// What one extraction pass produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    pub selections: SelectionSet,
    /// The extractor flagged the auto-fill directive.
    pub auto_fill: bool,
}

/// Returns the first JSON object found in `text`, or an empty object.
///
/// A fenced ```json block wins if present; otherwise the balanced `{...}`
/// spans are tried in order of their opening brace and the first one that
/// parses as an object is returned.
pub fn extract_json(text: &str) -> Value {
    if let Some(value) = fenced_json(text) {
        return value;
    }

    let chars: Vec<char> = text.chars().collect();
    for (start, end) in balanced_spans(&chars) {
        let candidate: String = chars[start..=end].iter().collect();
        if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(&candidate) {
            return value;
        }
    }

    debug!("No JSON object found in model output ({} chars)", text.len());
    Value::Object(Map::new())
}

fn fenced_json(text: &str) -> Option<Value> {
    let start = text.find("```json")? + "```json".len();
    let end = text[start..].find("```")?;
    match serde_json::from_str::<Value>(text[start..start + end].trim()) {
        Ok(value @ Value::Object(_)) => Some(value),
        _ => None,
    }
}

/// Every matched `{`/`}` pair, sorted by the opening index, found in one scan.
/// Quotes only open a string inside an object, so prose around the JSON
/// cannot hide its braces. Unmatched braces are ignored.
fn balanced_spans(chars: &[char]) -> Vec<(usize, usize)> {
    let mut open = Vec::new();
    let mut spans = Vec::new();
    let mut in_string = false;
    let mut escape_next = false;

    for (i, &ch) in chars.iter().enumerate() {
        if escape_next {
            escape_next = false;
            continue;
        }
        if in_string {
            match ch {
                '\\' => escape_next = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' if !open.is_empty() => in_string = true,
            '{' => open.push(i),
            '}' => {
                if let Some(start) = open.pop() {
                    spans.push((start, i));
                }
            }
            _ => {}
        }
    }

    spans.sort_unstable_by_key(|&(start, _)| start);
    spans
}

/// Reads `updated_selections` and the optional `auto_fill` flag from an extractor reply.
pub fn parse_extraction(text: &str) -> Extraction {
    let value = extract_json(text);
    let selections = value
        .get("updated_selections")
        .map(SelectionSet::from_json_object)
        .unwrap_or_default();
    let auto_fill = value
        .get("auto_fill")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    Extraction {
        selections,
        auto_fill,
    }
}

/// Whether the user is asking the director to choose everything still open.
///
/// The message is split into clauses at punctuation. A clause counts when it
/// starts or ends with one of the directives and no negation precedes the
/// directive, so "the rest is up to you" matches but "it's not up to you" or
/// "before you decide anything" do not.
pub fn detects_auto_fill(message: &str) -> bool {
    clauses(message).iter().any(|clause| is_directive(clause))
}

fn clauses(message: &str) -> Vec<String> {
    let normalized: String = message
        .to_lowercase()
        .chars()
        .map(|c| match c {
            '\u{2019}' => '\'',
            '.' | ',' | '!' | '?' | ';' | ':' | '\n' => '|',
            c if c.is_alphanumeric() || c == '\'' => c,
            _ => ' ',
        })
        .collect();
    normalized
        .split('|')
        .map(|clause| clause.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|clause| !clause.is_empty())
        .collect()
}

fn is_directive(clause: &str) -> bool {
    let clause = clause.strip_suffix(" please").unwrap_or(clause);
    let clause = clause.strip_prefix("please ").unwrap_or(clause);
    AUTO_FILL_DIRECTIVES.iter().any(|&directive| {
        let opens = clause
            .strip_prefix(directive)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with(' '));
        let prefix = if opens {
            ""
        } else if let Some(prefix) = clause.strip_suffix(directive) {
            if !prefix.ends_with(' ') {
                return false;
            }
            prefix
        } else {
            return false;
        };
        let words: Vec<&str> = prefix.split_whitespace().collect();
        let negated = NEGATIONS.iter().any(|negation| {
            let negation: Vec<&str> = negation.split(' ').collect();
            words.windows(negation.len()).any(|w| w == negation.as_slice())
        });
        !negated
    })
}
