//! Response parser.
//!
//! Converts a provider's free-form answer into a structured prediction.
//! Extraction is an ordered list of pure strategies tried until one yields
//! fields containing a winner; validation then pins the winner to one of
//! the two team names and clamps confidence into [0.5, 1.0].

use serde_json::Value;

use crate::types::PredictError;

// ---------------------------------------------------------------------------
// Output types
// ---------------------------------------------------------------------------

/// A validated prediction extracted from raw response text.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedPrediction {
    /// Canonical team name (exactly one of the two supplied).
    pub winner: String,
    /// Clamped into [0.5, 1.0].
    pub confidence: f64,
    pub reasoning: String,
}

/// Fields pulled out of the raw text, prior to validation.
/// `winner` and `confidence` stay as JSON values so that validation can
/// report exactly what the model produced.
#[derive(Debug, Clone)]
pub struct RawFields {
    pub winner: Value,
    pub confidence: Value,
    pub reasoning: Option<String>,
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Parse a model's response text into a structured prediction.
///
/// Tries whole-text JSON, fenced code blocks (with repair for truncated
/// output), embedded objects, and loose field extraction, in that order.
pub fn parse_prediction(
    raw: &str,
    team_a: &str,
    team_b: &str,
) -> Result<ParsedPrediction, PredictError> {
    let fields = extract_raw_fields(raw)
        .ok_or_else(|| PredictError::Parse("no structured prediction found".to_string()))?;

    let winner = validate_winner(&fields.winner, team_a, team_b)?;
    let confidence = clamp_confidence(&fields.confidence)?;

    Ok(ParsedPrediction {
        winner,
        confidence,
        reasoning: fields.reasoning.unwrap_or_default(),
    })
}

/// An extraction strategy: pure text in, candidate fields out.
type Extractor = fn(&str) -> Option<RawFields>;

/// Strategies in priority order. First success wins.
const EXTRACTORS: &[Extractor] = &[
    parse_whole_json,
    parse_fenced_block,
    parse_embedded_object,
    parse_field_triple,
    parse_loose_fields,
];

/// Run the extraction cascade without validation.
pub fn extract_raw_fields(text: &str) -> Option<RawFields> {
    EXTRACTORS.iter().find_map(|extract| extract(text))
}

// ---------------------------------------------------------------------------
// Extraction strategies
// ---------------------------------------------------------------------------

/// Strategy 1: the whole response is a JSON object.
fn parse_whole_json(text: &str) -> Option<RawFields> {
    let value: Value = serde_json::from_str(text.trim()).ok()?;
    fields_from_object(&value)
}

/// Strategy 2: a fenced code block, complete or truncated.
/// A block that fails to parse as JSON is repaired by pulling the fields
/// straight out of the (possibly cut off) block text.
fn parse_fenced_block(text: &str) -> Option<RawFields> {
    let block = fenced_block(text)?;
    if let Ok(value) = serde_json::from_str::<Value>(block.trim()) {
        if let Some(fields) = fields_from_object(&value) {
            return Some(fields);
        }
    }
    extract_fields(block, false)
}

/// Strategy 3: the smallest flat brace-delimited object containing a
/// `"winner"` key, anywhere in the text.
fn parse_embedded_object(text: &str) -> Option<RawFields> {
    let winner_pos = text.find("\"winner\"")?;
    let start = text[..winner_pos].rfind('{')?;

    // Flat object only: no other braces between the delimiters.
    let before = &text[start + 1..winner_pos];
    if before.contains('{') || before.contains('}') {
        return None;
    }
    let end = winner_pos + text[winner_pos..].find('}')?;
    if text[winner_pos..end].contains('{') {
        return None;
    }

    let value: Value = serde_json::from_str(&text[start..=end]).ok()?;
    fields_from_object(&value)
}

/// Strategy 4: a full winner/confidence/reasoning triple, all present.
fn parse_field_triple(text: &str) -> Option<RawFields> {
    extract_fields(text, true)
}

/// Strategy 5: winner and confidence independently; reasoning optional.
fn parse_loose_fields(text: &str) -> Option<RawFields> {
    extract_fields(text, false)
}

// ---------------------------------------------------------------------------
// Extraction helpers
// ---------------------------------------------------------------------------

/// Fields from an already-parsed JSON object. Succeeds only if the object
/// carries a `winner` key.
fn fields_from_object(value: &Value) -> Option<RawFields> {
    let obj = value.as_object()?;
    let winner = obj.get("winner")?.clone();
    let confidence = obj.get("confidence").cloned().unwrap_or(Value::Null);
    let reasoning = obj
        .get("reasoning")
        .and_then(|r| r.as_str())
        .map(String::from);
    Some(RawFields {
        winner,
        confidence,
        reasoning,
    })
}

/// The contents of the first ``` fence, up to the closing fence or the end
/// of the text (models routinely truncate the closing fence).
fn fenced_block(text: &str) -> Option<&str> {
    let start = text.find("```")?;
    let mut rest = &text[start + 3..];

    // Skip a bare or `json` language tag on the fence line.
    if let Some(newline) = rest.find('\n') {
        let tag = rest[..newline].trim();
        if tag.is_empty() || tag.eq_ignore_ascii_case("json") {
            rest = &rest[newline + 1..];
        }
    }

    Some(match rest.find("```") {
        Some(end) => &rest[..end],
        None => rest,
    })
}

/// Pull `"winner"` / `"confidence"` / `"reasoning"` fields out of arbitrary
/// (possibly truncated) text.
fn extract_fields(text: &str, require_reasoning: bool) -> Option<RawFields> {
    let winner = extract_string_field(text, "winner")?;
    let confidence = extract_number_field(text, "confidence")?;
    let reasoning = extract_string_field(text, "reasoning");
    if require_reasoning && reasoning.is_none() {
        return None;
    }
    Some(RawFields {
        winner: Value::String(winner),
        confidence: Value::from(confidence),
        reasoning,
    })
}

/// Extract a quoted string value after `"name":`, unescaping the common
/// sequences. A value whose closing quote was truncated is kept as-is.
fn extract_string_field(text: &str, name: &str) -> Option<String> {
    let needle = format!("\"{name}\"");
    let pos = text.find(&needle)?;
    let after = text[pos + needle.len()..].trim_start();
    let after = after.strip_prefix(':')?.trim_start();
    let after = after.strip_prefix('"')?;

    let mut out = String::new();
    let mut chars = after.chars();
    while let Some(c) = chars.next() {
        match c {
            '"' => return Some(out).filter(|s| !s.is_empty()),
            '\\' => match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some(other) => out.push(other),
                None => break,
            },
            other => out.push(other),
        }
    }
    Some(out).filter(|s| !s.is_empty())
}

/// Extract a bare numeric value after `"name":`.
fn extract_number_field(text: &str, name: &str) -> Option<f64> {
    let needle = format!("\"{name}\"");
    let pos = text.find(&needle)?;
    let after = text[pos + needle.len()..].trim_start();
    let after = after.strip_prefix(':')?.trim_start();

    let digits: String = after
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    digits.trim_end_matches('.').parse::<f64>().ok()
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Pin a claimed winner to one of the two team names.
///
/// Accepts an exact case-insensitive match, then a substring match in
/// either direction (handles partial naming like "Pak" for "Pakistan").
pub fn validate_winner(
    value: &Value,
    team_a: &str,
    team_b: &str,
) -> Result<String, PredictError> {
    let raw = value
        .as_str()
        .ok_or_else(|| PredictError::Parse(format!("invalid winner value: {value}")))?;

    let normalized = raw.trim().to_lowercase();
    let a = team_a.to_lowercase();
    let b = team_b.to_lowercase();

    if normalized == a {
        return Ok(team_a.to_string());
    }
    if normalized == b {
        return Ok(team_b.to_string());
    }

    if !normalized.is_empty() {
        if a.contains(&normalized) || normalized.contains(&a) {
            return Ok(team_a.to_string());
        }
        if b.contains(&normalized) || normalized.contains(&b) {
            return Ok(team_b.to_string());
        }
    }

    Err(PredictError::Parse(format!(
        "winner \"{raw}\" does not match either team: \"{team_a}\" or \"{team_b}\""
    )))
}

/// Coerce a claimed confidence to a number and clamp it into [0.5, 1.0].
///
/// Values below 0.5 or above 1.0 are clamped, not rejected: a stated
/// favorite is never allowed to imply a coin flip or worse, and no model
/// gets to claim more than certainty. Anything non-numeric raises.
pub fn clamp_confidence(value: &Value) -> Result<f64, PredictError> {
    let num = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    match num {
        Some(n) if n.is_finite() => Ok(n.clamp(0.5, 1.0)),
        _ => Err(PredictError::Parse(format!(
            "invalid confidence value: {value}"
        ))),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // -- Full cascade ------------------------------------------------------

    #[test]
    fn test_parse_clean_json() {
        let raw = r#"{ "winner": "India", "confidence": 0.72, "reasoning": "Better spin attack." }"#;
        let p = parse_prediction(raw, "India", "Pakistan").unwrap();
        assert_eq!(p.winner, "India");
        assert!((p.confidence - 0.72).abs() < 1e-10);
        assert_eq!(p.reasoning, "Better spin attack.");
    }

    #[test]
    fn test_parse_fenced_code_block() {
        let raw = "Here is my pick:\n```json\n{ \"winner\": \"Pakistan\", \"confidence\": 0.61, \"reasoning\": \"Pace advantage.\" }\n```\nGood luck!";
        let p = parse_prediction(raw, "India", "Pakistan").unwrap();
        assert_eq!(p.winner, "Pakistan");
        assert!((p.confidence - 0.61).abs() < 1e-10);
    }

    #[test]
    fn test_parse_untagged_fence() {
        let raw = "```\n{ \"winner\": \"India\", \"confidence\": 0.8, \"reasoning\": \"Form.\" }\n```";
        let p = parse_prediction(raw, "India", "Pakistan").unwrap();
        assert_eq!(p.winner, "India");
    }

    #[test]
    fn test_parse_truncated_code_block_repair() {
        // Closing brace and fence never arrived; repair pulls fields out.
        let raw = "```json\n{ \"winner\": \"India\", \"confidence\": 0.68, \"reasoning\": \"Top order depth and";
        let p = parse_prediction(raw, "India", "Pakistan").unwrap();
        assert_eq!(p.winner, "India");
        assert!((p.confidence - 0.68).abs() < 1e-10);
        assert!(p.reasoning.starts_with("Top order depth"));
    }

    #[test]
    fn test_parse_embedded_object() {
        let raw = "After weighing the factors, my answer is {\"winner\": \"Pakistan\", \"confidence\": 0.55} based on conditions.";
        let p = parse_prediction(raw, "India", "Pakistan").unwrap();
        assert_eq!(p.winner, "Pakistan");
        assert!((p.confidence - 0.55).abs() < 1e-10);
    }

    #[test]
    fn test_parse_loose_fields_without_reasoning() {
        let raw = "I'll go with \"winner\": \"India\" and \"confidence\": 0.7 here.";
        let p = parse_prediction(raw, "India", "Pakistan").unwrap();
        assert_eq!(p.winner, "India");
        assert_eq!(p.reasoning, "");
    }

    #[test]
    fn test_parse_escaped_reasoning() {
        let raw = r#"{ "winner": "India", "confidence": 0.66, "reasoning": "They \"own\" this venue.\nHistory says so." }"#;
        let p = parse_prediction(raw, "India", "Pakistan").unwrap();
        assert_eq!(p.reasoning, "They \"own\" this venue.\nHistory says so.");
    }

    #[test]
    fn test_parse_prose_only_fails() {
        let raw = "I think India will probably win this one, maybe 70% sure.";
        let err = parse_prediction(raw, "India", "Pakistan").unwrap_err();
        assert!(format!("{err}").contains("no structured prediction found"));
    }

    #[test]
    fn test_parse_json_without_winner_falls_through() {
        // A valid JSON object with no winner key must not satisfy the
        // cascade on its own.
        let raw = r#"{ "pick": "India", "confidence": 0.7 }"#;
        assert!(parse_prediction(raw, "India", "Pakistan").is_err());
    }

    #[test]
    fn test_parse_missing_confidence_fails() {
        let raw = r#"{ "winner": "India", "reasoning": "gut feel" }"#;
        let err = parse_prediction(raw, "India", "Pakistan").unwrap_err();
        assert!(format!("{err}").contains("confidence"));
    }

    #[test]
    fn test_parse_non_string_winner_fails() {
        let raw = r#"{ "winner": 1, "confidence": 0.7 }"#;
        let err = parse_prediction(raw, "India", "Pakistan").unwrap_err();
        assert!(format!("{err}").contains("invalid winner"));
    }

    #[test]
    fn test_first_strategy_wins() {
        // Whole-text JSON takes priority over an embedded fragment in the
        // reasoning.
        let raw = r#"{ "winner": "India", "confidence": 0.9, "reasoning": "ignore {\"winner\": \"Pakistan\"}" }"#;
        let p = parse_prediction(raw, "India", "Pakistan").unwrap();
        assert_eq!(p.winner, "India");
    }

    // -- Winner validation -------------------------------------------------

    #[test]
    fn test_validate_winner_case_insensitive() {
        let v = json!("india");
        assert_eq!(validate_winner(&v, "India", "USA").unwrap(), "India");
    }

    #[test]
    fn test_validate_winner_partial() {
        let v = json!("Pak");
        assert_eq!(validate_winner(&v, "Pakistan", "Netherlands").unwrap(), "Pakistan");
    }

    #[test]
    fn test_validate_winner_superstring() {
        let v = json!("Team India");
        assert_eq!(validate_winner(&v, "India", "USA").unwrap(), "India");
    }

    #[test]
    fn test_validate_winner_whitespace() {
        let v = json!("  USA  ");
        assert_eq!(validate_winner(&v, "India", "USA").unwrap(), "USA");
    }

    #[test]
    fn test_validate_winner_unknown_team_fails() {
        let v = json!("Australia");
        assert!(validate_winner(&v, "India", "USA").is_err());
    }

    #[test]
    fn test_validate_winner_empty_fails() {
        let v = json!("");
        assert!(validate_winner(&v, "India", "USA").is_err());
    }

    // -- Confidence clamping -----------------------------------------------

    #[test]
    fn test_clamp_confidence_in_range() {
        assert!((clamp_confidence(&json!(0.75)).unwrap() - 0.75).abs() < 1e-10);
    }

    #[test]
    fn test_clamp_confidence_low() {
        assert!((clamp_confidence(&json!(0.3)).unwrap() - 0.5).abs() < 1e-10);
    }

    #[test]
    fn test_clamp_confidence_high() {
        assert!((clamp_confidence(&json!(1.5)).unwrap() - 1.0).abs() < 1e-10);
    }

    #[test]
    fn test_clamp_confidence_boundaries() {
        assert!((clamp_confidence(&json!(0.5)).unwrap() - 0.5).abs() < 1e-10);
        assert!((clamp_confidence(&json!(1.0)).unwrap() - 1.0).abs() < 1e-10);
    }

    #[test]
    fn test_clamp_confidence_numeric_string() {
        assert!((clamp_confidence(&json!("0.85")).unwrap() - 0.85).abs() < 1e-10);
    }

    #[test]
    fn test_clamp_confidence_garbage_fails() {
        assert!(clamp_confidence(&json!("abc")).is_err());
        assert!(clamp_confidence(&json!(null)).is_err());
        assert!(clamp_confidence(&json!([0.7])).is_err());
    }

    // -- Extraction helpers ------------------------------------------------

    #[test]
    fn test_fenced_block_with_closing_fence() {
        let text = "before\n```json\n{\"a\": 1}\n```\nafter";
        assert_eq!(fenced_block(text).unwrap().trim(), "{\"a\": 1}");
    }

    #[test]
    fn test_fenced_block_truncated() {
        let text = "```json\n{\"winner\": \"India\"";
        assert_eq!(fenced_block(text).unwrap(), "{\"winner\": \"India\"");
    }

    #[test]
    fn test_extract_string_field() {
        assert_eq!(
            extract_string_field("\"winner\" : \"India\"", "winner").as_deref(),
            Some("India")
        );
        assert_eq!(extract_string_field("no fields here", "winner"), None);
        assert_eq!(extract_string_field("\"winner\": \"\"", "winner"), None);
    }

    #[test]
    fn test_extract_number_field() {
        assert_eq!(
            extract_number_field("\"confidence\": 0.75,", "confidence"),
            Some(0.75)
        );
        assert_eq!(extract_number_field("\"confidence\": high", "confidence"), None);
        assert_eq!(extract_number_field("nothing", "confidence"), None);
    }

    #[test]
    fn test_embedded_object_skips_nested() {
        // The candidate span contains a nested brace: not a flat object.
        let raw = "{\"outer\": {\"winner\": \"India\", \"inner\": {\"x\": 1}, \"confidence\": 0.7}}";
        assert!(parse_embedded_object(raw).is_none());
    }
}
