//! JSON shapes exchanged with the extraction and citation steps.
//!
//! Proposition documents are kept as `serde_json::Value` so fields this crate
//! does not know about survive a round trip untouched.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::semantic::Match;

/// Field added to every matched proposition.
pub const MATCHES_FIELD: &str = "closest_database_matches";

const PROPOSITIONS_FIELD: &str = "propositions";
const TEXT_FIELDS: [&str; 3] = ["cleanText", "Text", "text"];
const NON_TEXT_FIELDS: [&str; 2] = ["id", "sourceText"];

#[derive(Debug, thiserror::Error)]
pub enum PropositionError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("expected a document with propositions, a list of documents or a list of propositions")]
    UnsupportedShape,
}

/// Normalize any accepted input shape into a list of documents.
///
/// - `{ "propositions": [...] }` becomes a one-element list
/// - a list whose first element has `propositions` is taken as is
/// - any other list of objects is wrapped as a single `doc_1` document
pub fn into_documents(data: Value) -> Result<Vec<Value>, PropositionError> {
    match data {
        Value::Object(map) if map.contains_key(PROPOSITIONS_FIELD) => Ok(vec![Value::Object(map)]),
        Value::Array(items) => {
            let is_documents = items
                .first()
                .and_then(Value::as_object)
                .is_some_and(|first| first.contains_key(PROPOSITIONS_FIELD));

            if is_documents {
                Ok(items)
            } else if items.iter().all(Value::is_object) {
                let mut document = Map::new();
                document.insert("documentId".to_string(), Value::from("doc_1"));
                document.insert(PROPOSITIONS_FIELD.to_string(), Value::Array(items));
                Ok(vec![Value::Object(document)])
            } else {
                Err(PropositionError::UnsupportedShape)
            }
        }
        _ => Err(PropositionError::UnsupportedShape),
    }
}

/// Pick the text to embed for one proposition.
///
/// Known text fields win in order; otherwise the first string field that is
/// not an identifier or the raw source sentence.
pub fn proposition_text(proposition: &Map<String, Value>) -> Option<&str> {
    TEXT_FIELDS
        .iter()
        .find_map(|field| proposition.get(*field).and_then(Value::as_str))
        .or_else(|| {
            proposition
                .iter()
                .filter(|(key, _)| !NON_TEXT_FIELDS.contains(&key.as_str()))
                .find_map(|(_, value)| value.as_str())
        })
        .map(str::trim)
        .filter(|text| !text.is_empty())
}

/// Counters for one annotation run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct AnnotateStats {
    pub documents: usize,
    pub propositions: usize,
    pub matched: usize,
    pub skipped_no_text: usize,
}

/// Walk every proposition of every document, calling `find` with its text
/// and storing the result under [`MATCHES_FIELD`].
///
/// Stops at the first error returned by `find`.
pub fn annotate_documents<F, E>(
    documents: &mut [Value],
    mut find: F,
) -> Result<AnnotateStats, E>
where
    F: FnMut(&str) -> Result<Vec<Match>, E>,
{
    let mut stats = AnnotateStats {
        documents: documents.len(),
        ..Default::default()
    };

    for (doc_idx, document) in documents.iter_mut().enumerate() {
        let Some(propositions) = document
            .get_mut(PROPOSITIONS_FIELD)
            .and_then(Value::as_array_mut)
        else {
            continue;
        };

        for (prop_idx, proposition) in propositions.iter_mut().enumerate() {
            let Some(proposition) = proposition.as_object_mut() else {
                continue;
            };
            stats.propositions += 1;

            let Some(text) = proposition_text(proposition).map(str::to_string) else {
                log::warn!(
                    "Document {doc_idx} proposition {prop_idx} has no text field (keys: {:?})",
                    proposition.keys().collect::<Vec<_>>()
                );
                stats.skipped_no_text += 1;
                continue;
            };

            let matches = find(&text)?;
            proposition.insert(MATCHES_FIELD.to_string(), matches_to_value(&matches));
            stats.matched += 1;
        }
    }

    Ok(stats)
}

fn matches_to_value(matches: &[Match]) -> Value {
    // Match only holds strings and a finite f32, serialization cannot fail.
    serde_json::to_value(matches).unwrap_or(Value::Array(vec![]))
}

/// An extracted claim awaiting comparison.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Claim {
    #[serde(rename = "sourceText", default)]
    pub source_text: String,
}

/// A claim together with its closest reference propositions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimMatches {
    pub claim: String,
    pub matches: Vec<Match>,
}

/// Parse a claims file, tolerating a Markdown code fence around the JSON.
pub fn parse_claims(raw: &str) -> Result<Vec<Claim>, PropositionError> {
    Ok(serde_json::from_str(strip_code_fence(raw))?)
}

/// Parse the output of a `claims` run, fenced or not.
pub fn parse_claim_matches(raw: &str) -> Result<Vec<ClaimMatches>, PropositionError> {
    Ok(serde_json::from_str(strip_code_fence(raw))?)
}

/// Remove a surrounding ```` ```json ```` fence left behind by an LLM.
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    body.trim_end().trim_end_matches("```").trim()
}
