use std::collections::{HashMap, HashSet};

use tracing::{debug, info, warn};

use crate::streaming::balanced_object_len;
use crate::types::{
    ArticleInput, ErrorKind, Result, SummarizerError, SummaryResultWithId,
};

pub const SUMMARY_MIN_CHARS: usize = 50;
pub const SUMMARY_MAX_CHARS: usize = 5_000;

/// Accumulated validation verdict for one result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationOutcome {
    pub is_valid: bool,
    pub errors: Vec<String>,
}

/// Structural/semantic validation of a single result against its input.
/// All rules are evaluated and accumulated; results the LLM itself marked
/// failed only report the carried failure reason.
pub fn validate_result(
    input: &ArticleInput,
    result: &SummaryResultWithId,
    valid_categories: &HashSet<String>,
) -> ValidationOutcome {
    if !result.success {
        let reason = result
            .error
            .clone()
            .unwrap_or_else(|| "upstream failure without reason".to_string());
        return ValidationOutcome {
            is_valid: false,
            errors: vec![reason],
        };
    }

    let mut errors = Vec::new();

    if result.id != input.id {
        errors.push(format!(
            "ID mismatch: expected {}, got {}",
            input.id, result.id
        ));
    }

    match result.summary.as_deref().map(str::trim) {
        None | Some("") => errors.push("summary is blank".to_string()),
        Some(summary) => {
            let len = summary.chars().count();
            if len < SUMMARY_MIN_CHARS {
                errors.push(format!("summary too short: {} chars", len));
            } else if len > SUMMARY_MAX_CHARS {
                errors.push(format!("summary too long: {} chars", len));
            }
        }
    }

    match result.categories.as_deref() {
        None | Some([]) => errors.push("categories are empty".to_string()),
        Some(categories) => {
            for category in categories {
                if !valid_categories.contains(category) {
                    errors.push(format!("invalid category: {}", category));
                }
            }
        }
    }

    if result
        .preview
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .is_none()
    {
        errors.push("preview is blank".to_string());
    }

    ValidationOutcome {
        is_valid: errors.is_empty(),
        errors,
    }
}

/// Reconciles decoded results against the original batch so that exactly one
/// outcome exists per submitted input, and recovers complete objects out of
/// truncated response text.
pub struct BatchResponseProcessor {
    valid_categories: HashSet<String>,
}

impl BatchResponseProcessor {
    pub fn new(valid_categories: &[String]) -> Self {
        Self {
            valid_categories: valid_categories.iter().cloned().collect(),
        }
    }

    /// Reconcile: one result per input, in input order.
    ///
    /// Inputs with no decoded result get a synthetic "No response received"
    /// failure; decoded results with unknown ids become "Unknown ID" failure
    /// records appended after the per-input outcomes; successful results that
    /// fail validation are downgraded to failures carrying the joined errors.
    pub fn process(
        &self,
        inputs: &[ArticleInput],
        decoded: Vec<SummaryResultWithId>,
    ) -> Vec<SummaryResultWithId> {
        let known: HashSet<&str> = inputs.iter().map(|i| i.id.as_str()).collect();
        let mut by_id: HashMap<String, SummaryResultWithId> = HashMap::new();
        let mut unknown = Vec::new();

        for result in decoded {
            if !known.contains(result.id.as_str()) {
                warn!("Response carries unknown id: {}", result.id);
                unknown.push(SummaryResultWithId::failure(
                    result.id,
                    "Unknown ID",
                    ErrorKind::ValidationError,
                ));
                continue;
            }
            if by_id.contains_key(&result.id) {
                warn!("Duplicate result for id {}, keeping the first", result.id);
                continue;
            }
            by_id.insert(result.id.clone(), result);
        }

        let mut outcomes: Vec<SummaryResultWithId> = inputs
            .iter()
            .map(|input| match by_id.remove(&input.id) {
                None => {
                    debug!("No response received for id {}", input.id);
                    SummaryResultWithId::failure(
                        &input.id,
                        "No response received",
                        ErrorKind::ApiError,
                    )
                }
                Some(result) if !result.success => {
                    let kind = result.error_type.unwrap_or(ErrorKind::ApiError);
                    let reason = result
                        .error
                        .unwrap_or_else(|| "upstream failure without reason".to_string());
                    SummaryResultWithId::failure(&input.id, reason, kind)
                }
                Some(result) => {
                    let verdict = validate_result(input, &result, &self.valid_categories);
                    if verdict.is_valid {
                        result
                    } else {
                        SummaryResultWithId::failure(
                            &input.id,
                            verdict.errors.join("; "),
                            ErrorKind::ValidationError,
                        )
                    }
                }
            })
            .collect();

        outcomes.extend(unknown);
        outcomes
    }

    /// Best-effort extraction of complete result objects from a response
    /// that was cut off mid-stream.
    ///
    /// `already_decoded` carries whatever the streaming parser managed to
    /// emit before the cut; only the remaining ids are searched for. If the
    /// combined recovery resolves less than half of the expected inputs the
    /// whole attempt is abandoned with `TruncatedResponse`.
    pub fn recover_truncated(
        &self,
        raw: &str,
        inputs: &[ArticleInput],
        already_decoded: Vec<SummaryResultWithId>,
    ) -> Result<Vec<SummaryResultWithId>> {
        let resolved: HashSet<String> = already_decoded.iter().map(|r| r.id.clone()).collect();
        let mut combined = already_decoded;

        for input in inputs {
            if resolved.contains(&input.id) {
                continue;
            }
            if let Some(result) = extract_object_for_id(raw, &input.id) {
                debug!("Recovered result for id {} from truncated text", input.id);
                combined.push(result);
            }
        }

        let expected = inputs.len();
        let recovered = combined.len();
        if recovered * 2 < expected {
            warn!(
                "Truncation recovery abandoned: {} of {} results",
                recovered, expected
            );
            return Err(SummarizerError::TruncatedResponse {
                expected,
                recovered,
            });
        }

        info!(
            "Truncation recovery salvaged {} of {} results",
            recovered, expected
        );
        Ok(combined)
    }
}

/// Locate the last occurrence of the id in the raw text, back up to the
/// nearest opening brace, and try to decode the balanced object around it.
fn extract_object_for_id(raw: &str, id: &str) -> Option<SummaryResultWithId> {
    let marker = format!("\"{}\"", id);
    let marker_pos = raw.rfind(&marker)?;
    let start = raw[..marker_pos].rfind('{')?;
    let len = balanced_object_len(&raw[start..])?;

    serde_json::from_str::<SummaryResultWithId>(&raw[start..start + len])
        .ok()
        .filter(|r| r.id == id)
}
