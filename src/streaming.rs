use tracing::{debug, trace};

use crate::types::SummaryResultWithId;

/// Stateful incremental parser that extracts complete JSON result objects
/// from a live token stream before the stream finishes.
///
/// Chunks must be fed in arrival order. Incomplete trailing text is buffered
/// between calls; each call may yield zero or more completed objects.
#[derive(Debug, Default)]
pub struct StreamingJsonParser {
    buffer: String,
}

impl StreamingJsonParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and drain every complete result object it unlocked.
    pub fn process(&mut self, chunk: &str) -> Vec<SummaryResultWithId> {
        self.buffer.push_str(chunk);
        let mut results = Vec::new();

        loop {
            let start = match self.buffer.find('{') {
                Some(idx) => idx,
                None => {
                    // No object can begin in what's left; drop the noise.
                    self.buffer.clear();
                    break;
                }
            };

            match balanced_object_len(&self.buffer[start..]) {
                None => break,
                Some(len) => {
                    let candidate = &self.buffer[start..start + len];
                    match serde_json::from_str::<SummaryResultWithId>(candidate) {
                        Ok(result) if !result.id.trim().is_empty() => {
                            trace!("Streaming parser completed object id={}", result.id);
                            results.push(result);
                            self.buffer.drain(..start + len);
                        }
                        _ => {
                            // Wrapper/array noise or malformed candidate: step
                            // past the opening brace only and keep scanning, so
                            // nested result objects are still found.
                            self.buffer.drain(..start + 1);
                        }
                    }
                }
            }
        }

        if !results.is_empty() {
            debug!("Streaming parser emitted {} results", results.len());
        }
        results
    }

    /// Bytes still waiting for a closing brace.
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }
}

/// Scan a string beginning at `{`, tracking quoted strings and escape
/// sequences, until brace depth returns to zero. Returns the byte length of
/// the balanced object, or `None` when the closing brace has not arrived yet.
pub(crate) fn balanced_object_len(text: &str) -> Option<usize> {
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escape_pending = false;

    for (idx, ch) in text.char_indices() {
        if escape_pending {
            escape_pending = false;
            continue;
        }
        if in_string {
            match ch {
                '\\' => escape_pending = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(idx + ch.len_utf8());
                }
            }
            _ => {}
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_call_parses_complete_object() {
        let mut parser = StreamingJsonParser::new();
        let results =
            parser.process(r#"{"id": "a", "success": true, "summary": "done", "preview": "p"}"#);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "a");
        assert!(results[0].success);
    }

    #[test]
    fn object_split_across_three_chunks() {
        let mut parser = StreamingJsonParser::new();
        assert!(parser.process(r#"{"id": "1", "suc"#).is_empty());
        assert!(parser.process(r#"cess": true, "summary": "part1 "#).is_empty());
        let results = parser.process(r#"part2"}"#);

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "1");
        assert_eq!(results[0].summary.as_deref(), Some("part1 part2"));
    }

    #[test]
    fn fragmentation_is_equivalent_to_one_shot() {
        let payload = r#"{"id": "x", "success": true, "summary": "s", "categories": ["AI"]}"#;

        let mut whole = StreamingJsonParser::new();
        let one_shot = whole.process(payload);

        let mut fragmented = StreamingJsonParser::new();
        let mut collected = Vec::new();
        for ch in payload.chars() {
            collected.extend(fragmented.process(&ch.to_string()));
        }

        assert_eq!(one_shot.len(), 1);
        assert_eq!(collected.len(), 1);
        assert_eq!(one_shot[0].id, collected[0].id);
        assert_eq!(one_shot[0].summary, collected[0].summary);
    }

    #[test]
    fn wrapper_object_is_skipped_to_reach_inner_results() {
        let mut parser = StreamingJsonParser::new();
        let results = parser.process(
            r#"{"results": [{"id": "a", "success": true}, {"id": "b", "success": false, "error": "boom"}]}"#,
        );
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, "a");
        assert_eq!(results[1].id, "b");
        assert!(!results[1].success);
    }

    #[test]
    fn braces_inside_strings_do_not_close_objects() {
        let mut parser = StreamingJsonParser::new();
        let results =
            parser.process(r#"{"id": "a", "success": true, "summary": "code: { } and \" quote"}"#);
        assert_eq!(results.len(), 1);
        assert_eq!(
            results[0].summary.as_deref(),
            Some(r#"code: { } and " quote"#)
        );
    }

    #[test]
    fn object_without_id_is_discarded_as_noise() {
        let mut parser = StreamingJsonParser::new();
        let results = parser.process(r#"{"success": true} {"id": "real", "success": true}"#);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "real");
    }

    #[test]
    fn multiple_objects_emit_in_arrival_order() {
        let mut parser = StreamingJsonParser::new();
        let results = parser
            .process(r#"[{"id": "first", "success": true}, {"id": "second", "success": true}]"#);
        assert_eq!(
            results.iter().map(|r| r.id.as_str()).collect::<Vec<_>>(),
            vec!["first", "second"]
        );
    }

    #[test]
    fn incomplete_tail_stays_buffered() {
        let mut parser = StreamingJsonParser::new();
        let results = parser.process(r#"{"id": "done", "success": true}{"id": "pend"#);
        assert_eq!(results.len(), 1);
        assert!(parser.pending_len() > 0);

        let more = parser.process(r#"ing", "success": true}"#);
        assert_eq!(more.len(), 1);
        assert_eq!(more[0].id, "pending");
    }
}
