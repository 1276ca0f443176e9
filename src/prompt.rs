use serde_json::{json, Value};

use crate::types::ArticleInput;

/// One LLM submission: prompt text, response schema, model identifier.
#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub prompt: String,
    pub schema: Value,
    pub model: String,
}

/// Build the batched summarization prompt and response schema for a batch.
///
/// Every article is rendered as a numbered block carrying its stable id; the
/// model is instructed to emit one JSON result object per article so the
/// streaming parser can pick them off as they complete.
pub fn build_batch_prompt(posts: &[ArticleInput], categories: &[String], model: &str) -> LlmRequest {
    let mut prompt = String::new();
    prompt.push_str(
        "You are summarizing technical blog articles. For EACH article below, \
         produce one JSON object with fields: id (copied exactly), success (true), \
         summary (50-5000 characters, plain text), preview (one or two sentences), \
         and categories (one or more from the allowed list).\n",
    );
    prompt.push_str("Allowed categories: ");
    prompt.push_str(&categories.join(", "));
    prompt.push_str("\n\nRespond with a JSON array containing exactly one object per article, in any order.\n");

    for (i, post) in posts.iter().enumerate() {
        prompt.push_str(&format!(
            "\n--- Article {} (id: {}) ---\nTitle: {}\n\n{}\n",
            i + 1,
            post.id,
            post.title,
            post.content
        ));
    }

    LlmRequest {
        prompt,
        schema: response_schema(categories),
        model: model.to_string(),
    }
}

/// JSON schema for the per-article result record.
fn response_schema(categories: &[String]) -> Value {
    json!({
        "type": "array",
        "items": {
            "type": "object",
            "properties": {
                "id": { "type": "string" },
                "success": { "type": "boolean" },
                "summary": { "type": "string", "minLength": 50, "maxLength": 5000 },
                "preview": { "type": "string" },
                "categories": {
                    "type": "array",
                    "items": { "type": "string", "enum": categories },
                    "minItems": 1
                }
            },
            "required": ["id", "success", "summary", "preview", "categories"]
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_includes_every_article_id() {
        let posts = vec![
            ArticleInput {
                id: "p1".to_string(),
                title: "One".to_string(),
                content: "body one".to_string(),
            },
            ArticleInput {
                id: "p2".to_string(),
                title: "Two".to_string(),
                content: "body two".to_string(),
            },
        ];
        let categories = vec!["AI".to_string(), "Backend".to_string()];
        let request = build_batch_prompt(&posts, &categories, "test-model");

        assert!(request.prompt.contains("(id: p1)"));
        assert!(request.prompt.contains("(id: p2)"));
        assert!(request.prompt.contains("AI, Backend"));
        assert_eq!(request.model, "test-model");
    }

    #[test]
    fn schema_pins_the_category_whitelist() {
        let categories = vec!["AI".to_string()];
        let request = build_batch_prompt(&[], &categories, "m");
        let enum_values = &request.schema["items"]["properties"]["categories"]["items"]["enum"];
        assert_eq!(enum_values, &json!(["AI"]));
    }
}
