use tracing::debug;

use crate::types::{ArticleInput, Batch, BatchBuilderConfig};

/// CJK scripts tokenize far denser than Latin text, so they are priced
/// separately: Hangul and CJK ideograph ranges cost 3 tokens per character.
fn is_cjk(ch: char) -> bool {
    matches!(ch,
        '\u{1100}'..='\u{11FF}'   // Hangul Jamo
        | '\u{3040}'..='\u{30FF}' // Hiragana, Katakana
        | '\u{3130}'..='\u{318F}' // Hangul Compatibility Jamo
        | '\u{3400}'..='\u{4DBF}' // CJK Extension A
        | '\u{4E00}'..='\u{9FFF}' // CJK Unified Ideographs
        | '\u{AC00}'..='\u{D7AF}' // Hangul Syllables
        | '\u{F900}'..='\u{FAFF}' // CJK Compatibility Ideographs
    )
}

/// Heuristic token count: non-CJK characters cost `chars / tokens_per_char`,
/// CJK characters cost `chars * 3`.
pub fn estimate_tokens(text: &str, tokens_per_char: f64) -> usize {
    let mut cjk = 0usize;
    let mut other = 0usize;
    for ch in text.chars() {
        if is_cjk(ch) {
            cjk += 1;
        } else {
            other += 1;
        }
    }
    (other as f64 / tokens_per_char).ceil() as usize + cjk * 3
}

/// Greedy bin-packing of articles into token-bounded batches, deterministic
/// for a fixed input order.
pub struct BatchBuilder {
    config: BatchBuilderConfig,
}

impl BatchBuilder {
    pub fn new(config: BatchBuilderConfig) -> Self {
        Self { config }
    }

    /// Estimated request cost of a single article, prompt overheads included.
    pub fn estimate_item_cost(&self, post: &ArticleInput) -> usize {
        let content_tokens = estimate_tokens(&post.title, self.config.tokens_per_char)
            + estimate_tokens(&post.content, self.config.tokens_per_char);
        self.config.base_prompt_tokens
            + content_tokens
            + self.config.avg_tokens_per_summary
            + self.config.json_overhead_tokens
    }

    fn usable_budget(&self) -> usize {
        (self.config.max_tokens_per_request as f64 * self.config.output_safety_margin) as usize
    }

    /// Pack posts in input order. A batch closes when the next item would
    /// exceed the usable token budget or the size cap; an item whose cost
    /// alone exceeds the budget still gets its own batch.
    pub fn build_batches(&self, posts: Vec<ArticleInput>) -> Vec<Batch> {
        let budget = self.usable_budget();
        let mut batches = Vec::new();
        let mut items: Vec<ArticleInput> = Vec::new();
        let mut total = 0usize;

        for post in posts {
            let cost = self.estimate_item_cost(&post);
            let fits = total + cost <= budget && items.len() < self.config.max_batch_size;

            if !fits && !items.is_empty() {
                batches.push(Batch {
                    items: std::mem::take(&mut items),
                    estimated_tokens: total,
                });
                total = 0;
            }

            items.push(post);
            total += cost;
        }

        if !items.is_empty() {
            batches.push(Batch {
                items,
                estimated_tokens: total,
            });
        }

        debug!(
            "Packed {} batches under budget {} ({} usable)",
            batches.len(),
            self.config.max_tokens_per_request,
            budget
        );
        batches
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post(id: &str, content: &str) -> ArticleInput {
        ArticleInput {
            id: id.to_string(),
            title: String::new(),
            content: content.to_string(),
        }
    }

    #[test]
    fn mixed_script_estimate() {
        // "Hello " is 6 Latin chars at 2 chars/token, "안녕" is 2 Hangul at 3x.
        assert_eq!(estimate_tokens("Hello 안녕", 2.0), 9);
    }

    #[test]
    fn pure_latin_estimate() {
        assert_eq!(estimate_tokens("abcd", 2.0), 2);
    }

    #[test]
    fn empty_text_estimates_zero() {
        assert_eq!(estimate_tokens("", 2.0), 0);
    }

    #[test]
    fn batches_respect_size_cap() {
        let config = BatchBuilderConfig {
            max_tokens_per_request: 1_000_000,
            max_batch_size: 2,
            ..Default::default()
        };
        let builder = BatchBuilder::new(config);
        let posts = (0..5).map(|i| post(&i.to_string(), "short")).collect();

        let batches = builder.build_batches(posts);
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].items.len(), 2);
        assert_eq!(batches[2].items.len(), 1);
    }

    #[test]
    fn batches_respect_token_budget() {
        let config = BatchBuilderConfig::default();
        let builder = BatchBuilder::new(config.clone());
        let budget = (config.max_tokens_per_request as f64 * config.output_safety_margin) as usize;

        let big = "x".repeat(20_000);
        let posts: Vec<ArticleInput> = (0..4).map(|i| post(&i.to_string(), &big)).collect();
        let batches = builder.build_batches(posts);

        for batch in &batches {
            if batch.items.len() > 1 {
                assert!(batch.estimated_tokens <= budget);
            }
        }
        let total_items: usize = batches.iter().map(|b| b.items.len()).sum();
        assert_eq!(total_items, 4);
    }

    #[test]
    fn oversized_item_gets_its_own_batch() {
        let config = BatchBuilderConfig {
            max_tokens_per_request: 100,
            ..Default::default()
        };
        let builder = BatchBuilder::new(config);

        let posts = vec![post("1", &"y".repeat(50_000)), post("2", "tiny")];
        let batches = builder.build_batches(posts);

        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].items.len(), 1);
        assert_eq!(batches[0].items[0].id, "1");
        assert_eq!(batches[1].items[0].id, "2");
    }

    #[test]
    fn packing_is_deterministic() {
        let builder = BatchBuilder::new(BatchBuilderConfig::default());
        let posts: Vec<ArticleInput> = (0..20)
            .map(|i| post(&i.to_string(), &"content ".repeat(i * 100)))
            .collect();

        let a = builder.build_batches(posts.clone());
        let b = builder.build_batches(posts);
        assert_eq!(a.len(), b.len());
        for (left, right) in a.iter().zip(&b) {
            assert_eq!(left.estimated_tokens, right.estimated_tokens);
            assert_eq!(
                left.items.iter().map(|p| &p.id).collect::<Vec<_>>(),
                right.items.iter().map(|p| &p.id).collect::<Vec<_>>()
            );
        }
    }
}
