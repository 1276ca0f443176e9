use scraper::{ElementRef, Html, Node};

/// Convert an HTML fragment into a lightweight markdown-like string.
///
/// Headers, paragraphs, list items, blockquotes and links get dedicated
/// renderings; any other leaf element contributes its trimmed text; container
/// elements without a handler only pass through to their children.
/// `script`/`style` subtrees are skipped entirely.
pub fn extract_structured_text(html: &str) -> String {
    let doc = Html::parse_fragment(html);
    let mut out = String::new();
    visit(doc.root_element(), &mut out);
    collapse_newlines(&out).trim().to_string()
}

fn visit(el: ElementRef, out: &mut String) {
    let name = el.value().name();

    match name {
        "script" | "style" => {}
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
            let level = name[1..].parse::<usize>().unwrap_or(1);
            let text = own_text(el);
            let text = text.trim();
            out.push('\n');
            out.push_str(&"#".repeat(level));
            out.push(' ');
            out.push_str(text);
            out.push_str("\n\n");
        }
        "p" => {
            let text = own_text(el);
            let text = text.trim();
            if !text.is_empty() {
                out.push_str(text);
                out.push_str("\n\n");
            }
        }
        "li" => {
            let text = own_text(el);
            out.push_str("- ");
            out.push_str(text.trim());
            out.push('\n');
        }
        "blockquote" => {
            let text = own_text(el);
            out.push_str("> ");
            out.push_str(text.trim());
            out.push_str("\n\n");
        }
        "a" => {
            let text = own_text(el);
            let text = text.trim();
            if !text.is_empty() {
                let href = el.value().attr("href").unwrap_or("");
                out.push('[');
                out.push_str(text);
                out.push_str("](");
                out.push_str(href);
                out.push_str(") ");
            }
        }
        _ => {
            if has_element_children(el) {
                for child in el.children() {
                    if let Some(child_el) = ElementRef::wrap(child) {
                        visit(child_el, out);
                    }
                }
            } else {
                let text = own_text(el);
                let text = text.trim();
                if !text.is_empty() {
                    out.push_str(text);
                    out.push(' ');
                }
            }
        }
    }
}

fn has_element_children(el: ElementRef) -> bool {
    el.children().any(|c| c.value().is_element())
}

/// All descendant text of an element, minus script/style subtrees and NULs.
fn own_text(el: ElementRef) -> String {
    let mut s = String::new();
    collect_text(el, &mut s);
    s
}

fn collect_text(el: ElementRef, out: &mut String) {
    for child in el.children() {
        match child.value() {
            Node::Text(text) => {
                for ch in text.chars() {
                    if ch != '\0' {
                        out.push(ch);
                    }
                }
            }
            Node::Element(e) => {
                let name = e.name();
                if name != "script" && name != "style" {
                    if let Some(child_el) = ElementRef::wrap(child) {
                        collect_text(child_el, out);
                    }
                }
            }
            _ => {}
        }
    }
}

/// Three or more consecutive newlines collapse to two.
fn collapse_newlines(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut run = 0usize;
    for ch in s.chars() {
        if ch == '\n' {
            run += 1;
            if run <= 2 {
                out.push(ch);
            }
        } else {
            run = 0;
            out.push(ch);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headers_render_with_level_prefix() {
        let out = extract_structured_text("<h2>  Section Title </h2>");
        assert_eq!(out, "## Section Title");
    }

    #[test]
    fn paragraphs_and_lists() {
        let html = "<p>First paragraph.</p><ul><li>one</li><li>two</li></ul>";
        let out = extract_structured_text(html);
        assert_eq!(out, "First paragraph.\n\n- one\n- two");
    }

    #[test]
    fn empty_paragraph_emits_nothing() {
        let out = extract_structured_text("<p>   </p><p>real</p>");
        assert_eq!(out, "real");
    }

    #[test]
    fn blockquote_renders_with_marker() {
        let out = extract_structured_text("<blockquote>quoted words</blockquote>");
        assert_eq!(out, "> quoted words");
    }

    #[test]
    fn links_render_markdown_style() {
        let out = extract_structured_text(r#"<a href="https://example.com/a">label</a>"#);
        assert_eq!(out, "[label](https://example.com/a)");
    }

    #[test]
    fn link_without_href_gets_empty_parens() {
        let out = extract_structured_text("<a>label</a>");
        assert_eq!(out, "[label]()");
    }

    #[test]
    fn empty_link_text_emits_nothing() {
        let out = extract_structured_text(r#"<a href="https://example.com"> </a>"#);
        assert_eq!(out, "");
    }

    #[test]
    fn script_and_style_are_skipped() {
        let html = "<p>keep</p><script>var x = 1;</script><style>.a{}</style>";
        assert_eq!(extract_structured_text(html), "keep");
    }

    #[test]
    fn script_inside_paragraph_is_skipped() {
        let html = "<p>before<script>nope()</script>after</p>";
        assert_eq!(extract_structured_text(html), "beforeafter");
    }

    #[test]
    fn unknown_leaf_emits_plain_text() {
        let out = extract_structured_text("<span>inline text</span>");
        assert_eq!(out, "inline text");
    }

    #[test]
    fn container_without_handler_visits_children() {
        let html = "<div><article><p>nested</p></article></div>";
        assert_eq!(extract_structured_text(html), "nested");
    }

    #[test]
    fn consecutive_newlines_collapse_to_two() {
        let html = "<h1>Title</h1><p></p><p>body</p>";
        let out = extract_structured_text(html);
        assert!(!out.contains("\n\n\n"));
        assert_eq!(out, "# Title\n\nbody");
    }

    #[test]
    fn nul_characters_are_stripped() {
        let out = extract_structured_text("<p>ab\0cd</p>");
        assert_eq!(out, "abcd");
    }
}
