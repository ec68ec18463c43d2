//! Rendered MediaWiki HTML → plain article text.
//!
//! Locates the main content container and walks it in document order,
//! dropping the known non-content subtrees (reference lists, navboxes,
//! infoboxes, edit links, tables, scripts) and the trailing apparatus
//! sections. Reference superscripts surviving the walk are stripped by
//! pattern.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};

/// Section headings after which content stops being prose.
const STOP_SECTIONS: &[&str] = &[
    "references",
    "external links",
    "see also",
    "further reading",
    "notes",
    "bibliography",
    "sources",
];

const BLOCKED_CLASSES: &[&str] = &[
    "navbox",
    "infobox",
    "reflist",
    "mw-editsection",
    "metadata",
    "toc",
    "thumb",
    "hatnote",
    "sidebar",
    "catlinks",
    "printfooter",
    "noprint",
    "mw-empty-elt",
];

static REF_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    // [1], [a], [note 3], [edit], [citation needed]
    Regex::new(r"\[(?:\d+|[a-z]|note \d+|edit|citation needed)\]")
        .unwrap_or_else(|e| unreachable!("static regex: {e}"))
});

static BLANK_LINES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\n{3,}").unwrap_or_else(|e| unreachable!("static regex: {e}"))
});

/// Extract plain text from rendered page HTML. Returns an empty string when
/// no recognizable content container exists.
pub fn extract_article_text(html: &str) -> String {
    let document = Html::parse_document(html);

    let Ok(content_sel) = Selector::parse("div.mw-parser-output") else {
        return String::new();
    };
    let Some(content) = document.select(&content_sel).next() else {
        // API fragments sometimes arrive without the wrapper div.
        return clean_text(collect_top_level(document.root_element()));
    };

    clean_text(collect_top_level(content))
}

fn collect_top_level(content: ElementRef<'_>) -> String {
    let mut out = String::new();
    let mut skipping_section = false;

    for child in content.child_elements() {
        let tag = child.value().name();
        match tag {
            "h2" | "h3" | "h4" => {
                let heading = text_of(child);
                let normalized = heading.trim().to_lowercase();
                if tag == "h2" {
                    skipping_section = STOP_SECTIONS.iter().any(|s| normalized.starts_with(s));
                }
                if !skipping_section && !heading.trim().is_empty() {
                    out.push('\n');
                    out.push_str(heading.trim());
                    out.push('\n');
                }
            }
            "p" | "ul" | "ol" | "dl" | "blockquote" if !skipping_section => {
                let text = text_of(child);
                if !text.trim().is_empty() {
                    out.push_str(text.trim());
                    out.push_str("\n\n");
                }
            }
            _ => {}
        }
    }
    out
}

fn text_of(el: ElementRef<'_>) -> String {
    let mut out = String::new();
    push_text(el, &mut out);
    out
}

fn push_text(el: ElementRef<'_>, out: &mut String) {
    if is_blocked(&el) {
        return;
    }
    for child in el.children() {
        match child.value() {
            scraper::Node::Text(text) => out.push_str(text),
            scraper::Node::Element(_) => {
                if let Some(child_el) = ElementRef::wrap(child) {
                    if child_el.value().name() == "li" {
                        out.push('\n');
                    }
                    push_text(child_el, out);
                }
            }
            _ => {}
        }
    }
}

fn is_blocked(el: &ElementRef<'_>) -> bool {
    let element = el.value();
    match element.name() {
        "script" | "style" | "table" | "figure" => return true,
        "sup" => {
            if element.classes().any(|c| c == "reference") {
                return true;
            }
        }
        _ => {}
    }
    element.classes().any(|c| BLOCKED_CLASSES.contains(&c))
}

fn clean_text(raw: String) -> String {
    let stripped = REF_MARKER.replace_all(&raw, "");
    let collapsed = BLANK_LINES.replace_all(&stripped, "\n\n");
    collapsed.trim().to_string()
}

/// Normalize a title to MediaWiki canonical form: underscores become
/// spaces, whitespace collapses, the first character is uppercased.
pub fn normalize_title(title: &str) -> String {
    let spaced = title.replace('_', " ");
    let collapsed = spaced.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut chars = collapsed.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => collapsed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_paragraphs_and_skips_infobox() {
        let html = r#"<div class="mw-parser-output">
            <table class="infobox"><tr><td>Born: 1900</td></tr></table>
            <p>The <b>Apollo program</b> was a spaceflight program.<sup class="reference">[1]</sup></p>
            <p>It landed humans on the Moon.</p>
        </div>"#;
        let text = extract_article_text(html);
        assert!(text.contains("The Apollo program was a spaceflight program."));
        assert!(text.contains("It landed humans on the Moon."));
        assert!(!text.contains("Born"));
        assert!(!text.contains("[1]"));
    }

    #[test]
    fn stops_at_references_section() {
        let html = r#"<div class="mw-parser-output">
            <p>Body text.</p>
            <h2>References<span class="mw-editsection">[edit]</span></h2>
            <ul><li>Smith, J. (1970)</li></ul>
            <h2>Legacy</h2>
            <p>Legacy text.</p>
        </div>"#;
        let text = extract_article_text(html);
        assert!(text.contains("Body text."));
        assert!(!text.contains("Smith"));
        assert!(text.contains("Legacy text."));
    }

    #[test]
    fn drops_navbox_and_scripts() {
        let html = r#"<div class="mw-parser-output">
            <p>Real content.</p>
            <div class="navbox"><p>Nav junk</p></div>
            <script>var x = 1;</script>
        </div>"#;
        let text = extract_article_text(html);
        assert_eq!(text, "Real content.");
    }

    #[test]
    fn list_items_become_lines() {
        let html = r#"<div class="mw-parser-output">
            <ul><li>First landing</li><li>Second landing</li></ul>
        </div>"#;
        let text = extract_article_text(html);
        assert!(text.contains("First landing"));
        assert!(text.contains("Second landing"));
    }

    #[test]
    fn normalize_title_canonicalizes() {
        assert_eq!(normalize_title("apollo_program"), "Apollo program");
        assert_eq!(normalize_title("  moon   landing "), "Moon landing");
        assert_eq!(normalize_title("二战"), "二战");
        assert_eq!(normalize_title(""), "");
    }
}
