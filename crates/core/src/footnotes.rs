//! Footnote extraction.
//!
//! Inline links in an article body are turned into a numbered bibliography.
//! Every qualifying `<a>` gets a superscript marker right after it, and the
//! template's footnote list receives one `<dt>`/`<dd>` pair per distinct URL.
//!
//! Numbering follows first-encounter order within one article. A link whose
//! visible text is just its own URL is left alone, as are fragment links and
//! links back to the article itself.
//!
//! # Example
//!
//! ```rust
//! use quire_core::footnotes::{FootnoteIds, insert_footnotes};
//! use quire_core::parse::{parse_document, parse_fragment};
//!
//! let mut doc = parse_document(r#"<html><body><dl id="fn"></dl></body></html>"#);
//! let mut content = parse_fragment(r#"<p><a href="http://a.example">A</a></p>"#);
//!
//! let found = insert_footnotes(&mut doc, &mut content, "http://x.example", &FootnoteIds::with_prefix("fn"));
//! assert!(found);
//! assert!(content.to_html().contains(r##"href="#fn_1""##));
//! ```

use std::collections::HashMap;

use crate::dom_tree::{DomTree, NodeId};

/// Longest footnote text shown in the list before it is abbreviated.
pub const FOOTNOTE_TEXT_LEN: usize = 40;

/// One entry in an article's bibliography.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Footnote {
    /// 1-based ordinal in first-encounter order.
    pub number: usize,
    pub url: String,
    /// Link text of the first occurrence that had any.
    pub text: String,
}

/// Ids and classes written into the document.
///
/// The template decides where the list lives; these names tie the markers in
/// the body to the entries in the list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FootnoteIds {
    /// Id of the list container (`<dl>`).
    pub list: String,
    /// Id of an optional wrapper removed together with the list.
    pub section: String,
    /// Prefix of each list entry id; the number is appended.
    pub entry_prefix: String,
    /// Prefix of the back-reference id placed on the first marker.
    pub source_prefix: String,
    pub marker_class: String,
    pub url_class: String,
}

impl FootnoteIds {
    /// Names derived from one stem: list `stem`, entries `stem_N`.
    pub fn with_prefix(stem: &str) -> Self {
        Self {
            list: stem.to_string(),
            section: format!("{stem}_section"),
            entry_prefix: format!("{stem}_"),
            source_prefix: format!("{stem}_source_"),
            marker_class: format!("{stem}_marker"),
            url_class: format!("{stem}_url"),
        }
    }
}

impl Default for FootnoteIds {
    fn default() -> Self {
        Self {
            list: "quire_footnotes".to_string(),
            section: "quire_footnotes_section".to_string(),
            entry_prefix: "quire_footnote_".to_string(),
            source_prefix: "quire_sourcenote_".to_string(),
            marker_class: "quire_footnote_source".to_string(),
            url_class: "quire_url_url".to_string(),
        }
    }
}

/// True when the link text is the href itself, possibly without `http://`.
pub fn is_naked_url(href: &str, text: &str) -> bool {
    if href.eq_ignore_ascii_case(text) {
        return true;
    }
    !text.to_ascii_lowercase().starts_with("http://")
        && href.get(..7).is_some_and(|scheme| scheme.eq_ignore_ascii_case("http://"))
        && href.get(7..).is_some_and(|rest| rest.eq_ignore_ascii_case(text))
}

fn qualifies(href: &str, text: &str, article_url: &str) -> bool {
    !href.is_empty() && !href.starts_with('#') && href != article_url && !is_naked_url(href, text)
}

/// Scans `content` for links, inserts markers after each qualifying anchor and
/// returns the footnotes in number order.
///
/// The content tree is modified in place. Running this on identical input
/// always yields identical numbering.
pub fn extract_footnotes(content: &mut DomTree, article_url: &str, ids: &FootnoteIds) -> Vec<Footnote> {
    let mut footnotes: Vec<Footnote> = Vec::new();
    let mut by_url: HashMap<String, usize> = HashMap::new();

    for anchor in content.elements_by_tag(content.root(), "a") {
        let Some(href) = content.attr(anchor, "href").map(str::to_string) else {
            continue;
        };
        let text = content.text(anchor).trim().to_string();
        if !qualifies(&href, &text, article_url) {
            continue;
        }

        let (number, first) = match by_url.get(&href) {
            Some(&idx) => {
                let existing = &mut footnotes[idx];
                if existing.text.is_empty() && !text.is_empty() {
                    existing.text = text;
                }
                (existing.number, false)
            }
            None => {
                let number = footnotes.len() + 1;
                by_url.insert(href.clone(), footnotes.len());
                footnotes.push(Footnote { number, url: href, text });
                (number, true)
            }
        };

        let marker = build_marker(content, number, first, ids);
        content.insert_after(anchor, marker);
        let nbsp = content.create_text("\u{a0}");
        content.insert_after(anchor, nbsp);
    }

    footnotes
}

fn build_marker(content: &mut DomTree, number: usize, first: bool, ids: &FootnoteIds) -> NodeId {
    let marker = content.create_element("a");
    content.set_attr(marker, "class", &ids.marker_class);
    content.set_attr(marker, "href", &format!("#{}{number}", ids.entry_prefix));
    content.set_attr(marker, "title", "Goto footnote");
    if first {
        content.set_attr(marker, "id", &format!("{}{number}", ids.source_prefix));
    }
    let sup = content.append_element(marker, "sup");
    content.append_text(sup, &format!("[{number}]"));
    marker
}

/// Appends one `<dt>`/`<dd>` pair per footnote to `list`.
pub fn render_footnotes(doc: &mut DomTree, list: NodeId, footnotes: &[Footnote], ids: &FootnoteIds) {
    for footnote in footnotes {
        let text = abbreviate(&footnote.text, FOOTNOTE_TEXT_LEN);
        let number = footnote.number;

        let dt = doc.append_element(list, "dt");
        doc.set_attr(dt, "id", &format!("{}{number}", ids.entry_prefix));
        let back = doc.append_element(dt, "a");
        doc.set_attr(back, "href", &format!("#{}{number}", ids.source_prefix));
        if !text.is_empty() {
            doc.set_attr(back, "title", &text);
        }
        doc.append_text(back, &format!("[{number}]"));
        doc.append_text(dt, " ");
        doc.append_text(dt, &text);

        let dd = doc.append_element(list, "dd");
        let link = doc.append_element(dd, "a");
        doc.set_attr(link, "href", &footnote.url);
        doc.set_attr(link, "class", &ids.url_class);
        if !text.is_empty() {
            doc.set_attr(link, "title", &text);
        }
        doc.append_text(link, &footnote.url);
    }
}

/// Removes the footnote section (or, failing that, the bare list) from `doc`.
pub fn remove_footnotes(doc: &mut DomTree, ids: &FootnoteIds) {
    if let Some(section) = doc.element_by_id(&ids.section) {
        doc.detach(section);
    } else if let Some(list) = doc.element_by_id(&ids.list) {
        doc.detach(list);
    }
}

/// Runs the whole footnote pass for one article.
///
/// Returns whether any footnotes were produced. A document without a list
/// container is treated as footnotes disabled and the content is untouched.
pub fn insert_footnotes(doc: &mut DomTree, content: &mut DomTree, article_url: &str, ids: &FootnoteIds) -> bool {
    let Some(list) = doc.element_by_id(&ids.list) else {
        tracing::debug!("No footnotes element in template");
        remove_footnotes(doc, ids);
        return false;
    };

    let footnotes = extract_footnotes(content, article_url, ids);
    if footnotes.is_empty() {
        tracing::debug!("No footnotes for this article");
        remove_footnotes(doc, ids);
        return false;
    }

    render_footnotes(doc, list, &footnotes, ids);
    tracing::debug!(count = footnotes.len(), "Inserted footnotes");
    true
}

/// Shortens `text` to at most `max` characters, ending on a word boundary
/// where possible and marking the cut with `…`.
///
/// The result is trimmed. If no word boundary exists in the second half of
/// the allowed length, the text is cut hard at `max - 1`.
pub fn abbreviate(text: &str, max: usize) -> String {
    let trimmed = text.trim();
    let chars: Vec<char> = trimmed.chars().collect();
    if chars.len() <= max {
        return trimmed.to_string();
    }
    if max == 0 {
        return String::new();
    }

    let min = (max / 2).max(1);
    let mut pos = max - 1;
    while pos >= min && !chars[pos].is_whitespace() {
        pos -= 1;
    }
    while pos >= min && !chars[pos - 1].is_alphanumeric() {
        pos -= 1;
    }
    if pos < min {
        pos = max - 1;
    }

    let mut out: String = chars[..pos].iter().collect();
    out.push('\u{2026}');
    out
}
