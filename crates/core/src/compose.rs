//! Document composition.
//!
//! [`Composer::compose`] turns one article into a finished HTML document:
//! it clones the template, fills the metadata slots, renders discussion
//! links, runs the footnote pass, rewrites images and finally places the
//! article body into `#quire_contents`. Slots the template does not have are
//! skipped; only the content slot is required.

use crate::article::Article;
use crate::dom_tree::{DomTree, NodeId};
use crate::footnotes::{FootnoteIds, insert_footnotes, remove_footnotes};
use crate::images::ImageHandler;
use crate::source::SourceMeta;
use crate::template::Template;
use crate::{QuireError, Result};

/// Id of the element that receives the article body.
pub const CONTENTS_ID: &str = "quire_contents";

/// Builds documents from articles and templates.
#[derive(Debug, Clone, Default)]
pub struct Composer {
    footnote_ids: FootnoteIds,
}

impl Composer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses non-default footnote ids.
    pub fn with_footnote_ids(footnote_ids: FootnoteIds) -> Self {
        Self { footnote_ids }
    }

    /// Composes `article` into a copy of `template`.
    ///
    /// Without an image handler every `<img>` is removed. Fails when the
    /// article body is empty, when the template has no content slot, and
    /// when an image fails while the handler does not ignore failures.
    pub fn compose(
        &self, article: &dyn Article, source: &SourceMeta, template: &Template, images: Option<&mut ImageHandler>,
        footnotes: bool, discussion_urls: &[String],
    ) -> Result<DomTree> {
        tracing::debug!(title = article.title(), "Composing");
        let mut doc = template.document();
        let mut content = article.content()?;
        if content.children(content.root()).is_empty() {
            return Err(QuireError::NoContent);
        }
        let Some(slot) = doc.element_by_id(CONTENTS_ID) else {
            return Err(QuireError::TemplateError(format!("template has no #{CONTENTS_ID} element")));
        };

        fill_title(&mut doc, article.title());
        set_link_by_class(&mut doc, "quire_original_url", article.original_url(), true);
        set_link_by_class(&mut doc, "quire_original_link", article.original_url(), false);
        insert_plug(&mut doc, source);
        insert_source_meta(&mut doc, article, source);
        insert_discussions(&mut doc, discussion_urls);

        if footnotes {
            insert_footnotes(&mut doc, &mut content, article.original_url(), &self.footnote_ids);
        } else {
            remove_footnotes(&mut doc, &self.footnote_ids);
        }

        rewrite_images(&mut content, images)?;

        doc.clear_children(slot);
        doc.append_tree(slot, &content);
        Ok(doc)
    }
}

fn fill_title(doc: &mut DomTree, title: &str) {
    match doc.elements_by_tag(doc.root(), "title").first() {
        Some(&el) => doc.set_text(el, title),
        None => {
            if let Some(&head) = doc.elements_by_tag(doc.root(), "head").first() {
                let el = doc.append_element(head, "title");
                doc.append_text(el, title);
            }
        }
    }
    set_text_by_class(doc, "quire_title", title);
}

fn set_text_by_class(doc: &mut DomTree, class: &str, text: &str) {
    for el in doc.elements_by_class(class) {
        doc.set_text(el, text);
    }
}

fn set_link_by_class(doc: &mut DomTree, class: &str, href: &str, with_text: bool) {
    for el in doc.elements_by_class(class) {
        doc.set_attr(el, "href", href);
        if with_text {
            doc.set_text(el, href);
        }
    }
}

fn remove_by_class(doc: &mut DomTree, class: &str) {
    for el in doc.elements_by_class(class) {
        doc.detach(el);
    }
}

fn insert_plug(doc: &mut DomTree, source: &SourceMeta) {
    let plugs = doc.elements_by_class("quire_source");
    if plugs.is_empty() {
        tracing::debug!("Template missing source plug element");
    }
    for plug in plugs {
        doc.set_inner_html(plug, &source.via_html);
    }
}

fn insert_source_meta(doc: &mut DomTree, article: &dyn Article, source: &SourceMeta) {
    match article.source_url() {
        None => remove_by_class(doc, "quire_source_info"),
        Some(url) => {
            set_link_by_class(doc, "quire_source_url", url, true);
            set_link_by_class(doc, "quire_source_link", url, false);
            set_text_by_class(doc, "quire_source_name", &source.name);
        }
    }
}

fn insert_discussions(doc: &mut DomTree, urls: &[String]) {
    match urls {
        [] => {
            remove_by_class(doc, "quire_hn_info");
            remove_by_class(doc, "quire_hn_infos");
        }
        [url] => {
            remove_by_class(doc, "quire_hn_infos");
            set_link_by_class(doc, "quire_hn_url", url, true);
            set_link_by_class(doc, "quire_hn_link", url, false);
        }
        _ => {
            remove_by_class(doc, "quire_hn_info");
            let links = doc.elements_by_class("quire_hn_links");
            let full = doc.elements_by_class("quire_hn_urls");
            for &el in links.iter().chain(&full) {
                doc.clear_children(el);
            }
            for (idx, url) in urls.iter().enumerate() {
                for &el in &links {
                    append_link(doc, el, idx > 0, "quire_url_link quire_hn_link", url, &format!("#{}", idx + 1));
                }
                for &el in &full {
                    append_link(doc, el, idx > 0, "quire_url_url quire_hn_url", url, url);
                }
            }
        }
    }
}

fn append_link(doc: &mut DomTree, parent: NodeId, separator: bool, class: &str, href: &str, text: &str) {
    if separator {
        doc.append_text(parent, ", ");
    }
    let a = doc.append_element(parent, "a");
    doc.set_attr(a, "class", class);
    doc.set_attr(a, "href", href);
    doc.append_text(a, text);
}

fn rewrite_images(content: &mut DomTree, mut images: Option<&mut ImageHandler>) -> Result<()> {
    let mut yank = Vec::new();
    for img in content.elements_by_tag(content.root(), "img") {
        let source = content.attr(img, "src").unwrap_or_default().to_string();
        if source.is_empty() {
            yank.push(img);
            continue;
        }
        let Some(handler) = images.as_deref_mut() else {
            tracing::debug!(source, "No image handler, removing image");
            yank.push(img);
            continue;
        };
        match handler.rewrite(&source)? {
            Some(local) => {
                tracing::debug!(source, local, "Processed image");
                content.set_attr(img, "src", &local);
            }
            None => {
                tracing::debug!(source, "Could not retrieve image, removing");
                yank.push(img);
            }
        }
    }
    for img in yank {
        content.detach(img);
    }
    Ok(())
}
