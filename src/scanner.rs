//! Reference scanning over parsed HTML content.
//!
//! Walks the content tree once, collecting every candidate asset reference
//! (`a[href]`, `img[src]`, `video[poster]`, `audio[poster]`, `source[src]`)
//! that the URL rules accept, while applying the structural fix-ups the
//! downstream renderer depends on: `noscript` wrappers are dropped, `p`
//! wrappers around managed images are unwrapped, media containers are
//! flagged and empty `div`/`p` elements get a text child so they survive
//! serialization.

use anyhow::{Context, Result};
use kuchiki::NodeRef;
use kuchiki::traits::TendrilSink;

use crate::url_rules::UrlRules;

/// Attribute flag stamped on `video`/`audio` elements that contain a
/// `source` child, so the renderer knows the element carries its own
/// sources rather than a single `src`.
pub const ATTR_PROCESSED: &str = "data-gts-processed";

/// Where a reference was found, which determines the attribute the rewriter
/// targets and the render node the substituter produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefKind {
    /// `a[href]`
    Link,
    /// `img[src]`
    Image,
    /// `video[poster]` / `audio[poster]`
    MediaPoster,
    /// `source[src]`
    MediaSource,
}

/// One accepted asset reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    /// The attribute value exactly as written in the content.
    pub url_key: String,
    /// Absolute classified form of the URL.
    pub resolved_url: String,
    pub kind: RefKind,
}

/// Result of scanning one content body.
#[derive(Debug)]
pub struct ScanOutcome {
    /// Accepted references, deduplicated by resolved URL, in document order.
    pub references: Vec<Reference>,
    /// The content after structural fix-ups, ready for attribute rewriting.
    pub content: String,
}

/// Scan `content` for managed asset references and apply structural fix-ups.
///
/// Mutation never happens while iterating a live selection: candidates are
/// collected first, then detached or modified in a second pass.
pub fn scan(content: &str, rules: &UrlRules<'_>) -> Result<ScanOutcome> {
    let document = kuchiki::parse_html().one(content);

    drop_noscript(&document);

    let mut references: Vec<Reference> = Vec::new();
    let mut unwrap_paragraphs: Vec<NodeRef> = Vec::new();
    let mut flag_media: Vec<NodeRef> = Vec::new();

    let selection = document
        .select("a, img, video, audio, source")
        .map_err(|()| anyhow::anyhow!("invalid reference selector"))?;

    for node in selection {
        let element = node.as_node();
        let name = node.name.local.to_string();
        let (attr, kind) = match name.as_str() {
            "a" => ("href", RefKind::Link),
            "img" => ("src", RefKind::Image),
            "video" | "audio" => ("poster", RefKind::MediaPoster),
            _ => ("src", RefKind::MediaSource),
        };

        let url = {
            let attributes = node.attributes.borrow();
            match attributes.get(attr) {
                Some(v) if !v.is_empty() && !v.starts_with('#') => v.to_string(),
                _ => continue,
            }
        };

        let Some(resolved_url) = rules.classify(&url) else {
            continue;
        };

        if kind == RefKind::Image {
            if let Some(paragraph) = enclosing_paragraph(element) {
                if !unwrap_paragraphs.contains(&paragraph) {
                    unwrap_paragraphs.push(paragraph);
                }
            }
        }

        // Only managed sources mark their container; a video full of
        // unmanaged sources is left untouched.
        if kind == RefKind::MediaSource {
            if let Some(media) = enclosing_media(element) {
                if !flag_media.contains(&media) {
                    flag_media.push(media);
                }
            }
        }

        if !references.iter().any(|r| r.resolved_url == resolved_url) {
            references.push(Reference {
                url_key: url,
                resolved_url,
                kind,
            });
        }
    }

    for paragraph in unwrap_paragraphs {
        unwrap(&paragraph);
    }

    for media in flag_media {
        if let Some(element) = media.as_element() {
            element
                .attributes
                .borrow_mut()
                .insert(ATTR_PROCESSED, String::new());
        }
    }

    fill_empty_blocks(&document)?;

    Ok(ScanOutcome {
        references,
        content: serialize_body(&document)?,
    })
}

/// Detach every `noscript` element along with its contents. Fallback markup
/// duplicates the primary references and would double-count them.
fn drop_noscript(document: &NodeRef) {
    let doomed: Vec<NodeRef> = match document.select("noscript") {
        Ok(selection) => selection.map(|n| n.as_node().clone()).collect(),
        Err(()) => return,
    };
    for node in doomed {
        node.detach();
    }
}

/// Nearest `p` ancestor of `node`, if any.
fn enclosing_paragraph(node: &NodeRef) -> Option<NodeRef> {
    node.ancestors().find(|ancestor| {
        ancestor
            .as_element()
            .is_some_and(|e| matches!(&*e.name.local, "p"))
    })
}

/// Nearest `video`/`audio` ancestor of `node`, if any.
fn enclosing_media(node: &NodeRef) -> Option<NodeRef> {
    node.ancestors().find(|ancestor| {
        ancestor
            .as_element()
            .is_some_and(|e| matches!(&*e.name.local, "video" | "audio"))
    })
}

/// Replace an element with its children, preserving their order.
fn unwrap(node: &NodeRef) {
    let children: Vec<NodeRef> = node.children().collect();
    for child in children {
        node.insert_before(child);
    }
    node.detach();
}

/// Give childless `div` and `p` elements an empty text child. Some HTML
/// serializers collapse `<div></div>` into a self-closing tag that browsers
/// then mis-nest; a text node keeps the explicit close tag.
fn fill_empty_blocks(document: &NodeRef) -> Result<()> {
    let empties: Vec<NodeRef> = document
        .select("div, p")
        .map_err(|()| anyhow::anyhow!("invalid block selector"))?
        .filter(|n| n.as_node().first_child().is_none())
        .map(|n| n.as_node().clone())
        .collect();
    for node in empties {
        node.append(NodeRef::new_text(""));
    }
    Ok(())
}

/// Serialize only the body's children, dropping the `html`/`head`/`body`
/// wrapper the fragment parse adds.
fn serialize_body(document: &NodeRef) -> Result<String> {
    let body = document
        .select_first("body")
        .map_err(|()| anyhow::anyhow!("parsed document has no body"))?;
    let mut out = Vec::new();
    for child in body.as_node().children() {
        child
            .serialize(&mut out)
            .context("failed to serialize content")?;
    }
    String::from_utf8(out).context("serialized content is not valid UTF-8")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SitePair;

    fn pairs() -> Vec<SitePair> {
        vec![SitePair {
            site_url: "https://server.com/".into(),
            uploads_url: "https://server.com/wp-content/uploads/".into(),
        }]
    }

    fn rules(pairs: &[SitePair]) -> UrlRules<'_> {
        UrlRules::new(pairs, "https://server.com/wp-content/uploads/")
    }

    #[test]
    fn collects_references_in_document_order() {
        let pairs = pairs();
        let html = r#"<a href="https://server.com/wp-content/uploads/doc.pdf">doc</a>
            <img src="/wp-content/uploads/photo.jpg">"#;
        let outcome = scan(html, &rules(&pairs)).unwrap();
        assert_eq!(outcome.references.len(), 2);
        assert_eq!(outcome.references[0].kind, RefKind::Link);
        assert_eq!(
            outcome.references[1].resolved_url,
            "https://server.com/wp-content/uploads/photo.jpg"
        );
        assert_eq!(outcome.references[1].url_key, "/wp-content/uploads/photo.jpg");
    }

    #[test]
    fn deduplicates_by_resolved_url() {
        let pairs = pairs();
        let html = r#"<img src="/wp-content/uploads/a.jpg"><img src="/wp-content/uploads/a.jpg">"#;
        let outcome = scan(html, &rules(&pairs)).unwrap();
        assert_eq!(outcome.references.len(), 1);
    }

    #[test]
    fn skips_fragment_and_unmanaged_urls() {
        let pairs = pairs();
        let html = r##"<a href="#section">jump</a><a href="https://other.com/x.pdf">x</a>"##;
        let outcome = scan(html, &rules(&pairs)).unwrap();
        assert!(outcome.references.is_empty());
    }

    #[test]
    fn drops_noscript_wrappers() {
        let pairs = pairs();
        let html = r#"<noscript><img src="/wp-content/uploads/a.jpg"></noscript>
            <img src="/wp-content/uploads/b.jpg">"#;
        let outcome = scan(html, &rules(&pairs)).unwrap();
        assert_eq!(outcome.references.len(), 1);
        assert!(!outcome.content.contains("noscript"));
        assert!(!outcome.content.contains("a.jpg"));
    }

    #[test]
    fn unwraps_paragraph_around_managed_image() {
        let pairs = pairs();
        let html = r#"<p><img src="/wp-content/uploads/a.jpg"></p>"#;
        let outcome = scan(html, &rules(&pairs)).unwrap();
        assert!(!outcome.content.contains("<p>"));
        assert!(outcome.content.contains("<img"));
    }

    #[test]
    fn keeps_paragraphs_around_unmanaged_images() {
        let pairs = pairs();
        let html = r#"<p><img src="https://other.com/a.jpg"></p>"#;
        let outcome = scan(html, &rules(&pairs)).unwrap();
        assert!(outcome.content.contains("<p>"));
    }

    #[test]
    fn flags_media_containers_with_sources() {
        let pairs = pairs();
        let html = r#"<video><source src="/wp-content/uploads/clip.mp4"></video>"#;
        let outcome = scan(html, &rules(&pairs)).unwrap();
        assert!(outcome.content.contains(ATTR_PROCESSED));
        assert_eq!(outcome.references.len(), 1);
        assert_eq!(outcome.references[0].kind, RefKind::MediaSource);
    }

    #[test]
    fn media_with_only_unmanaged_sources_is_not_flagged() {
        let pairs = pairs();
        let html = r#"<video><source src="https://other.com/clip.mp4"></video>"#;
        let outcome = scan(html, &rules(&pairs)).unwrap();
        assert!(!outcome.content.contains(ATTR_PROCESSED));
        assert!(outcome.references.is_empty());
    }

    #[test]
    fn empty_blocks_keep_explicit_close_tags() {
        let pairs = pairs();
        let outcome = scan("<div></div><p></p>", &rules(&pairs)).unwrap();
        assert!(outcome.content.contains("</div>"));
        assert!(outcome.content.contains("</p>"));
    }
}
