//! Streaming markup rewriter.
//!
//! Takes the scanner's fixed-up content and the resolver's swap map and
//! rewrites every managed reference to its local locator, stamping the
//! transient `data-gts-*` index attributes the render-time substituter
//! reads back. Each attribute occurrence is classified independently, so
//! relative and absolute spellings of the same asset all get rewritten.

use anyhow::{Context, Result};
use lol_html::{HtmlRewriter, Settings, element};

use crate::resolver::SwapMap;
use crate::url_rules::UrlRules;

/// Index attribute stamped on rewritten `img` elements.
pub const ATTR_IMG_INDEX: &str = "data-gts-encfluid";
/// Index attribute stamped on rewritten `a` elements.
pub const ATTR_LINK_INDEX: &str = "data-gts-swapped-href";
/// Marker value used on `a` elements whose asset has no index yet.
pub const LINK_MARKER: &str = "gts-swapped-href";
/// Index attribute stamped on rewritten `video`/`audio` posters.
pub const ATTR_POSTER_INDEX: &str = "data-gts-poster-encfluid";
/// Index attribute stamped on rewritten `source` elements.
pub const ATTR_SOURCE_INDEX: &str = "data-gts-swapped-src";

/// Rewrite managed references in `content` according to `swaps`.
///
/// Attribute values are re-classified here rather than matched against the
/// scanner's url keys, so a swap recorded once covers every occurrence of
/// the asset regardless of how each occurrence spells the URL.
pub fn rewrite(content: &str, rules: &UrlRules<'_>, swaps: &SwapMap) -> Result<String> {
    let lookup = |attr_value: &str| {
        rules
            .classify(attr_value)
            .and_then(|resolved| swaps.get(&resolved).cloned())
    };

    let mut output = Vec::new();
    let mut rewriter = HtmlRewriter::new(
        Settings {
            element_content_handlers: vec![
                element!("img[src]", |el| {
                    let Some(src) = el.get_attribute("src") else {
                        return Ok(());
                    };
                    if let Some(target) = lookup(&src) {
                        el.set_attribute("src", &target.locator)?;
                        el.remove_attribute("srcset");
                        el.remove_attribute("sizes");
                        if let Some(index) = target.index {
                            el.set_attribute(ATTR_IMG_INDEX, &index.to_string())?;
                        }
                    }
                    Ok(())
                }),
                element!("a[href]", |el| {
                    let Some(href) = el.get_attribute("href") else {
                        return Ok(());
                    };
                    if let Some(target) = lookup(&href) {
                        el.set_attribute("href", &target.locator)?;
                        let marker = match target.index {
                            Some(index) => index.to_string(),
                            None => LINK_MARKER.to_string(),
                        };
                        el.set_attribute(ATTR_LINK_INDEX, &marker)?;
                    }
                    Ok(())
                }),
                element!("video", |el| {
                    rewrite_media(el, &lookup)
                }),
                element!("audio", |el| {
                    rewrite_media(el, &lookup)
                }),
                element!("source[src]", |el| {
                    let Some(src) = el.get_attribute("src") else {
                        return Ok(());
                    };
                    if let Some(target) = lookup(&src) {
                        el.set_attribute("src", &target.locator)?;
                        if let Some(index) = target.index {
                            el.set_attribute(ATTR_SOURCE_INDEX, &index.to_string())?;
                        }
                    }
                    Ok(())
                }),
            ],
            ..Settings::default()
        },
        |chunk: &[u8]| output.extend_from_slice(chunk),
    );

    rewriter
        .write(content.as_bytes())
        .context("markup rewrite failed")?;
    rewriter.end().context("markup rewrite failed")?;

    String::from_utf8(output).context("rewritten markup is not valid UTF-8")
}

fn rewrite_media<F>(
    el: &mut lol_html::html_content::Element<'_, '_>,
    lookup: &F,
) -> lol_html::HandlerResult
where
    F: Fn(&str) -> Option<crate::resolver::SwapTarget>,
{
    // Browsers default to eager preloading; media in article bodies only
    // needs metadata until the reader presses play.
    if el.get_attribute("preload").is_none() {
        el.set_attribute("preload", "metadata")?;
    }
    if let Some(poster) = el.get_attribute("poster") {
        if let Some(target) = lookup(&poster) {
            el.set_attribute("poster", &target.locator)?;
            if let Some(index) = target.index {
                el.set_attribute(ATTR_POSTER_INDEX, &index.to_string())?;
            }
        }
    }
    Ok(())
}
