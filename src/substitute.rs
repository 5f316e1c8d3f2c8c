//! Render-time substitution of rewritten markup into typed render nodes.
//!
//! Consumers render the typed tree with their own components instead of
//! dangerously injecting raw HTML. Stamped `data-gts-*` indexes are resolved
//! against the found-assets list that accompanies the markup; a stale or
//! truncated list is a hard error, because rendering a wrong asset silently
//! is worse than failing the render.

use kuchiki::NodeRef;
use kuchiki::traits::TendrilSink;
use log::warn;
use url::Url;

use crate::asset::{AssetPayload, AssetRecord, ResponsiveImage};
use crate::error::SubstituteError;
use crate::rewriter::{
    ATTR_IMG_INDEX, ATTR_LINK_INDEX, ATTR_POSTER_INDEX, ATTR_SOURCE_INDEX, LINK_MARKER,
};
use crate::scanner::ATTR_PROCESSED;
use crate::url_rules::{is_relative, strip_protocol};

/// CSS class appended to every substituted inline image.
pub const INLINE_IMAGE_CLASS: &str = "inline-parsed-img";

/// Site context for the internal-link heuristic.
#[derive(Debug, Clone)]
pub struct SubstituteOptions {
    /// Absolute URL of the consuming site's CMS origin.
    pub site_url: String,
    /// Absolute URL of the managed uploads area under that origin.
    pub uploads_url: String,
}

/// A typed node for the consumer's renderer.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderNode {
    Text(String),
    /// Any element with no special handling.
    Element(ElementNode),
    /// An on-site link to render with the consumer's router.
    InternalLink {
        to: String,
        class: Option<String>,
        children: Vec<RenderNode>,
    },
    /// A link to a mirrored asset.
    AssetLink {
        href: String,
        class: Option<String>,
        children: Vec<RenderNode>,
    },
    Image(ImageNode),
    Media(MediaNode),
    /// A `source` child of a media element.
    MediaSource {
        src: String,
        attrs: Vec<(String, String)>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ElementNode {
    pub tag: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<RenderNode>,
}

/// A substituted inline image, carrying its responsive encoding data.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageNode {
    pub image: ResponsiveImage,
    /// Alt text; falls back to the title when the markup has no alt.
    pub alt: Option<String>,
    pub title: Option<String>,
    /// Always contains [`INLINE_IMAGE_CLASS`].
    pub class: String,
    /// Author-specified display width, when the markup carries one.
    pub width_px: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Video,
    Audio,
}

/// A substituted `video`/`audio` element.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaNode {
    pub kind: MediaKind,
    pub poster: Option<String>,
    pub class: Option<String>,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<RenderNode>,
}

/// Convert rewritten markup into render nodes, resolving stamped indexes
/// against `assets`.
///
/// # Errors
///
/// Fails with [`SubstituteError::AssetIndexOutOfRange`] when a stamped index
/// points past the end of `assets`; the caller must re-parse the content
/// rather than render a mismatched asset.
pub fn substitute(
    content: &str,
    assets: &[AssetRecord],
    options: &SubstituteOptions,
) -> Result<Vec<RenderNode>, SubstituteError> {
    let document = kuchiki::parse_html().one(content);
    let body = document
        .select_first("body")
        .map_err(|()| SubstituteError::Markup("parsed markup has no body".into()))?;
    convert_children(body.as_node(), assets, options)
}

fn convert_children(
    parent: &NodeRef,
    assets: &[AssetRecord],
    options: &SubstituteOptions,
) -> Result<Vec<RenderNode>, SubstituteError> {
    let mut nodes = Vec::new();
    for child in parent.children() {
        if let Some(text) = child.as_text() {
            nodes.push(RenderNode::Text(text.borrow().clone()));
        } else if child.as_element().is_some() {
            nodes.push(convert_element(&child, assets, options)?);
        }
        // Comments and other node types are dropped.
    }
    Ok(nodes)
}

fn convert_element(
    node: &NodeRef,
    assets: &[AssetRecord],
    options: &SubstituteOptions,
) -> Result<RenderNode, SubstituteError> {
    let element = match node.as_element() {
        Some(e) => e,
        None => return Ok(RenderNode::Text(String::new())),
    };
    let tag = element.name.local.to_string();
    let attrs = element.attributes.borrow();

    match tag.as_str() {
        "img" if attrs.get(ATTR_IMG_INDEX).is_some() => {
            let index = parse_index(attrs.get(ATTR_IMG_INDEX).unwrap_or_default());
            match index {
                Some(index) => {
                    let record = asset_at(assets, index)?;
                    Ok(RenderNode::Image(image_node(record, &attrs)))
                }
                None => {
                    warn!("unreadable image index; rendering as plain element");
                    let children = convert_children(node, assets, options)?;
                    Ok(plain_element(&tag, &attrs, children))
                }
            }
        }
        "a" if attrs.get(ATTR_LINK_INDEX).is_some() => {
            let marker = attrs.get(ATTR_LINK_INDEX).unwrap_or_default().to_string();
            let children = convert_children(node, assets, options)?;
            let class = attrs.get("class").map(ToString::to_string);
            let current_href = attrs.get("href").unwrap_or_default().to_string();
            if marker == LINK_MARKER {
                // Swapped before the store indexed the asset; the href
                // already points at the local copy.
                return Ok(RenderNode::AssetLink {
                    href: current_href,
                    class,
                    children,
                });
            }
            match parse_index(&marker) {
                Some(index) => {
                    let record = asset_at(assets, index)?;
                    Ok(RenderNode::AssetLink {
                        href: record.display_url().to_string(),
                        class,
                        children,
                    })
                }
                None => Ok(RenderNode::AssetLink {
                    href: current_href,
                    class,
                    children,
                }),
            }
        }
        "a" => {
            let href = attrs.get("href").unwrap_or_default().to_string();
            let children = convert_children(node, assets, options)?;
            match internal_target(&href, options) {
                Some(to) => Ok(RenderNode::InternalLink {
                    to,
                    class: attrs.get("class").map(ToString::to_string),
                    children,
                }),
                None => Ok(plain_element(&tag, &attrs, children)),
            }
        }
        "video" | "audio" => {
            let kind = if tag == "video" {
                MediaKind::Video
            } else {
                MediaKind::Audio
            };
            let poster = match attrs.get(ATTR_POSTER_INDEX).and_then(parse_index) {
                Some(index) => {
                    let record = asset_at(assets, index)?;
                    Some(poster_url(record))
                }
                None => attrs.get("poster").map(ToString::to_string),
            };
            let children = convert_children(node, assets, options)?;
            Ok(RenderNode::Media(MediaNode {
                kind,
                poster,
                class: attrs.get("class").map(ToString::to_string),
                attrs: kept_attrs(&attrs, &["class", "poster"]),
                children,
            }))
        }
        "source" => {
            let src = match attrs.get(ATTR_SOURCE_INDEX).and_then(parse_index) {
                Some(index) => asset_at(assets, index)?.display_url().to_string(),
                None => attrs.get("src").unwrap_or_default().to_string(),
            };
            Ok(RenderNode::MediaSource {
                src,
                attrs: kept_attrs(&attrs, &["src"]),
            })
        }
        _ => {
            let children = convert_children(node, assets, options)?;
            Ok(plain_element(&tag, &attrs, children))
        }
    }
}

fn image_node(record: &AssetRecord, attrs: &kuchiki::Attributes) -> ImageNode {
    let image = match &record.payload {
        AssetPayload::Image(image) => image.clone(),
        AssetPayload::File => ResponsiveImage::plain(record.display_url()),
    };
    let alt = attrs
        .get("alt")
        .filter(|v| !v.is_empty())
        .or_else(|| attrs.get("title").filter(|v| !v.is_empty()))
        .map(ToString::to_string);
    let class = match attrs.get("class") {
        Some(existing) if !existing.is_empty() => format!("{existing} {INLINE_IMAGE_CLASS}"),
        _ => INLINE_IMAGE_CLASS.to_string(),
    };
    ImageNode {
        image,
        alt,
        title: attrs.get("title").map(ToString::to_string),
        class,
        width_px: attrs.get("width").and_then(|w| w.trim().parse().ok()),
    }
}

fn poster_url(record: &AssetRecord) -> String {
    match &record.payload {
        AssetPayload::Image(image) => image.poster_url().to_string(),
        AssetPayload::File => record.display_url().to_string(),
    }
}

fn plain_element(tag: &str, attrs: &kuchiki::Attributes, children: Vec<RenderNode>) -> RenderNode {
    RenderNode::Element(ElementNode {
        tag: tag.to_string(),
        attrs: kept_attrs(attrs, &[]),
        children,
    })
}

/// All attributes except `data-gts-*` markers and the names in `skip`.
fn kept_attrs(attrs: &kuchiki::Attributes, skip: &[&str]) -> Vec<(String, String)> {
    attrs
        .map
        .iter()
        .filter_map(|(name, attr)| {
            let local = name.local.to_string();
            if is_marker(&local) || skip.contains(&local.as_str()) {
                None
            } else {
                Some((local, attr.value.clone()))
            }
        })
        .collect()
}

fn is_marker(name: &str) -> bool {
    matches!(
        name,
        ATTR_IMG_INDEX | ATTR_LINK_INDEX | ATTR_POSTER_INDEX | ATTR_SOURCE_INDEX | ATTR_PROCESSED
    )
}

fn parse_index(value: &str) -> Option<usize> {
    value.trim().parse().ok()
}

fn asset_at<'a>(
    assets: &'a [AssetRecord],
    index: usize,
) -> Result<&'a AssetRecord, SubstituteError> {
    assets.get(index).ok_or(SubstituteError::AssetIndexOutOfRange {
        index,
        len: assets.len(),
    })
}

/// Router target for an on-site link, or `None` when the href leaves the
/// site (or points into the uploads area, which is handled elsewhere).
///
/// When the site lives under a subdirectory, the subdirectory is stripped
/// from the target so the consumer's router sees a root-relative path.
fn internal_target(href: &str, options: &SubstituteOptions) -> Option<String> {
    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let absolute = if is_relative(href) {
        let base = Url::parse(&options.site_url).ok()?;
        base.join(href).ok()?.to_string()
    } else {
        href.to_string()
    };

    let href_cmp = strip_protocol(&absolute);
    let site_cmp = strip_protocol(&options.site_url);
    let uploads_cmp = strip_protocol(&options.uploads_url);
    if !href_cmp.contains(site_cmp.as_ref()) || href_cmp.contains(uploads_cmp.as_ref()) {
        return None;
    }

    let url = Url::parse(&absolute).ok()?;
    let site = Url::parse(&options.site_url).ok()?;
    let mut to = url.path().to_string();
    let subdirectory = site.path();
    if subdirectory != "/" && !subdirectory.is_empty() {
        to = to.replacen(subdirectory, "/", 1);
    }
    if let Some(query) = url.query() {
        to.push('?');
        to.push_str(query);
    }
    if let Some(fragment) = url.fragment() {
        to.push('#');
        to.push_str(fragment);
    }
    Some(to)
}
