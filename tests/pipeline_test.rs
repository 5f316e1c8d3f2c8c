//! End-to-end pipeline tests against an in-memory store.

mod common;

use std::sync::Arc;

use cms_media_mirror::{
    ContentPipeline, HttpAcquirer, MirrorConfig, RenderNode, SubstituteError,
};
use common::{MemoryStore, init_logging};

const SITE: &str = "https://server.com/";
const UPLOADS: &str = "https://server.com/wp-content/uploads/";

fn config() -> MirrorConfig {
    MirrorConfig::builder()
        .site(SITE, UPLOADS)
        .build()
        .expect("valid config")
}

fn pipeline(store: MemoryStore) -> ContentPipeline<MemoryStore, HttpAcquirer> {
    let dir = std::env::temp_dir();
    let acquirer = HttpAcquirer::new(dir.join("mirror-cache"), dir.join("mirror-static"), "/static")
        .expect("acquirer");
    ContentPipeline::new(config(), Arc::new(store), Arc::new(acquirer))
}

#[tokio::test]
async fn known_image_is_unwrapped_rewritten_and_indexed() {
    init_logging();
    let store = MemoryStore::new().with_image(
        "https://server.com/wp-content/uploads/2024/photo.jpg",
        "img-1",
        "/m/photo.jpg",
    );
    let pipeline = pipeline(store);

    let html = format!(
        r#"<p><img src="{UPLOADS}2024/photo.jpg?w=300" srcset="{UPLOADS}2024/photo.jpg 1024w" sizes="100vw" alt="Photo"></p>"#
    );
    let result = pipeline.scan_and_rewrite(&html, false).await;

    assert!(!result.content.contains("<p>"));
    assert!(result.content.contains(r#"src="/m/photo.jpg""#));
    assert!(result.content.contains(r#"data-gts-encfluid="0""#));
    assert!(!result.content.contains("srcset"));
    assert!(!result.content.contains("sizes"));
    assert_eq!(result.found_assets.len(), 1);
    assert_eq!(result.found_assets[0].id, "img-1");
    assert!(!result.did_download_work);

    let nodes: Vec<RenderNode> = pipeline.substitute(&result).expect("substitute");
    let image = nodes
        .iter()
        .find_map(|n| match n {
            RenderNode::Image(image) => Some(image),
            _ => None,
        })
        .expect("an image node");
    assert_eq!(image.image.src, "/m/photo.jpg");
    assert_eq!(image.alt.as_deref(), Some("Photo"));
}

#[tokio::test]
async fn reparsing_rewritten_content_reaches_a_fixed_point() {
    init_logging();
    let store = MemoryStore::new().with_image(
        "https://server.com/wp-content/uploads/2024/photo.jpg",
        "img-1",
        "/m/photo.jpg",
    );
    let pipeline = pipeline(store);

    let html = format!(r#"<p><img src="{UPLOADS}2024/photo.jpg"></p>"#);
    let first = pipeline.scan_and_rewrite(&html, false).await;
    let second = pipeline.scan_and_rewrite(&first.content, false).await;
    let third = pipeline.scan_and_rewrite(&second.content, false).await;

    // Local URLs are not classified again, so nothing accumulates.
    assert_eq!(second.content, third.content);
    assert_eq!(second.content.matches("data-gts-encfluid").count(), 1);
    assert!(second.found_assets.is_empty());
}

#[tokio::test]
async fn duplicate_references_share_one_found_asset() {
    init_logging();
    let store = MemoryStore::new().with_image(
        "https://server.com/wp-content/uploads/a.jpg",
        "img-a",
        "/m/a.jpg",
    );
    let pipeline = pipeline(store);

    let html = format!(
        r#"<img src="{UPLOADS}a.jpg"><img src="/wp-content/uploads/a.jpg?w=150"><a href="{UPLOADS}a.jpg">full size</a>"#
    );
    let result = pipeline.scan_and_rewrite(&html, false).await;

    assert_eq!(result.found_assets.len(), 1);
    assert_eq!(result.content.matches(r#"data-gts-encfluid="0""#).count(), 2);
    assert!(result.content.contains(r#"data-gts-swapped-href="0""#));
}

#[tokio::test]
async fn video_gets_poster_swap_and_metadata_preload() {
    init_logging();
    let store = MemoryStore::new()
        .with_image(
            "https://server.com/wp-content/uploads/poster.jpg",
            "img-p",
            "/m/poster.jpg",
        )
        .with_file(
            "https://server.com/wp-content/uploads/clip.mp4",
            "file-c",
            "/m/clip.mp4",
        );
    let pipeline = pipeline(store);

    let html = format!(
        r#"<video poster="{UPLOADS}poster.jpg"><source src="{UPLOADS}clip.mp4" type="video/mp4"></video>"#
    );
    let result = pipeline.scan_and_rewrite(&html, false).await;

    assert!(result.content.contains(r#"preload="metadata""#));
    assert!(result.content.contains("data-gts-processed"));
    assert!(result.content.contains(r#"poster="/m/poster.jpg""#));
    assert!(result.content.contains(r#"src="/m/clip.mp4""#));
    assert_eq!(result.found_assets.len(), 2);

    let nodes = pipeline.substitute(&result).expect("substitute");
    let media = nodes
        .iter()
        .find_map(|n| match n {
            RenderNode::Media(media) => Some(media),
            _ => None,
        })
        .expect("a media node");
    assert_eq!(media.poster.as_deref(), Some("/m/poster.jpg"));
}

#[tokio::test]
async fn known_document_link_is_swapped_at_index_zero() {
    init_logging();
    let store = MemoryStore::new().with_file(
        "https://server.com/wp-content/uploads/2019/12/MyPdf.pdf",
        "pdf-1",
        "/m/MyPdf.pdf",
    );
    let pipeline = pipeline(store);

    let html = format!(r#"<a href="{UPLOADS}2019/12/MyPdf.pdf">text</a>"#);
    let result = pipeline.scan_and_rewrite(&html, false).await;

    assert!(result.content.contains(r#"href="/m/MyPdf.pdf""#));
    assert!(result.content.contains(r#"data-gts-swapped-href="0""#));
    assert_eq!(result.found_assets.len(), 1);
    assert_eq!(result.found_assets[0].id, "pdf-1");
}

#[tokio::test]
async fn unknown_references_pass_through_unchanged() {
    init_logging();
    let pipeline = pipeline(MemoryStore::new());

    let html = format!(
        r#"<img src="{UPLOADS}unknown.jpg"><a href="{UPLOADS}files/Missing.pdf">m</a>"#
    );
    let result = pipeline.scan_and_rewrite(&html, false).await;

    assert!(result.content.contains(&format!(r#"src="{UPLOADS}unknown.jpg""#)));
    assert!(result.content.contains(&format!(r#"href="{UPLOADS}files/Missing.pdf""#)));
    assert!(!result.content.contains("data-gts-"));
    assert!(result.found_assets.is_empty());
    assert!(!result.did_download_work);
}

#[tokio::test]
async fn empty_content_short_circuits() {
    init_logging();
    let pipeline = pipeline(MemoryStore::new());
    let result = pipeline.scan_and_rewrite("   ", false).await;
    assert_eq!(result.content, "   ");
    assert!(result.found_assets.is_empty());
}

#[tokio::test]
async fn stale_index_against_truncated_list_fails_loud() {
    init_logging();
    let pipeline = pipeline(MemoryStore::new());

    let rewritten = r#"<img src="/m/photo.jpg" data-gts-encfluid="2">"#;
    let mut result = pipeline.scan_and_rewrite("<p>x</p>", false).await;
    result.content = rewritten.to_string();

    let err = pipeline.substitute(&result).expect_err("must fail");
    assert_eq!(err, SubstituteError::AssetIndexOutOfRange { index: 2, len: 0 });
}

#[tokio::test]
async fn cached_parse_is_computed_once() {
    init_logging();
    let store = MemoryStore::new().with_image(
        "https://server.com/wp-content/uploads/a.jpg",
        "img-a",
        "/m/a.jpg",
    );
    let pipeline = Arc::new(pipeline(store));

    let html = format!(r#"<img src="{UPLOADS}a.jpg">"#);
    let first = pipeline
        .parse_cached(Some("post-1"), "content", "Post", &html, false)
        .await;
    let second = pipeline
        .parse_cached(Some("post-1"), "content", "Post", &html, false)
        .await;

    assert!(Arc::ptr_eq(&first, &second));

    // A different field is a different key.
    let excerpt = pipeline
        .parse_cached(Some("post-1"), "excerpt", "Post", &html, false)
        .await;
    assert!(!Arc::ptr_eq(&first, &excerpt));
}

#[tokio::test]
async fn internal_links_become_router_targets() {
    init_logging();
    let pipeline = pipeline(MemoryStore::new());

    let html = r#"<a href="https://server.com/about/#team">about</a>"#;
    let result = pipeline.scan_and_rewrite(html, false).await;
    let nodes = pipeline.substitute(&result).expect("substitute");

    let target = nodes
        .iter()
        .find_map(|n| match n {
            RenderNode::InternalLink { to, .. } => Some(to.clone()),
            _ => None,
        })
        .expect("an internal link");
    assert_eq!(target, "/about/#team");
}
