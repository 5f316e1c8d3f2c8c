//! Acquisition tests against a mock HTTP server.

mod common;

use std::sync::Arc;

use cms_media_mirror::{ContentPipeline, HttpAcquirer, MirrorConfig, RenderNode};
use common::{MemoryStore, init_logging};
use tempfile::TempDir;

struct Fixture {
    pipeline: ContentPipeline<MemoryStore, HttpAcquirer>,
    server: mockito::ServerGuard,
    _cache_dir: TempDir,
    static_dir: TempDir,
}

async fn fixture() -> Fixture {
    init_logging();
    let server = mockito::Server::new_async().await;
    let config = MirrorConfig::builder()
        .site(
            format!("{}/", server.url()),
            format!("{}/wp-content/uploads/", server.url()),
        )
        .http_header("X-Mirror-Token", "test-token")
        .build()
        .expect("valid config");

    let cache_dir = TempDir::new().expect("cache dir");
    let static_dir = TempDir::new().expect("static dir");
    let acquirer = HttpAcquirer::new(cache_dir.path(), static_dir.path(), "/static")
        .expect("acquirer");

    Fixture {
        pipeline: ContentPipeline::new(config, Arc::new(MemoryStore::new()), Arc::new(acquirer)),
        server,
        _cache_dir: cache_dir,
        static_dir,
    }
}

#[tokio::test]
async fn missing_document_is_acquired_and_marker_swapped() {
    let mut fx = fixture().await;
    let mock = fx
        .server
        .mock("GET", "/wp-content/uploads/files/report.pdf")
        .match_header("X-Mirror-Token", "test-token")
        .with_status(200)
        .with_body("%PDF-1.4")
        .create_async()
        .await;

    let html = format!(
        r#"<a href="{}/wp-content/uploads/files/report.pdf">report</a>"#,
        fx.server.url()
    );
    let result = fx.pipeline.scan_and_rewrite(&html, true).await;

    mock.assert_async().await;
    assert!(result.did_download_work);
    assert!(result.content.contains(r#"href="/static/report.pdf""#));
    assert!(result.content.contains(r#"data-gts-swapped-href="gts-swapped-href""#));
    // Not in the store, so nothing joins the found-assets list yet.
    assert!(result.found_assets.is_empty());
    assert!(fx.static_dir.path().join("report.pdf").is_file());

    // The render side keeps the local href without needing an index.
    let nodes = fx.pipeline.substitute(&result).expect("substitute");
    let href = nodes
        .iter()
        .find_map(|n| match n {
            RenderNode::AssetLink { href, .. } => Some(href.clone()),
            _ => None,
        })
        .expect("an asset link");
    assert_eq!(href, "/static/report.pdf");
}

#[tokio::test]
async fn acquired_image_gets_a_base_rendition() {
    let mut fx = fixture().await;
    let mock = fx
        .server
        .mock("GET", "/wp-content/uploads/2024/photo.jpg")
        .with_status(200)
        .with_body([0xFF, 0xD8, 0xFF].as_slice())
        .create_async()
        .await;

    let html = format!(
        r#"<img src="{}/wp-content/uploads/2024/photo.jpg">"#,
        fx.server.url()
    );
    let result = fx.pipeline.scan_and_rewrite(&html, true).await;

    mock.assert_async().await;
    assert!(result.did_download_work);
    assert!(result.content.contains(r#"src="/static/photo.jpg""#));
    // Acquired this parse, so no index is stamped yet.
    assert!(!result.content.contains("data-gts-encfluid"));
    assert!(fx.static_dir.path().join("photo.jpg").is_file());
}

#[tokio::test]
async fn not_found_is_cached_and_never_refetched() {
    let mut fx = fixture().await;
    let mock = fx
        .server
        .mock("GET", "/wp-content/uploads/gone.jpg")
        .with_status(404)
        .expect(1)
        .create_async()
        .await;

    let url = format!("{}/wp-content/uploads/gone.jpg", fx.server.url());
    let html = format!(r#"<img src="{url}">"#);

    let first = fx.pipeline.scan_and_rewrite(&html, true).await;
    let second = fx.pipeline.scan_and_rewrite(&html, true).await;

    mock.assert_async().await;
    assert!(!first.did_download_work);
    assert!(!second.did_download_work);
    assert!(fx.pipeline.negatives().has_404(&url));
    // The reference stays on the origin URL.
    assert!(second.content.contains(&url));
}

#[tokio::test]
async fn server_errors_do_not_poison_the_negative_caches() {
    let mut fx = fixture().await;
    let mock = fx
        .server
        .mock("GET", "/wp-content/uploads/flaky.jpg")
        .with_status(500)
        .expect(2)
        .create_async()
        .await;

    let url = format!("{}/wp-content/uploads/flaky.jpg", fx.server.url());
    let html = format!(r#"<img src="{url}">"#);

    fx.pipeline.scan_and_rewrite(&html, true).await;
    fx.pipeline.scan_and_rewrite(&html, true).await;

    // A transient 500 is retried on the next parse.
    mock.assert_async().await;
    assert!(!fx.pipeline.negatives().has_404(&url));
    assert!(fx.pipeline.negatives().timeout_record(&url).is_none());
}
