//! The client against a real in-process highlighting service.

use std::path::Path;
use std::sync::Arc;

use futures::future::join_all;
use leafpress_core::{Config, HighlightClient, HighlightError, MarkdownRenderer, SiteUrls};
use leafpress_highlight::Server;

async fn start(dir: &Path) -> HighlightClient {
    let socket = dir.join("hl.sock");
    let server = Server::bind(&socket).unwrap();
    tokio::spawn(server.run());
    HighlightClient::connect(&socket).await.unwrap()
}

#[tokio::test]
async fn matches_service_output() {
    let dir = tempfile::tempdir().unwrap();
    let client = start(dir.path()).await;

    let code = "// greet\nfn main() { println!(\"hi\"); }\n";
    let html = client.highlight("rust", code).await.unwrap();
    assert_eq!(html, leafpress_highlight::highlight("rust", code).unwrap());
    assert!(html.contains("<span class=\"at\">"), "{html}");
}

#[tokio::test]
async fn concurrent_requests_resolve_to_their_own_responses() {
    let dir = tempfile::tempdir().unwrap();
    let client = Arc::new(start(dir.path()).await);

    let sources: Vec<String> = (0..64)
        .map(|i| format!("fn f{i}() -> u32 {{ {i} }}\n"))
        .collect();
    let calls = sources.iter().map(|code| {
        let client = client.clone();
        async move { client.highlight("rust", code).await }
    });
    let results = join_all(calls).await;

    for (code, result) in sources.iter().zip(results) {
        let html = result.unwrap();
        assert_eq!(html, leafpress_highlight::highlight("rust", code).unwrap());
    }
    assert_eq!(client.in_flight(), 0);
}

#[tokio::test]
async fn service_errors_reject_only_their_request() {
    let dir = tempfile::tempdir().unwrap();
    let client = start(dir.path()).await;

    let (bad, good) = tokio::join!(
        client.highlight("nonexistent", "x"),
        client.highlight("python", "def f(): pass\n"),
    );
    match bad {
        Err(HighlightError::Service(message)) => {
            assert!(message.contains("unsupported language"), "{message}")
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(good.unwrap().contains("def"));
}

#[tokio::test]
async fn renders_code_blocks_through_the_service() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("leafpress.yml");
    std::fs::write(
        &config_path,
        "paths:\n  content: content\n  templates: templates\nhighlighter:\n  socket: hl.sock\n",
    )
    .unwrap();
    let config = Config::from_file(&config_path).unwrap();

    let server = Server::bind(config.highlighter_socket().unwrap()).unwrap();
    tokio::spawn(server.run());
    let client = config.connect_highlighter().await.unwrap();

    let mut renderer = MarkdownRenderer::new(Arc::new(client), config.site_urls().into_resolver());
    let html = renderer
        .render_block(
            "# Example\n\n```rust\nlet x = 1;\n```\n\nSee [next](next.md).",
            Some(&config.content_dir()),
        )
        .await
        .unwrap();

    assert!(html.contains(r#"<h1 id="example">"#));
    assert!(html.contains(r#"<pre><code class="language-rust"><span class="#), "{html}");
    assert!(html.contains(r#"<a href="/next.html">next</a>"#));
}

#[test]
fn site_urls_follow_config() {
    let urls = SiteUrls::new("/srv/content", "/docs/");
    assert_eq!(
        urls.url_for(Path::new("/srv/content/a/b.md")).as_deref(),
        Some("/docs/a/b.html")
    );
}
