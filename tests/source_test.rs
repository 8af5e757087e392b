mod common;

use common::{LogCapture, candidate, settings};
use serde_json::json;
use std::time::{Duration, Instant};
use wallfetch::error::Error;
use wallfetch::source::{Orientation, SearchOptions, SourceKind, build_source};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn wallhaven_item(id: &str, base: &str) -> serde_json::Value {
    json!({
        "id": id,
        "url": format!("{base}/w/{id}"),
        "path": format!("{base}/full/{id}.jpg"),
        "dimension_x": 1920,
        "dimension_y": 1080,
        "thumbs": {"large": format!("{base}/th/l/{id}.jpg"), "small": format!("{base}/th/s/{id}.jpg")}
    })
}

fn search(query: &str) -> SearchOptions {
    SearchOptions {
        query: Some(query.to_string()),
        ..SearchOptions::default()
    }
}

#[tokio::test]
async fn test_malformed_entry_is_skipped_with_one_warning() {
    let server = MockServer::start().await;
    let base = server.uri();
    let mut data: Vec<serde_json::Value> =
        (1..=5).map(|i| wallhaven_item(&format!("ok{i}"), &base)).collect();
    // 缺少必需的 path 字段
    data.insert(2, json!({"id": "broken", "dimension_x": 10}));

    Mock::given(method("GET"))
        .and(path("/api/v1/search"))
        .and(query_param("apikey", "wh-key"))
        .and(query_param("q", "nature"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": data })))
        .expect(1)
        .mount(&server)
        .await;

    let (logs, _guard) = LogCapture::install();
    let source = build_source(
        SourceKind::Wallhaven,
        reqwest::Client::new(),
        settings(&base, Some("wh-key"), Duration::ZERO),
    );

    let candidates = source.list(&search("nature")).await.unwrap();

    assert_eq!(candidates.len(), 5);
    assert!(candidates.iter().all(|c| c.id.starts_with("ok")));
    assert_eq!(candidates[0].category, "nature");
    assert_eq!(logs.count("skipping malformed listing entry"), 1);
}

#[tokio::test]
async fn test_wallhaven_without_key_scrapes_and_resolves_detail_page() {
    let server = MockServer::start().await;
    let base = server.uri();

    let listing = r#"<section class="thumb-listing-page"><ul>
        <li><figure class="thumb" data-wallpaper-id="abc123">
            <div class="thumb-info"><span class="wall-res">2560 x 1440</span></div>
        </figure></li>
    </ul></section>"#;
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("q", "forest"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing))
        .expect(1)
        .mount(&server)
        .await;

    let detail = format!(r#"<img id="wallpaper" src="{base}/full/abc123.png">"#);
    Mock::given(method("GET"))
        .and(path("/w/abc123"))
        .respond_with(ResponseTemplate::new(200).set_body_string(detail))
        .expect(1)
        .mount(&server)
        .await;

    let source = build_source(
        SourceKind::Wallhaven,
        reqwest::Client::new(),
        settings(&base, None, Duration::ZERO),
    );

    let candidates = source.list(&search("forest")).await.unwrap();
    assert_eq!(candidates.len(), 1);
    assert_eq!((candidates[0].width, candidates[0].height), (Some(2560), Some(1440)));

    let url = source.resolve(&candidates[0]).await.unwrap();
    assert_eq!(url, format!("{base}/full/abc123.png"));
}

#[tokio::test]
async fn test_list_waits_between_requests() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
        .expect(3)
        .mount(&server)
        .await;

    let source = build_source(
        SourceKind::Wallhaven,
        reqwest::Client::new(),
        settings(&server.uri(), Some("k"), Duration::from_millis(200)),
    );

    let started = Instant::now();
    for _ in 0..3 {
        source.list(&SearchOptions::default()).await.unwrap();
    }
    assert!(started.elapsed() >= Duration::from_millis(400));
}

#[tokio::test]
async fn test_missing_credential_fails_before_any_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    for kind in [SourceKind::Unsplash, SourceKind::Pixabay] {
        let source = build_source(
            kind,
            reqwest::Client::new(),
            settings(&server.uri(), Some("   "), Duration::ZERO),
        );
        let err = source.list(&SearchOptions::default()).await.unwrap_err();
        match err {
            Error::MissingCredential { env_var, .. } => {
                assert_eq!(env_var, kind.credential_env())
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}

#[tokio::test]
async fn test_keyed_sources_refuse_to_resolve_without_credential() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let mut listed = candidate("k1", Some(format!("{}/full/k1.jpg", server.uri())));
    listed.extra = Some(format!("{}/photos/k1/download", server.uri()));

    for kind in [SourceKind::Unsplash, SourceKind::Pixabay] {
        let source = build_source(
            kind,
            reqwest::Client::new(),
            settings(&server.uri(), None, Duration::ZERO),
        );
        match source.resolve(&listed).await {
            Err(Error::MissingCredential { env_var, .. }) => {
                assert_eq!(env_var, kind.credential_env())
            }
            other => panic!("{kind:?}: expected missing credential, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn test_unsplash_search_sends_client_id_and_tracks_download() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/search/photos"))
        .and(header("Authorization", "Client-ID us-key"))
        .and(header("Accept-Version", "v1"))
        .and(query_param("query", "ocean"))
        .and(query_param("orientation", "portrait"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "total": 1,
            "results": [{
                "id": "u1",
                "width": 4000,
                "height": 6000,
                "alt_description": "blue wave",
                "urls": {"raw": format!("{base}/raw/u1"), "full": format!("{base}/full/u1")},
                "links": {"download_location": format!("{base}/photos/u1/download")},
                "user": {"username": "surfer"}
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/photos/u1/download"))
        .and(header("Authorization", "Client-ID us-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"url": "x"})))
        .expect(1)
        .mount(&server)
        .await;

    let source = build_source(
        SourceKind::Unsplash,
        reqwest::Client::new(),
        settings(&base, Some("us-key"), Duration::ZERO),
    );

    let options = SearchOptions {
        orientation: Orientation::Portrait,
        ..search("ocean")
    };
    let candidates = source.list(&options).await.unwrap();
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].title, "blue wave_by_surfer");

    let url = source.resolve(&candidates[0]).await.unwrap();
    assert_eq!(url, format!("{base}/full/u1"));
}

#[tokio::test]
async fn test_unsplash_without_query_uses_random_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/photos/random"))
        .and(query_param("count", "30"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "r1", "urls": {"regular": "https://img/r1"}}
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let source = build_source(
        SourceKind::Unsplash,
        reqwest::Client::new(),
        settings(&server.uri(), Some("k"), Duration::ZERO),
    );

    let candidates = source.list(&SearchOptions::default()).await.unwrap();
    assert_eq!(candidates[0].category, "unsplash");
}

#[tokio::test]
async fn test_pixabay_passes_key_and_size_filters() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/"))
        .and(query_param("key", "px-key"))
        .and(query_param("q", "city"))
        .and(query_param("min_width", "3840"))
        .and(query_param("min_height", "2160"))
        .and(query_param("orientation", "horizontal"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "hits": [
                {"id": 11, "tags": "city, night", "largeImageURL": "https://px/l11.jpg"},
                {"tags": "no id"}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let source = build_source(
        SourceKind::Pixabay,
        reqwest::Client::new(),
        settings(&format!("{}/api/", server.uri()), Some("px-key"), Duration::ZERO),
    );

    let options = SearchOptions {
        resolution: Some("3840x2160".to_string()),
        ..search("city")
    };
    let candidates = source.list(&options).await.unwrap();
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].title, "city night_11");
    assert_eq!(source.resolve(&candidates[0]).await.unwrap(), "https://px/l11.jpg");
}

#[tokio::test]
async fn test_error_status_and_bad_shape_fail_the_listing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/search"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/search"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"error": "bad"})))
        .mount(&server)
        .await;

    let source = build_source(
        SourceKind::Wallhaven,
        reqwest::Client::new(),
        settings(&server.uri(), Some("k"), Duration::ZERO),
    );

    let err = source.list(&SearchOptions::default()).await.unwrap_err();
    assert!(matches!(err, Error::Status { status: 429, .. }));

    let page_two = SearchOptions {
        page: 2,
        ..SearchOptions::default()
    };
    let err = source.list(&page_two).await.unwrap_err();
    assert!(matches!(err, Error::Malformed { .. }));
}
