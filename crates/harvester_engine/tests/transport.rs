use harvester_core::{Cursor, Position, SourceConfig};
use harvester_engine::{
    CredentialBag, FailureKind, FetchSettings, PageTransport, ReqwestTransport, TransportError,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config(endpoint: String, extra: serde_json::Value) -> SourceConfig {
    let mut base = json!({
        "name": "tvil",
        "endpoint": endpoint,
        "pagination": { "OffsetLimit": { "limit": 20 } },
        "fields": [{ "name": "id", "path": "id" }],
    });
    if let (Some(base), Some(extra)) = (base.as_object_mut(), extra.as_object()) {
        base.extend(extra.clone());
    }
    serde_json::from_value(base).expect("valid config")
}

fn offset(offset: usize) -> Cursor {
    Cursor::new(Position::Offset { offset, limit: 20 })
}

#[tokio::test]
async fn json_page_is_requested_with_cursor_query_and_cookies() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/entities"))
        .and(query_param("offset", "40"))
        .and(query_param("limit", "20"))
        .and(query_param("params", r#"{"city":"irkutsk"}"#))
        .and(header("cookie", "sid=abc; yuid=42"))
        .and(header("x-requested-with", "XMLHttpRequest"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [{ "id": 1 }] })))
        .expect(1)
        .mount(&server)
        .await;

    let transport = ReqwestTransport::new(
        &config(
            format!("{}/api/entities", server.uri()),
            json!({
                "query": {
                    "offset": "{offset}",
                    "limit": "{limit}",
                    "params": r#"{"city":"irkutsk"}"#,
                },
                "headers": { "X-Requested-With": "XMLHttpRequest" },
            }),
        ),
        FetchSettings::default(),
    )
    .expect("transport");
    let mut credentials = CredentialBag::new();
    credentials.insert("sid", "abc");
    credentials.insert("yuid", "42");

    let page = transport.fetch(&offset(40), &credentials).await.expect("page");

    assert_eq!(page.body, json!({ "data": [{ "id": 1 }] }));
}

#[tokio::test]
async fn endpoint_template_carries_page_numbers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/hotels/page/3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;
    let transport = ReqwestTransport::new(
        &config(format!("{}/hotels/page/{{page}}", server.uri()), json!({})),
        FetchSettings::default(),
    )
    .expect("transport");

    let page = transport
        .fetch(&Cursor::new(Position::Page(3)), &CredentialBag::new())
        .await
        .expect("page");

    assert_eq!(page.body, json!([]));
}

#[tokio::test]
async fn request_body_switches_to_post() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hotel/search/v1/site/hp/search"))
        .and(header("content-type", "application/json"))
        .and(body_json(json!({ "hotel": "baikal_hotel", "page": 2, "currency": "RUB" })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "ota_hotel_id": "baikal_hotel" })),
        )
        .expect(1)
        .mount(&server)
        .await;
    let transport = ReqwestTransport::new(
        &config(
            format!("{}/hotel/search/v1/site/hp/search", server.uri()),
            json!({
                "request_body": r#"{"hotel": "baikal_hotel", "page": {page}, "currency": "RUB"}"#,
            }),
        ),
        FetchSettings::default(),
    )
    .expect("transport");

    let page = transport
        .fetch(&Cursor::new(Position::Page(2)), &CredentialBag::new())
        .await
        .expect("page");

    assert_eq!(page.body, json!({ "ota_hotel_id": "baikal_hotel" }));
}

#[tokio::test]
async fn rejected_credentials_are_session_expired() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;
    let transport = ReqwestTransport::new(&config(server.uri(), json!({})), FetchSettings::default())
        .expect("transport");

    let err = transport
        .fetch(&offset(0), &CredentialBag::new())
        .await
        .unwrap_err();

    assert_eq!(err.kind, FailureKind::SessionExpired);
    assert!(!err.kind.is_retryable());
}

#[tokio::test]
async fn server_errors_keep_their_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    let transport = ReqwestTransport::new(&config(server.uri(), json!({})), FetchSettings::default())
        .expect("transport");

    let err = transport
        .fetch(&offset(0), &CredentialBag::new())
        .await
        .unwrap_err();

    assert_eq!(err.kind, FailureKind::HttpStatus(503));
    assert!(err.kind.is_retryable());
}

#[tokio::test]
async fn broken_json_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("{\"data\": [", "application/json"))
        .mount(&server)
        .await;
    let transport = ReqwestTransport::new(&config(server.uri(), json!({})), FetchSettings::default())
        .expect("transport");

    let err = transport
        .fetch(&offset(0), &CredentialBag::new())
        .await
        .unwrap_err();

    assert_eq!(err.kind, FailureKind::Malformed);
}

#[tokio::test]
async fn oversized_body_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Content-Type", "application/json")
                .set_body_string("[0,1,2,3,4,5,6,7,8,9]"),
        )
        .mount(&server)
        .await;
    let settings = FetchSettings {
        max_bytes: 10,
        ..FetchSettings::default()
    };
    let transport =
        ReqwestTransport::new(&config(server.uri(), json!({})), settings).expect("transport");

    let err = transport
        .fetch(&offset(0), &CredentialBag::new())
        .await
        .unwrap_err();

    assert_eq!(
        err.kind,
        FailureKind::TooLarge {
            max_bytes: 10,
            actual: Some(21)
        }
    );
}

#[tokio::test]
async fn images_are_not_listing_pages() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(vec![0u8; 4], "image/png"))
        .mount(&server)
        .await;
    let transport = ReqwestTransport::new(&config(server.uri(), json!({})), FetchSettings::default())
        .expect("transport");

    let err = transport
        .fetch(&offset(0), &CredentialBag::new())
        .await
        .unwrap_err();

    assert_eq!(
        err.kind,
        FailureKind::UnsupportedContentType {
            content_type: "image/png".to_string()
        }
    );
}

#[tokio::test]
async fn rendered_pages_are_parsed_into_cards() {
    let server = MockServer::start().await;
    let html = r#"<html><body>
        <div class="card"><a class="name" href="/h/1">Ангара</a><span class="price">3&#8239;900 ₽</span></div>
        <div class="card"><a class="name" href="/h/2">Байкал</a></div>
        <div class="pages"><a>1</a><a>2</a></div>
    </body></html>"#;
    Mock::given(method("GET"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(html, "text/html; charset=utf-8"))
        .mount(&server)
        .await;
    let transport = ReqwestTransport::new(
        &config(
            format!("{}/hotels", server.uri()),
            json!({
                "query": { "page": "{page}" },
                "pagination": { "LinkPresence": {} },
                "format": { "Html": {
                    "card": "div.card",
                    "fields": [
                        { "name": "name", "selector": "a.name" },
                        { "name": "url", "selector": "a.name", "attr": "href" },
                        { "name": "price", "selector": ".price" },
                    ],
                    "page_links": ".pages a",
                } },
            }),
        ),
        FetchSettings::default(),
    )
    .expect("transport");

    let page = transport
        .fetch(&Cursor::new(Position::Page(1)), &CredentialBag::new())
        .await
        .expect("page");

    assert_eq!(
        page.body,
        json!([
            { "name": "Ангара", "url": "/h/1", "price": "3 900 ₽" },
            { "name": "Байкал", "url": "/h/2", "price": null },
        ])
    );
    assert_eq!(page.meta.has_next_link, Some(true));
}

#[test]
fn invalid_headers_and_selectors_fail_construction() {
    let bad_header = config(
        "https://example.test".to_string(),
        json!({ "headers": { "bad header": "x" } }),
    );
    assert!(matches!(
        ReqwestTransport::new(&bad_header, FetchSettings::default()),
        Err(TransportError::InvalidHeader { .. })
    ));

    let bad_selector = config(
        "https://example.test".to_string(),
        json!({ "format": { "Html": { "card": "div[", "fields": [] } } }),
    );
    assert!(matches!(
        ReqwestTransport::new(&bad_selector, FetchSettings::default()),
        Err(TransportError::InvalidSelector { .. })
    ));
}

#[test]
fn unparsable_endpoint_is_invalid_url() {
    let transport = ReqwestTransport::new(
        &config("not a url/{page}".to_string(), json!({})),
        FetchSettings::default(),
    )
    .expect("transport");

    let err = transport.page_url(&offset(0)).unwrap_err();

    assert_eq!(err.kind, FailureKind::InvalidUrl);
}

#[test]
fn source_vars_fill_endpoint_query_and_body() {
    let transport = ReqwestTransport::new(
        &config(
            "https://ostrovok.example/hotel/{region}/rates".to_string(),
            json!({
                "query": { "offset": "{offset}", "region": "{region}" },
                "request_body": r#"{"hotel": "{hotel}", "checkin": "{checkin}", "page": {page}}"#,
                "vars": { "hotel": "angara_irkutsk", "checkin": "2026-01-25", "region": "irkutsk" },
            }),
        ),
        FetchSettings::default(),
    )
    .expect("transport");

    let url = transport.page_url(&offset(20)).expect("url");
    let body = transport.request_body(&offset(20)).expect("posts");

    assert_eq!(
        url.as_str(),
        "https://ostrovok.example/hotel/irkutsk/rates?offset=20&region=irkutsk"
    );
    assert_eq!(
        serde_json::from_str::<serde_json::Value>(&body).expect("json body"),
        json!({ "hotel": "angara_irkutsk", "checkin": "2026-01-25", "page": 2 })
    );
}

#[test]
fn vars_cannot_shadow_cursor_placeholders() {
    let transport = ReqwestTransport::new(
        &config(
            "https://tvil.example/api".to_string(),
            json!({ "query": { "offset": "{offset}" }, "vars": { "offset": "999" } }),
        ),
        FetchSettings::default(),
    )
    .expect("transport");

    let url = transport.page_url(&offset(40)).expect("url");

    assert_eq!(url.query(), Some("offset=40"));
}
