use std::collections::BTreeMap;

use harvester_core::BootstrapConfig;
use harvester_engine::{
    bootstrap_from_config, BootstrapError, FetchSettings, LandingPageBootstrap, SessionBootstrap,
};
use pretty_assertions::assert_eq;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn landing_page_cookies_are_collected() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/hotels/irkutsk/"))
        .and(header("user-agent", "Mozilla/5.0 (harvest test)"))
        .respond_with(
            ResponseTemplate::new(200)
                .append_header("Set-Cookie", "yandexuid=9001; Path=/; Secure")
                .append_header("Set-Cookie", "i=abc==; HttpOnly")
                .set_body_string("<html></html>"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let bootstrap = LandingPageBootstrap::new(
        format!("{}/hotels/irkutsk/", server.uri()),
        FetchSettings::default(),
    )
    .with_user_agent("Mozilla/5.0 (harvest test)");

    let credentials = bootstrap.bootstrap().await.expect("bootstrap");

    assert_eq!(credentials.len(), 2);
    assert_eq!(credentials.get("yandexuid"), Some("9001"));
    assert_eq!(credentials.get("i"), Some("abc=="));
    assert_eq!(
        credentials.cookie_header().as_deref(),
        Some("i=abc==; yandexuid=9001")
    );
}

#[tokio::test]
async fn failing_landing_page_is_a_bootstrap_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let bootstrap = LandingPageBootstrap::new(server.uri(), FetchSettings::default());

    assert_eq!(
        bootstrap.bootstrap().await,
        Err(BootstrapError::HttpStatus(500))
    );
}

#[tokio::test]
async fn malformed_landing_url_is_rejected() {
    let bootstrap = LandingPageBootstrap::new("::nope::", FetchSettings::default());

    assert!(matches!(
        bootstrap.bootstrap().await,
        Err(BootstrapError::InvalidUrl { .. })
    ));
}

#[tokio::test]
async fn config_selects_static_credentials() {
    let cookies = BTreeMap::from([("session".to_string(), "s3cr3t".to_string())]);
    let settings = FetchSettings::default();

    let open = bootstrap_from_config(&BootstrapConfig::None, &settings)
        .bootstrap()
        .await
        .expect("bootstrap");
    let fixed = bootstrap_from_config(&BootstrapConfig::Static(cookies), &settings)
        .bootstrap()
        .await
        .expect("bootstrap");

    assert!(open.is_empty());
    assert_eq!(fixed.cookie_header().as_deref(), Some("session=s3cr3t"));
}
