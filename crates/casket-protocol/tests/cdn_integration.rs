//! Patch server and CDN clients against a fake server

#![allow(clippy::expect_used, clippy::unwrap_used)]

use casket_crypto::{EncodingKey, Keyring};
use casket_protocol::{
    CdnClient, CdnEntry, HostResolver, HttpClient, PatchClient, ProtocolConfig, ProtocolError,
    refresh_keys,
};
use pretty_assertions::assert_eq;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const VERSIONS: &str = "Region!STRING:0|BuildConfig!HEX:16|CDNConfig!HEX:16|BuildId!DEC:4|VersionsName!String:0\n\
                        ## seqn = 7\n\
                        eu|11111111111111111111111111111111|22222222222222222222222222222222|100|1.0.0.100\n\
                        us|33333333333333333333333333333333|44444444444444444444444444444444|100|1.0.0.100\n";

const UNREACHABLE: &str = "127.0.0.1:1";

fn host_of(server: &MockServer) -> String {
    server.uri().trim_start_matches("http://").to_string()
}

fn http(config: &ProtocolConfig) -> HttpClient {
    HttpClient::new(config).expect("HTTP client should build")
}

#[tokio::test]
async fn test_patch_versions_and_cdns() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/wow/versions"))
        .respond_with(ResponseTemplate::new(200).set_body_string(VERSIONS))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/wow/cdns"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "Name!STRING:0|Path!STRING:0|Hosts!STRING:0\neu|tpr/wow|a.example b.example\nus|tpr/wow|c.example\n",
        ))
        .mount(&server)
        .await;

    let config = ProtocolConfig::new("us").with_patch_host(server.uri());
    let patch = PatchClient::new(http(&config), &config);

    let build = patch
        .version("wow")
        .await
        .expect("Versions should load")
        .expect("Region row should exist");
    assert_eq!(build.build_config, "33333333333333333333333333333333");
    assert_eq!(build.product, "wow");

    let cdn = patch.cdn("wow").await.expect("CDNs should load");
    assert_eq!(cdn.hosts, vec!["c.example"]);

    // products without a document are dropped
    let builds = patch.builds(&["wow", "wowt"]).await;
    assert_eq!(builds.len(), 1);
}

#[tokio::test]
async fn test_resolver_skips_dead_hosts() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let config = ProtocolConfig::default();
    let resolver = HostResolver::new(http(&config), 4);
    let hosts = vec![UNREACHABLE.to_string(), host_of(&server)];

    let best = resolver.best_host("us", &hosts).await.expect("One host should answer");
    assert_eq!(best, host_of(&server));

    resolver.mark_failed(&best);
    let ranked = resolver.ranked_hosts("us", &hosts).await.expect("Resolution is cached");
    assert_eq!(ranked.len(), 1);
}

#[tokio::test]
async fn test_resolver_fails_when_every_host_fails() {
    let config = ProtocolConfig::default();
    let resolver = HostResolver::new(http(&config), 4);
    let result = resolver
        .best_host("us", &[UNREACHABLE.to_string()])
        .await;
    assert!(matches!(result, Err(ProtocolError::AllHostsFailed(_))));
}

#[tokio::test]
async fn test_config_falls_back_to_next_host() {
    let bad = MockServer::start().await;
    let good = MockServer::start().await;
    let key = "0017a402f556fbece46c38dc431a2c9b";

    for server in [&bad, &good] {
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200))
            .mount(server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path(format!("/tpr/wow/config/00/17/{key}")))
        .respond_with(ResponseTemplate::new(404))
        .mount(&bad)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/tpr/wow/config/00/17/{key}")))
        .respond_with(ResponseTemplate::new(200).set_body_string("archives = \n"))
        .expect(1)
        .mount(&good)
        .await;

    let config = ProtocolConfig::default();
    let http = http(&config);
    let entry = CdnEntry {
        name: "us".to_string(),
        path: "tpr/wow".to_string(),
        hosts: vec![host_of(&bad), host_of(&good)],
    };
    let cdn = CdnClient::with_host(
        http.clone(),
        HostResolver::new(http, 4),
        "us",
        entry,
        host_of(&bad),
    );

    let body = cdn.fetch_config(key).await.expect("Second host should serve");
    assert_eq!(body, "archives = \n");
    assert_eq!(cdn.host(), host_of(&good));
}

#[tokio::test]
async fn test_archive_range_request() {
    let server = MockServer::start().await;
    let archive = EncodingKey::from_hex("abcdef00000000000000000000000000").expect("valid key");
    Mock::given(method("GET"))
        .and(path(format!("/tpr/wow/data/ab/cd/{archive}")))
        .and(header("range", "bytes=100-149"))
        .respond_with(ResponseTemplate::new(206).set_body_bytes(vec![7u8; 50]))
        .expect(1)
        .mount(&server)
        .await;

    let config = ProtocolConfig::default();
    let http = http(&config);
    let entry = CdnEntry {
        name: "us".to_string(),
        path: "tpr/wow".to_string(),
        hosts: vec![host_of(&server)],
    };
    let cdn = CdnClient::with_host(http.clone(), HostResolver::new(http, 4), "us", entry, host_of(&server));

    let bytes = cdn
        .fetch_archive_range(&archive, 100, 50)
        .await
        .expect("Range should be served");
    assert_eq!(bytes.len(), 50);
}

#[tokio::test]
async fn test_data_fetch_reports_status() {
    let server = MockServer::start().await;
    let config = ProtocolConfig::default();
    let http = http(&config);
    let entry = CdnEntry {
        name: "us".to_string(),
        path: "tpr/wow".to_string(),
        hosts: vec![host_of(&server)],
    };
    let cdn = CdnClient::with_host(http.clone(), HostResolver::new(http, 4), "us", entry, host_of(&server));

    let error = cdn
        .fetch_data(&EncodingKey::from_bytes([1; 16]))
        .await
        .expect_err("Unknown file should fail");
    assert_eq!(error.status(), Some(404));
    assert!(error.url().is_some_and(|u| u.ends_with("01010101010101010101010101010101")));
}

#[tokio::test]
async fn test_refresh_keys() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/keys.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "FA505078126ACB3E BDC51862ABED79B2DE48C8E7E66C6200\nbad line\n",
        ))
        .mount(&server)
        .await;

    let config = ProtocolConfig::default();
    let http = http(&config);
    let keyring = Keyring::in_memory();

    let added = refresh_keys(&http, &format!("{}/keys.txt", server.uri()), &keyring)
        .await
        .expect("Refresh should succeed");
    assert_eq!(added, 1);

    let added = refresh_keys(&http, &format!("{}/missing.txt", server.uri()), &keyring)
        .await
        .expect("Missing list is not an error");
    assert_eq!(added, 0);
}
