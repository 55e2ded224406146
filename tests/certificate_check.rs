use std::net::SocketAddr;
use std::time::Duration;

use axum::{routing::get, Router};
use axum_server::tls_rustls::RustlsConfig;
use url::Url;

use webhook_relay::net::reachability::{check_certificate, CertificateCheck};

const CERT: &[u8] = include_bytes!("fixtures/self_signed.pem");
const KEY: &[u8] = include_bytes!("fixtures/self_signed.key");

async fn serve_self_signed() -> SocketAddr {
    let config = RustlsConfig::from_pem(CERT.to_vec(), KEY.to_vec()).await.unwrap();
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.set_nonblocking(true).unwrap();
    let addr = listener.local_addr().unwrap();

    let app = Router::new().route("/", get(|| async { "ok" }));
    tokio::spawn(async move {
        axum_server::from_tcp_rustls(listener, config)
            .serve(app.into_make_service())
            .await
            .unwrap();
    });
    addr
}

#[tokio::test]
async fn test_self_signed_endpoint_is_untrusted() {
    let addr = serve_self_signed().await;
    let url = Url::parse(&format!("https://{}/", addr)).unwrap();

    let check = check_certificate(&reqwest::Client::new(), &url, Duration::from_secs(5)).await;
    assert!(matches!(check, CertificateCheck::Untrusted(_)), "{check:?}");
}

#[tokio::test]
async fn test_pinned_certificate_is_trusted() {
    let addr = serve_self_signed().await;
    let url = Url::parse(&format!("https://{}/", addr)).unwrap();
    let client = reqwest::Client::builder()
        .add_root_certificate(reqwest::Certificate::from_pem(CERT).unwrap())
        .build()
        .unwrap();

    let check = check_certificate(&client, &url, Duration::from_secs(5)).await;
    assert_eq!(check, CertificateCheck::Trusted);
}
