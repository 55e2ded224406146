//! One-shot HTTPS check of a pre-configured endpoint.
//!
//! The platform refuses to deliver to an endpoint whose certificate it cannot
//! verify, unless that certificate was uploaded with `setWebhook`. A plain GET
//! with the default trust store tells the two cases apart before the first
//! delivery silently fails.

use std::error::Error as StdError;
use std::time::Duration;

use reqwest::Client;
use url::Url;

/// Command suggested for creating a self-signed pair.
pub const SELF_SIGNED_HINT: &str = "openssl req -newkey rsa:2048 -sha256 -nodes -keyout PRIVATE.key \
     -x509 -days 365 -out PUBLIC.pem -subj \"/CN=DOMAIN\"";

/// Outcome of [`check_certificate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CertificateCheck {
    /// The TLS handshake succeeded; any HTTP status counts.
    Trusted,
    /// The handshake failed certificate verification.
    Untrusted(String),
    /// Anything else: DNS, refused connection, timeout.
    Unreachable(String),
}

pub async fn check_certificate(client: &Client, url: &Url, timeout: Duration) -> CertificateCheck {
    match client.get(url.clone()).timeout(timeout).send().await {
        Ok(_) => CertificateCheck::Trusted,
        Err(e) => {
            let chain = error_chain(&e);
            if is_certificate_failure(&chain) {
                CertificateCheck::Untrusted(chain)
            } else {
                CertificateCheck::Unreachable(chain)
            }
        }
    }
}

/// Log the outcome of a check against `url`.
pub fn report(url: &Url, check: &CertificateCheck) {
    match check {
        CertificateCheck::Trusted => {
            tracing::info!(url = %url, "Endpoint presents a trusted certificate");
        }
        CertificateCheck::Untrusted(reason) => tracing::error!(
            url = %url,
            reason = %reason,
            "Endpoint certificate is not trusted; the platform will not deliver updates. \
             Upload it with `certificate`, or create a self-signed pair with '{}'",
            SELF_SIGNED_HINT
        ),
        CertificateCheck::Unreachable(reason) => tracing::warn!(
            url = %url,
            reason = %reason,
            "Could not reach the endpoint to check its certificate"
        ),
    }
}

fn error_chain(error: &(dyn StdError + 'static)) -> String {
    let mut parts = vec![error.to_string()];
    let mut source = error.source();
    while let Some(cause) = source {
        parts.push(cause.to_string());
        source = cause.source();
    }
    parts.join(": ")
}

fn is_certificate_failure(chain: &str) -> bool {
    let chain = chain.to_ascii_lowercase();
    ["certificate", "unknownissuer", "self signed", "self-signed"]
        .iter()
        .any(|needle| chain.contains(needle))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_certificate_failures_are_recognised() {
        assert!(is_certificate_failure(
            "error sending request: client error (Connect): error:0A000086:SSL routines:tls_post_process_server_certificate:certificate verify failed:self-signed certificate"
        ));
        assert!(is_certificate_failure("invalid peer certificate: UnknownIssuer"));
        assert!(!is_certificate_failure(
            "error sending request: client error (Connect): tcp connect error: Connection refused (os error 111)"
        ));
    }

    #[tokio::test]
    async fn test_refused_connection_is_unreachable() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let url = Url::parse(&format!("https://{}", addr)).unwrap();
        let check = check_certificate(&Client::new(), &url, Duration::from_secs(2)).await;
        assert!(matches!(check, CertificateCheck::Unreachable(_)), "{check:?}");
    }
}
