//! runtime::cdn
//!
//! Fetch package source from public CDNs.
//!
//! Endpoints are tried in configured order and the first successful
//! response wins. Fetched code is not verified; its SHA-256 digest is
//! logged so a run can be audited afterwards.

use reqwest::Client;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use super::error::RuntimeError;

/// Source text retrieved for a package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedModule {
    /// URL that served the code
    pub url: String,
    pub code: String,
    /// Hex SHA-256 of `code`
    pub sha256: String,
}

/// HTTP client over an ordered list of CDN base URLs.
#[derive(Debug, Clone)]
pub struct CdnClient {
    client: Client,
    endpoints: Vec<String>,
}

impl CdnClient {
    pub fn new(endpoints: Vec<String>) -> Self {
        Self {
            client: Client::new(),
            endpoints,
        }
    }

    pub fn endpoints(&self) -> &[String] {
        &self.endpoints
    }

    fn url_for(endpoint: &str, name: &str) -> String {
        format!("{}/{name}", endpoint.trim_end_matches('/'))
    }

    /// Fetch `name` from the first endpoint that serves it.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::Cdn`] when every endpoint fails.
    pub async fn fetch(&self, name: &str) -> Result<FetchedModule, RuntimeError> {
        for endpoint in &self.endpoints {
            let url = Self::url_for(endpoint, name);
            let response = match self.client.get(&url).send().await {
                Ok(response) => response,
                Err(e) => {
                    debug!(%url, error = %e, "CDN request failed");
                    continue;
                }
            };
            let status = response.status();
            if !status.is_success() {
                debug!(%url, status = status.as_u16(), "CDN endpoint declined");
                continue;
            }
            match response.text().await {
                Ok(code) => {
                    let sha256 = hex::encode(Sha256::digest(code.as_bytes()));
                    info!(module = name, %url, %sha256, "fetched module from CDN");
                    return Ok(FetchedModule { url, code, sha256 });
                }
                Err(e) => debug!(%url, error = %e, "CDN body unreadable"),
            }
        }
        Err(RuntimeError::Cdn {
            specifier: name.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn urls_join_cleanly() {
        assert_eq!(CdnClient::url_for("https://unpkg.com/", "lodash"), "https://unpkg.com/lodash");
        assert_eq!(
            CdnClient::url_for("https://jspm.dev", "@acme/x"),
            "https://jspm.dev/@acme/x"
        );
    }

    #[tokio::test]
    async fn first_successful_endpoint_wins() {
        let down = MockServer::start().await;
        let up = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tiny"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&down)
            .await;
        Mock::given(method("GET"))
            .and(path("/tiny"))
            .respond_with(ResponseTemplate::new(200).set_body_string("module.exports = 1"))
            .mount(&up)
            .await;

        let client = CdnClient::new(vec![down.uri(), up.uri()]);
        let fetched = client.fetch("tiny").await.unwrap();
        assert_eq!(fetched.code, "module.exports = 1");
        assert_eq!(fetched.url, format!("{}/tiny", up.uri()));
        assert_eq!(
            fetched.sha256,
            hex::encode(Sha256::digest(b"module.exports = 1"))
        );
    }

    #[tokio::test]
    async fn all_endpoints_failing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        let err = CdnClient::new(vec![server.uri()]).fetch("nope").await.unwrap_err();
        assert!(matches!(err, RuntimeError::Cdn { specifier } if specifier == "nope"));
    }
}
