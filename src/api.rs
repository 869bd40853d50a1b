use reqwest::StatusCode;
use reqwest::blocking::{Client, Response};
use reqwest::header::{CACHE_CONTROL, HeaderMap, HeaderValue, PRAGMA};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt;
use std::time::Duration;
use tracing::{debug, error, trace};
use url::Url;

#[derive(Debug)]
pub enum ApiError {
    /// Non-success status, `message` is the `detail` of the body or the reason phrase.
    Http { status: u16, message: String },
    Network(reqwest::Error),
    Timeout(Duration),
    InvalidUrl(String),
    Parse { message: String, body: String },
}

impl ApiError {
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        ApiError::Http {
            status,
            message: message.into(),
        }
    }

    fn from_response(status: StatusCode, body: &str) -> Self {
        let reason = status.canonical_reason().unwrap_or("Unknown status");
        let detail = serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|v| v.get("detail").cloned());
        let message = match detail {
            Some(serde_json::Value::String(s)) if !s.is_empty() => s,
            Some(serde_json::Value::String(_)) | Some(serde_json::Value::Null) | None => {
                reason.to_string()
            }
            Some(other) => other.to_string(),
        };
        ApiError::http(status.as_u16(), message)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Http { message, .. } => write!(f, "API Error: {message}"),
            ApiError::Network(e) => write!(f, "API Error: network failure ({e})"),
            ApiError::Timeout(d) => write!(f, "API Error: timeout after {d:?}"),
            ApiError::InvalidUrl(u) => write!(f, "API Error: invalid url {u}"),
            ApiError::Parse { message, .. } => {
                write!(f, "API Error: unexpected response ({message})")
            }
        }
    }
}

impl std::error::Error for ApiError {}

pub struct ApiClient {
    base_url: String,
    timeout: Duration,
    http: Client,
}

impl ApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        Url::parse(base_url).map_err(|e| ApiError::InvalidUrl(format!("{base_url}: {e}")))?;

        // Every request must reach the backend, nothing is served from a cache.
        let mut headers = HeaderMap::new();
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
        headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));

        let http = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(ApiError::Network)?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
            http,
        })
    }

    fn url(&self, endpoint: &str, params: &[(&str, String)]) -> Result<Url, ApiError> {
        let raw = format!("{}{}", self.base_url, endpoint);
        let mut url = Url::parse(&raw).map_err(|e| ApiError::InvalidUrl(format!("{raw}: {e}")))?;
        // An empty pair list must not leave a bare `?` behind.
        if !params.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(params.iter().map(|(k, v)| (*k, v.as_str())));
        }
        Ok(url)
    }

    fn send_error(&self, err: reqwest::Error) -> ApiError {
        if err.is_timeout() {
            ApiError::Timeout(self.timeout)
        } else {
            ApiError::Network(err)
        }
    }

    fn handle<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
        let status = response.status();
        let body = response.text().map_err(ApiError::Network)?;
        if !status.is_success() {
            let err = ApiError::from_response(status, &body);
            error!("{err} ({status})");
            return Err(err);
        }
        trace!("Response body: {} bytes", body.len());
        serde_json::from_str(&body).map_err(|e| ApiError::Parse {
            message: e.to_string(),
            body,
        })
    }

    pub fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> Result<T, ApiError> {
        let url = self.url(endpoint, params)?;
        debug!("GET {url}");
        let response = self.http.get(url).send().map_err(|e| self.send_error(e))?;
        Self::handle(response)
    }

    pub fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let url = self.url(endpoint, &[])?;
        debug!("POST {url}");
        let response = self
            .http
            .post(url)
            .json(body)
            .send()
            .map_err(|e| self.send_error(e))?;
        Self::handle(response)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    pub(crate) fn client(base: &str) -> ApiClient {
        ApiClient::new(base, Duration::from_secs(5)).unwrap()
    }

    /// The blocking client has to live and die off the async runtime.
    pub(crate) async fn blocking<T, F>(f: F) -> T
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        tokio::task::spawn_blocking(f).await.unwrap()
    }

    #[test]
    fn url_without_params_has_no_query() {
        let api = client("http://localhost:7777/");
        let url = api.url("/clientes/", &[]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:7777/clientes/");
        assert_eq!(url.query(), None);

        let url = api
            .url("/clientes/search", &[("name", "Ana María".into())])
            .unwrap();
        assert_eq!(url.as_str(), "http://localhost:7777/clientes/search?name=Ana+Mar%C3%ADa");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn get_encodes_query_and_bypasses_cache() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/cobranza/vida"))
            .and(query_param("insurer", "SURA"))
            .and(query_param("start_date", "2025-01-01"))
            .and(header("cache-control", "no-store"))
            .and(header("pragma", "no-cache"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"poliza": "1"}])))
            .expect(1)
            .mount(&mock_server)
            .await;

        let base = mock_server.uri();
        let rows: Vec<serde_json::Value> = blocking(move || {
            client(&base).get_json(
                "/cobranza/vida",
                &[("insurer", "SURA".into()), ("start_date", "2025-01-01".into())],
            )
        })
        .await
        .unwrap();
        assert_eq!(rows, vec![json!({"poliza": "1"})]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn post_sends_json_body() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/clientes/delete"))
            .and(body_json(json!({"nombre": "Ana"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
            .expect(1)
            .mount(&mock_server)
            .await;

        let base = mock_server.uri();
        let reply: serde_json::Value = blocking(move || {
            client(&base).post_json("/clientes/delete", &json!({"nombre": "Ana"}))
        })
        .await
        .unwrap();
        assert_eq!(reply["success"], true);

        let requests = mock_server.received_requests().await.unwrap();
        assert_eq!(requests[0].url.query(), None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn error_message_comes_from_detail() {
        let mock_server = MockServer::start().await;
        let not_found = json!({"detail": "Database file not found"});
        Mock::given(path("/missing"))
            .respond_with(ResponseTemplate::new(404).set_body_json(not_found))
            .mount(&mock_server)
            .await;
        Mock::given(path("/invalid"))
            .respond_with(
                ResponseTemplate::new(422).set_body_json(json!({"detail": [{"loc": ["body"]}]})),
            )
            .mount(&mock_server)
            .await;
        Mock::given(path("/broken"))
            .respond_with(ResponseTemplate::new(500).set_body_string("oops"))
            .mount(&mock_server)
            .await;

        let base = mock_server.uri();
        let errors = blocking(move || {
            let api = client(&base);
            ["/missing", "/invalid", "/broken"]
                .map(|endpoint| api.get_json::<serde_json::Value>(endpoint, &[]).unwrap_err())
        })
        .await;

        assert_eq!(errors[0].to_string(), "API Error: Database file not found");
        assert!(matches!(errors[0], ApiError::Http { status: 404, .. }));
        assert_eq!(errors[1].to_string(), r#"API Error: [{"loc":["body"]}]"#);
        assert_eq!(errors[2].to_string(), "API Error: Internal Server Error");
        assert!(matches!(errors[2], ApiError::Http { status: 500, .. }));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unparsable_body_is_a_parse_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/cartera"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&mock_server)
            .await;

        let base = mock_server.uri();
        let err = blocking(move || {
            client(&base)
                .get_json::<Vec<serde_json::Value>>("/cartera", &[])
                .unwrap_err()
        })
        .await;
        assert!(matches!(err, ApiError::Parse { ref body, .. } if body == "not json"));
    }

    #[test]
    fn rejects_bad_base_url() {
        assert!(matches!(
            ApiClient::new("not a url", Duration::from_secs(1)),
            Err(ApiError::InvalidUrl(_))
        ));
    }
}
