use std::time::{Duration, Instant};

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client as ReqwestClient, Method, RequestBuilder, Response, StatusCode, header};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use url::Url;

use crate::api::ChatApi;
use crate::config::{AuthHeader, DEFAULT_BASE_URL, DEFAULT_TIMEOUT, SyncConfig};
use crate::error::{Error, Result};
use crate::observability::{CLIENT_REQUEST_DURATION, CLIENT_REQUEST_ERRORS, CLIENT_REQUESTS};
use crate::types::{
    CheckTokenParams, CheckTokenResponse, CountResponse, LoginParams, LoginResponse, Message,
    MessageList, PresenceSnapshot, RegisterParams, RegisterResponse, SendMessageParams, User,
};

/// HTTP client for the chat service.
#[derive(Debug, Clone)]
pub struct ChatClient {
    client: ReqwestClient,
    base_url: Url,
    timeout: Duration,
    auth_header: AuthHeader,
}

impl ChatClient {
    /// Create a client for the service at `base_url` with default settings.
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_options(Some(base_url), None, None)
    }

    /// Create a client from a resolved configuration.
    pub fn from_config(config: &SyncConfig) -> Result<Self> {
        Self::with_options(
            Some(&config.base_url),
            Some(config.timeout),
            Some(config.auth_header.clone()),
        )
    }

    /// Create a new client with custom settings.
    pub fn with_options(
        base_url: Option<&str>,
        timeout: Option<Duration>,
        auth_header: Option<AuthHeader>,
    ) -> Result<Self> {
        let mut base_url = base_url.unwrap_or(DEFAULT_BASE_URL).to_string();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        let base_url = Url::parse(&base_url)?;

        let timeout = timeout.unwrap_or(DEFAULT_TIMEOUT);
        let client = ReqwestClient::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                Error::http_client(
                    format!("Failed to build HTTP client: {}", e),
                    Some(Box::new(e)),
                )
            })?;

        Ok(Self {
            client,
            base_url,
            timeout,
            auth_header: auth_header.unwrap_or_default(),
        })
    }

    /// The base URL every endpoint is resolved against.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// The header used to carry the token.
    pub fn auth_header(&self) -> &AuthHeader {
        &self.auth_header
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(self.base_url.join(path)?)
    }

    /// Create and return default headers, with the token attached if given.
    fn default_headers(&self, token: Option<&str>) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        if let Some(token) = token {
            let name = HeaderName::from_bytes(self.auth_header.name.as_bytes()).map_err(|_| {
                Error::validation(
                    format!("invalid token header name {:?}", self.auth_header.name),
                    Some("auth_header".to_string()),
                )
            })?;
            let value = HeaderValue::from_str(&self.auth_header.value_for(token)).map_err(|_| {
                Error::validation(
                    "token contains characters not allowed in a header",
                    Some("token".to_string()),
                )
            })?;
            headers.insert(name, value);
        }
        Ok(headers)
    }

    fn request(&self, method: Method, path: &str, token: Option<&str>) -> Result<RequestBuilder> {
        Ok(self
            .client
            .request(method, self.endpoint(path)?)
            .headers(self.default_headers(token)?))
    }

    /// Send a request, converting transport failures into our error type.
    async fn execute(&self, builder: RequestBuilder, path: &str) -> Result<Response> {
        CLIENT_REQUESTS.click();
        let start = Instant::now();
        let result = builder.send().await;
        CLIENT_REQUEST_DURATION.add(start.elapsed().as_secs_f64());
        result.map_err(|e| {
            CLIENT_REQUEST_ERRORS.click();
            tracing::debug!(target: "pollchat::client", path, error = %e, "request failed");
            if e.is_timeout() {
                Error::timeout(
                    format!("Request timed out: {}", e),
                    Some(self.timeout.as_secs_f64()),
                )
            } else if e.is_connect() {
                Error::connection(format!("Connection error: {}", e), Some(Box::new(e)))
            } else {
                Error::http_client(format!("Request failed: {}", e), Some(Box::new(e)))
            }
        })
    }

    /// Send a request and decode a successful JSON body.
    async fn fetch_json<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
        path: &str,
    ) -> Result<T> {
        let response = self.execute(builder, path).await?;
        if !response.status().is_success() {
            CLIENT_REQUEST_ERRORS.click();
            return Err(process_error_response(response).await);
        }
        response.json::<T>().await.map_err(|e| {
            Error::serialization(
                format!("Failed to parse response from {path}: {}", e),
                Some(Box::new(e)),
            )
        })
    }

    /// Send a request whose success body is irrelevant.
    async fn fetch_unit(&self, builder: RequestBuilder, path: &str) -> Result<()> {
        let response = self.execute(builder, path).await?;
        if !response.status().is_success() {
            CLIENT_REQUEST_ERRORS.click();
            return Err(process_error_response(response).await);
        }
        Ok(())
    }

    /// Decode a body that carries its verdict in the payload, falling back to
    /// the status mapping when a failure body does not decode.
    async fn fetch_verdict<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
        path: &str,
    ) -> Result<T> {
        let response = self.execute(builder, path).await?;
        let status = response.status();
        let body = response.text().await.map_err(|e| {
            Error::http_client(format!("Failed to read response: {}", e), Some(Box::new(e)))
        })?;
        match serde_json::from_str::<T>(&body) {
            Ok(parsed) => Ok(parsed),
            Err(e) if status.is_success() => Err(Error::serialization(
                format!("Failed to parse response from {path}: {}", e),
                Some(Box::new(e)),
            )),
            Err(_) => Err(error_from_body(status, &body)),
        }
    }
}

#[async_trait::async_trait]
impl ChatApi for ChatClient {
    async fn login(&self, params: &LoginParams) -> Result<LoginResponse> {
        let path = "api/auth/login";
        let builder = self.request(Method::POST, path, None)?.json(params);
        self.fetch_verdict(builder, path).await
    }

    async fn register(&self, params: &RegisterParams) -> Result<RegisterResponse> {
        let path = "api/auth/register";
        let builder = self.request(Method::POST, path, None)?.json(params);
        self.fetch_verdict(builder, path).await
    }

    async fn logout(&self, token: &str) -> Result<()> {
        let path = "api/auth/logout";
        let builder = self.request(Method::POST, path, Some(token))?;
        self.fetch_unit(builder, path).await
    }

    async fn check_token(&self, token: &str) -> Result<bool> {
        let path = "api/check_token";
        let params = CheckTokenParams {
            token: token.to_string(),
        };
        let builder = self.request(Method::POST, path, None)?.json(&params);
        let response = self.execute(builder, path).await?;
        if response.status() != StatusCode::OK {
            CLIENT_REQUEST_ERRORS.click();
            return Err(process_error_response(response).await);
        }
        let verdict = response.json::<CheckTokenResponse>().await.map_err(|e| {
            Error::serialization(
                format!("Failed to parse token check: {}", e),
                Some(Box::new(e)),
            )
        })?;
        Ok(verdict.check_status)
    }

    async fn current_user(&self, token: &str) -> Result<User> {
        let path = "api/users/me";
        let builder = self.request(Method::GET, path, Some(token))?;
        self.fetch_json(builder, path).await
    }

    async fn history(&self, token: &str, limit: u32) -> Result<Vec<Message>> {
        let path = "api/messages";
        let builder = self
            .request(Method::GET, path, Some(token))?
            .query(&[("limit", limit)]);
        let list: MessageList = self.fetch_json(builder, path).await?;
        Ok(list.messages)
    }

    async fn messages_after(&self, token: &str, after_id: u64) -> Result<Vec<Message>> {
        let path = "api/messages/new";
        let builder = self
            .request(Method::GET, path, Some(token))?
            .query(&[("after_id", after_id)]);
        let list: MessageList = self.fetch_json(builder, path).await?;
        Ok(list.messages)
    }

    async fn send_message(&self, token: &str, params: &SendMessageParams) -> Result<()> {
        let path = "api/messages";
        let builder = self.request(Method::POST, path, Some(token))?.json(params);
        self.fetch_unit(builder, path).await
    }

    async fn online_users(&self, token: &str) -> Result<PresenceSnapshot> {
        let path = "api/users/online";
        let builder = self.request(Method::GET, path, Some(token))?;
        self.fetch_json(builder, path).await
    }

    async fn message_count(&self, token: &str) -> Result<u64> {
        let path = "api/messages/count";
        let builder = self.request(Method::GET, path, Some(token))?;
        let count: CountResponse = self.fetch_json(builder, path).await?;
        Ok(count.count)
    }

    async fn user_count(&self, token: &str) -> Result<u64> {
        let path = "api/users/count";
        let builder = self.request(Method::GET, path, Some(token))?;
        let count: CountResponse = self.fetch_json(builder, path).await?;
        Ok(count.count)
    }
}

/// Process API response errors and convert to our Error type
async fn process_error_response(response: Response) -> Error {
    let status = response.status();
    match response.text().await {
        Ok(body) => error_from_body(status, &body),
        Err(e) => Error::http_client(
            format!("Failed to read error response: {}", e),
            Some(Box::new(e)),
        ),
    }
}

/// Map a non-success status and its body to an error.
///
/// The service reports failures as `{"error": kind, "message": text}`; bodies
/// that do not decode are used verbatim as the message.
fn error_from_body(status: StatusCode, body: &str) -> Error {
    #[derive(Deserialize)]
    struct ErrorResponse {
        error: Option<String>,
        message: Option<String>,
    }

    let parsed = serde_json::from_str::<ErrorResponse>(body).ok();
    let error_type = parsed.as_ref().and_then(|e| e.error.clone());
    let message = parsed
        .and_then(|e| e.message)
        .filter(|m| !m.is_empty())
        .or_else(|| error_type.clone())
        .unwrap_or_else(|| {
            if body.is_empty() {
                status.to_string()
            } else {
                body.to_string()
            }
        });

    match status.as_u16() {
        401 => Error::authentication(message),
        403 => Error::permission(message),
        404 => Error::not_found(message),
        408 => Error::timeout(message, None),
        500 => Error::internal_server(message),
        502..=504 => Error::service_unavailable(message),
        code => Error::api(code, error_type, message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_creation() {
        let client = ChatClient::new("http://localhost:8080").unwrap();
        assert_eq!(client.base_url().as_str(), "http://localhost:8080/");
        assert_eq!(client.timeout, DEFAULT_TIMEOUT);
        assert_eq!(client.auth_header(), &AuthHeader::default());

        let client = ChatClient::with_options(
            Some("https://chat.example.com/prefix/"),
            Some(Duration::from_secs(3)),
            Some(AuthHeader::bearer()),
        )
        .unwrap();
        assert_eq!(
            client.endpoint("api/messages/new").unwrap().as_str(),
            "https://chat.example.com/prefix/api/messages/new"
        );
        assert_eq!(client.timeout, Duration::from_secs(3));
    }

    #[test]
    fn client_from_config() {
        let config = SyncConfig::new()
            .with_base_url("http://10.0.0.2:9000")
            .with_auth_header(AuthHeader::bearer());
        let client = ChatClient::from_config(&config).unwrap();
        assert_eq!(client.base_url().as_str(), "http://10.0.0.2:9000/");
        assert_eq!(client.auth_header(), &AuthHeader::bearer());
    }

    #[test]
    fn invalid_base_url() {
        assert!(matches!(
            ChatClient::new("not a url").unwrap_err(),
            Error::Url { .. }
        ));
    }

    #[test]
    fn headers_carry_token() {
        let client = ChatClient::new("http://localhost:8080").unwrap();
        let headers = client.default_headers(Some("tok")).unwrap();
        assert_eq!(headers.get("Authorization-Token").unwrap(), "tok");

        let client =
            ChatClient::with_options(None, None, Some(AuthHeader::bearer())).unwrap();
        let headers = client.default_headers(Some("tok")).unwrap();
        assert_eq!(headers.get(header::AUTHORIZATION).unwrap(), "Bearer tok");

        let headers = client.default_headers(None).unwrap();
        assert!(headers.get(header::AUTHORIZATION).is_none());
    }

    #[test]
    fn header_rejects_bad_token() {
        let client = ChatClient::new("http://localhost:8080").unwrap();
        let err = client.default_headers(Some("bad\ntoken")).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn error_mapping() {
        let body = r#"{"error":"not_found","message":"Invalid token"}"#;
        let err = error_from_body(StatusCode::UNAUTHORIZED, body);
        assert!(err.is_authentication());
        assert!(err.to_string().contains("Invalid token"));

        let err = error_from_body(StatusCode::BAD_REQUEST, r#"{"error":"bad_request"}"#);
        assert_eq!(err.status_code(), Some(400));
        assert!(err.to_string().contains("bad_request"));

        let err = error_from_body(StatusCode::BAD_GATEWAY, "upstream down");
        assert!(err.is_server_error());
        assert!(err.to_string().contains("upstream down"));

        let err = error_from_body(StatusCode::INTERNAL_SERVER_ERROR, "");
        assert!(err.is_server_error());
    }

    #[tokio::test]
    async fn unreachable_service_is_transient() {
        // Port 9 on loopback is the discard port; nothing listens there in CI.
        let client = ChatClient::with_options(
            Some("http://127.0.0.1:9/"),
            Some(Duration::from_secs(2)),
            None,
        )
        .unwrap();
        let err = client.check_token("tok").await.unwrap_err();
        assert!(err.is_transient(), "unexpected error: {err}");
    }
}
