//! REST implementation of [`VaultClient`]

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use crate::types::{AuthResponse, PasswordPolicy, PinPolicy, RecordId, RecordInput, SecretRecord};
use crate::{bearer, ClientError, ClientResult, VaultClient};

/// Longest plain-text error body carried into a failure message
const MAX_DETAIL_LEN: usize = 200;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RegisterRequest<'a> {
    username: &'a str,
    email: &'a str,
    master_password: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LoginRequest<'a> {
    username: &'a str,
    master_password: &'a str,
}

#[derive(Deserialize)]
struct GeneratedPassword {
    password: String,
}

#[derive(Deserialize)]
struct GeneratedPin {
    pin: String,
}

#[derive(Deserialize)]
struct RevealResponse {
    password: Option<String>,
}

/// Vault client speaking JSON over HTTP
#[derive(Debug, Clone)]
pub struct HttpVaultClient {
    http: Client,
    base_url: String,
}

impl HttpVaultClient {
    pub fn new(base_url: &str, timeout: Duration) -> ClientResult<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("passvault/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn record_url(&self, id: RecordId) -> String {
        self.url(&format!("/api/passwords/{}", id))
    }

    /// Send a request and return the body of a successful response. A
    /// failure status is classified even when its body cannot be read.
    async fn send(&self, request: RequestBuilder) -> ClientResult<String> {
        let response = request.send().await?;
        let status = response.status();

        if status.is_success() {
            debug!(status = status.as_u16(), "vault request succeeded");
            return Ok(response.text().await?);
        }

        let detail = match response.text().await {
            Ok(body) => extract_detail(&body),
            Err(err) => {
                debug!(error = %err, "could not read error body");
                None
            }
        };
        warn!(status = status.as_u16(), "vault request failed");
        Err(ClientError::from_status(status.as_u16(), detail))
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> ClientResult<T> {
        let body = self.send(request).await?;
        parse_body(&body)
    }
}

fn parse_body<T: DeserializeOwned>(body: &str) -> ClientResult<T> {
    serde_json::from_str(body).map_err(|e| ClientError::Server {
        status: 200,
        detail: Some(format!("Malformed response: {}", e)),
    })
}

/// Pull a human-readable message out of an error body
pub(crate) fn extract_detail(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(trimmed) {
        return ["message", "error", "detail"]
            .iter()
            .filter_map(|key| map.get(*key).and_then(Value::as_str))
            .find(|s| !s.is_empty())
            .map(String::from);
    }

    if trimmed.starts_with('<') {
        // HTML error page from a proxy
        return None;
    }

    Some(trimmed.chars().take(MAX_DETAIL_LEN).collect())
}

#[async_trait]
impl VaultClient for HttpVaultClient {
    async fn register(
        &self,
        username: &str,
        email: &str,
        master_password: &str,
    ) -> ClientResult<AuthResponse> {
        let body = RegisterRequest {
            username,
            email,
            master_password,
        };
        self.send_json(self.http.post(self.url("/api/auth/register")).json(&body))
            .await
    }

    async fn login(&self, username: &str, master_password: &str) -> ClientResult<AuthResponse> {
        let body = LoginRequest {
            username,
            master_password,
        };
        self.send_json(self.http.post(self.url("/api/auth/login")).json(&body))
            .await
    }

    async fn generate_password(&self, policy: &PasswordPolicy) -> ClientResult<String> {
        let generated: GeneratedPassword = self
            .send_json(self.http.post(self.url("/api/password/generate")).json(policy))
            .await?;
        Ok(generated.password)
    }

    async fn generate_pin(&self, policy: &PinPolicy) -> ClientResult<String> {
        let generated: GeneratedPin = self
            .send_json(self.http.post(self.url("/api/password/generate-pin")).json(policy))
            .await?;
        Ok(generated.pin)
    }

    async fn categories(&self) -> ClientResult<Vec<String>> {
        self.send_json(self.http.get(self.url("/api/password/categories")))
            .await
    }

    async fn list_records(&self, token: &str) -> ClientResult<Vec<SecretRecord>> {
        let request = self
            .http
            .get(self.url("/api/passwords"))
            .header("Authorization", bearer(token));
        self.send_json(request).await
    }

    async fn create_record(&self, token: &str, input: &RecordInput) -> ClientResult<SecretRecord> {
        let request = self
            .http
            .post(self.url("/api/passwords"))
            .header("Authorization", bearer(token))
            .json(input);
        self.send_json(request).await
    }

    async fn get_record(&self, token: &str, id: RecordId) -> ClientResult<SecretRecord> {
        let request = self
            .http
            .get(self.record_url(id))
            .header("Authorization", bearer(token));
        self.send_json(request).await
    }

    async fn update_record(
        &self,
        token: &str,
        id: RecordId,
        input: &RecordInput,
    ) -> ClientResult<SecretRecord> {
        let request = self
            .http
            .put(self.record_url(id))
            .header("Authorization", bearer(token))
            .json(input);
        self.send_json(request).await
    }

    async fn delete_record(&self, token: &str, id: RecordId) -> ClientResult<()> {
        let request = self
            .http
            .delete(self.record_url(id))
            .header("Authorization", bearer(token));
        self.send(request).await.map(|_| ())
    }

    async fn reveal_record(&self, token: &str, id: RecordId) -> ClientResult<String> {
        let request = self
            .http
            .post(format!("{}/decrypt", self.record_url(id)))
            .header("Authorization", bearer(token));
        let revealed: RevealResponse = self.send_json(request).await?;

        revealed.password.ok_or_else(|| ClientError::Server {
            status: 200,
            detail: Some("Password key not found in decrypt response".to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use passvault_core::ErrorKind;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Answer exactly one request with a canned response, returning the
    /// raw request head
    async fn serve_once(
        status_line: &'static str,
        body: &'static str,
    ) -> (String, tokio::task::JoinHandle<String>) {
        let response = format!(
            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status_line,
            body.len(),
            body
        );
        serve_raw(response).await
    }

    /// Like `serve_once`, but the response bytes are sent as given
    async fn serve_raw(response: String) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }

            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            String::from_utf8_lossy(&request).to_string()
        });

        (format!("http://{}", addr), handle)
    }

    #[test]
    fn test_extract_detail() {
        assert_eq!(
            extract_detail(r#"{"message":"Password not found"}"#).as_deref(),
            Some("Password not found")
        );
        assert_eq!(
            extract_detail(r#"{"error":"Bad Request","message":""}"#).as_deref(),
            Some("Bad Request")
        );
        assert_eq!(extract_detail(r#"{"status":500}"#), None);
        assert_eq!(extract_detail("   "), None);
        assert_eq!(extract_detail("<html>502</html>"), None);
        assert_eq!(extract_detail("plain failure").as_deref(), Some("plain failure"));
        assert_eq!(extract_detail(&"x".repeat(500)).map(|d| d.len()), Some(MAX_DETAIL_LEN));
    }

    #[test]
    fn test_base_url_normalized() {
        let client =
            HttpVaultClient::new("http://localhost:8080/", Duration::from_secs(5)).unwrap();
        assert_eq!(client.base_url(), "http://localhost:8080");
        assert_eq!(client.record_url(7), "http://localhost:8080/api/passwords/7");
    }

    #[test]
    fn test_malformed_body_is_server_error() {
        let result: ClientResult<Vec<SecretRecord>> = parse_body("not json");
        assert_eq!(result.unwrap_err().kind(), ErrorKind::ServerError);
    }

    #[tokio::test]
    async fn test_not_found_is_classified() {
        let (base, server) =
            serve_once("404 Not Found", r#"{"message":"Password not found"}"#).await;
        let client = HttpVaultClient::new(&base, Duration::from_secs(5)).unwrap();

        let err = client.get_record("tok-1", 99).await.unwrap_err();
        assert_eq!(err, ClientError::NotFound(Some("Password not found".to_string())));

        let request = server.await.unwrap();
        assert!(request.starts_with("GET /api/passwords/99 "));
        assert!(request.to_ascii_lowercase().contains("authorization: bearer tok-1"));
    }

    #[tokio::test]
    async fn test_reveal_reads_password_key() {
        let (base, server) = serve_once("200 OK", r#"{"password":"p@ss1"}"#).await;
        let client = HttpVaultClient::new(&base, Duration::from_secs(5)).unwrap();

        assert_eq!(client.reveal_record("tok", 7).await.unwrap(), "p@ss1");
        assert!(server.await.unwrap().starts_with("POST /api/passwords/7/decrypt "));
    }

    #[tokio::test]
    async fn test_unreadable_error_body_keeps_status() {
        // declares more body than it sends, then hangs up
        let response = "HTTP/1.1 401 Unauthorized\r\nContent-Type: application/json\r\nContent-Length: 64\r\nConnection: close\r\n\r\n{\"mess"
            .to_string();
        let (base, server) = serve_raw(response).await;
        let client = HttpVaultClient::new(&base, Duration::from_secs(5)).unwrap();

        let err = client.list_records("tok").await.unwrap_err();
        assert_eq!(err, ClientError::Unauthorized(None));
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_connection_refused_is_network() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let base = format!("http://{}", addr);
        let client = HttpVaultClient::new(&base, Duration::from_secs(5)).unwrap();
        let err = client.categories().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Network);
    }
}
