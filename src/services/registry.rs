use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::models::whitelist::{PlayerName, WhitelistRequest};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("registry did not answer in time")]
    Timeout,
    #[error("registry answered with HTTP {0}")]
    HttpStatus(u16),
    #[error("registry unreachable: {0}")]
    Transport(String),
    #[error("registry sent an unreadable listing: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for RegistryError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            RegistryError::Timeout
        } else if e.is_decode() {
            RegistryError::Decode(e.to_string())
        } else if let Some(status) = e.status() {
            RegistryError::HttpStatus(status.as_u16())
        } else {
            RegistryError::Transport(e.to_string())
        }
    }
}

/// The remote authoritative whitelist. Implementations never retry.
#[async_trait]
pub trait RegistryClient: Send + Sync {
    async fn submit(&self, request: &WhitelistRequest) -> Result<(), RegistryError>;

    async fn list_all(&self) -> Result<Vec<PlayerName>, RegistryError>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AddPlayerBody<'a> {
    player_name: &'a str,
}

pub struct HttpRegistryClient {
    client: reqwest::Client,
    url: String,
}

impl HttpRegistryClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, RegistryError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RegistryError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl RegistryClient for HttpRegistryClient {
    async fn submit(&self, request: &WhitelistRequest) -> Result<(), RegistryError> {
        let resp = self
            .client
            .post(&self.url)
            .json(&AddPlayerBody {
                player_name: &request.player_name,
            })
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(RegistryError::HttpStatus(status.as_u16()));
        }
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<PlayerName>, RegistryError> {
        let resp = self.client.get(&self.url).send().await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(RegistryError::HttpStatus(status.as_u16()));
        }
        Ok(resp.json::<Vec<PlayerName>>().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::get, Json, Router};
    use serde_json::Value;
    use std::sync::{Arc, Mutex};

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/whitelist", addr)
    }

    #[tokio::test]
    async fn submit_posts_player_name_and_accepts_2xx() {
        let seen: Arc<Mutex<Vec<Value>>> = Arc::default();
        let sink = seen.clone();
        let app = Router::new().route(
            "/whitelist",
            axum::routing::post(move |Json(body): Json<Value>| {
                let sink = sink.clone();
                async move {
                    sink.lock().unwrap().push(body);
                    StatusCode::CREATED
                }
            }),
        );
        let client = HttpRegistryClient::new(serve(app).await, Duration::from_secs(5)).unwrap();

        client.submit(&WhitelistRequest::new("9", "Notch")).await.unwrap();

        assert_eq!(
            seen.lock().unwrap().as_slice(),
            &[serde_json::json!({ "playerName": "Notch" })]
        );
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let app = Router::new().route(
            "/whitelist",
            axum::routing::post(|| async { StatusCode::SERVICE_UNAVAILABLE })
                .get(|| async { StatusCode::UNAUTHORIZED }),
        );
        let client = HttpRegistryClient::new(serve(app).await, Duration::from_secs(5)).unwrap();

        assert_eq!(
            client.submit(&WhitelistRequest::new("9", "Notch")).await,
            Err(RegistryError::HttpStatus(503))
        );
        assert_eq!(client.list_all().await, Err(RegistryError::HttpStatus(401)));
    }

    #[tokio::test]
    async fn list_all_reads_a_string_array() {
        let app = Router::new().route(
            "/whitelist",
            get(|| async { Json(serde_json::json!(["Alice", "bob"])) }),
        );
        let client = HttpRegistryClient::new(serve(app).await, Duration::from_secs(5)).unwrap();

        assert_eq!(client.list_all().await.unwrap(), vec!["Alice", "bob"]);
    }

    #[tokio::test]
    async fn malformed_listing_is_a_decode_error() {
        let app = Router::new().route(
            "/whitelist",
            get(|| async { Json(serde_json::json!({ "players": [] })) }),
        );
        let client = HttpRegistryClient::new(serve(app).await, Duration::from_secs(5)).unwrap();

        assert!(matches!(client.list_all().await, Err(RegistryError::Decode(_))));
    }

    #[tokio::test]
    async fn slow_registry_times_out() {
        let app = Router::new().route(
            "/whitelist",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Json(serde_json::json!([]))
            }),
        );
        let client = HttpRegistryClient::new(serve(app).await, Duration::from_millis(100)).unwrap();

        assert_eq!(client.list_all().await, Err(RegistryError::Timeout));
    }

    #[tokio::test]
    async fn unreachable_registry_is_a_transport_error() {
        // Bind then drop to get a port nobody listens on.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = HttpRegistryClient::new(format!("http://{}/whitelist", addr), Duration::from_secs(2)).unwrap();
        assert!(matches!(
            client.submit(&WhitelistRequest::new("9", "Notch")).await,
            Err(RegistryError::Transport(_))
        ));
    }
}
