#![allow(dead_code)]

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use reqwest::{Client, Response, StatusCode};
use serde_json::{json, Value};
use tokio::net::TcpListener;

use passfoo_api::api::{self, AppState};
use passfoo_api::config::AppConfig;

/// A server running inside the test's runtime on memory storage.
pub struct TestServer {
    pub base_url: String,
    pub client: Client,
}

impl TestServer {
    pub async fn spawn() -> Result<Self> {
        // Pick an unused port for isolation
        let port = portpicker::pick_unused_port().context("failed to pick free port")?;
        let listener = TcpListener::bind(("127.0.0.1", port))
            .await
            .context("failed to bind test port")?;
        let state = AppState::in_memory(AppConfig::in_memory());
        tokio::spawn(api::serve(listener, state));

        let server = Self {
            base_url: format!("http://127.0.0.1:{}", port),
            client: Client::new(),
        };
        server.wait_ready(Duration::from_secs(10)).await?;
        Ok(server)
    }

    async fn wait_ready(&self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if let Ok(resp) = self.client.get(self.url("/health")).send().await {
                if resp.status() == StatusCode::OK {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        anyhow::bail!("server did not become ready on {} within {:?}", self.base_url, timeout)
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn get(&self, path: &str, token: Option<&str>) -> Result<(StatusCode, Value)> {
        let mut req = self.client.get(self.url(path));
        if let Some(token) = token {
            req = req.header("Authorization", format!("Token {}", token));
        }
        read(req.send().await?).await
    }

    pub async fn send(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> Result<(StatusCode, Value)> {
        let mut req = self.client.request(method, self.url(path));
        if let Some(body) = body {
            req = req.json(&body);
        }
        if let Some(token) = token {
            req = req.header("Authorization", format!("Token {}", token));
        }
        read(req.send().await?).await
    }

    pub async fn post(&self, path: &str, body: Value, token: Option<&str>) -> Result<(StatusCode, Value)> {
        self.send(reqwest::Method::POST, path, Some(body), token).await
    }

    /// Register `username` and log in, returning the session token and user id.
    pub async fn sign_up(&self, username: &str, password: &str) -> Result<(String, i64)> {
        let (status, body) = self
            .post(
                "/api/auth/register",
                json!({"token": password, "created_by": {"username": username}}),
                None,
            )
            .await?;
        anyhow::ensure!(status == StatusCode::CREATED, "register failed: {} {}", status, body);

        let (status, body) = self
            .post("/api/auth/login", json!({"username": username, "password": password}), None)
            .await?;
        anyhow::ensure!(status == StatusCode::OK, "login failed: {} {}", status, body);

        let token = body["token"].as_str().context("login returned no token")?.to_string();
        let user_id = body["user"]["id"].as_i64().context("login returned no user id")?;
        Ok((token, user_id))
    }
}

async fn read(resp: Response) -> Result<(StatusCode, Value)> {
    let status = resp.status();
    let body = resp.json::<Value>().await.context("response body is not JSON")?;
    Ok((status, body))
}

pub fn question(text: &str) -> Value {
    json!({"text": text, "password_text": format!("{}?", text), "data_type": "string"})
}
