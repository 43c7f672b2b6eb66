//! HTTP API client for the chat backend

use crate::error::{Error, Result};
use crate::models::*;
use crate::ClientConfig;
use parking_lot::Mutex;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;

/// Shared ceiling for every REST call; beyond it the request counts as a
/// network failure.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub struct ApiClient {
    http: Client,
    base_url: String,
    token: Mutex<Option<String>>,
}

impl ApiClient {
    pub fn new(config: &ClientConfig) -> Self {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            http,
            base_url: config.http_url(),
            token: Mutex::new(None),
        }
    }

    pub fn set_token(&self, token: Option<String>) {
        *self.token.lock() = token;
    }

    pub fn token(&self) -> Option<String> {
        self.token.lock().clone()
    }

    fn auth_header(&self) -> Result<String> {
        self.token
            .lock()
            .as_ref()
            .map(|t| format!("Bearer {}", t))
            .ok_or(Error::NotAuthenticated)
    }

    // ============= Authentication =============

    pub async fn sign_up(
        &self,
        username: &str,
        email: &str,
        password: &str,
        full_name: &str,
    ) -> Result<AuthResponse> {
        let resp = self
            .http
            .post(format!("{}/api/v1/auth/signup", self.base_url))
            .json(&json!({
                "username": username,
                "email": email,
                "password": password,
                "fullName": full_name
            }))
            .send()
            .await?;

        let status = resp.status();
        let data: AuthResponse = resp.json().await?;
        if !status.is_success() || !data.success {
            return Err(Error::AuthRejected(
                data.message.unwrap_or_else(|| "Signup failed".to_string()),
            ));
        }
        *self.token.lock() = data.token.clone();
        Ok(data)
    }

    pub async fn sign_in(&self, username_or_email: &str, password: &str) -> Result<AuthResponse> {
        let resp = self
            .http
            .post(format!("{}/api/v1/auth/signin", self.base_url))
            .json(&json!({
                "usernameOrEmail": username_or_email,
                "password": password
            }))
            .send()
            .await?;

        let status = resp.status();
        let data: AuthResponse = resp.json().await?;
        if !status.is_success() || !data.success {
            return Err(Error::AuthRejected(
                data.message
                    .unwrap_or_else(|| "Invalid credentials".to_string()),
            ));
        }
        *self.token.lock() = data.token.clone();
        Ok(data)
    }

    /// Check a stored token against the backend. `Ok(false)` means the
    /// token was rejected and the stored session should be cleared.
    pub async fn validate_token(&self, token: &str) -> Result<bool> {
        let resp = self
            .http
            .post(format!("{}/api/v1/auth/validate", self.base_url))
            .header("Authorization", format!("Bearer {}", token))
            .send()
            .await?;

        if !resp.status().is_success() {
            return Ok(false);
        }
        let data: ValidateResponse = resp.json().await?;
        Ok(data.valid)
    }

    // ============= Rooms =============

    pub async fn create_room(
        &self,
        room_name: &str,
        password: Option<&str>,
        created_by: &str,
    ) -> Result<CreateRoomResponse> {
        let auth = self.auth_header()?;

        let mut body = json!({
            "roomName": room_name,
            "createdBy": created_by
        });
        if let Some(password) = password.filter(|p| !p.trim().is_empty()) {
            body["password"] = json!(password);
        }

        let resp = self
            .http
            .post(format!("{}/api/v1/rooms/create", self.base_url))
            .header("Authorization", auth)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        let data: CreateRoomResponse = resp.json().await?;
        if !status.is_success() || !data.success {
            return Err(Error::Server(
                data.message
                    .unwrap_or_else(|| "Failed to create room".to_string()),
            ));
        }
        Ok(data)
    }

    pub async fn join_room(
        &self,
        room_id: &str,
        password: Option<&str>,
        username: &str,
    ) -> Result<JoinRoomResponse> {
        let auth = self.auth_header()?;

        let mut body = json!({
            "roomId": room_id,
            "username": username
        });
        if let Some(password) = password.filter(|p| !p.trim().is_empty()) {
            body["password"] = json!(password);
        }

        let resp = self
            .http
            .post(format!("{}/api/v1/rooms/join", self.base_url))
            .header("Authorization", auth)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if status.as_u16() == 404 {
            return Err(Error::RoomNotFound(room_id.to_string()));
        }
        let data: JoinRoomResponse = resp.json().await?;
        if !status.is_success() || !data.success {
            return Err(Error::Server(
                data.message
                    .unwrap_or_else(|| "Failed to join room".to_string()),
            ));
        }
        Ok(data)
    }

    pub async fn rooms(&self) -> Result<Vec<RoomSummary>> {
        let auth = self.auth_header()?;

        let resp = self
            .http
            .get(format!("{}/api/v1/rooms/all", self.base_url))
            .header("Authorization", auth)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(Error::Server(format!(
                "Failed to list rooms: {}",
                resp.status()
            )));
        }
        Ok(resp.json().await?)
    }

    pub async fn room_info(&self, room_id: &str) -> Result<RoomInfo> {
        let auth = self.auth_header()?;

        let resp = self
            .http
            .get(format!("{}/api/v1/rooms/{}", self.base_url, room_id))
            .header("Authorization", auth)
            .send()
            .await?;

        if resp.status().as_u16() == 404 {
            return Err(Error::RoomNotFound(room_id.to_string()));
        }
        if !resp.status().is_success() {
            return Err(Error::Server(format!(
                "Failed to load room: {}",
                resp.status()
            )));
        }
        Ok(resp.json().await?)
    }

    /// Ordered message history for a room. Server order is canonical.
    pub async fn room_messages(&self, room_id: &str) -> Result<Vec<ChatMessage>> {
        let auth = self.auth_header()?;

        let resp = self
            .http
            .get(format!(
                "{}/api/v1/rooms/{}/messages",
                self.base_url, room_id
            ))
            .header("Authorization", auth)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(Error::Server(format!(
                "Failed to load messages: {}",
                resp.status()
            )));
        }
        Ok(resp.json().await?)
    }

    // ============= Users =============

    /// Display-name lookup for a username. Callers treat any failure as
    /// "unresolved" and fall back to the username itself.
    pub async fn user_full_name(&self, username: &str) -> Result<Option<String>> {
        let auth = self.auth_header()?;

        let resp = self
            .http
            .get(format!("{}/api/v1/users/{}", self.base_url, username))
            .header("Authorization", auth)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(Error::Server(format!(
                "User lookup failed: {}",
                resp.status()
            )));
        }
        let profile: UserProfile = resp.json().await?;
        Ok(profile.full_name)
    }

    // ============= Files =============

    /// Upload a file plus sender/room metadata. The endpoint persists the
    /// attachment and fans the resulting message out over the realtime
    /// topics; the client never publishes it.
    pub async fn upload_message(
        &self,
        data: Vec<u8>,
        file_name: &str,
        mime_type: &str,
        sender: &str,
        sender_full_name: &str,
        room_id: &str,
    ) -> Result<()> {
        let auth = self.auth_header()?;

        let part = reqwest::multipart::Part::bytes(data)
            .file_name(file_name.to_string())
            .mime_str(mime_type)?;

        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("sender", sender.to_string())
            .text("senderFullName", sender_full_name.to_string())
            .text("roomId", room_id.to_string());

        let resp = self
            .http
            .post(format!("{}/api/v1/files/upload-message", self.base_url))
            .header("Authorization", auth)
            .multipart(form)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(Error::Server(format!("Upload failed: {}", resp.status())));
        }
        Ok(())
    }
}
