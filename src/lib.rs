//! Room chat client library
//!
//! Client side of a room-based chat service: REST API access, bearer-token
//! session persistence, a STOMP realtime channel, and the per-room message
//! reconciliation core that merges history with live topic deliveries.

pub mod attachment;
pub mod channel;
pub mod chat;
pub mod error;
pub mod models;
pub mod network;
pub mod stomp;
pub mod storage;

use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;

pub use attachment::*;
pub use channel::{ChannelEvent, ChannelSession, ChannelState};
pub use chat::{Ingest, RoomClient, RoomSession};
pub use error::{Error, Result};
pub use models::*;
pub use network::ApiClient;
pub use storage::SessionStore;

/// Client configuration
#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub server_host: String,
    pub server_port: u16,
    pub use_tls: bool,
}

impl ClientConfig {
    pub fn new(host: &str, port: u16, use_tls: bool) -> Self {
        Self {
            server_host: host.to_string(),
            server_port: port,
            use_tls,
        }
    }

    /// Parse a base URL like `http://localhost:8080`.
    pub fn from_url(raw: &str) -> Result<Self> {
        let parsed = url::Url::parse(raw)
            .map_err(|e| Error::Server(format!("Invalid server URL '{}': {}", raw, e)))?;
        let use_tls = parsed.scheme() == "https";
        let host = parsed
            .host_str()
            .ok_or_else(|| Error::Server(format!("Server URL '{}' has no host", raw)))?;
        let port = parsed
            .port()
            .unwrap_or(if use_tls { 443 } else { 80 });
        Ok(Self::new(host, port, use_tls))
    }

    pub fn http_url(&self) -> String {
        let scheme = if self.use_tls { "https" } else { "http" };
        format!("{}://{}:{}", scheme, self.server_host, self.server_port)
    }

    /// Raw WebSocket sub-endpoint of the broker's SockJS mount.
    pub fn ws_url(&self) -> String {
        let scheme = if self.use_tls { "wss" } else { "ws" };
        format!(
            "{}://{}:{}/ws/websocket",
            scheme, self.server_host, self.server_port
        )
    }
}

/// Top-level client: owns the API client, the persisted session, and the
/// signed-in user. Rooms are entered through it, one `RoomClient` each.
pub struct ChatClient {
    config: ClientConfig,
    api: Arc<ApiClient>,
    store: SessionStore,
    user: Mutex<Option<AuthUser>>,
}

impl ChatClient {
    pub fn new(config: ClientConfig, data_dir: &Path) -> Result<Self> {
        let store = SessionStore::new(data_dir)?;
        let api = Arc::new(ApiClient::new(&config));
        Ok(Self {
            config,
            api,
            store,
            user: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn api(&self) -> &Arc<ApiClient> {
        &self.api
    }

    pub fn current_user(&self) -> Option<AuthUser> {
        self.user.lock().clone()
    }

    /// Restore a persisted session, validating the stored token against the
    /// backend. Anything short of a positive answer clears the stored state
    /// so the caller routes to sign-in.
    pub async fn restore_session(&self) -> Result<Option<AuthUser>> {
        let Some(token) = self.store.token() else {
            return Ok(None);
        };
        let Some(user) = self.store.current_user() else {
            self.store.clear()?;
            return Ok(None);
        };

        match self.api.validate_token(&token).await {
            Ok(true) => {
                self.api.set_token(Some(token));
                *self.user.lock() = Some(user.clone());
                Ok(Some(user))
            }
            _ => {
                self.store.clear()?;
                self.api.set_token(None);
                Ok(None)
            }
        }
    }

    pub async fn sign_up(
        &self,
        username: &str,
        email: &str,
        password: &str,
        full_name: &str,
    ) -> Result<AuthUser> {
        let data = self.api.sign_up(username, email, password, full_name).await?;
        self.adopt_session(data)
    }

    pub async fn sign_in(&self, username_or_email: &str, password: &str) -> Result<AuthUser> {
        let data = self.api.sign_in(username_or_email, password).await?;
        self.adopt_session(data)
    }

    fn adopt_session(&self, data: AuthResponse) -> Result<AuthUser> {
        let token = data
            .token
            .ok_or_else(|| Error::AuthRejected("Server returned no token".to_string()))?;
        let user = data
            .user
            .ok_or_else(|| Error::AuthRejected("Server returned no user".to_string()))?;
        self.store.save_session(&token, &user)?;
        *self.user.lock() = Some(user.clone());
        Ok(user)
    }

    pub fn logout(&self) -> Result<()> {
        self.store.clear()?;
        self.api.set_token(None);
        *self.user.lock() = None;
        Ok(())
    }

    // ============= Rooms =============

    pub async fn rooms(&self) -> Result<Vec<RoomSummary>> {
        self.api.rooms().await
    }

    /// Create a room; returns the server-issued room id.
    pub async fn create_room(&self, room_name: &str, password: Option<&str>) -> Result<String> {
        let user = self.current_user().ok_or(Error::NotAuthenticated)?;
        let data = self
            .api
            .create_room(room_name, password, &user.username)
            .await?;
        data.room
            .map(|r| r.room_id)
            .ok_or_else(|| Error::Server("Server returned no room id".to_string()))
    }

    pub async fn join_room(&self, room_id: &str, password: Option<&str>) -> Result<()> {
        let user = self.current_user().ok_or(Error::NotAuthenticated)?;
        self.api.join_room(room_id, password, &user.username).await?;
        Ok(())
    }

    /// Enter a room: binds a realtime channel session and returns the view
    /// driver for it. Exactly one per open room view.
    pub fn enter_room(&self, room_id: &str) -> Result<RoomClient> {
        let user = self.current_user().ok_or(Error::NotAuthenticated)?;
        RoomClient::open(&self.config, self.api.clone(), user, room_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_urls() {
        let config = ClientConfig::new("localhost", 8080, false);
        assert_eq!(config.http_url(), "http://localhost:8080");
        assert_eq!(config.ws_url(), "ws://localhost:8080/ws/websocket");

        let tls = ClientConfig::new("chat.example.com", 8443, true);
        assert_eq!(tls.http_url(), "https://chat.example.com:8443");
        assert_eq!(tls.ws_url(), "wss://chat.example.com:8443/ws/websocket");
    }

    #[test]
    fn config_parses_base_urls() {
        let config = ClientConfig::from_url("http://localhost:8080").unwrap();
        assert_eq!(config.server_host, "localhost");
        assert_eq!(config.server_port, 8080);
        assert!(!config.use_tls);

        let config = ClientConfig::from_url("https://chat.example.com").unwrap();
        assert_eq!(config.server_port, 443);
        assert!(config.use_tls);

        assert!(ClientConfig::from_url("not a url").is_err());
    }
}
