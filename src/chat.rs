//! Room session: message reconciliation, name cache, connection glue
//!
//! `RoomSession` is the authoritative in-memory view of one room - the
//! deduplicated, arrival-ordered message list plus the display-name cache.
//! It does no I/O; `RoomClient` drives it from channel events and REST
//! results, one event at a time.

use crate::attachment;
use crate::channel::{ChannelEvent, ChannelSession, ChannelState};
use crate::error::{Error, Result};
use crate::models::{now_timestamp, AuthUser, ChatMessage, OutgoingMessage};
use crate::network::ApiClient;
use crate::ClientConfig;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Outcome of feeding one realtime event into the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ingest {
    /// Appended to the list; `lookup` names a sender whose display name
    /// still needs resolving.
    Appended { lookup: Option<String> },
    /// Same identity triple already present - dropped.
    Duplicate,
    /// Session already closed - late events are ignored.
    Closed,
}

/// Reconciliation state for one room. Lives exactly as long as the room
/// view; replaced wholesale when another room is entered.
pub struct RoomSession {
    room_id: String,
    current_user: String,
    messages: Vec<ChatMessage>,
    name_cache: HashMap<String, String>,
    pending_lookups: HashSet<String>,
    room_name: Option<String>,
    online_users: u32,
    closed: bool,
}

impl RoomSession {
    pub fn new(room_id: &str, current_user: &str) -> Self {
        Self {
            room_id: room_id.to_string(),
            current_user: current_user.to_string(),
            messages: Vec::new(),
            name_cache: HashMap::new(),
            pending_lookups: HashSet::new(),
            room_name: None,
            online_users: 0,
            closed: false,
        }
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub fn current_user(&self) -> &str {
        &self.current_user
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn room_name(&self) -> Option<&str> {
        self.room_name.as_deref()
    }

    pub fn online_users(&self) -> u32 {
        self.online_users
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn lookup_needed(&self, sender: &str) -> bool {
        sender != self.current_user
            && !self.name_cache.contains_key(sender)
            && !self.pending_lookups.contains(sender)
    }

    /// Replace the whole list with a freshly loaded history. Server order
    /// is taken as canonical; nothing is re-sorted. Returns the distinct
    /// senders whose display names still need resolving.
    pub fn replace_history(&mut self, history: Vec<ChatMessage>) -> Vec<String> {
        if self.closed {
            return Vec::new();
        }
        self.messages = history;

        let mut wanted = Vec::new();
        let mut seen = HashSet::new();
        for msg in &self.messages {
            if seen.insert(msg.sender.as_str()) && self.lookup_needed(&msg.sender) {
                wanted.push(msg.sender.clone());
            }
        }
        for sender in &wanted {
            self.pending_lookups.insert(sender.clone());
        }
        wanted
    }

    /// Feed one event from a realtime topic. The same logical send may be
    /// fanned out on both the room and attachment topics; the identity
    /// triple collapses the second delivery to a no-op.
    pub fn ingest(&mut self, message: ChatMessage) -> Ingest {
        if self.closed {
            return Ingest::Closed;
        }
        if self.messages.iter().any(|m| m.same_event(&message)) {
            return Ingest::Duplicate;
        }
        let lookup = if self.lookup_needed(&message.sender) {
            self.pending_lookups.insert(message.sender.clone());
            Some(message.sender.clone())
        } else {
            None
        };
        self.messages.push(message);
        Ingest::Appended { lookup }
    }

    /// Resolve the name to show for a message, at render time: the
    /// message's own `senderFullName` wins, then the cache, then the raw
    /// username. Stored messages are never rewritten by late resolutions.
    pub fn display_name<'a>(&'a self, message: &'a ChatMessage) -> &'a str {
        message
            .sender_full_name
            .as_deref()
            .or_else(|| self.name_cache.get(&message.sender).map(String::as_str))
            .unwrap_or(&message.sender)
    }

    /// Record a lookup result. A failed lookup pins the username itself so
    /// the same name is never fetched twice in one session.
    pub fn complete_lookup(&mut self, username: &str, full_name: Option<String>) {
        if self.closed {
            return;
        }
        self.pending_lookups.remove(username);
        let resolved = full_name.unwrap_or_else(|| username.to_string());
        self.name_cache.entry(username.to_string()).or_insert(resolved);
    }

    pub fn set_room_name(&mut self, name: String) {
        if !self.closed {
            self.room_name = Some(name);
        }
    }

    pub fn set_online_users(&mut self, count: u32) {
        if !self.closed {
            self.online_users = count;
        }
    }

    /// Tear the session down: the list stops accepting events and the name
    /// cache is discarded.
    pub fn close(&mut self) {
        self.closed = true;
        self.name_cache.clear();
        self.pending_lookups.clear();
    }
}

/// Everything needed to run one room view: the shared API client, the
/// realtime binding, the reconciliation state, and the lookup plumbing.
pub struct RoomClient {
    api: Arc<ApiClient>,
    channel: ChannelSession,
    session: RoomSession,
    user: AuthUser,
    names_tx: mpsc::UnboundedSender<(String, Option<String>)>,
    names_rx: mpsc::UnboundedReceiver<(String, Option<String>)>,
}

impl RoomClient {
    /// Enter a room. Requires a bearer token; without one this fails before
    /// any network activity so the caller can route to sign-in. Room
    /// metadata and history load once the channel reports connected.
    pub fn open(
        config: &ClientConfig,
        api: Arc<ApiClient>,
        user: AuthUser,
        room_id: &str,
    ) -> Result<Self> {
        let token = api.token().ok_or(Error::NotAuthenticated)?;
        let channel = ChannelSession::connect(config, room_id, &token)?;
        let (names_tx, names_rx) = mpsc::unbounded_channel();
        Ok(Self {
            api,
            channel,
            session: RoomSession::new(room_id, &user.username),
            user,
            names_tx,
            names_rx,
        })
    }

    pub fn session(&self) -> &RoomSession {
        &self.session
    }

    pub fn connection_state(&self) -> ChannelState {
        self.channel.state()
    }

    pub fn is_connected(&self) -> bool {
        self.channel.is_connected()
    }

    /// Drain pending channel events and completed name lookups into the
    /// session. Call from the view loop; each event is applied exactly
    /// once, in delivery order.
    pub async fn process_events(&mut self) {
        for event in self.channel.poll_events() {
            match event {
                ChannelEvent::Connected => {
                    self.load_room_info().await;
                    if let Err(e) = self.reload_history().await {
                        tracing::warn!(room = %self.session.room_id(), "history load failed: {}", e);
                    }
                }
                ChannelEvent::Disconnected => {
                    tracing::info!(room = %self.session.room_id(), "realtime channel reconnecting");
                }
                ChannelEvent::Message { topic, message } => {
                    tracing::debug!(topic = %topic, sender = %message.sender, "event");
                    if let Ingest::Appended { lookup: Some(username) } =
                        self.session.ingest(message)
                    {
                        self.spawn_lookup(username);
                    }
                }
                ChannelEvent::OnlineCount(count) => self.session.set_online_users(count),
            }
        }

        while let Ok((username, full_name)) = self.names_rx.try_recv() {
            self.session.complete_lookup(&username, full_name);
        }
    }

    async fn load_room_info(&mut self) {
        // Metadata failures degrade to defaults; the room stays usable.
        match self.api.room_info(self.session.room_id()).await {
            Ok(info) => {
                if let Some(name) = info.room_name {
                    self.session.set_room_name(name);
                }
                if let Some(count) = info.active_users {
                    self.session.set_online_users(count);
                }
            }
            Err(e) => tracing::warn!(room = %self.session.room_id(), "room info failed: {}", e),
        }
    }

    /// Fetch history and replace the message list. On failure the existing
    /// list is left untouched and the error is returned; there is no
    /// internal retry.
    pub async fn reload_history(&mut self) -> Result<()> {
        let history = self.api.room_messages(self.session.room_id()).await?;
        for username in self.session.replace_history(history) {
            self.spawn_lookup(username);
        }
        Ok(())
    }

    fn spawn_lookup(&self, username: String) {
        let api = self.api.clone();
        let tx = self.names_tx.clone();
        tokio::spawn(async move {
            // Any failure falls back to the raw username, cached terminally.
            let resolved = api.user_full_name(&username).await.ok().flatten();
            let _ = tx.send((username, resolved));
        });
    }

    /// Publish a text message. Blank input or a disconnected channel makes
    /// this a silent no-op (`false`). The message is NOT appended locally;
    /// it appears once it echoes back on the room topic, which keeps the
    /// subscription the single source of truth for delivery.
    pub fn send_text(&self, content: &str) -> Result<bool> {
        if content.trim().is_empty() || !self.channel.is_connected() {
            return Ok(false);
        }
        let message = OutgoingMessage {
            sender: self.session.current_user().to_string(),
            content: content.to_string(),
            room_id: self.session.room_id().to_string(),
            time_stamp: now_timestamp(),
            sender_full_name: self.user.display_name().to_string(),
        };
        self.channel.publish(&message)?;
        Ok(true)
    }

    /// Upload an attachment. The size/type gate runs before any request is
    /// built; on success the backend persists the file and fans the
    /// resulting message out over the realtime topics itself, so delivery
    /// is observed through `process_events` like any other message.
    pub async fn send_attachment(
        &self,
        data: Vec<u8>,
        file_name: &str,
        mime_type: &str,
    ) -> Result<()> {
        attachment::validate_upload(data.len() as u64, mime_type)?;
        self.api
            .upload_message(
                data,
                file_name,
                mime_type,
                self.session.current_user(),
                self.user.display_name(),
                self.session.room_id(),
            )
            .await
    }

    /// Convenience for file-system callers: reads the file and infers its
    /// MIME type from the name before hitting the same gate.
    pub async fn send_attachment_path(&self, path: &Path) -> Result<()> {
        let data = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("file");
        let mime = mime_guess::from_path(path).first_or_octet_stream();
        self.send_attachment(data, file_name, mime.essence_str()).await
    }

    /// Leave the room: close the channel binding and stop reconciling.
    /// Events already in flight are dropped, not applied.
    pub fn close(&mut self) {
        self.channel.close();
        self.session.close();
    }
}

impl Drop for RoomClient {
    fn drop(&mut self) {
        self.channel.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(time_stamp: &str, sender: &str, content: &str) -> ChatMessage {
        ChatMessage {
            sender: sender.to_string(),
            content: content.to_string(),
            room_id: "room-1".to_string(),
            time_stamp: time_stamp.to_string(),
            sender_full_name: None,
            file_url: None,
            file_type: None,
            file_name: None,
            original_file_name: None,
            file_size: None,
            message_type: None,
        }
    }

    #[test]
    fn duplicate_delivery_across_topics_collapses() {
        let mut session = RoomSession::new("room-1", "me");
        let event = msg("2025-03-01T10:15:00.000Z", "alice", "hi");

        assert!(matches!(
            session.ingest(event.clone()),
            Ingest::Appended { .. }
        ));
        // Same triple arriving on the attachment topic.
        assert_eq!(session.ingest(event), Ingest::Duplicate);
        assert_eq!(session.messages().len(), 1);
    }

    #[test]
    fn arrival_order_is_preserved() {
        let mut session = RoomSession::new("room-1", "me");
        for i in 0..5 {
            let m = msg(
                &format!("2025-03-01T10:15:0{}.000Z", i),
                "alice",
                &format!("msg {}", i),
            );
            session.ingest(m);
        }
        let contents: Vec<_> = session.messages().iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["msg 0", "msg 1", "msg 2", "msg 3", "msg 4"]);
    }

    #[test]
    fn history_reload_replaces_rather_than_appends() {
        let mut session = RoomSession::new("room-1", "me");
        session.replace_history(vec![
            msg("2025-03-01T10:00:00.000Z", "alice", "m1"),
            msg("2025-03-01T10:01:00.000Z", "bob", "m2"),
        ]);
        assert_eq!(session.messages().len(), 2);

        session.replace_history(vec![msg("2025-03-01T10:02:00.000Z", "carol", "m3")]);
        let contents: Vec<_> = session.messages().iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["m3"]);
    }

    #[test]
    fn history_reports_each_unknown_sender_once() {
        let mut session = RoomSession::new("room-1", "me");
        let wanted = session.replace_history(vec![
            msg("2025-03-01T10:00:00.000Z", "alice", "m1"),
            msg("2025-03-01T10:01:00.000Z", "alice", "m2"),
            msg("2025-03-01T10:02:00.000Z", "me", "m3"),
            msg("2025-03-01T10:03:00.000Z", "bob", "m4"),
        ]);
        assert_eq!(wanted, ["alice", "bob"]);
    }

    #[test]
    fn failed_lookup_pins_the_username() {
        let mut session = RoomSession::new("room-1", "me");
        let event = msg("2025-03-01T10:15:00.000Z", "alice", "hi");

        let Ingest::Appended { lookup } = session.ingest(event.clone()) else {
            panic!("expected append");
        };
        assert_eq!(lookup.as_deref(), Some("alice"));

        // Lookup failed: the raw username becomes the terminal resolution.
        session.complete_lookup("alice", None);
        assert_eq!(session.display_name(&session.messages()[0]), "alice");

        // Further sightings issue no new lookup.
        let again = msg("2025-03-01T10:16:00.000Z", "alice", "hi again");
        assert_eq!(session.ingest(again), Ingest::Appended { lookup: None });
    }

    #[test]
    fn pending_lookup_is_not_reissued() {
        let mut session = RoomSession::new("room-1", "me");
        let Ingest::Appended { lookup } =
            session.ingest(msg("2025-03-01T10:15:00.000Z", "alice", "one"))
        else {
            panic!("expected append");
        };
        assert!(lookup.is_some());

        // Second message lands before the first lookup resolves.
        assert_eq!(
            session.ingest(msg("2025-03-01T10:15:01.000Z", "alice", "two")),
            Ingest::Appended { lookup: None }
        );
    }

    #[test]
    fn rendering_consults_the_cache_not_the_stored_message() {
        let mut session = RoomSession::new("room-1", "me");
        session.ingest(msg("2025-03-01T10:15:00.000Z", "alice", "hi"));

        // Before resolution the raw username shows.
        assert_eq!(session.display_name(&session.messages()[0]), "alice");

        session.complete_lookup("alice", Some("Alice Smith".to_string()));
        // The stored message is untouched; resolution is render-time.
        assert!(session.messages()[0].sender_full_name.is_none());
        assert_eq!(session.display_name(&session.messages()[0]), "Alice Smith");
    }

    #[test]
    fn sender_full_name_on_the_message_wins() {
        let mut session = RoomSession::new("room-1", "me");
        let mut event = msg("2025-03-01T10:15:00.000Z", "alice", "hi");
        event.sender_full_name = Some("Alice From Wire".to_string());
        session.ingest(event);
        session.complete_lookup("alice", Some("Alice From Cache".to_string()));
        assert_eq!(
            session.display_name(&session.messages()[0]),
            "Alice From Wire"
        );
    }

    #[test]
    fn own_messages_need_no_lookup() {
        let mut session = RoomSession::new("room-1", "me");
        assert_eq!(
            session.ingest(msg("2025-03-01T10:15:00.000Z", "me", "hi")),
            Ingest::Appended { lookup: None }
        );
    }

    #[test]
    fn late_events_after_close_are_ignored() {
        let mut session = RoomSession::new("room-1", "me");
        session.ingest(msg("2025-03-01T10:15:00.000Z", "alice", "hi"));
        session.close();

        assert_eq!(
            session.ingest(msg("2025-03-01T10:16:00.000Z", "bob", "late")),
            Ingest::Closed
        );
        assert_eq!(session.messages().len(), 1);

        // Late history and lookup results are dropped too.
        assert!(session
            .replace_history(vec![msg("2025-03-01T10:17:00.000Z", "bob", "x")])
            .is_empty());
        assert_eq!(session.messages().len(), 1);
        session.complete_lookup("alice", Some("Alice Smith".to_string()));
        assert_eq!(session.display_name(&session.messages()[0]), "alice");
    }
}
