//! Realtime channel adapter
//!
//! One STOMP-over-WebSocket binding per active room: subscribes the room,
//! attachment and online-count topics, queues decoded events for the
//! reconciliation core, and redials with a fixed delay after transport loss.

use crate::error::{Error, Result};
use crate::models::{ChatMessage, OutgoingMessage};
use crate::stomp::Frame;
use crate::ClientConfig;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};

/// Delay between automatic reconnection attempts.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Outbound publish destination for text messages.
pub const SEND_DESTINATION: &str = "/app/chat.sendMessage";

pub fn room_topic(room_id: &str) -> String {
    format!("/topic/room/{}", room_id)
}

pub fn file_topic(room_id: &str) -> String {
    format!("/topic/messages/{}", room_id)
}

pub fn users_topic(room_id: &str) -> String {
    format!("/topic/room/{}/users", room_id)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Idle,
    Connecting,
    Connected,
    Disconnected,
    Closed,
}

#[derive(Debug, Clone)]
pub enum ChannelEvent {
    Connected,
    Disconnected,
    /// A decoded message from either message topic.
    Message { topic: String, message: ChatMessage },
    /// Online-user count for the room.
    OnlineCount(u32),
}

/// One realtime binding to one room. Created on room entry, closed on
/// leave; a closed session never redials and drops late frames.
pub struct ChannelSession {
    room_id: String,
    state: Arc<Mutex<ChannelState>>,
    events: Arc<Mutex<VecDeque<ChannelEvent>>>,
    outbound: Arc<Mutex<Option<mpsc::UnboundedSender<String>>>>,
    shutdown: watch::Sender<bool>,
}

impl ChannelSession {
    /// Bind the channel and start the connection supervisor. Must be called
    /// on a tokio runtime; the returned session is in `Connecting` state
    /// until the broker handshake and topic subscriptions complete.
    pub fn connect(config: &ClientConfig, room_id: &str, token: &str) -> Result<Self> {
        if token.is_empty() {
            return Err(Error::NotAuthenticated);
        }

        let (shutdown, _) = watch::channel(false);
        let session = Self {
            room_id: room_id.to_string(),
            state: Arc::new(Mutex::new(ChannelState::Idle)),
            events: Arc::new(Mutex::new(VecDeque::new())),
            outbound: Arc::new(Mutex::new(None)),
            shutdown,
        };
        session.spawn_supervisor(config.clone(), token.to_string());
        Ok(session)
    }

    fn spawn_supervisor(&self, config: ClientConfig, token: String) {
        let room_id = self.room_id.clone();
        let state = self.state.clone();
        let events = self.events.clone();
        let outbound = self.outbound.clone();
        let mut shutdown = self.shutdown.subscribe();

        tokio::spawn(async move {
            loop {
                if *state.lock() == ChannelState::Closed {
                    break;
                }
                *state.lock() = ChannelState::Connecting;

                let result = run_connection(
                    &config, &room_id, &token, &state, &events, &outbound, &mut shutdown,
                )
                .await;

                *outbound.lock() = None;
                if *state.lock() == ChannelState::Closed {
                    break;
                }
                if let Err(e) = result {
                    tracing::warn!(room = %room_id, "channel connection lost: {}", e);
                }
                *state.lock() = ChannelState::Disconnected;
                events.lock().push_back(ChannelEvent::Disconnected);

                tokio::select! {
                    _ = tokio::time::sleep(RECONNECT_DELAY) => {}
                    _ = shutdown.changed() => break,
                }
            }
            tracing::debug!(room = %room_id, "channel supervisor stopped");
        });
    }

    /// Current connection state.
    pub fn state(&self) -> ChannelState {
        *self.state.lock()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ChannelState::Connected
    }

    /// Drain all queued events in arrival order.
    pub fn poll_events(&self) -> Vec<ChannelEvent> {
        let mut queue = self.events.lock();
        queue.drain(..).collect()
    }

    /// Publish a message to the send destination. Fails unless connected.
    pub fn publish(&self, message: &OutgoingMessage) -> Result<()> {
        if self.state() != ChannelState::Connected {
            return Err(Error::ChannelClosed);
        }
        let body = serde_json::to_string(message)?;
        let guard = self.outbound.lock();
        let tx = guard.as_ref().ok_or(Error::ChannelClosed)?;
        tx.send(Frame::send(SEND_DESTINATION, &body).encode())
            .map_err(|_| Error::ChannelClosed)
    }

    /// Deactivate the channel: terminal, releases the subscriptions and
    /// stops the reconnect loop.
    pub fn close(&self) {
        {
            let mut state = self.state.lock();
            if *state == ChannelState::Closed {
                return;
            }
            *state = ChannelState::Closed;
        }
        if let Some(tx) = self.outbound.lock().take() {
            let _ = tx.send(Frame::disconnect().encode());
        }
        let _ = self.shutdown.send(true);
    }
}

impl Drop for ChannelSession {
    fn drop(&mut self) {
        self.close();
    }
}

/// One dial: handshake, subscribe, then pump broker frames into the event
/// queue until the socket drops or the session is shut down.
async fn run_connection(
    config: &ClientConfig,
    room_id: &str,
    token: &str,
    state: &Mutex<ChannelState>,
    events: &Mutex<VecDeque<ChannelEvent>>,
    outbound: &Mutex<Option<mpsc::UnboundedSender<String>>>,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<()> {
    let (ws_stream, _) = connect_async(config.ws_url()).await?;
    let (mut write, mut read) = ws_stream.split();

    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    // Write task owns the sink for this dial; ends when the sender side is
    // dropped on disconnect or close.
    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if write.send(WsMessage::Text(frame)).await.is_err() {
                break;
            }
        }
        let _ = write.close().await;
    });

    tx.send(Frame::connect(&config.server_host, token).encode())
        .map_err(|_| Error::ChannelClosed)?;

    let users = users_topic(room_id);
    let result = loop {
        if *shutdown.borrow() {
            break Ok(());
        }
        let text = tokio::select! {
            _ = shutdown.changed() => break Ok(()),
            msg = read.next() => match msg {
                Some(Ok(WsMessage::Text(text))) => text,
                Some(Ok(WsMessage::Close(_))) | None => break Ok(()),
                Some(Ok(_)) => continue,
                Some(Err(e)) => break Err(Error::from(e)),
            },
        };

        let Some(frame) = Frame::parse(&text) else {
            continue;
        };
        match frame.command.as_str() {
            "CONNECTED" => {
                // Subscribe all three topics before reporting connected;
                // history load is gated on the Connected event.
                for (i, dest) in [room_topic(room_id), file_topic(room_id), users.clone()]
                    .iter()
                    .enumerate()
                {
                    tx.send(Frame::subscribe(&format!("sub-{}", i), dest).encode())
                        .map_err(|_| Error::ChannelClosed)?;
                }
                *outbound.lock() = Some(tx.clone());
                *state.lock() = ChannelState::Connected;
                events.lock().push_back(ChannelEvent::Connected);
                tracing::info!(room = %room_id, "realtime channel connected");
            }
            "MESSAGE" => {
                let destination = frame.header_value("destination").unwrap_or_default();
                if destination == users {
                    match serde_json::from_str::<u32>(&frame.body) {
                        Ok(count) => events.lock().push_back(ChannelEvent::OnlineCount(count)),
                        Err(e) => tracing::debug!("bad online-count payload: {}", e),
                    }
                } else {
                    match serde_json::from_str::<ChatMessage>(&frame.body) {
                        Ok(message) => events.lock().push_back(ChannelEvent::Message {
                            topic: destination.to_string(),
                            message,
                        }),
                        Err(e) => {
                            tracing::warn!(topic = %destination, "undecodable message: {}", e)
                        }
                    }
                }
            }
            "ERROR" => {
                let detail = frame
                    .header_value("message")
                    .unwrap_or("broker error")
                    .to_string();
                break Err(Error::WebSocket(detail));
            }
            "RECEIPT" => {}
            other => tracing::debug!("ignoring frame: {}", other),
        }
    };

    drop(tx);
    let _ = writer.await;
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topics_follow_the_broker_layout() {
        assert_eq!(room_topic("abc"), "/topic/room/abc");
        assert_eq!(file_topic("abc"), "/topic/messages/abc");
        assert_eq!(users_topic("abc"), "/topic/room/abc/users");
    }

    #[test]
    fn connect_requires_a_token() {
        let config = ClientConfig::new("localhost", 8080, false);
        // No runtime needed: the token check fires before any task spawns.
        assert!(matches!(
            ChannelSession::connect(&config, "room-1", ""),
            Err(Error::NotAuthenticated)
        ));
    }

    #[tokio::test]
    async fn publish_fails_until_connected() {
        let config = ClientConfig::new("127.0.0.1", 1, false);
        let session = ChannelSession::connect(&config, "room-1", "tok").unwrap();
        let msg = OutgoingMessage {
            sender: "alice".to_string(),
            content: "hi".to_string(),
            room_id: "room-1".to_string(),
            time_stamp: crate::models::now_timestamp(),
            sender_full_name: "Alice".to_string(),
        };
        assert!(matches!(session.publish(&msg), Err(Error::ChannelClosed)));
        session.close();
        assert_eq!(session.state(), ChannelState::Closed);
    }

    #[tokio::test]
    async fn close_is_terminal() {
        let config = ClientConfig::new("127.0.0.1", 1, false);
        let session = ChannelSession::connect(&config, "room-1", "tok").unwrap();
        session.close();
        session.close();
        assert_eq!(session.state(), ChannelState::Closed);
    }
}
