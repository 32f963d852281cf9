// src/chat/controller.rs
//
// Selection controller - owns the single active chat channel and the message
// log. A selection change is a strict transition: retire the old channel's
// generation, tear it down, reset the log, set the new selection, then (and
// only then) open the new channel. The command layer at the bottom wraps a
// process-wide controller instance for the UI.

use super::channel::{ChatChannel, ChatConfig};
use super::log::{LogAppender, MessageLog};
use super::{ChatMessage, RecordId, Sender};
use crate::{events, session};
use once_cell::sync::Lazy;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

pub struct SelectionController {
    config: ChatConfig,
    selected: Option<RecordId>,
    channel: Option<ChatChannel>,
    log: Arc<MessageLog>,
    /// Generation currently allowed to append. Channel tasks hold their own
    /// generation and compare before every write.
    active_generation: Arc<AtomicU64>,
    next_generation: u64,
}

impl SelectionController {
    pub fn new(config: ChatConfig) -> Self {
        Self {
            config,
            selected: None,
            channel: None,
            log: Arc::new(MessageLog::new()),
            active_generation: Arc::new(AtomicU64::new(0)),
            next_generation: 1,
        }
    }

    pub fn selected(&self) -> Option<RecordId> {
        self.selected
    }

    /// Snapshot of the current message log in append order.
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.log.snapshot()
    }

    /// Change the selection. No-op when `id` equals the current selection
    /// (including re-selecting a record whose connect previously failed -
    /// deselect and re-select to force a retry).
    pub async fn select(&mut self, id: Option<RecordId>) {
        if id == self.selected {
            return;
        }

        // Retire the active generation before teardown even starts: from this
        // point no in-flight delivery from the old channel can be appended.
        let retired = self.issue_generation();
        self.active_generation.store(retired, Ordering::SeqCst);

        if let Some(channel) = self.channel.take() {
            tlog!(
                "[chat] Tearing down channel for record {}",
                channel.record_id()
            );
            channel.stop().await;
        }

        self.log.reset();
        self.selected = id;

        if let Some(record_id) = id {
            let generation = self.issue_generation();
            self.active_generation.store(generation, Ordering::SeqCst);
            let appender = LogAppender::new(
                self.log.clone(),
                self.active_generation.clone(),
                generation,
            );
            self.channel = Some(ChatChannel::open(self.config.clone(), record_id, appender));
        }
    }

    /// Append the user's message locally, then hand it to the channel for
    /// transmission. Rejected when no channel is active - the UI disables the
    /// send affordance whenever the selection is empty.
    pub fn send_message(&self, content: &str) -> Result<(), String> {
        let channel = self
            .channel
            .as_ref()
            .ok_or_else(|| "No record selected - chat is unavailable".to_string())?;

        let message = ChatMessage {
            sender: Sender::User,
            content: content.to_string(),
        };
        // Optimistic append: the local message lands before transmission
        self.log.append(message.clone());
        events::emit_chat_message(channel.record_id(), message);

        if let Err(e) = channel.send(content) {
            // Fire-and-forget: a failed handoff degrades like any transport
            // error and is only logged
            tlog!("[chat] Send not transmitted: {}", e);
        }
        Ok(())
    }

    fn issue_generation(&mut self) -> u64 {
        let generation = self.next_generation;
        self.next_generation += 1;
        generation
    }
}

// ============================================================================
// Process-Wide Controller
// ============================================================================

static CONTROLLER: Lazy<Mutex<Option<SelectionController>>> = Lazy::new(|| Mutex::new(None));

/// Initialise the chat subsystem. Call once during app startup.
pub async fn init(config: ChatConfig) {
    let mut guard = CONTROLLER.lock().await;
    *guard = Some(SelectionController::new(config));
}

/// Select a review record (or clear the selection with None).
/// Selecting a record requires an authenticated session.
pub async fn select_record(id: Option<RecordId>) -> Result<(), String> {
    if id.is_some() && !session::is_authenticated() {
        return Err("Not logged in".to_string());
    }

    let mut guard = CONTROLLER.lock().await;
    let controller = guard
        .as_mut()
        .ok_or_else(|| "Chat subsystem is not initialised".to_string())?;
    controller.select(id).await;
    Ok(())
}

/// Unconditional teardown: equivalent of selecting nothing. Used on logout,
/// account withdrawal and app shutdown; never fails, even uninitialised.
pub async fn clear_selection() {
    let mut guard = CONTROLLER.lock().await;
    if let Some(controller) = guard.as_mut() {
        controller.select(None).await;
    }
}

/// Send a chat message about the selected record.
pub async fn send_chat_message(content: &str) -> Result<(), String> {
    let guard = CONTROLLER.lock().await;
    let controller = guard
        .as_ref()
        .ok_or_else(|| "Chat subsystem is not initialised".to_string())?;
    controller.send_message(content)
}

/// Snapshot of the active selection's message log.
pub async fn chat_messages() -> Vec<ChatMessage> {
    let guard = CONTROLLER.lock().await;
    guard.as_ref().map(|c| c.messages()).unwrap_or_default()
}

pub async fn selected_record() -> Option<RecordId> {
    let guard = CONTROLLER.lock().await;
    guard.as_ref().and_then(|c| c.selected())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::codec;
    use futures::{SinkExt, StreamExt};
    use std::time::Duration;
    use tokio_tungstenite::tungstenite::Message;

    /// Config pointing at a port nothing listens on: connects fail fast and
    /// the controller degrades to the "selection set, channel absent" state.
    fn dead_end_config() -> ChatConfig {
        ChatConfig {
            ws_url: "ws://127.0.0.1:9/ws-chat/websocket".to_string(),
            connect_timeout: Duration::from_millis(500),
        }
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        for _ in 0..100 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("condition not reached within 5s");
    }

    #[tokio::test]
    async fn test_select_sequence_keeps_one_channel_and_resets_log() {
        let mut controller = SelectionController::new(dead_end_config());

        for id in [1, 2, 1] {
            controller.select(Some(id)).await;
            assert_eq!(controller.selected(), Some(id));
            assert_eq!(
                controller.channel.as_ref().map(|c| c.record_id()),
                Some(id)
            );
            // Log is empty immediately after select returns
            assert!(controller.messages().is_empty());
        }

        controller.select(None).await;
        assert_eq!(controller.selected(), None);
        assert!(controller.channel.is_none());
        assert!(controller.messages().is_empty());
    }

    #[tokio::test]
    async fn test_reselecting_current_record_is_a_noop() {
        let mut controller = SelectionController::new(dead_end_config());
        controller.select(Some(5)).await;
        controller.log.append(ChatMessage {
            sender: Sender::Ai,
            content: "kept".to_string(),
        });

        controller.select(Some(5)).await;
        // Same id: nothing torn down, nothing cleared
        assert_eq!(controller.messages().len(), 1);
    }

    #[tokio::test]
    async fn test_superseded_generation_cannot_append() {
        let mut controller = SelectionController::new(dead_end_config());
        controller.select(Some(1)).await;

        // Simulate an in-flight delivery handle from the record-1 channel
        let stale = LogAppender::new(
            controller.log.clone(),
            controller.active_generation.clone(),
            controller.active_generation.load(Ordering::SeqCst),
        );
        assert!(stale.is_live());

        controller.select(Some(2)).await;

        // The delayed delivery addressed to record 1 must not land in
        // record 2's log
        assert!(!stale.append(ChatMessage {
            sender: Sender::Ai,
            content: "late".to_string(),
        }));
        assert!(controller.messages().is_empty());
    }

    #[tokio::test]
    async fn test_send_without_selection_is_rejected() {
        let controller = SelectionController::new(dead_end_config());
        assert!(controller.send_message("hello").is_err());
        assert!(controller.messages().is_empty());
    }

    #[tokio::test]
    async fn test_send_appends_locally_before_transmission() {
        let mut controller = SelectionController::new(dead_end_config());
        controller.select(Some(42)).await;

        controller.send_message("hello").unwrap();

        let messages = controller.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].sender, Sender::User);
        assert_eq!(messages[0].content, "hello");
    }

    /// Minimal STOMP-over-WebSocket broker: accepts one client, answers the
    /// handshake, records the SUBSCRIBE/SEND it sees and publishes an AI
    /// reply (preceded by a malformed payload that must be dropped).
    async fn spawn_mock_broker() -> (
        u16,
        tokio::sync::oneshot::Receiver<String>,
        tokio::sync::oneshot::Receiver<(String, String)>,
        tokio::task::JoinHandle<()>,
    ) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (sub_tx, sub_rx) = tokio::sync::oneshot::channel();
        let (send_tx, send_rx) = tokio::sync::oneshot::channel();

        let handle = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

            let mut sub_tx = Some(sub_tx);
            let mut send_tx = Some(send_tx);
            let mut subscription: Option<(String, String)> = None;

            while let Some(Ok(message)) = ws.next().await {
                let text = match message {
                    Message::Text(t) => t,
                    Message::Close(_) => break,
                    _ => continue,
                };
                let frame = match codec::decode(text.as_str()).unwrap() {
                    Some(f) => f,
                    None => continue,
                };
                match frame.command.as_str() {
                    "CONNECT" => {
                        let connected =
                            codec::Frame::new("CONNECTED").with_header("version", "1.2");
                        ws.send(Message::text(codec::encode(&connected)))
                            .await
                            .unwrap();
                    }
                    "SUBSCRIBE" => {
                        let id = frame.header("id").unwrap().to_string();
                        let dest = frame.header("destination").unwrap().to_string();
                        if let Some(tx) = sub_tx.take() {
                            let _ = tx.send(dest.clone());
                        }
                        subscription = Some((id, dest));
                    }
                    "SEND" => {
                        let dest = frame.header("destination").unwrap().to_string();
                        if let Some(tx) = send_tx.take() {
                            let _ = tx.send((dest, frame.body.clone()));
                        }
                        if let Some((sub_id, topic)) = &subscription {
                            // A payload that fails message decode: dropped by
                            // the client without touching the log
                            let bad = codec::Frame::new("MESSAGE")
                                .with_header("subscription", sub_id)
                                .with_header("destination", topic)
                                .with_header("message-id", "m-0")
                                .with_body("not json");
                            ws.send(Message::text(codec::encode(&bad))).await.unwrap();

                            let reply = codec::Frame::new("MESSAGE")
                                .with_header("subscription", sub_id)
                                .with_header("destination", topic)
                                .with_header("message-id", "m-1")
                                .with_body(r#"{"sender":"AI","content":"echo reply"}"#);
                            ws.send(Message::text(codec::encode(&reply))).await.unwrap();
                        }
                    }
                    "UNSUBSCRIBE" | "DISCONNECT" => {}
                    other => panic!("mock broker got unexpected frame: {}", other),
                }
            }
        });

        (port, sub_rx, send_rx, handle)
    }

    #[tokio::test]
    async fn test_end_to_end_subscribe_send_and_deliver() {
        let (port, sub_rx, send_rx, broker) = spawn_mock_broker().await;
        let config = ChatConfig {
            ws_url: format!("ws://127.0.0.1:{}/ws-chat/websocket", port),
            connect_timeout: Duration::from_secs(5),
        };

        let mut controller = SelectionController::new(config);
        controller.select(Some(42)).await;

        // The channel subscribes to the record's topic
        let topic = tokio::time::timeout(Duration::from_secs(5), sub_rx)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(topic, "/topic/messages/42");

        // Local send: optimistic append plus a SEND to the outbound path
        controller.send_message("hello").unwrap();
        let (dest, body) = tokio::time::timeout(Duration::from_secs(5), send_rx)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(dest, "/app/chat/42");
        assert_eq!(body, "hello");

        // The AI reply lands after the local message; the malformed payload
        // the broker sent first never does
        {
            let log = controller.log.clone();
            wait_until(move || log.len() == 2).await;
        }
        let messages = controller.messages();
        assert_eq!(messages[0].sender, Sender::User);
        assert_eq!(messages[0].content, "hello");
        assert_eq!(messages[1].sender, Sender::Ai);
        assert_eq!(messages[1].content, "echo reply");

        // Clearing the selection leaves no channel and an empty log
        controller.select(None).await;
        assert!(controller.messages().is_empty());
        assert!(controller.channel.is_none());

        broker.abort();
    }
}
