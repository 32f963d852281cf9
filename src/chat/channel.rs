// src/chat/channel.rs
//
// Chat channel - one WebSocket connection carrying one STOMP subscription,
// bound to a single review record for the lifetime of a selection.
//
// The channel runs as a background task: connect, STOMP handshake, subscribe,
// then a poll loop that multiplexes queued outbound sends with inbound
// deliveries and re-checks the cancel flag between polls. Teardown raises the
// flag, waits briefly for the clean disconnect, then abandons the task; the
// generation guard on the log keeps any abandoned task harmless.

use super::codec;
use super::error::ChatError;
use super::log::LogAppender;
use super::{inbound_topic, outbound_destination, ChannelState, ChatMessage, RecordId};
use crate::events;
use crate::settings::AppSettings;
use futures::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How often the poll loop wakes to re-check the cancel flag.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How long `stop` waits for the clean disconnect before abandoning the task.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// Chat transport configuration
#[derive(Clone, Debug)]
pub struct ChatConfig {
    /// WebSocket URL of the chat endpoint
    pub ws_url: String,
    /// Budget for connect + STOMP handshake, each
    pub connect_timeout: Duration,
}

impl ChatConfig {
    pub fn from_settings(settings: &AppSettings) -> Self {
        Self {
            ws_url: settings.chat_ws_url(),
            connect_timeout: settings.chat_connect_timeout(),
        }
    }
}

/// Handle to one live channel. At most one exists at a time; the selection
/// controller owns it.
pub struct ChatChannel {
    record_id: RecordId,
    cancel_flag: Arc<AtomicBool>,
    outbound_tx: mpsc::UnboundedSender<String>,
    task_handle: Option<JoinHandle<()>>,
}

impl ChatChannel {
    /// Spawn the channel task for one record. The task reports progress and
    /// failures through the event bus; `open` itself never blocks.
    pub fn open(config: ChatConfig, record_id: RecordId, appender: LogAppender) -> Self {
        let cancel_flag = Arc::new(AtomicBool::new(false));
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        let task_handle = tokio::spawn(run_chat_stream(
            config,
            record_id,
            appender,
            cancel_flag.clone(),
            outbound_rx,
        ));

        Self {
            record_id,
            cancel_flag,
            outbound_tx,
            task_handle: Some(task_handle),
        }
    }

    pub fn record_id(&self) -> RecordId {
        self.record_id
    }

    /// Queue a message body for transmission to this record's destination.
    /// Fire-and-forget: delivery failures surface on the event bus, not here.
    pub fn send(&self, content: &str) -> Result<(), String> {
        self.outbound_tx
            .send(content.to_string())
            .map_err(|_| "chat channel task is not running".to_string())
    }

    /// Tear the channel down. Raises the cancel flag, gives the task a short
    /// grace window to unsubscribe and disconnect cleanly, then abandons it
    /// outright. Safe to call while the connect is still in flight.
    pub async fn stop(mut self) {
        self.cancel_flag.store(true, Ordering::Relaxed);

        if let Some(mut handle) = self.task_handle.take() {
            if tokio::time::timeout(SHUTDOWN_GRACE, &mut handle)
                .await
                .is_err()
            {
                handle.abort();
            }
        }
    }
}

// ============================================================================
// Channel Task
// ============================================================================

async fn run_chat_stream(
    config: ChatConfig,
    record_id: RecordId,
    appender: LogAppender,
    cancel_flag: Arc<AtomicBool>,
    mut outbound_rx: mpsc::UnboundedReceiver<String>,
) {
    let topic = inbound_topic(record_id);
    let destination = outbound_destination(record_id);
    let sub_id = format!("sub-{}", uuid::Uuid::new_v4());

    events::emit_channel_state(record_id, ChannelState::Stopped, ChannelState::Starting);

    let mut ws = match open_socket(&config, record_id).await {
        Ok(ws) => ws,
        Err(e) => {
            events::emit_session_error("chat", format!("Chat connection failed: {}", e));
            events::emit_channel_state(
                record_id,
                ChannelState::Starting,
                ChannelState::Error(e.to_string()),
            );
            events::emit_channel_ended(record_id, "error");
            return;
        }
    };

    if let Err(e) = stomp_handshake(&mut ws, &config, &sub_id, &topic).await {
        events::emit_session_error("chat", format!("Chat subscribe failed: {}", e));
        events::emit_channel_state(
            record_id,
            ChannelState::Starting,
            ChannelState::Error(e.to_string()),
        );
        let _ = ws.close(None).await;
        events::emit_channel_ended(record_id, "error");
        return;
    }

    tlog!("[chat:{}] Subscribed to '{}'", record_id, topic);
    events::emit_channel_state(record_id, ChannelState::Starting, ChannelState::Running);

    #[allow(unused_assignments)]
    let mut reason = "stopped";
    let mut outbound_open = true;

    loop {
        if cancel_flag.load(Ordering::Relaxed) {
            reason = "stopped";
            break;
        }

        tokio::select! {
            queued = outbound_rx.recv(), if outbound_open => {
                match queued {
                    Some(content) => {
                        let frame = codec::send(&destination, &content);
                        if let Err(e) = ws.send(Message::text(codec::encode(&frame))).await {
                            events::emit_session_error("chat", format!("Chat send failed: {}", e));
                            reason = "error";
                            break;
                        }
                    }
                    None => outbound_open = false,
                }
            }
            incoming = tokio::time::timeout(POLL_INTERVAL, ws.next()) => {
                match incoming {
                    Err(_) => {
                        // Poll timeout - loop around to re-check the cancel flag
                    }
                    Ok(None) => {
                        reason = "disconnected";
                        break;
                    }
                    Ok(Some(Ok(message))) => {
                        match handle_ws_message(&mut ws, record_id, &appender, message).await {
                            Ok(true) => {}
                            Ok(false) => {
                                reason = "disconnected";
                                break;
                            }
                            Err(e) => {
                                events::emit_session_error("chat", e.to_string());
                                reason = "error";
                                break;
                            }
                        }
                    }
                    Ok(Some(Err(e))) => {
                        events::emit_session_error("chat", format!("Chat transport error: {}", e));
                        reason = "error";
                        break;
                    }
                }
            }
        }
    }

    // Best-effort clean shutdown; the broker drops subscription state on
    // disconnect regardless
    let _ = ws
        .send(Message::text(codec::encode(&codec::unsubscribe(&sub_id))))
        .await;
    let _ = ws
        .send(Message::text(codec::encode(&codec::disconnect())))
        .await;
    let _ = ws.close(None).await;

    events::emit_channel_state(record_id, ChannelState::Running, ChannelState::Stopped);
    events::emit_channel_ended(record_id, reason);
    tlog!("[chat:{}] Stream ended: {}", record_id, reason);
}

/// Open the WebSocket with a bounded connect.
async fn open_socket(config: &ChatConfig, record_id: RecordId) -> Result<WsStream, ChatError> {
    tlog!("[chat:{}] Connecting to {}", record_id, config.ws_url);

    let connect_res = tokio::time::timeout(
        config.connect_timeout,
        connect_async(config.ws_url.as_str()),
    )
    .await;

    match connect_res {
        Ok(Ok((ws, _response))) => Ok(ws),
        Ok(Err(e)) => Err(ChatError::connection(&config.ws_url, e.to_string())),
        Err(_) => Err(ChatError::timeout(&config.ws_url, "connect")),
    }
}

/// CONNECT, await CONNECTED, then SUBSCRIBE to the record topic.
async fn stomp_handshake(
    ws: &mut WsStream,
    config: &ChatConfig,
    sub_id: &str,
    topic: &str,
) -> Result<(), ChatError> {
    let host = host_of(&config.ws_url);
    ws.send(Message::text(codec::encode(&codec::connect(&host))))
        .await
        .map_err(|e| ChatError::connection(&config.ws_url, e.to_string()))?;

    let deadline = tokio::time::Instant::now() + config.connect_timeout;
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            return Err(ChatError::timeout(&config.ws_url, "CONNECTED"));
        }

        let message = match tokio::time::timeout(remaining, ws.next()).await {
            Err(_) => return Err(ChatError::timeout(&config.ws_url, "CONNECTED")),
            Ok(None) => {
                return Err(ChatError::connection(
                    &config.ws_url,
                    "closed during handshake",
                ))
            }
            Ok(Some(Ok(m))) => m,
            Ok(Some(Err(e))) => return Err(ChatError::connection(&config.ws_url, e.to_string())),
        };

        let text = match message {
            Message::Text(text) => text,
            // Handshake traffic is text; skip control frames
            _ => continue,
        };

        match codec::decode(text.as_str())? {
            None => continue, // heart-beat
            Some(frame) if frame.command == "CONNECTED" => break,
            Some(frame) if frame.command == "ERROR" => {
                return Err(ChatError::protocol(format!(
                    "broker refused connection: {}",
                    frame.header("message").unwrap_or("unknown")
                )));
            }
            Some(frame) => {
                return Err(ChatError::protocol(format!(
                    "expected CONNECTED, got {}",
                    frame.command
                )));
            }
        }
    }

    ws.send(Message::text(codec::encode(&codec::subscribe(
        sub_id, topic,
    ))))
    .await
    .map_err(|e| ChatError::connection(&config.ws_url, e.to_string()))
}

/// Handle one inbound WebSocket message.
/// Returns Ok(false) when the peer closed the stream.
async fn handle_ws_message(
    ws: &mut WsStream,
    record_id: RecordId,
    appender: &LogAppender,
    message: Message,
) -> Result<bool, ChatError> {
    match message {
        Message::Text(text) => {
            let frame = match codec::decode(text.as_str()) {
                Ok(Some(frame)) => frame,
                Ok(None) => return Ok(true), // heart-beat
                Err(e) => {
                    // Malformed frame: dropped, never fatal
                    tlog!("[chat:{}] Dropping undecodable frame: {}", record_id, e);
                    return Ok(true);
                }
            };

            match frame.command.as_str() {
                "MESSAGE" => {
                    match serde_json::from_str::<ChatMessage>(&frame.body) {
                        Ok(chat_message) => {
                            if appender.append(chat_message.clone()) {
                                events::emit_chat_message(record_id, chat_message);
                            } else {
                                tlog!(
                                    "[chat:{}] Discarding delivery for a superseded channel",
                                    record_id
                                );
                            }
                        }
                        Err(e) => {
                            // Malformed payload: dropped, log untouched
                            tlog!(
                                "[chat:{}] Failed to decode message payload: {}",
                                record_id,
                                e
                            );
                        }
                    }
                    Ok(true)
                }
                "ERROR" => Err(ChatError::protocol(format!(
                    "broker error: {}",
                    frame.header("message").unwrap_or("unknown")
                ))),
                // RECEIPT and anything else carries nothing we track
                _ => Ok(true),
            }
        }
        Message::Ping(payload) => {
            let _ = ws.send(Message::Pong(payload)).await;
            Ok(true)
        }
        Message::Close(_) => Ok(false),
        _ => Ok(true),
    }
}

/// Virtual host for the STOMP CONNECT header, taken from the WebSocket URL.
fn host_of(ws_url: &str) -> String {
    let without_scheme = ws_url
        .trim_start_matches("wss://")
        .trim_start_matches("ws://");
    let authority = without_scheme.split('/').next().unwrap_or("");
    let host = authority.split(':').next().unwrap_or("");
    if host.is_empty() {
        "localhost".to_string()
    } else {
        host.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_of_strips_scheme_port_and_path() {
        assert_eq!(host_of("ws://localhost:8080/ws-chat/websocket"), "localhost");
        assert_eq!(
            host_of("wss://review.example.com/ws-chat/websocket"),
            "review.example.com"
        );
    }

    #[test]
    fn test_host_of_defaults_on_garbage() {
        assert_eq!(host_of(""), "localhost");
        assert_eq!(host_of("ws://"), "localhost");
    }
}
