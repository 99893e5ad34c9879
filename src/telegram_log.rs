//! Tracing layer that mirrors this crate's log events into an operator chat.
//!
//! Warnings and errors (store outages, delivery failures) go out at once;
//! info lines are batched. Events from other crates are ignored.

use std::time::Duration;

use teloxide::prelude::*;
use teloxide::types::ChatId;
use tokio::sync::mpsc;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

use crate::intake::chunk::MAX_CHUNK_CHARS;
use crate::telegram::TelegramClient;

const FLUSH_INTERVAL: Duration = Duration::from_secs(5);
const MAX_BATCH: usize = 50;
const OWN_TARGET: &str = "intake_bot";

enum Forward {
    Now(String),
    Batched(String),
}

pub struct TelegramLogLayer {
    tx: mpsc::UnboundedSender<Forward>,
}

impl TelegramLogLayer {
    /// Spawns the forwarding task; must be called inside a tokio runtime.
    pub fn new(bot: Bot, chat_id: ChatId) -> Self {
        let (tx, rx) = mpsc::unbounded_channel::<Forward>();
        let client = TelegramClient::new(bot);
        tokio::spawn(forward_loop(client, chat_id.0, rx));
        Self { tx }
    }
}

async fn forward_loop(client: TelegramClient, chat_id: i64, mut rx: mpsc::UnboundedReceiver<Forward>) {
    let mut batch: Vec<String> = Vec::new();
    let mut interval = tokio::time::interval(FLUSH_INTERVAL);

    loop {
        tokio::select! {
            msg = rx.recv() => match msg {
                Some(Forward::Now(text)) => deliver(&client, chat_id, &text).await,
                Some(Forward::Batched(text)) => {
                    batch.push(text);
                    if batch.len() >= MAX_BATCH {
                        flush(&client, chat_id, &mut batch).await;
                    }
                }
                None => {
                    flush(&client, chat_id, &mut batch).await;
                    break;
                }
            },
            _ = interval.tick() => flush(&client, chat_id, &mut batch).await,
        }
    }
}

/// Cut `text` to one message, marking the cut with `...`.
fn truncate(text: &str) -> String {
    if text.chars().count() <= MAX_CHUNK_CHARS {
        return text.to_string();
    }
    let kept: String = text.chars().take(MAX_CHUNK_CHARS - 3).collect();
    format!("{kept}...")
}

async fn deliver(client: &TelegramClient, chat_id: i64, text: &str) {
    // Logging a delivery failure here would feed back into this layer.
    if let Err(e) = client.send_text(chat_id, &truncate(text), None).await {
        eprintln!("Failed to forward log to chat {chat_id}: {e}");
    }
}

async fn flush(client: &TelegramClient, chat_id: i64, batch: &mut Vec<String>) {
    if batch.is_empty() {
        return;
    }
    let combined = batch.join("\n");
    batch.clear();
    deliver(client, chat_id, &combined).await;
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
}

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        let part = if field.name() == "message" {
            format!("{value:?}")
        } else {
            format!("{} = {:?}", field.name(), value)
        };
        if !self.message.is_empty() {
            self.message.push_str(", ");
        }
        self.message.push_str(&part);
    }
}

fn format_event(level: Level, message: String) -> Option<Forward> {
    match level {
        Level::ERROR => Some(Forward::Now(format!("❌ {message}"))),
        Level::WARN => Some(Forward::Now(format!("⚠️ {message}"))),
        Level::INFO => Some(Forward::Batched(message)),
        _ => None,
    }
}

impl<S: Subscriber> Layer<S> for TelegramLogLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if !metadata.target().starts_with(OWN_TARGET) {
            return;
        }

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        if let Some(forward) = format_event(*metadata.level(), visitor.message)
            && self.tx.send(forward).is_err()
        {
            eprintln!("Log channel closed, message dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levels() {
        assert!(matches!(format_event(Level::ERROR, "x".into()), Some(Forward::Now(t)) if t == "❌ x"));
        assert!(matches!(format_event(Level::WARN, "x".into()), Some(Forward::Now(t)) if t == "⚠️ x"));
        assert!(matches!(format_event(Level::INFO, "x".into()), Some(Forward::Batched(t)) if t == "x"));
        assert!(format_event(Level::DEBUG, "x".into()).is_none());
    }

    #[test]
    fn test_long_messages_are_truncated_to_one_chunk() {
        let long = "ä".repeat(MAX_CHUNK_CHARS + 100);
        let sent = truncate(&long);
        assert_eq!(sent.chars().count(), MAX_CHUNK_CHARS);
        assert!(sent.ends_with("..."));

        assert_eq!(truncate("short"), "short");
        let exact = "x".repeat(MAX_CHUNK_CHARS);
        assert_eq!(truncate(&exact), exact);
    }
}
