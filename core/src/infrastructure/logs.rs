//! Process-level log capture: a bounded ring buffer that mirrors Gordon's
//! own `tracing` output so the admin API can serve it back over
//! `GetProcessLogs` (§4.5) without shelling out to the system journal or
//! relying on a log file the operator may not have configured.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::field::{Field, Visit};
use tracing::Subscriber;
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

const MAX_LINES: usize = 10_000;
const FOLLOW_CHANNEL_CAPACITY: usize = 1024;

/// Shared, clonable handle onto the process log buffer. Held by the
/// `tracing_subscriber::Layer` that populates it and by the admin server
/// that reads it back.
#[derive(Clone)]
pub struct ProcessLogBuffer {
    inner: Arc<Inner>,
}

struct Inner {
    lines: Mutex<VecDeque<String>>,
    live: broadcast::Sender<String>,
}

impl Default for ProcessLogBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessLogBuffer {
    pub fn new() -> Self {
        let (live, _) = broadcast::channel(FOLLOW_CHANNEL_CAPACITY);
        ProcessLogBuffer {
            inner: Arc::new(Inner {
                lines: Mutex::new(VecDeque::with_capacity(MAX_LINES)),
                live,
            }),
        }
    }

    fn push(&self, line: String) {
        let mut lines = self.inner.lines.lock();
        if lines.len() >= MAX_LINES {
            lines.pop_front();
        }
        lines.push_back(line.clone());
        drop(lines);
        // No subscribers is the common case outside an active `follow`
        // request; the send failing then is expected, not an error.
        let _ = self.inner.live.send(line);
    }

    /// The most recent `max_lines` lines, oldest first.
    pub fn tail(&self, max_lines: usize) -> Vec<String> {
        let lines = self.inner.lines.lock();
        let skip = lines.len().saturating_sub(max_lines);
        lines.iter().skip(skip).cloned().collect()
    }

    /// Subscribe to lines written after this call, for `follow=true`
    /// streaming.
    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.inner.live.subscribe()
    }
}

/// A `tracing_subscriber::Layer` that formats each event as a single line
/// and appends it to a [`ProcessLogBuffer`], independent of whatever
/// formatting layer renders to stdout.
pub struct ProcessLogLayer {
    buffer: ProcessLogBuffer,
}

impl ProcessLogLayer {
    pub fn new(buffer: ProcessLogBuffer) -> Self {
        ProcessLogLayer { buffer }
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
}

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        } else if !self.message.is_empty() {
            self.message.push_str(&format!(" {}={:?}", field.name(), value));
        }
    }
}

impl<S: Subscriber> Layer<S> for ProcessLogLayer {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        let line = format!(
            "{} {:>5} {}: {}",
            chrono::Utc::now().to_rfc3339(),
            event.metadata().level(),
            event.metadata().target(),
            visitor.message
        );
        self.buffer.push(line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tail_returns_most_recent_lines_in_order() {
        let buffer = ProcessLogBuffer::new();
        for i in 0..5 {
            buffer.push(format!("line-{i}"));
        }
        assert_eq!(buffer.tail(3), vec!["line-2", "line-3", "line-4"]);
    }

    #[test]
    fn buffer_evicts_oldest_past_capacity() {
        let buffer = ProcessLogBuffer::new();
        for i in 0..(MAX_LINES + 10) {
            buffer.push(format!("line-{i}"));
        }
        let tail = buffer.tail(MAX_LINES + 10);
        assert_eq!(tail.len(), MAX_LINES);
        assert_eq!(tail.first().unwrap(), &format!("line-{}", 10));
    }

    #[tokio::test]
    async fn subscriber_receives_lines_pushed_after_subscribing() {
        let buffer = ProcessLogBuffer::new();
        let mut rx = buffer.subscribe();
        buffer.push("hello".to_string());
        assert_eq!(rx.recv().await.unwrap(), "hello");
    }
}
