//! Tracing setup: a file sink plus a bounded in-memory ring that backs the
//! Logs view, so the view never blocks on log I/O (§5 non-blocking-UI rule).

use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::constants::{APP_DIR_NAME, MAX_LOG_LINES};

/// Bounded ring of formatted log lines backing the Logs view.
#[derive(Default)]
pub struct LogRing {
    lines: VecDeque<String>,
}

impl LogRing {
    fn push(&mut self, line: String) {
        if self.lines.len() >= MAX_LOG_LINES {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.lines.iter().cloned().collect()
    }
}

pub type SharedLogRing = Arc<Mutex<LogRing>>;

/// `$XDG_STATE_HOME`, falling back to `~/.local/state`.
fn xdg_state_home() -> PathBuf {
    if let Ok(dir) = std::env::var("XDG_STATE_HOME") {
        if !dir.is_empty() {
            return PathBuf::from(dir);
        }
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".local").join("state")
}

pub fn log_file_path() -> PathBuf {
    xdg_state_home().join(APP_DIR_NAME).join("s3term.log")
}

#[derive(Default)]
struct RingVisitor {
    message: String,
}

impl Visit for RingVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        } else if self.message.is_empty() {
            self.message = format!("{}={:?}", field.name(), value);
        } else {
            self.message.push_str(&format!(" {}={:?}", field.name(), value));
        }
    }
}

/// Bound on the channel `RingLayer` pushes formatted lines through; once
/// full, `on_event` drops the line rather than block the calling thread.
const LOG_CHANNEL_CAPACITY: usize = 1024;

/// A `tracing_subscriber::Layer` that never touches the ring or the log
/// file itself — it only formats the event and hands the line to a bounded
/// channel, so emitting a log record is never blocked on I/O.
struct RingLayer {
    tx: tokio::sync::mpsc::Sender<String>,
}

impl<S: Subscriber> Layer<S> for RingLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = RingVisitor::default();
        event.record(&mut visitor);
        let line = format!(
            "{} {:>5} {} - {}",
            chrono::Utc::now().format("%H:%M:%S%.3f"),
            event.metadata().level(),
            event.metadata().target(),
            visitor.message
        );
        let _ = self.tx.try_send(line);
    }
}

/// Drains the channel `RingLayer` feeds, appending each line to the shared
/// ring and (best-effort) the log file. Runs for the lifetime of the
/// process; the channel closes when the last `RingLayer` is dropped.
async fn drain_log_channel(
    mut rx: tokio::sync::mpsc::Receiver<String>,
    ring: SharedLogRing,
    mut file: Option<File>,
) {
    while let Some(line) = rx.recv().await {
        if let Ok(mut guard) = ring.lock() {
            guard.push(line.clone());
        }
        if let Some(file) = file.as_mut() {
            let _ = writeln!(file, "{line}");
        }
    }
}

/// Install the global subscriber and spawn the channel drain task. Returns
/// the shared ring the Logs view reads from. The log file is best-effort:
/// if it can't be opened (e.g. no writable state directory) logging still
/// works through the ring alone. Must be called from within a running
/// Tokio runtime.
pub fn init(level: &str) -> SharedLogRing {
    let ring: SharedLogRing = Arc::new(Mutex::new(LogRing::default()));

    let path = log_file_path();
    let file = path
        .parent()
        .map(std::fs::create_dir_all)
        .transpose()
        .ok()
        .and_then(|_| OpenOptions::new().create(true).append(true).open(&path).ok());

    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    let (tx, rx) = tokio::sync::mpsc::channel(LOG_CHANNEL_CAPACITY);
    let layer = RingLayer { tx };

    let _ = tracing_subscriber::registry().with(filter).with(layer).try_init();
    tokio::spawn(drain_log_channel(rx, ring.clone(), file));

    ring
}
