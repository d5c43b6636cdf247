use std::time::Duration;

/// Target budget for one Update+View pass (§4.7: the runtime targets ≤16 ms).
pub const FRAME_BUDGET: Duration = Duration::from_millis(16);

/// Spinner tick cadence, slower than the frame budget on purpose.
pub const SPINNER_TICK: Duration = Duration::from_millis(120);

/// How long the runtime waits for outstanding commands to observe
/// cancellation before it closes the display on shutdown.
pub const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(2);

/// Render workers serving the virtual list's async formatting queue.
pub const RENDER_WORKERS: usize = 4;

/// Lines kept in the in-memory log ring shown by the Logs view.
pub const MAX_LOG_LINES: usize = 500;

/// XDG application name, used for the state directory (`$XDG_STATE_HOME/s3term`).
pub const APP_DIR_NAME: &str = "s3term";
