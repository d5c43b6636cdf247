//! Event Loop Runtime (C7): one cooperative `tokio::select!` merging the
//! three message sources the view-state machine can react to — terminal
//! input, a render tick, and background command completions — mirroring the
//! teacher's worker-loop shape one level up.

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

use crate::app::{update, Model, Msg};
use crate::commands::CommandContext;
use crate::constants::{FRAME_BUDGET, SHUTDOWN_GRACE_PERIOD, SPINNER_TICK};
use crate::shutdown::ShutdownEvent;
use crate::terminal::InputEvent;

pub struct Runtime {
    model: Model,
    ctx: CommandContext,
    input_rx: mpsc::UnboundedReceiver<InputEvent>,
    msg_rx: mpsc::UnboundedReceiver<Msg>,
    shutdown_rx: mpsc::UnboundedReceiver<ShutdownEvent>,
}

impl Runtime {
    pub fn new(
        model: Model,
        ctx: CommandContext,
        input_rx: mpsc::UnboundedReceiver<InputEvent>,
        msg_rx: mpsc::UnboundedReceiver<Msg>,
        shutdown_rx: mpsc::UnboundedReceiver<ShutdownEvent>,
    ) -> Self {
        Self { model, ctx, input_rx, msg_rx, shutdown_rx }
    }

    /// Runs until the model asks to quit or a shutdown signal arrives,
    /// drawing at most once per [`FRAME_BUDGET`] tick. Returns the final
    /// model so the caller can decide the process exit code.
    pub async fn run<F>(mut self, mut draw: F) -> Model
    where
        F: FnMut(&mut Model),
    {
        let mut ticker = tokio::time::interval(FRAME_BUDGET);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut spinner_ticker = tokio::time::interval(SPINNER_TICK);
        spinner_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut dirty = true;

        loop {
            tokio::select! {
                biased;

                Some(event) = self.shutdown_rx.recv() => {
                    match event {
                        ShutdownEvent::Immediate => break,
                        ShutdownEvent::Graceful => {
                            self.model.status = Some(
                                "stop requested — finishing in-flight transfers (press Ctrl-C again to exit immediately)".to_string(),
                            );
                            self.model.quit = true;
                        }
                    }
                }
                Some(input) = self.input_rx.recv() => {
                    let cmds = update(&mut self.model, Msg::Input(input));
                    self.dispatch(cmds);
                    dirty = true;
                }
                Some(msg) = self.msg_rx.recv() => {
                    let cmds = update(&mut self.model, msg);
                    self.dispatch(cmds);
                    dirty = true;
                }
                _ = spinner_ticker.tick() => {
                    if self.model.loading {
                        let cmds = update(&mut self.model, Msg::Tick);
                        self.dispatch(cmds);
                        dirty = true;
                    }
                }
                _ = ticker.tick() => {
                    if dirty {
                        draw(&mut self.model);
                        dirty = false;
                    }
                }
                else => break,
            }

            if self.model.quit {
                break;
            }
        }

        // Graceful shutdown: stop taking new input, give in-flight commands
        // a grace period to observe cancellation before we tear down.
        self.input_rx.close();
        let grace = tokio::time::sleep(SHUTDOWN_GRACE_PERIOD);
        tokio::pin!(grace);
        loop {
            tokio::select! {
                _ = &mut grace => break,
                msg = self.msg_rx.recv() => {
                    match msg {
                        Some(msg) => { update(&mut self.model, msg); }
                        None => break,
                    }
                }
            }
        }

        self.model
    }

    fn dispatch(&self, cmds: Vec<crate::commands::Command>) {
        for cmd in cmds {
            self.ctx.spawn(cmd);
        }
    }
}
