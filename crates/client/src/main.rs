mod app;
mod cli;
mod commands;
mod constants;
mod format;
mod list;
mod logging;
mod runtime;
mod shutdown;
mod terminal;
mod view;

use std::io::IsTerminal;
use std::sync::Arc;

use clap::Parser;
use ratatui::prelude::CrosstermBackend;
use ratatui::Terminal;

use crate::app::Model;
use crate::cli::Cli;
use crate::commands::CommandContext;
use crate::runtime::Runtime;
use crate::shutdown::{spawn_ctrl_c_handler, ShutdownController, ShutdownEvent};
use crate::terminal::TuiTerminal;

const EXIT_OK: i32 = 0;
const EXIT_FATAL: i32 = 1;
const EXIT_USAGE: i32 = 2;

fn main() -> std::process::ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            err.print().ok();
            return std::process::ExitCode::from(EXIT_USAGE as u8);
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(err) => {
            eprintln!("fatal: failed to start async runtime: {err}");
            return std::process::ExitCode::from(EXIT_FATAL as u8);
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(code) => std::process::ExitCode::from(code as u8),
        Err(err) => {
            eprintln!("fatal: {err:#}");
            std::process::ExitCode::from(EXIT_FATAL as u8)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<i32> {
    if !std::io::stdout().is_terminal() || !std::io::stdin().is_terminal() {
        anyhow::bail!("s3term requires an interactive terminal");
    }

    let logs = logging::init(&cli.log_level);

    let mut config_loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
    if let Some(region) = cli.region.clone() {
        config_loader = config_loader.region(aws_sdk_s3::config::Region::new(region));
    }
    if let Some(profile) = cli.profile.clone() {
        config_loader = config_loader.profile_name(profile);
    }
    let sdk_config = config_loader.load().await;

    let mut s3_config_builder = aws_sdk_s3::config::Builder::from(&sdk_config);
    if let Some(endpoint) = cli.endpoint_url.clone() {
        s3_config_builder = s3_config_builder.endpoint_url(endpoint);
    }
    s3_config_builder = s3_config_builder.force_path_style(cli.path_style);
    let client = aws_sdk_s3::Client::from_conf(s3_config_builder.build());

    let adapter: Arc<dyn s3term_storage::StorageAdapter> = Arc::new(s3term_storage::S3Adapter::new(client));
    let engine = Arc::new(
        s3term_engine::TransferEngine::new(adapter.clone())
            .with_concurrency(cli.concurrency)
            .with_part_size(cli.part_size_bytes),
    );

    let shutdown = Arc::new(ShutdownController::new());
    let (shutdown_tx, shutdown_rx) = tokio::sync::mpsc::unbounded_channel::<ShutdownEvent>();
    let (input_tx, input_rx) = tokio::sync::mpsc::unbounded_channel();
    let (msg_tx, msg_rx) = tokio::sync::mpsc::unbounded_channel();

    let tui_terminal = TuiTerminal::enter(shutdown.clone(), shutdown_tx.clone(), input_tx)?;
    spawn_ctrl_c_handler(shutdown.clone(), shutdown_tx);

    let backend = CrosstermBackend::new(std::io::stdout());
    let mut terminal = Terminal::new(backend)?;

    let viewport_height = terminal.size().map(|s| s.height as usize).unwrap_or(24).saturating_sub(4).max(1);
    let model = Model::new(logs, cli.region.clone(), viewport_height);
    let ctx = CommandContext { adapter, engine, out_tx: msg_tx };

    let runtime = Runtime::new(model, ctx, input_rx, msg_rx, shutdown_rx);
    let final_model = runtime.run(|model| {
        let _ = terminal.draw(|frame| crate::view::render(frame, model));
    }).await;

    drop(tui_terminal);
    drop(terminal);
    let _ = final_model;

    Ok(EXIT_OK)
}
