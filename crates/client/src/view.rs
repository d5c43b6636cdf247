//! Pure rendering: turns a [`Model`] into ratatui widgets. Never performs
//! I/O and never mutates the model (`visible_lines` is the one exception,
//! since it drives the virtual list's cache drain-and-fill, not app state).

use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Gauge, Paragraph};
use ratatui::Frame;

use crate::app::{BrowseMode, Model, Screen, TransferKind};
use crate::format::{format_bytes, format_percent};

pub fn render(frame: &mut Frame<'_>, model: &mut Model) {
    let area = frame.area();
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(1), Constraint::Length(1)])
        .split(area);

    render_screen(frame, model, chunks[0]);
    render_status_bar(frame, model, chunks[1]);
}

fn render_screen(frame: &mut Frame<'_>, model: &mut Model, area: Rect) {
    match model.current() {
        Screen::Welcome => render_welcome(frame, area),
        Screen::Region => render_region(frame, model, area),
        Screen::Bucket => render_list(frame, model, area, "Buckets"),
        Screen::Operation => render_operation(frame, model, area),
        Screen::ObjectBrowse(mode) => {
            let title = match mode {
                BrowseMode::Download => "Objects — Enter to download",
                BrowseMode::Delete => "Objects — Enter to delete",
            };
            render_list(frame, model, area, title)
        }
        Screen::Upload => render_upload(frame, model, area),
        Screen::ListGenerator => render_list_generator(frame, model, area),
        Screen::CloudInfo => render_cloud_info(frame, model, area),
        Screen::Progress => render_progress(frame, model, area),
        Screen::Help => render_help(frame, area),
        Screen::Settings => render_settings(frame, area),
        Screen::Logs => render_logs(frame, model, area),
        Screen::Error => render_error(frame, model, area),
    }
}

fn block(title: &str) -> Block<'_> {
    Block::default().borders(Borders::ALL).title(title)
}

fn render_welcome(frame: &mut Frame<'_>, area: Rect) {
    let text = "s3term\n\nPress Enter to begin, ? for help, q to quit.";
    frame.render_widget(Paragraph::new(text).block(block("Welcome")).alignment(Alignment::Center), area);
}

fn render_region(frame: &mut Frame<'_>, model: &Model, area: Rect) {
    let text = format!("Region: {}_\n\nEnter to continue, Esc to go back.", model.region_input);
    frame.render_widget(Paragraph::new(text).block(block("Region")), area);
}

fn render_operation(frame: &mut Frame<'_>, model: &Model, area: Rect) {
    let bucket = model.bucket.as_ref().map(|b| b.name.as_str()).unwrap_or("?");
    let text = format!(
        "Bucket: {bucket}\n\n[d] download  [x] delete  [u] upload  [g] object list  [i] cloud info"
    );
    frame.render_widget(Paragraph::new(text).block(block("Operation")), area);
}

const SPINNER_FRAMES: [char; 4] = ['|', '/', '-', '\\'];

fn spinner_glyph(frame: usize) -> char {
    SPINNER_FRAMES[frame % SPINNER_FRAMES.len()]
}

fn render_list(frame: &mut Frame<'_>, model: &mut Model, area: Rect, title: &str) {
    if model.loading {
        let text = format!("{} loading...", spinner_glyph(model.spinner_frame));
        frame.render_widget(Paragraph::new(text).block(block(title)), area);
        return;
    }

    let show_preview = model.preview_visible && matches!(model.current(), Screen::ObjectBrowse(_));
    let (list_area, preview_area) = if show_preview {
        let chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(65), Constraint::Percentage(35)])
            .split(area);
        (chunks[0], Some(chunks[1]))
    } else {
        (area, None)
    };

    let lines: Vec<Line> = match model.current() {
        Screen::Bucket => model.buckets.visible_lines().into_iter().map(Line::raw).collect(),
        _ => model.objects.visible_lines().into_iter().map(Line::raw).collect(),
    };
    frame.render_widget(Paragraph::new(lines).block(block(title)), list_area);

    if let Some(preview_area) = preview_area {
        let text = match model.objects.cursor_item() {
            Some(item) => format!(
                "Key: {}\nSize: {}\nEtag: {}\nStorage class: {}\nLast modified: {}",
                item.payload.key,
                format_bytes(item.payload.size),
                item.payload.etag,
                item.payload.storage_class.as_deref().unwrap_or("-"),
                item.payload
                    .last_modified
                    .map(|ts| ts.to_rfc3339())
                    .unwrap_or_else(|| "-".to_string()),
            ),
            None => "No object selected.".to_string(),
        };
        frame.render_widget(Paragraph::new(text).block(block("Preview")), preview_area);
    }
}

fn render_upload(frame: &mut Frame<'_>, model: &Model, area: Rect) {
    let text = format!("Local path: {}_\n\nEnter to start upload, Esc to cancel.", model.upload_path_input);
    frame.render_widget(Paragraph::new(text).block(block("Upload")), area);
}

fn render_list_generator(frame: &mut Frame<'_>, model: &Model, area: Rect) {
    let text = format!(
        "{} objects listed.\n\nEnter to write ObjectList-<timestamp>.txt",
        model.object_listing.len()
    );
    frame.render_widget(Paragraph::new(text).block(block("Object List Generator")), area);
}

fn render_cloud_info(frame: &mut Frame<'_>, model: &Model, area: Rect) {
    let text = match &model.cloud_info {
        Some(info) => format!(
            "Region: {}\nObjects: {}\nTotal size: {}",
            info.region.as_str(),
            info.object_count,
            format_bytes(info.total_bytes)
        ),
        None => "Resolving region...".to_string(),
    };
    frame.render_widget(Paragraph::new(text).block(block("Cloud Info")), area);
}

fn render_progress(frame: &mut Frame<'_>, model: &Model, area: Rect) {
    let Some(transfer) = &model.transfer else {
        frame.render_widget(Paragraph::new("").block(block("Progress")), area);
        return;
    };
    let verb = match transfer.kind {
        TransferKind::Upload => "Uploading",
        TransferKind::Download => "Downloading",
        TransferKind::Delete => "Deleting",
    };
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Length(3), Constraint::Min(1)])
        .split(area);
    frame.render_widget(Paragraph::new(format!("{verb} {}", transfer.key)), chunks[0]);

    let percent = format_percent(transfer.current, transfer.total);
    let label = format!(
        "{} / {}",
        format_bytes(transfer.current),
        format_bytes(transfer.total)
    );
    let gauge = Gauge::default()
        .block(block("Progress"))
        .gauge_style(Style::default().fg(Color::Green))
        .percent(percent as u16)
        .label(label);
    frame.render_widget(gauge, chunks[1]);

    if transfer.done {
        let msg = transfer.message.clone().unwrap_or_else(|| "done — Esc to go back".to_string());
        frame.render_widget(Paragraph::new(msg), chunks[2]);
    }
}

fn render_help(frame: &mut Frame<'_>, area: Rect) {
    let text = "\
q / Ctrl-C  quit
?           this screen
Esc         back
r           refresh
s           settings
l           logs
Enter       select / confirm
p           toggle preview
u / d / x   upload / download / delete";
    frame.render_widget(Paragraph::new(text).block(block("Help")), area);
}

fn render_settings(frame: &mut Frame<'_>, area: Rect) {
    frame.render_widget(Paragraph::new("Nothing to configure yet.").block(block("Settings")), area);
}

fn render_logs(frame: &mut Frame<'_>, model: &Model, area: Rect) {
    let lines = model.logs.lock().map(|ring| ring.snapshot()).unwrap_or_default();
    let text: Vec<Line> = lines.into_iter().rev().take(area.height as usize).map(Line::raw).collect();
    frame.render_widget(Paragraph::new(text).block(block("Logs")), area);
}

fn render_error(frame: &mut Frame<'_>, model: &Model, area: Rect) {
    let text = match &model.error {
        Some(err) => format!(
            "{}\n\n{}\n\nSuggestion: {}",
            err.title, err.user_message, err.suggestion
        ),
        None => "No error.".to_string(),
    };
    frame.render_widget(
        Paragraph::new(text).block(block("Error")).style(Style::default().add_modifier(Modifier::BOLD)),
        area,
    );
}

fn render_status_bar(frame: &mut Frame<'_>, model: &Model, area: Rect) {
    let text = model
        .status
        .clone()
        .unwrap_or_else(|| "q quit · ? help · esc back · r refresh · s settings · l logs".to_string());
    frame.render_widget(Paragraph::new(Span::raw(text)).style(Style::default().fg(Color::DarkGray)), area);
}
