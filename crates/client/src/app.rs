//! View State Machine (C6): `update(model, msg)` is the only place state
//! changes; screens never perform I/O directly, they return [`Command`]s.

use std::path::PathBuf;
use std::sync::Arc;

use s3term_core::{Bucket, ErrorRecord, ObjectInfo, Region};

use crate::commands::{Command, CommandOutcome};
use crate::list::{ListItem, VirtualList};
use crate::logging::SharedLogRing;
use crate::terminal::InputEvent;

/// Leaf/modal states. History is kept as a stack so `esc` pops to the prior
/// state; the root state (`Welcome`) treats `esc` as a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Welcome,
    Region,
    Bucket,
    Operation,
    ObjectBrowse(BrowseMode),
    Upload,
    ListGenerator,
    CloudInfo,
    Progress,
    Help,
    Settings,
    Logs,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrowseMode {
    Download,
    Delete,
}

#[derive(Debug, Clone)]
pub struct CloudInfoData {
    pub region: Region,
    pub object_count: usize,
    pub total_bytes: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferKind {
    Upload,
    Download,
    Delete,
}

#[derive(Debug, Clone)]
pub struct TransferView {
    pub kind: TransferKind,
    pub key: String,
    pub current: u64,
    pub total: u64,
    pub done: bool,
    pub message: Option<String>,
}

/// Messages the runtime delivers to `update`.
pub enum Msg {
    Input(InputEvent),
    Tick,
    CommandResult(CommandOutcome),
}

pub struct Model {
    pub stack: Vec<Screen>,
    pub region_input: String,
    pub region: Option<Region>,
    pub bucket: Option<Bucket>,
    pub buckets: VirtualList<Bucket>,
    pub objects: VirtualList<ObjectInfo>,
    pub object_listing: Vec<ObjectInfo>,
    pub loading: bool,
    pub status: Option<String>,
    pub error: Option<ErrorRecord>,
    pub upload_path_input: String,
    pub cloud_info: Option<CloudInfoData>,
    pub transfer: Option<TransferView>,
    pub logs: SharedLogRing,
    pub quit: bool,
    /// Object-browse-local toggle (`p`) showing the cursor item's metadata.
    pub preview_visible: bool,
    /// Advanced once per [`crate::constants::SPINNER_TICK`] while `loading`
    /// is set; used to animate the loading indicator.
    pub spinner_frame: usize,
}

fn format_bucket_row(item: &ListItem<Bucket>, is_cursor: bool) -> String {
    let marker = if is_cursor { ">" } else { " " };
    format!("{marker} {}", item.title)
}

fn format_object_row(item: &ListItem<ObjectInfo>, is_cursor: bool) -> String {
    let marker = if is_cursor { ">" } else { " " };
    format!(
        "{marker} {:<48} {:>12}",
        item.title,
        crate::format::format_bytes(item.payload.size)
    )
}

impl Model {
    pub fn new(logs: SharedLogRing, default_region: Option<String>, viewport_height: usize) -> Self {
        Self {
            stack: vec![Screen::Welcome],
            region_input: default_region.unwrap_or_default(),
            region: None,
            bucket: None,
            buckets: VirtualList::new(viewport_height, format_bucket_row),
            objects: VirtualList::new(viewport_height, format_object_row),
            object_listing: Vec::new(),
            loading: false,
            status: None,
            error: None,
            upload_path_input: String::new(),
            cloud_info: None,
            transfer: None,
            logs,
            quit: false,
            preview_visible: false,
            spinner_frame: 0,
        }
    }

    pub fn current(&self) -> Screen {
        *self.stack.last().expect("stack is never empty")
    }

    fn push(&mut self, screen: Screen) {
        self.stack.push(screen);
    }

    fn pop(&mut self) {
        if self.stack.len() > 1 {
            self.stack.pop();
        }
    }
}

/// Pure with respect to the model: given the same model and message it
/// always produces the same new model and command list. Implemented as
/// `&mut Model` for ergonomics rather than returning an owned copy.
pub fn update(model: &mut Model, msg: Msg) -> Vec<Command> {
    match msg {
        Msg::Tick => {
            model.spinner_frame = model.spinner_frame.wrapping_add(1);
            Vec::new()
        }
        Msg::CommandResult(outcome) => apply_command_result(model, outcome),
        Msg::Input(input) => {
            if let Some(cmds) = handle_global_key(model, input) {
                return cmds;
            }
            handle_screen_key(model, input)
        }
    }
}

/// Keys active in every non-modal state (§4.6). Free-text screens
/// (`Region`, `Upload`) swallow every printable character locally so the
/// user can type a region name or a path containing `q`/`s`/`l`/`?`; `Esc`
/// still pops globally everywhere.
fn handle_global_key(model: &mut Model, input: InputEvent) -> Option<Vec<Command>> {
    let text_entry_screen = matches!(model.current(), Screen::Upload | Screen::Region);
    if text_entry_screen && matches!(input, InputEvent::Char(_)) {
        return None;
    }

    match input {
        InputEvent::Char('q') => {
            model.quit = true;
            Some(Vec::new())
        }
        InputEvent::Char('?') if model.current() != Screen::Help => {
            model.push(Screen::Help);
            Some(Vec::new())
        }
        InputEvent::Char('s') => {
            model.push(Screen::Settings);
            Some(Vec::new())
        }
        InputEvent::Char('l') => {
            model.push(Screen::Logs);
            Some(Vec::new())
        }
        InputEvent::Esc => {
            match model.current() {
                Screen::Progress if model.transfer.as_ref().map(|t| !t.done).unwrap_or(false) => {
                    // Modal Progress only dismisses once terminal.
                    Some(Vec::new())
                }
                Screen::Error => {
                    model.error = None;
                    model.pop();
                    Some(Vec::new())
                }
                _ => {
                    model.pop();
                    Some(Vec::new())
                }
            }
        }
        _ => None,
    }
}

fn handle_screen_key(model: &mut Model, input: InputEvent) -> Vec<Command> {
    match model.current() {
        Screen::Welcome => {
            if matches!(input, InputEvent::Enter) {
                model.push(Screen::Region);
            }
            Vec::new()
        }
        Screen::Region => handle_region_key(model, input),
        Screen::Bucket => handle_bucket_key(model, input),
        Screen::Operation => handle_operation_key(model, input),
        Screen::ObjectBrowse(mode) => handle_object_browse_key(model, mode, input),
        Screen::Upload => handle_upload_key(model, input),
        Screen::ListGenerator => {
            if matches!(input, InputEvent::Enter) {
                let listing = model.object_listing.clone();
                let bucket = model.bucket.as_ref().map(|b| b.name.clone()).unwrap_or_default();
                return vec![Command::GenerateObjectList { bucket, listing }];
            }
            Vec::new()
        }
        Screen::CloudInfo | Screen::Help | Screen::Settings | Screen::Logs | Screen::Error => {
            Vec::new()
        }
        Screen::Progress => Vec::new(),
    }
}

fn handle_region_key(model: &mut Model, input: InputEvent) -> Vec<Command> {
    match input {
        InputEvent::Char(c) => {
            model.region_input.push(c);
            Vec::new()
        }
        InputEvent::Backspace => {
            model.region_input.pop();
            Vec::new()
        }
        InputEvent::Enter if !model.region_input.is_empty() => {
            model.region = Some(Region::new(model.region_input.clone()));
            model.push(Screen::Bucket);
            model.loading = true;
            vec![Command::ListBuckets]
        }
        _ => Vec::new(),
    }
}

fn handle_bucket_key(model: &mut Model, input: InputEvent) -> Vec<Command> {
    match input {
        InputEvent::Down => {
            model.buckets.move_down(1);
            Vec::new()
        }
        InputEvent::Up => {
            model.buckets.move_up(1);
            Vec::new()
        }
        InputEvent::PageDown => {
            model.buckets.page_down();
            Vec::new()
        }
        InputEvent::PageUp => {
            model.buckets.page_up();
            Vec::new()
        }
        InputEvent::Home => {
            model.buckets.home();
            Vec::new()
        }
        InputEvent::End => {
            model.buckets.end();
            Vec::new()
        }
        InputEvent::Char('r') => {
            model.loading = true;
            vec![Command::ListBuckets]
        }
        InputEvent::Enter => {
            if let Some(item) = model.buckets.cursor_item() {
                model.bucket = Some(item.payload.clone());
                model.push(Screen::Operation);
            }
            Vec::new()
        }
        _ => Vec::new(),
    }
}

fn handle_operation_key(model: &mut Model, input: InputEvent) -> Vec<Command> {
    let bucket = match model.bucket.as_ref() {
        Some(b) => b.name.clone(),
        None => return Vec::new(),
    };
    match input {
        InputEvent::Char('d') => {
            model.push(Screen::ObjectBrowse(BrowseMode::Download));
            model.loading = true;
            vec![Command::ListObjects { bucket, prefix: String::new(), continuation: None }]
        }
        InputEvent::Char('x') => {
            model.push(Screen::ObjectBrowse(BrowseMode::Delete));
            model.loading = true;
            vec![Command::ListObjects { bucket, prefix: String::new(), continuation: None }]
        }
        InputEvent::Char('u') => {
            model.push(Screen::Upload);
            Vec::new()
        }
        InputEvent::Char('g') => {
            model.push(Screen::ListGenerator);
            model.loading = true;
            vec![Command::ListObjects { bucket, prefix: String::new(), continuation: None }]
        }
        InputEvent::Char('i') => {
            model.push(Screen::CloudInfo);
            vec![Command::GetBucketRegion { bucket }]
        }
        _ => Vec::new(),
    }
}

fn handle_object_browse_key(model: &mut Model, mode: BrowseMode, input: InputEvent) -> Vec<Command> {
    let bucket = model.bucket.as_ref().map(|b| b.name.clone()).unwrap_or_default();
    match input {
        InputEvent::Down => {
            model.objects.move_down(1);
            Vec::new()
        }
        InputEvent::Up => {
            model.objects.move_up(1);
            Vec::new()
        }
        InputEvent::PageDown => {
            model.objects.page_down();
            Vec::new()
        }
        InputEvent::PageUp => {
            model.objects.page_up();
            Vec::new()
        }
        InputEvent::Home => {
            model.objects.home();
            Vec::new()
        }
        InputEvent::End => {
            model.objects.end();
            Vec::new()
        }
        InputEvent::Char('r') => {
            model.loading = true;
            vec![Command::ListObjects { bucket, prefix: String::new(), continuation: None }]
        }
        InputEvent::Char('p') => {
            model.preview_visible = !model.preview_visible;
            Vec::new()
        }
        InputEvent::Enter => {
            let Some(item) = model.objects.cursor_item() else { return Vec::new() };
            let key = item.payload.key.clone();
            let size = item.payload.size;
            model.push(Screen::Progress);
            match mode {
                BrowseMode::Download => {
                    model.transfer = Some(TransferView {
                        kind: TransferKind::Download,
                        key: key.clone(),
                        current: 0,
                        total: size,
                        done: false,
                        message: None,
                    });
                    let local_path = PathBuf::from(key.rsplit('/').next().unwrap_or(&key).to_string());
                    vec![Command::Download { bucket, key, local_path, total_size: size }]
                }
                BrowseMode::Delete => {
                    model.transfer = Some(TransferView {
                        kind: TransferKind::Delete,
                        key: key.clone(),
                        current: 0,
                        total: 0,
                        done: false,
                        message: None,
                    });
                    vec![Command::DeleteObject { bucket, key }]
                }
            }
        }
        _ => Vec::new(),
    }
}

fn handle_upload_key(model: &mut Model, input: InputEvent) -> Vec<Command> {
    let bucket = model.bucket.as_ref().map(|b| b.name.clone()).unwrap_or_default();
    match input {
        InputEvent::Char(c) => {
            model.upload_path_input.push(c);
            Vec::new()
        }
        InputEvent::Backspace => {
            model.upload_path_input.pop();
            Vec::new()
        }
        InputEvent::Enter if !model.upload_path_input.is_empty() => {
            let local_path = PathBuf::from(model.upload_path_input.clone());
            let key = local_path.file_name().and_then(|n| n.to_str()).unwrap_or("upload").to_string();
            let total = std::fs::metadata(&local_path).map(|m| m.len()).unwrap_or(0);
            model.push(Screen::Progress);
            model.transfer = Some(TransferView {
                kind: TransferKind::Upload,
                key: key.clone(),
                current: 0,
                total,
                done: false,
                message: None,
            });
            vec![Command::Upload { bucket, key, local_path }]
        }
        _ => Vec::new(),
    }
}

fn apply_command_result(model: &mut Model, outcome: CommandOutcome) -> Vec<Command> {
    model.loading = false;
    match outcome {
        CommandOutcome::Buckets(Ok(buckets)) => {
            model.buckets.set_items(buckets.into_iter().map(|b| {
                ListItem::new(b.name.clone(), b)
            }).collect());
        }
        CommandOutcome::Buckets(Err(err)) => fail(model, err),
        CommandOutcome::Objects(Ok(page)) => {
            model.object_listing = page.items.clone();
            model.objects.set_items(
                page.items.into_iter().map(|o| ListItem::new(o.key.clone(), o)).collect(),
            );
        }
        CommandOutcome::Objects(Err(err)) => fail(model, err),
        CommandOutcome::BucketRegion(Ok(region)) => {
            model.cloud_info = Some(CloudInfoData {
                region,
                object_count: model.object_listing.len(),
                total_bytes: model.object_listing.iter().map(|o| o.size).sum(),
            });
        }
        CommandOutcome::BucketRegion(Err(err)) => fail(model, err),
        CommandOutcome::TransferProgress { current, total } => {
            if let Some(t) = model.transfer.as_mut() {
                t.current = current;
                t.total = total;
            }
        }
        CommandOutcome::TransferDone(Ok(_)) => {
            if let Some(t) = model.transfer.as_mut() {
                t.done = true;
                t.current = t.total;
            }
        }
        CommandOutcome::TransferDone(Err(err)) => {
            if let Some(t) = model.transfer.as_mut() {
                t.done = true;
                t.message = Some(err.user_message.clone());
            }
            model.error = Some(err);
        }
        CommandOutcome::ObjectListWritten(Ok(path)) => {
            model.status = Some(format!("wrote {}", path.display()));
        }
        CommandOutcome::ObjectListWritten(Err(err)) => fail(model, err),
    }
    Vec::new()
}

fn fail(model: &mut Model, err: ErrorRecord) {
    model.error = Some(err);
    model.push(Screen::Error);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::LogRing;
    use std::sync::Mutex;

    fn new_model() -> Model {
        Model::new(Arc::new(Mutex::new(LogRing::default())), None, 20)
    }

    #[test]
    fn welcome_enter_goes_to_region() {
        let mut model = new_model();
        update(&mut model, Msg::Input(InputEvent::Enter));
        assert_eq!(model.current(), Screen::Region);
    }

    #[test]
    fn region_enter_lists_buckets_and_pushes_bucket_screen() {
        let mut model = new_model();
        model.push(Screen::Region);
        for c in "us-east-1".chars() {
            update(&mut model, Msg::Input(InputEvent::Char(c)));
        }
        let cmds = update(&mut model, Msg::Input(InputEvent::Enter));
        assert_eq!(model.current(), Screen::Bucket);
        assert!(matches!(cmds.as_slice(), [Command::ListBuckets]));
        assert!(model.loading);
    }

    #[test]
    fn esc_pops_to_prior_screen_but_not_past_root() {
        let mut model = new_model();
        model.push(Screen::Region);
        model.push(Screen::Bucket);
        update(&mut model, Msg::Input(InputEvent::Esc));
        assert_eq!(model.current(), Screen::Region);
        update(&mut model, Msg::Input(InputEvent::Esc));
        assert_eq!(model.current(), Screen::Welcome);
        update(&mut model, Msg::Input(InputEvent::Esc));
        assert_eq!(model.current(), Screen::Welcome);
    }

    #[test]
    fn q_quits_from_any_non_text_screen() {
        let mut model = new_model();
        model.push(Screen::Bucket);
        update(&mut model, Msg::Input(InputEvent::Char('q')));
        assert!(model.quit);
    }

    #[test]
    fn text_entry_screens_swallow_global_shortcut_letters() {
        let mut model = new_model();
        model.push(Screen::Upload);
        update(&mut model, Msg::Input(InputEvent::Char('q')));
        assert!(!model.quit);
        assert_eq!(model.upload_path_input, "q");
    }

    #[test]
    fn help_is_reachable_globally_and_pops_back() {
        let mut model = new_model();
        model.push(Screen::Bucket);
        update(&mut model, Msg::Input(InputEvent::Char('?')));
        assert_eq!(model.current(), Screen::Help);
        update(&mut model, Msg::Input(InputEvent::Esc));
        assert_eq!(model.current(), Screen::Bucket);
    }

    #[test]
    fn bucket_list_populates_from_command_result_and_enter_selects() {
        let mut model = new_model();
        model.push(Screen::Region);
        model.push(Screen::Bucket);
        let bucket = Bucket { name: "my-bucket".to_string(), creation_date: None, region: Region::unresolved() };
        update(
            &mut model,
            Msg::CommandResult(CommandOutcome::Buckets(Ok(vec![bucket.clone()]))),
        );
        assert_eq!(model.buckets.len(), 1);
        update(&mut model, Msg::Input(InputEvent::Enter));
        assert_eq!(model.current(), Screen::Operation);
        assert_eq!(model.bucket.as_ref().map(|b| b.name.as_str()), Some("my-bucket"));
    }

    #[test]
    fn storage_error_pushes_error_screen() {
        let mut model = new_model();
        model.push(Screen::Region);
        model.push(Screen::Bucket);
        let err = s3term_core::classify("access denied", Some(403));
        update(&mut model, Msg::CommandResult(CommandOutcome::Buckets(Err(err))));
        assert_eq!(model.current(), Screen::Error);
        assert!(model.error.is_some());
    }

    #[test]
    fn transfer_progress_updates_view_without_changing_screen() {
        let mut model = new_model();
        model.push(Screen::Region);
        model.push(Screen::Bucket);
        model.push(Screen::Operation);
        model.bucket = Some(Bucket {
            name: "b".to_string(),
            creation_date: None,
            region: Region::unresolved(),
        });
        model.push(Screen::ObjectBrowse(BrowseMode::Download));
        let object = ObjectInfo {
            key: "a.txt".to_string(),
            size: 100,
            last_modified: None,
            etag: String::new(),
            storage_class: None,
        };
        update(
            &mut model,
            Msg::CommandResult(CommandOutcome::Objects(Ok(s3term_storage::ListObjectsPage {
                items: vec![object],
                truncated: false,
                next_token: None,
            }))),
        );
        update(&mut model, Msg::Input(InputEvent::Enter));
        assert_eq!(model.current(), Screen::Progress);

        update(
            &mut model,
            Msg::CommandResult(CommandOutcome::TransferProgress { current: 50, total: 100 }),
        );
        assert_eq!(model.current(), Screen::Progress);
        assert_eq!(model.transfer.as_ref().unwrap().current, 50);
    }

    #[test]
    fn p_toggles_preview_only_on_object_browse_screens() {
        let mut model = new_model();
        assert!(!model.preview_visible);

        model.push(Screen::ObjectBrowse(BrowseMode::Download));
        update(&mut model, Msg::Input(InputEvent::Char('p')));
        assert!(model.preview_visible);
        update(&mut model, Msg::Input(InputEvent::Char('p')));
        assert!(!model.preview_visible);
    }
}
