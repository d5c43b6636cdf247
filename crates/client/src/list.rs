//! Virtual List (C5): a pure viewport/navigation model, a bounded render
//! cache, and an optional async formatter pool — composed in that order
//! rather than mixed together.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use crate::constants::RENDER_WORKERS;

/// One row. `payload` is a tagged-union value per screen (e.g. a `Bucket` or
/// an `ObjectInfo`), never a free-form any-type.
#[derive(Debug, Clone)]
pub struct ListItem<T> {
    pub title: String,
    pub description: String,
    pub tag: String,
    pub payload: T,
}

impl<T> ListItem<T> {
    pub fn new(title: impl Into<String>, payload: T) -> Self {
        Self { title: title.into(), description: String::new(), tag: String::new(), payload }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }
}

/// `top`/`max_visible`/`cursor` window over a list, kept consistent by
/// [`Viewport::reconcile`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub top: usize,
    pub max_visible: usize,
    pub cursor: usize,
}

impl Viewport {
    pub fn new(max_visible: usize) -> Self {
        Self { top: 0, max_visible: max_visible.max(1), cursor: 0 }
    }

    /// Re-establish `0 <= top <= cursor < top + max_visible` (when `len >
    /// 0`), pulling `top` toward `cursor` by the minimum amount necessary.
    pub fn reconcile(&mut self, len: usize) {
        if len == 0 {
            self.top = 0;
            self.cursor = 0;
            return;
        }
        self.cursor = self.cursor.min(len - 1);
        if self.cursor < self.top {
            self.top = self.cursor;
        } else if self.cursor >= self.top.saturating_add(self.max_visible) {
            self.top = self.cursor + 1 - self.max_visible;
        }
        let max_top = len.saturating_sub(self.max_visible);
        self.top = self.top.min(max_top);
    }
}

struct RenderRequest<T> {
    index: usize,
    item: ListItem<T>,
    is_cursor: bool,
}

struct RenderResult {
    index: usize,
    rendered: String,
}

/// Large-list mode multiplies `max_cache_size` once the item count exceeds
/// the viewport, so scrolling a big bucket doesn't thrash the cache.
const BASE_CACHE_SIZE: usize = 128;

pub struct VirtualList<T: Clone + Send + 'static> {
    items: Vec<ListItem<T>>,
    viewport: Viewport,
    selected: Option<usize>,
    cache: HashMap<usize, String>,
    cache_order: VecDeque<usize>,
    max_cache_size: usize,
    formatter: Arc<dyn Fn(&ListItem<T>, bool) -> String + Send + Sync>,
    render_tx: async_channel::Sender<RenderRequest<T>>,
    render_rx: async_channel::Receiver<RenderResult>,
}

impl<T: Clone + Send + 'static> VirtualList<T> {
    pub fn new(
        max_visible: usize,
        formatter: impl Fn(&ListItem<T>, bool) -> String + Send + Sync + 'static,
    ) -> Self {
        let (req_tx, req_rx) = async_channel::bounded::<RenderRequest<T>>(RENDER_WORKERS * 8);
        let (res_tx, res_rx) = async_channel::unbounded::<RenderResult>();
        let formatter: Arc<dyn Fn(&ListItem<T>, bool) -> String + Send + Sync> = Arc::new(formatter);

        for _ in 0..RENDER_WORKERS {
            let req_rx = req_rx.clone();
            let res_tx = res_tx.clone();
            let formatter = formatter.clone();
            tokio::spawn(async move {
                while let Ok(req) = req_rx.recv().await {
                    let rendered = (formatter)(&req.item, req.is_cursor);
                    if res_tx.send(RenderResult { index: req.index, rendered }).await.is_err() {
                        break;
                    }
                }
            });
        }

        Self {
            items: Vec::new(),
            viewport: Viewport::new(max_visible),
            selected: None,
            cache: HashMap::new(),
            cache_order: VecDeque::new(),
            max_cache_size: BASE_CACHE_SIZE,
            formatter,
            render_tx: req_tx,
            render_rx: res_rx,
        }
    }

    /// Replace the item set. Invalidates cursor, selection and the render
    /// cache atomically.
    pub fn set_items(&mut self, items: Vec<ListItem<T>>) {
        self.items = items;
        if self.items.len() > self.viewport.max_visible {
            self.max_cache_size = self.max_cache_size.max(self.items.len().min(2000));
        }
        self.reset();
    }

    /// Clear cursor, selection and cache without touching the item set.
    pub fn reset(&mut self) {
        self.viewport.top = 0;
        self.viewport.cursor = 0;
        self.selected = None;
        self.cache.clear();
        self.cache_order.clear();
        self.viewport.reconcile(self.items.len());
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn cursor_item(&self) -> Option<&ListItem<T>> {
        self.items.get(self.viewport.cursor)
    }

    pub fn selected(&self) -> Option<&ListItem<T>> {
        self.selected.and_then(|idx| self.items.get(idx))
    }

    pub fn select_cursor(&mut self) {
        if !self.items.is_empty() {
            self.selected = Some(self.viewport.cursor);
        }
    }

    fn move_cursor_to(&mut self, new_cursor: usize) {
        let old_cursor = self.viewport.cursor;
        self.viewport.cursor = new_cursor;
        self.viewport.reconcile(self.items.len());
        if old_cursor != self.viewport.cursor {
            self.invalidate(old_cursor);
            self.invalidate(self.viewport.cursor);
        }
    }

    pub fn move_down(&mut self, by: usize) {
        self.move_cursor_to(self.viewport.cursor.saturating_add(by));
    }

    pub fn move_up(&mut self, by: usize) {
        self.move_cursor_to(self.viewport.cursor.saturating_sub(by));
    }

    pub fn page_down(&mut self) {
        self.move_down(self.viewport.max_visible);
    }

    pub fn page_up(&mut self) {
        self.move_up(self.viewport.max_visible);
    }

    pub fn home(&mut self) {
        self.move_cursor_to(0);
    }

    pub fn end(&mut self) {
        self.move_cursor_to(self.items.len().saturating_sub(1));
    }

    fn invalidate(&mut self, index: usize) {
        self.cache.remove(&index);
        self.cache_order.retain(|&i| i != index);
    }

    fn insert_cache(&mut self, index: usize, rendered: String) {
        if !self.cache.contains_key(&index) {
            self.cache_order.push_back(index);
        }
        self.cache.insert(index, rendered);
        while self.cache.len() > self.max_cache_size.max(1) {
            if let Some(oldest) = self.cache_order.pop_front() {
                self.cache.remove(&oldest);
            } else {
                break;
            }
        }
    }

    /// Drain any render results available without blocking.
    fn drain_results(&mut self) {
        while let Ok(result) = self.render_rx.try_recv() {
            self.insert_cache(result.index, result.rendered);
        }
    }

    /// Lines for the currently visible window: cached where possible,
    /// rendered synchronously as a this-frame fallback otherwise, with a
    /// background re-render enqueued (best-effort, dropped if saturated) so
    /// the next frame can serve it from cache.
    pub fn visible_lines(&mut self) -> Vec<String> {
        self.drain_results();

        let end = (self.viewport.top + self.viewport.max_visible).min(self.items.len());
        let mut lines = Vec::with_capacity(end.saturating_sub(self.viewport.top));
        for idx in self.viewport.top..end {
            let is_cursor = idx == self.viewport.cursor;
            if let Some(line) = self.cache.get(&idx) {
                lines.push(line.clone());
                continue;
            }

            let item = self.items[idx].clone();
            let rendered = (self.formatter)(&item, is_cursor);
            let _ = self.render_tx.try_send(RenderRequest { index: idx, item, is_cursor });
            lines.push(rendered);
        }
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list_of(n: usize, max_visible: usize) -> VirtualList<usize> {
        let mut list = VirtualList::new(max_visible, |item: &ListItem<usize>, is_cursor| {
            format!("{}{}", if is_cursor { "> " } else { "  " }, item.title)
        });
        list.set_items((0..n).map(|i| ListItem::new(format!("item-{i}"), i)).collect());
        list
    }

    #[test]
    fn viewport_invariant_holds_after_many_downs() {
        let mut list = list_of(1000, 20);
        for _ in 0..25 {
            list.move_down(1);
        }
        let vp = list.viewport();
        assert_eq!(vp.cursor, 25);
        assert!(vp.top <= vp.cursor);
        assert!(vp.cursor < vp.top + vp.max_visible);
        assert!(vp.top + vp.max_visible <= 1000);
    }

    #[test]
    fn home_and_end_snap_to_bounds() {
        let mut list = list_of(50, 10);
        list.end();
        assert_eq!(list.viewport().cursor, 49);
        list.home();
        assert_eq!(list.viewport().cursor, 0);
        assert_eq!(list.viewport().top, 0);
    }

    #[test]
    fn empty_list_has_zero_viewport() {
        let list = list_of(0, 10);
        let vp = list.viewport();
        assert_eq!(vp.top, 0);
        assert_eq!(vp.cursor, 0);
    }

    #[tokio::test]
    async fn visible_lines_match_window_and_mark_cursor() {
        let mut list = list_of(5, 3);
        let lines = list.visible_lines();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with('>'));
        assert!(lines[1].starts_with(' '));
    }

    #[test]
    fn reset_clears_selection_and_cursor() {
        let mut list = list_of(10, 5);
        list.move_down(3);
        list.select_cursor();
        list.reset();
        assert!(list.selected().is_none());
        assert_eq!(list.viewport().cursor, 0);
    }

    #[test]
    fn large_list_mode_raises_cache_bound() {
        let list = list_of(5000, 20);
        assert!(list.max_cache_size > BASE_CACHE_SIZE);
    }
}
