// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! Adapts a ledger (and its window controller) to a virtualized list: a dense,
//! placeholder-filled records array plus range, missing-index and near-end signals,
//! auto-selection and scroll-follow.

pub mod slot;
pub mod virtualizer;

use std::sync::Arc;

use core_types::config::ViewportConfig;
use log::{debug, trace};
use record_ledger::{LedgerMode, LedgerRegistry, RecordId, RecordLedger, RecordRow};
use window_controller::WindowController;

pub use slot::{BridgeView, RecordSlot};
pub use virtualizer::{ScrollAlign, Virtualizer, VisibleRange};

pub type PlaceholderFn<R> = Arc<dyn Fn(usize, &RecordId) -> R + Send + Sync>;
pub type LoadedFn<R> = Arc<dyn Fn(usize, &RecordSlot<R>) -> bool + Send + Sync>;

type RangeCallback = Box<dyn FnMut(VisibleRange) + Send>;
type MissingCallback = Box<dyn FnMut(&[usize]) + Send>;
type NearEndCallback = Box<dyn FnMut() + Send>;

pub struct ViewportBridge<R> {
    module: String,
    registry: LedgerRegistry<R>,
    controller: Option<Arc<WindowController<R>>>,
    near_end_distance: usize,
    placeholder: Option<PlaceholderFn<R>>,
    is_index_loaded: Option<LoadedFn<R>>,
    on_range: Option<RangeCallback>,
    on_missing: Option<MissingCallback>,
    on_near_end: Option<NearEndCallback>,
    last_range: Option<VisibleRange>,
    follow_align: ScrollAlign,
    /// Last selection seen by `render` and whether it still needs a scroll.
    observed: Option<RecordId>,
    follow_pending: bool,
}

impl<R: RecordRow> ViewportBridge<R> {
    pub fn new(module: impl Into<String>, registry: LedgerRegistry<R>, config: &ViewportConfig) -> Self {
        Self {
            module: module.into(),
            registry,
            controller: None,
            near_end_distance: config.near_end_distance,
            placeholder: None,
            is_index_loaded: None,
            on_range: None,
            on_missing: None,
            on_near_end: None,
            last_range: None,
            follow_align: ScrollAlign::Center,
            observed: None,
            follow_pending: false,
        }
    }

    /// Routes visible-range misses into `controller`'s window.
    pub fn with_controller(mut self, controller: Arc<WindowController<R>>) -> Self {
        self.controller = Some(controller);
        self
    }

    pub fn with_placeholder(mut self, build: impl Fn(usize, &RecordId) -> R + Send + Sync + 'static) -> Self {
        self.placeholder = Some(Arc::new(build));
        self
    }

    pub fn with_loaded_predicate(
        mut self,
        is_loaded: impl Fn(usize, &RecordSlot<R>) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.is_index_loaded = Some(Arc::new(is_loaded));
        self
    }

    /// Where scroll-follow places the selected row; centered by default.
    pub fn with_follow_align(mut self, align: ScrollAlign) -> Self {
        self.follow_align = align;
        self
    }

    pub fn on_range_change(mut self, callback: impl FnMut(VisibleRange) + Send + 'static) -> Self {
        self.on_range = Some(Box::new(callback));
        self
    }

    pub fn on_missing_indices(mut self, callback: impl FnMut(&[usize]) + Send + 'static) -> Self {
        self.on_missing = Some(Box::new(callback));
        self
    }

    pub fn on_near_end(mut self, callback: impl FnMut() + Send + 'static) -> Self {
        self.on_near_end = Some(Box::new(callback));
        self
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn last_range(&self) -> Option<VisibleRange> {
        self.last_range
    }

    /// Dense records array over the authoritative ordering.
    pub fn view(&self) -> BridgeView<R> {
        // controller state is read before the registry lock is taken
        let fetching = self.controller.as_ref().is_some_and(|c| c.is_fetching());
        let window_size = self.controller.as_ref().map(|c| c.window_size());
        self.registry
            .with_ledger(&self.module, |ledger| {
                let total = ledger.len();
                let records = (0..total)
                    .filter_map(|index| self.slot_at(ledger, index))
                    .collect();
                BridgeView {
                    records,
                    total,
                    at_end: at_end(ledger, window_size),
                    fetching,
                }
            })
            .unwrap_or_else(|| BridgeView {
                fetching,
                ..BridgeView::empty()
            })
    }

    /// Kept for callers that page explicitly; windowed hydration needs no prompting.
    pub fn request_more(&self) {}

    pub fn selection(&self) -> Option<RecordId> {
        self.registry.current_id(&self.module)
    }

    pub fn select(&self, id: Option<RecordId>) -> bool {
        self.registry.set_current_id(&self.module, id)
    }

    /// Handles a scroll or resize of the virtualized list.
    pub fn viewport_changed(&mut self, virtualizer: &dyn Virtualizer) -> Option<VisibleRange> {
        let range = virtualizer.visible_range()?;
        let (mode, total, missing) = self.registry.with_ledger(&self.module, |ledger| {
            let total = ledger.len();
            let missing = range
                .clamp(total)
                .map(|visible| {
                    visible
                        .indices()
                        .filter(|index| !self.index_loaded(ledger, *index))
                        .collect::<Vec<_>>()
                })
                .unwrap_or_default();
            (ledger.mode(), total, missing)
        })?;

        if self.last_range != Some(range) {
            self.last_range = Some(range);
            if let Some(callback) = self.on_range.as_mut() {
                callback(range);
            }
        }

        if !missing.is_empty() {
            trace!(
                "[viewport_bridge] '{}' {} visible index(es) unloaded",
                self.module,
                missing.len()
            );
            if let (LedgerMode::Hybrid, Some(controller)) = (mode, self.controller.as_ref()) {
                if let Some(last) = missing.last() {
                    controller.ensure_covers(*last);
                }
            }
            if let Some(callback) = self.on_missing.as_mut() {
                callback(&missing);
            }
        }

        if mode == LedgerMode::Legacy && total > 0 && range.end + self.near_end_distance >= total {
            if let Some(callback) = self.on_near_end.as_mut() {
                callback();
            }
        }
        Some(range)
    }

    /// Builds the current view, auto-selects when nothing is selected and scrolls the
    /// selection into view once its row is rendered.
    pub fn render(&mut self, virtualizer: &mut dyn Virtualizer) -> BridgeView<R> {
        let view = self.view();
        let mut selection = self.selection();
        if selection.is_none() {
            let first = self
                .registry
                .with_ledger(&self.module, |ledger| first_identified(ledger, &view))
                .flatten();
            if let Some(first) = first {
                debug!("[viewport_bridge] '{}' auto-selecting {}", self.module, first);
                self.select(Some(first.clone()));
                selection = Some(first);
            }
        }
        self.follow(selection, &view, virtualizer);
        view
    }

    fn follow(&mut self, selection: Option<RecordId>, view: &BridgeView<R>, virtualizer: &mut dyn Virtualizer) {
        if self.observed != selection {
            self.follow_pending = selection.is_some();
            self.observed = selection;
        }
        if !self.follow_pending {
            return;
        }
        let Some(selection) = self.observed.as_ref() else {
            return;
        };
        let index = self
            .registry
            .with_ledger(&self.module, |ledger| rendered_index(ledger, view, selection))
            .flatten();
        match index {
            Some(index) => {
                virtualizer.scroll_to_index(index, self.follow_align);
                self.follow_pending = false;
            }
            None => trace!(
                "[viewport_bridge] '{}' selection {} not rendered yet",
                self.module,
                selection
            ),
        }
    }

    fn slot_at(&self, ledger: &RecordLedger<R>, index: usize) -> Option<RecordSlot<R>> {
        match ledger.mode() {
            LedgerMode::Hybrid => {
                let id = ledger.id_at(index)?;
                if let Some(row) = ledger.hydrated_row(&id) {
                    return Some(RecordSlot::Hydrated(row.clone()));
                }
                Some(match self.placeholder.as_ref() {
                    Some(build) => RecordSlot::Placeholder(build(index, &id)),
                    None => RecordSlot::Loading { index, id },
                })
            }
            LedgerMode::Legacy => ledger.records().get(index).cloned().map(RecordSlot::Hydrated),
            LedgerMode::Empty => None,
        }
    }

    fn index_loaded(&self, ledger: &RecordLedger<R>, index: usize) -> bool {
        match self.is_index_loaded.as_ref() {
            Some(is_loaded) => self
                .slot_at(ledger, index)
                .is_some_and(|slot| is_loaded(index, &slot)),
            None => match ledger.mode() {
                LedgerMode::Hybrid => ledger
                    .id_at(index)
                    .is_some_and(|id| ledger.is_hydrated(&id.key())),
                LedgerMode::Legacy => index < ledger.records().len(),
                LedgerMode::Empty => false,
            },
        }
    }
}

fn at_end<R: RecordRow>(ledger: &RecordLedger<R>, window_size: Option<usize>) -> bool {
    match ledger.mode() {
        LedgerMode::Hybrid => match window_size {
            Some(window_size) => window_size >= ledger.len(),
            None => ledger.hydrated_count() >= ledger.len(),
        },
        LedgerMode::Legacy | LedgerMode::Empty => true,
    }
}

fn first_identified<R: RecordRow>(ledger: &RecordLedger<R>, view: &BridgeView<R>) -> Option<RecordId> {
    view.records.iter().enumerate().find_map(|(index, slot)| match slot {
        RecordSlot::Hydrated(row) => ledger.id_of(row).or_else(|| ledger.id_at(index)),
        RecordSlot::Placeholder(_) | RecordSlot::Loading { .. } => ledger.id_at(index),
    })
}

/// Index of `id` in the records array, only when that slot holds a hydrated row.
fn rendered_index<R: RecordRow>(ledger: &RecordLedger<R>, view: &BridgeView<R>, id: &RecordId) -> Option<usize> {
    let index = ledger.position_of(id)?;
    view.records
        .get(index)
        .filter(|slot| slot.is_hydrated())
        .map(|_| index)
}
