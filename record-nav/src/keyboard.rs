// Copyright (c) James Kassemi, SC, US. All rights reserved.
use log::debug;
use record_ledger::{RecordId, RecordRow};

use crate::NavigationFacade;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Modifiers {
    pub ctrl: bool,
    pub meta: bool,
    pub alt: bool,
    pub shift: bool,
}

impl Modifiers {
    pub const NONE: Modifiers = Modifiers {
        ctrl: false,
        meta: false,
        alt: false,
        shift: false,
    };

    pub fn any(&self) -> bool {
        self.ctrl || self.meta || self.alt || self.shift
    }

    /// Cmd on macOS, Ctrl elsewhere.
    pub fn command(&self) -> bool {
        self.ctrl || self.meta
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NavKey {
    Up,
    Down,
    Left,
    Right,
    Escape,
    Other,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KeyEvent {
    pub key: NavKey,
    pub modifiers: Modifiers,
}

impl KeyEvent {
    pub fn plain(key: NavKey) -> Self {
        Self {
            key,
            modifiers: Modifiers::NONE,
        }
    }

    pub fn with_command(key: NavKey) -> Self {
        Self {
            key,
            modifiers: Modifiers {
                meta: true,
                ..Modifiers::NONE
            },
        }
    }
}

/// Focus state queried from the host UI at dispatch time.
pub trait FocusSource {
    /// A text input or other editable control has focus.
    fn editable_focused(&self) -> bool;
    /// Focus is inside an embedded grid/sheet editor that owns arrow keys.
    fn nested_editor_focused(&self) -> bool;
    /// A modal wants Escape for itself.
    fn modal_intercepting(&self) -> bool;
}

pub trait Router {
    fn navigate(&mut self, path: &str);
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ViewKind {
    Index { path: String },
    Detail { index_path: String },
}

/// Maps key events onto [`NavigationFacade`] moves for the active view.
pub struct KeyDispatcher<R> {
    facade: NavigationFacade<R>,
    view: ViewKind,
}

impl<R: RecordRow> KeyDispatcher<R> {
    pub fn new(facade: NavigationFacade<R>, view: ViewKind) -> Self {
        Self { facade, view }
    }

    pub fn facade(&self) -> &NavigationFacade<R> {
        &self.facade
    }

    pub fn view(&self) -> &ViewKind {
        &self.view
    }

    pub fn set_view(&mut self, view: ViewKind) {
        self.view = view;
    }

    /// Returns whether the event was consumed.
    pub fn handle(&self, event: &KeyEvent, focus: &dyn FocusSource, router: &mut dyn Router) -> bool {
        if focus.nested_editor_focused() {
            return false;
        }
        if focus.editable_focused() && !event.modifiers.any() {
            return false;
        }
        match (&self.view, event.key) {
            (ViewKind::Index { .. }, NavKey::Down) => self.facade.select_next().is_some(),
            (ViewKind::Index { .. }, NavKey::Up) => self.facade.select_prev().is_some(),
            (ViewKind::Detail { .. }, NavKey::Right) if event.modifiers.command() => {
                self.open(self.step(|current| self.facade.next_id(current)), router)
            }
            (ViewKind::Detail { .. }, NavKey::Left) if event.modifiers.command() => {
                self.open(self.step(|current| self.facade.prev_id(current)), router)
            }
            (ViewKind::Detail { index_path }, NavKey::Escape) => {
                if focus.modal_intercepting() {
                    return false;
                }
                router.navigate(index_path);
                true
            }
            _ => false,
        }
    }

    fn step(&self, next: impl FnOnce(&RecordId) -> Option<RecordId>) -> Option<RecordId> {
        match self.facade.current_id() {
            Some(current) => next(&current),
            None => self.facade.first_id(),
        }
    }

    fn open(&self, target: Option<RecordId>, router: &mut dyn Router) -> bool {
        let Some(target) = target else {
            return false;
        };
        let path = self.facade.path_for_id(&target);
        debug!("[{}] keyboard navigation to {}", self.facade.module(), path);
        self.facade.set_current_id(Some(target));
        router.navigate(&path);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use record_ledger::LedgerRegistry;
    use serde_json::Value;

    #[derive(Default)]
    struct Focus {
        editable: bool,
        nested: bool,
        modal: bool,
    }

    impl FocusSource for Focus {
        fn editable_focused(&self) -> bool {
            self.editable
        }

        fn nested_editor_focused(&self) -> bool {
            self.nested
        }

        fn modal_intercepting(&self) -> bool {
            self.modal
        }
    }

    #[derive(Default)]
    struct History(Vec<String>);

    impl Router for History {
        fn navigate(&mut self, path: &str) {
            self.0.push(path.to_string());
        }
    }

    fn dispatcher(view: ViewKind) -> KeyDispatcher<Value> {
        let registry = LedgerRegistry::new();
        registry.set_id_list("jobs", (1..=3).map(RecordId::Int).collect(), true);
        KeyDispatcher::new(NavigationFacade::new("jobs", registry), view)
    }

    fn index_view() -> ViewKind {
        ViewKind::Index {
            path: "/jobs".into(),
        }
    }

    fn detail_view() -> ViewKind {
        ViewKind::Detail {
            index_path: "/jobs".into(),
        }
    }

    #[test]
    fn arrows_move_selection_on_index() {
        let keys = dispatcher(index_view());
        let mut router = History::default();
        let focus = Focus::default();
        assert!(keys.handle(&KeyEvent::plain(NavKey::Down), &focus, &mut router));
        assert_eq!(keys.facade().current_id(), Some(RecordId::Int(1)));
        assert!(keys.handle(&KeyEvent::plain(NavKey::Down), &focus, &mut router));
        assert!(keys.handle(&KeyEvent::plain(NavKey::Up), &focus, &mut router));
        assert_eq!(keys.facade().current_id(), Some(RecordId::Int(1)));
        assert!(!keys.handle(&KeyEvent::plain(NavKey::Up), &focus, &mut router));
        assert!(router.0.is_empty());
    }

    #[test]
    fn command_arrows_open_neighbors_on_detail() {
        let keys = dispatcher(detail_view());
        keys.facade().set_current_id(Some(RecordId::Int(2)));
        let mut router = History::default();
        let focus = Focus::default();
        assert!(!keys.handle(&KeyEvent::plain(NavKey::Right), &focus, &mut router));
        assert!(keys.handle(&KeyEvent::with_command(NavKey::Right), &focus, &mut router));
        assert_eq!(router.0, vec!["/jobs/3".to_string()]);
        assert!(!keys.handle(&KeyEvent::with_command(NavKey::Right), &focus, &mut router));
        let ctrl_left = KeyEvent {
            key: NavKey::Left,
            modifiers: Modifiers {
                ctrl: true,
                ..Modifiers::NONE
            },
        };
        assert!(keys.handle(&ctrl_left, &focus, &mut router));
        assert_eq!(router.0.last().map(String::as_str), Some("/jobs/2"));
    }

    #[test]
    fn escape_returns_to_index_unless_modal() {
        let keys = dispatcher(detail_view());
        let mut router = History::default();
        let modal = Focus {
            modal: true,
            ..Focus::default()
        };
        assert!(!keys.handle(&KeyEvent::plain(NavKey::Escape), &modal, &mut router));
        assert!(keys.handle(&KeyEvent::plain(NavKey::Escape), &Focus::default(), &mut router));
        assert_eq!(router.0, vec!["/jobs".to_string()]);
    }

    #[test]
    fn editable_focus_needs_modifier() {
        let keys = dispatcher(detail_view());
        keys.facade().set_current_id(Some(RecordId::Int(1)));
        let mut router = History::default();
        let editing = Focus {
            editable: true,
            ..Focus::default()
        };
        assert!(!keys.handle(&KeyEvent::plain(NavKey::Escape), &editing, &mut router));
        assert!(keys.handle(&KeyEvent::with_command(NavKey::Right), &editing, &mut router));
    }

    #[test]
    fn nested_editor_suppresses_everything() {
        let keys = dispatcher(detail_view());
        keys.facade().set_current_id(Some(RecordId::Int(1)));
        let mut router = History::default();
        let nested = Focus {
            nested: true,
            ..Focus::default()
        };
        assert!(!keys.handle(&KeyEvent::with_command(NavKey::Right), &nested, &mut router));
        assert!(!keys.handle(&KeyEvent::plain(NavKey::Escape), &nested, &mut router));
        assert!(router.0.is_empty());
    }

    #[test]
    fn other_keys_pass_through() {
        let mut keys = dispatcher(index_view());
        let mut router = History::default();
        assert!(!keys.handle(&KeyEvent::plain(NavKey::Other), &Focus::default(), &mut router));
        keys.set_view(detail_view());
        assert!(!keys.handle(&KeyEvent::plain(NavKey::Down), &Focus::default(), &mut router));
    }
}
