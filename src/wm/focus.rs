//! Focus control
//!
//! Owns the "current" selection and every operation that moves it: cycling,
//! minimize/hide into the auxiliary stacks, restore/unhide, the maximize
//! toggle and graceful close. All server effects go through the display
//! backend; all bookkeeping stays in the registry and stacks.

use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::wm::backend::{best_effort, DisplayBackend, Geometry, WindowId};
use crate::wm::registry::{WindowRegistry, WindowState};
use crate::wm::stacks::{StackKind, StackTracker};

/// Shared slot holding the title of the currently focused window.
///
/// The one piece of core state another thread may read: the status surface
/// copies it out on its own cadence. The lock is held only for the copy.
#[derive(Clone, Default)]
pub struct FocusedTitle(Arc<Mutex<String>>);

impl FocusedTitle {
    pub fn copy_out(&self) -> String {
        self.0.lock().map(|title| title.clone()).unwrap_or_default()
    }

    fn store(&self, title: String) {
        if let Ok(mut slot) = self.0.lock() {
            *slot = title;
        }
    }
}

/// Focus selection and the state transitions that drive it.
pub struct FocusController {
    current: Option<WindowId>,
    focused_color: u32,
    unfocused_color: u32,
    title: FocusedTitle,
}

impl FocusController {
    pub fn new(focused_color: u32, unfocused_color: u32) -> Self {
        Self {
            current: None,
            focused_color,
            unfocused_color,
            title: FocusedTitle::default(),
        }
    }

    pub fn current(&self) -> Option<WindowId> {
        self.current
    }

    /// Handle to the shared focused-title slot, for the status surface.
    pub fn title_handle(&self) -> FocusedTitle {
        self.title.clone()
    }

    /// Drop the selection without publishing anything. Callers re-derive.
    pub fn clear_current(&mut self) {
        self.current = None;
    }

    /// Make a window the current focus target.
    ///
    /// A live-attribute probe runs first: the client may have vanished
    /// between event receipt and now, in which case nothing changes and the
    /// eventual destroy notification cleans up.
    pub fn focus<B: DisplayBackend>(
        &mut self,
        backend: &mut B,
        registry: &WindowRegistry,
        handle: WindowId,
    ) {
        if !backend.window_exists(handle) {
            debug!("focus target {handle:#x} no longer exists");
            return;
        }

        self.current = Some(handle);
        best_effort("raise window", backend.raise_window(handle));
        best_effort("set input focus", backend.set_input_focus(handle));
        best_effort(
            "publish active window",
            backend.publish_active_window(Some(handle)),
        );
        best_effort(
            "set focused border",
            backend.set_border_color(handle, self.focused_color),
        );

        for record in registry.iter() {
            if record.handle != handle && backend.window_exists(record.handle) {
                best_effort(
                    "set unfocused border",
                    backend.set_border_color(record.handle, self.unfocused_color),
                );
            }
        }

        let title = backend.window_title(handle).unwrap_or_default();
        self.title.store(title);
    }

    /// Cycle to the next eligible window in list order.
    pub fn next<B: DisplayBackend>(&mut self, backend: &mut B, registry: &WindowRegistry) {
        match self.current {
            None => {
                if let Some(handle) = registry.first_eligible() {
                    self.focus(backend, registry, handle);
                }
            }
            Some(current) => {
                if let Some(next) = registry.next_eligible_after(current) {
                    self.focus(backend, registry, next);
                }
            }
        }
    }

    /// Focus the first eligible window, or publish that nothing is active.
    pub fn focus_first<B: DisplayBackend>(&mut self, backend: &mut B, registry: &WindowRegistry) {
        match registry.first_eligible() {
            Some(handle) => self.focus(backend, registry, handle),
            None => self.publish_no_active(backend),
        }
    }

    pub fn minimize<B: DisplayBackend>(
        &mut self,
        backend: &mut B,
        registry: &mut WindowRegistry,
        stacks: &mut StackTracker,
    ) {
        self.stash(
            backend,
            registry,
            stacks,
            StackKind::Minimized,
            WindowState::Minimized,
        );
    }

    pub fn hide<B: DisplayBackend>(
        &mut self,
        backend: &mut B,
        registry: &mut WindowRegistry,
        stacks: &mut StackTracker,
    ) {
        self.stash(
            backend,
            registry,
            stacks,
            StackKind::Hidden,
            WindowState::Hidden,
        );
    }

    /// Restore the most recently minimized window.
    pub fn restore<B: DisplayBackend>(
        &mut self,
        backend: &mut B,
        registry: &mut WindowRegistry,
        stacks: &mut StackTracker,
    ) {
        self.unstash(
            backend,
            registry,
            stacks,
            StackKind::Minimized,
            WindowState::Minimized,
        );
    }

    /// Remap the most recently hidden window.
    pub fn unhide<B: DisplayBackend>(
        &mut self,
        backend: &mut B,
        registry: &mut WindowRegistry,
        stacks: &mut StackTracker,
    ) {
        self.unstash(
            backend,
            registry,
            stacks,
            StackKind::Hidden,
            WindowState::Hidden,
        );
    }

    /// Push the current window onto a stack and move focus elsewhere.
    ///
    /// No-op when there is no current window, the window is already in the
    /// target state, or the stack is at capacity.
    fn stash<B: DisplayBackend>(
        &mut self,
        backend: &mut B,
        registry: &mut WindowRegistry,
        stacks: &mut StackTracker,
        kind: StackKind,
        target: WindowState,
    ) {
        let Some(current) = self.current else {
            return;
        };
        let Some(record) = registry.find(current) else {
            return;
        };
        if record.state == target {
            return;
        }
        if stacks.push(kind, current).is_err() {
            debug!("{kind:?} stack is full, leaving window {current:#x} as is");
            return;
        }

        if let Some(record) = registry.find_mut(current) {
            record.state = target;
        }
        best_effort("unmap window", backend.unmap_window(current));
        best_effort("set hidden state", backend.set_state_hidden(current));

        self.current = None;
        match registry.next_eligible_after(current) {
            Some(next) => self.focus(backend, registry, next),
            None => self.publish_no_active(backend),
        }
    }

    /// Pop a stack and bring the window back if it is still what we expect.
    ///
    /// A stale entry (record gone, or state changed behind our back) is
    /// discarded without retrying; the pop is spent either way.
    fn unstash<B: DisplayBackend>(
        &mut self,
        backend: &mut B,
        registry: &mut WindowRegistry,
        stacks: &mut StackTracker,
        kind: StackKind,
        expected: WindowState,
    ) {
        let Some(handle) = stacks.pop(kind) else {
            return;
        };
        let Some(record) = registry.find_mut(handle) else {
            debug!("discarding stale {kind:?} entry {handle:#x}");
            return;
        };
        if record.state != expected {
            debug!("discarding {kind:?} entry {handle:#x} in state {:?}", record.state);
            return;
        }

        record.state = WindowState::Normal;
        best_effort("map window", backend.map_window(handle));
        best_effort("clear state", backend.clear_state(handle));
        self.focus(backend, registry, handle);
    }

    /// Toggle the current window between Maximized and its saved geometry.
    pub fn maximize<B: DisplayBackend>(
        &mut self,
        backend: &mut B,
        registry: &mut WindowRegistry,
    ) {
        let Some(current) = self.current else {
            return;
        };
        let Some(record) = registry.find_mut(current) else {
            return;
        };

        match record.state {
            WindowState::Maximized => {
                record.state = WindowState::Normal;
                let saved = record.geometry;
                best_effort("restore geometry", backend.move_resize(current, saved));
                best_effort("clear state", backend.clear_state(current));
            }
            WindowState::Normal => {
                // Snapshot only from Normal, so toggling twice cannot
                // overwrite the true pre-maximize geometry.
                if let Ok(live) = backend.window_geometry(current) {
                    record.geometry = live;
                }
                record.state = WindowState::Maximized;
                let (width, height) = backend.screen_size();
                best_effort(
                    "maximize geometry",
                    backend.move_resize(
                        current,
                        Geometry {
                            x: 0,
                            y: 0,
                            width,
                            height,
                        },
                    ),
                );
                best_effort("set maximized state", backend.set_state_maximized(current));
            }
            WindowState::Minimized | WindowState::Hidden => {}
        }
    }

    /// Close the current window, gracefully when the client allows it.
    ///
    /// Never waits for the client to comply; the record goes away when the
    /// unmap or destroy notification arrives.
    pub fn close<B: DisplayBackend>(&mut self, backend: &mut B) {
        let Some(current) = self.current else {
            return;
        };
        if backend.supports_delete(current) {
            best_effort("send delete message", backend.send_delete(current));
        } else {
            best_effort("kill client", backend.kill_client(current));
        }
    }

    /// Publish that no window is active and clear the shared title.
    pub fn publish_no_active<B: DisplayBackend>(&mut self, backend: &mut B) {
        best_effort(
            "publish active window",
            backend.publish_active_window(None),
        );
        self.title.store(String::new());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wm::backend::testing::{FakeBackend, PublishedState};

    const FOCUSED: u32 = 0xffffff;
    const UNFOCUSED: u32 = 0x000000;

    struct Fixture {
        backend: FakeBackend,
        registry: WindowRegistry,
        stacks: StackTracker,
        focus: FocusController,
    }

    impl Fixture {
        fn new(capacity: usize) -> Self {
            Self {
                backend: FakeBackend::new(),
                registry: WindowRegistry::new(),
                stacks: StackTracker::new(capacity),
                focus: FocusController::new(FOCUSED, UNFOCUSED),
            }
        }

        /// Map a window the way the dispatcher would: register and focus.
        fn map(&mut self, handle: WindowId, geometry: Geometry) {
            self.backend.add_window(handle, geometry);
            self.registry.add(&mut self.backend, handle);
            self.backend.map_window(handle).unwrap();
            self.focus
                .focus(&mut self.backend, &self.registry, handle);
        }
    }

    fn geom(x: i16, y: i16, width: u16, height: u16) -> Geometry {
        Geometry {
            x,
            y,
            width,
            height,
        }
    }

    #[test]
    fn focus_raises_and_publishes() {
        let mut fx = Fixture::new(4);
        fx.map(1, geom(0, 0, 100, 100));

        assert_eq!(fx.focus.current(), Some(1));
        assert_eq!(fx.backend.raised, vec![1]);
        assert_eq!(fx.backend.input_focus, Some(1));
        assert_eq!(fx.backend.active_window, Some(1));
        assert_eq!(fx.backend.borders.get(&1), Some(&FOCUSED));
    }

    #[test]
    fn focus_recolors_other_windows() {
        let mut fx = Fixture::new(4);
        fx.map(1, geom(0, 0, 100, 100));
        fx.map(2, geom(0, 0, 100, 100));

        assert_eq!(fx.backend.borders.get(&2), Some(&FOCUSED));
        assert_eq!(fx.backend.borders.get(&1), Some(&UNFOCUSED));
    }

    #[test]
    fn focus_on_vanished_window_is_noop() {
        let mut fx = Fixture::new(4);
        fx.map(1, geom(0, 0, 100, 100));
        fx.backend.destroy_window(1);

        fx.focus.clear_current();
        fx.focus.focus(&mut fx.backend, &fx.registry, 1);

        assert_eq!(fx.focus.current(), None);
    }

    #[test]
    fn focus_updates_shared_title() {
        let mut fx = Fixture::new(4);
        fx.backend.titles.insert(1, "editor".into());
        let title = fx.focus.title_handle();
        fx.map(1, geom(0, 0, 100, 100));

        assert_eq!(title.copy_out(), "editor");
    }

    #[test]
    fn next_cycles_in_list_order_and_wraps() {
        let mut fx = Fixture::new(4);
        fx.map(1, geom(0, 0, 100, 100));
        fx.map(2, geom(0, 0, 100, 100));
        // Order is [2, 1], current = 2.

        fx.focus.next(&mut fx.backend, &fx.registry);
        assert_eq!(fx.focus.current(), Some(1));

        fx.focus.next(&mut fx.backend, &fx.registry);
        assert_eq!(fx.focus.current(), Some(2));
    }

    #[test]
    fn next_with_no_current_picks_first_eligible() {
        let mut fx = Fixture::new(4);
        fx.map(1, geom(0, 0, 100, 100));
        fx.map(2, geom(0, 0, 100, 100));
        fx.focus.clear_current();

        fx.focus.next(&mut fx.backend, &fx.registry);
        assert_eq!(fx.focus.current(), Some(2));
    }

    #[test]
    fn next_keeps_current_when_nothing_else_is_eligible() {
        let mut fx = Fixture::new(4);
        fx.map(1, geom(0, 0, 100, 100));
        fx.map(2, geom(0, 0, 100, 100));
        fx.focus.minimize(&mut fx.backend, &mut fx.registry, &mut fx.stacks);
        // Only 1 is left eligible and focused.

        let current = fx.focus.current();
        fx.focus.next(&mut fx.backend, &fx.registry);
        assert_eq!(fx.focus.current(), current);
    }

    #[test]
    fn minimize_single_window_empties_selection() {
        let mut fx = Fixture::new(4);
        fx.map(1, geom(0, 0, 100, 100));

        fx.focus.minimize(&mut fx.backend, &mut fx.registry, &mut fx.stacks);

        assert_eq!(fx.registry.find(1).unwrap().state, WindowState::Minimized);
        assert_eq!(fx.focus.current(), None);
        assert_eq!(fx.backend.active_window, None);
        assert_eq!(fx.stacks.handles(StackKind::Minimized), &[1]);
        assert!(!fx.backend.mapped.contains(&1));
        assert_eq!(fx.backend.states.get(&1), Some(&PublishedState::Hidden));
    }

    #[test]
    fn minimize_twice_changes_state_once() {
        let mut fx = Fixture::new(4);
        fx.map(1, geom(0, 0, 100, 100));

        fx.focus.minimize(&mut fx.backend, &mut fx.registry, &mut fx.stacks);
        fx.focus.minimize(&mut fx.backend, &mut fx.registry, &mut fx.stacks);

        assert_eq!(fx.stacks.handles(StackKind::Minimized), &[1]);
        assert_eq!(fx.registry.find(1).unwrap().state, WindowState::Minimized);
    }

    #[test]
    fn minimize_focuses_next_eligible() {
        let mut fx = Fixture::new(4);
        fx.map(1, geom(0, 0, 100, 100));
        fx.map(2, geom(0, 0, 100, 100));
        // Current = 2, order [2, 1].

        fx.focus.minimize(&mut fx.backend, &mut fx.registry, &mut fx.stacks);

        assert_eq!(fx.focus.current(), Some(1));
        assert_eq!(fx.backend.active_window, Some(1));
    }

    #[test]
    fn minimize_then_restore_round_trips() {
        let mut fx = Fixture::new(4);
        let original = geom(30, 40, 500, 400);
        fx.map(1, original);

        fx.focus.minimize(&mut fx.backend, &mut fx.registry, &mut fx.stacks);
        fx.focus.restore(&mut fx.backend, &mut fx.registry, &mut fx.stacks);

        let record = fx.registry.find(1).unwrap();
        assert_eq!(record.state, WindowState::Normal);
        assert_eq!(record.geometry, original);
        assert_eq!(fx.focus.current(), Some(1));
        assert!(fx.backend.mapped.contains(&1));
        assert!(fx.backend.states.get(&1).is_none());
        assert_eq!(fx.backend.geometries.get(&1), Some(&original));
    }

    #[test]
    fn restore_discards_stale_entry() {
        let mut fx = Fixture::new(4);
        fx.map(1, geom(0, 0, 100, 100));
        fx.focus.minimize(&mut fx.backend, &mut fx.registry, &mut fx.stacks);

        // The window goes away while minimized; only the registry record is
        // dropped here, the stack entry stays behind.
        let handle = 1;
        fx.backend.destroy_window(handle);
        fx.registry.remove(&mut fx.backend, handle);

        fx.focus.restore(&mut fx.backend, &mut fx.registry, &mut fx.stacks);

        assert_eq!(fx.focus.current(), None);
        assert!(fx.stacks.handles(StackKind::Minimized).is_empty());
    }

    #[test]
    fn hide_respects_capacity() {
        let mut fx = Fixture::new(4);
        for handle in 1..=5 {
            fx.map(handle, geom(0, 0, 100, 100));
        }

        for _ in 0..5 {
            fx.focus.hide(&mut fx.backend, &mut fx.registry, &mut fx.stacks);
        }

        assert_eq!(fx.stacks.handles(StackKind::Hidden).len(), 4);
        // The fifth hide was dropped: one window is still Normal, focused
        // and focus-eligible.
        let survivor = fx.focus.current().unwrap();
        assert_eq!(fx.registry.find(survivor).unwrap().state, WindowState::Normal);
        assert_eq!(fx.registry.first_eligible(), Some(survivor));
    }

    #[test]
    fn unhide_is_lifo() {
        let mut fx = Fixture::new(4);
        fx.map(1, geom(0, 0, 100, 100));
        fx.map(2, geom(0, 0, 100, 100));

        // Hide 2, then 1.
        fx.focus.hide(&mut fx.backend, &mut fx.registry, &mut fx.stacks);
        fx.focus.hide(&mut fx.backend, &mut fx.registry, &mut fx.stacks);
        assert_eq!(fx.backend.active_window, None);

        fx.focus.unhide(&mut fx.backend, &mut fx.registry, &mut fx.stacks);
        assert_eq!(fx.focus.current(), Some(1));

        fx.focus.unhide(&mut fx.backend, &mut fx.registry, &mut fx.stacks);
        assert_eq!(fx.focus.current(), Some(2));
    }

    #[test]
    fn no_handle_sits_in_both_stacks() {
        let mut fx = Fixture::new(4);
        fx.map(1, geom(0, 0, 100, 100));
        fx.map(2, geom(0, 0, 100, 100));

        fx.focus.minimize(&mut fx.backend, &mut fx.registry, &mut fx.stacks);
        fx.focus.hide(&mut fx.backend, &mut fx.registry, &mut fx.stacks);

        for handle in [1, 2] {
            assert!(
                !(fx.stacks.contains(StackKind::Minimized, handle)
                    && fx.stacks.contains(StackKind::Hidden, handle))
            );
        }
    }

    #[test]
    fn maximize_toggle_restores_exact_geometry() {
        let mut fx = Fixture::new(4);
        let original = geom(25, 35, 800, 600);
        fx.map(1, original);

        fx.focus.maximize(&mut fx.backend, &mut fx.registry);
        let record = fx.registry.find(1).unwrap();
        assert_eq!(record.state, WindowState::Maximized);
        let (width, height) = fx.backend.screen_size();
        assert_eq!(
            fx.backend.geometries.get(&1),
            Some(&geom(0, 0, width, height))
        );
        assert_eq!(fx.backend.states.get(&1), Some(&PublishedState::Maximized));

        fx.focus.maximize(&mut fx.backend, &mut fx.registry);
        let record = fx.registry.find(1).unwrap();
        assert_eq!(record.state, WindowState::Normal);
        assert_eq!(fx.backend.geometries.get(&1), Some(&original));
        assert!(fx.backend.states.get(&1).is_none());
    }

    #[test]
    fn maximize_snapshot_tracks_moves_between_toggles() {
        let mut fx = Fixture::new(4);
        fx.map(1, geom(0, 0, 100, 100));

        // The client moved itself since mapping; entering Maximized must
        // snapshot the live geometry, not the stale registration one.
        let moved = geom(50, 60, 320, 240);
        fx.backend.geometries.insert(1, moved);

        fx.focus.maximize(&mut fx.backend, &mut fx.registry);
        fx.focus.maximize(&mut fx.backend, &mut fx.registry);

        assert_eq!(fx.backend.geometries.get(&1), Some(&moved));
    }

    #[test]
    fn close_prefers_graceful_delete() {
        let mut fx = Fixture::new(4);
        fx.map(1, geom(0, 0, 100, 100));
        fx.backend.delete_supported.insert(1);

        fx.focus.close(&mut fx.backend);

        assert_eq!(fx.backend.deleted, vec![1]);
        assert!(fx.backend.killed.is_empty());
        // The record stays until the unmap/destroy notification arrives.
        assert!(fx.registry.find(1).is_some());
    }

    #[test]
    fn close_kills_without_protocol() {
        let mut fx = Fixture::new(4);
        fx.map(1, geom(0, 0, 100, 100));

        fx.focus.close(&mut fx.backend);

        assert_eq!(fx.backend.killed, vec![1]);
        assert!(fx.backend.deleted.is_empty());
    }

    #[test]
    fn close_without_current_is_noop() {
        let mut fx = Fixture::new(4);
        fx.focus.close(&mut fx.backend);

        assert!(fx.backend.killed.is_empty());
        assert!(fx.backend.deleted.is_empty());
    }
}
