//! Window registry
//!
//! Canonical ordered collection of managed windows, most recently mapped
//! first. Records are addressed by handle, never by pointer, so the focus
//! selection stays valid while unrelated records come and go.

use tracing::warn;

use crate::wm::backend::{best_effort, DisplayBackend, Geometry, WindowId};

/// Cap on how many windows the published client list can carry.
pub const MAX_CLIENT_LIST: usize = 256;

/// Tracked state of a managed window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowState {
    Normal,
    Minimized,
    Maximized,
    Hidden,
}

impl WindowState {
    /// Eligible for focus selection: neither minimized nor hidden.
    pub fn is_eligible(self) -> bool {
        matches!(self, WindowState::Normal | WindowState::Maximized)
    }
}

/// Per-window record owned by the registry.
#[derive(Debug)]
pub struct WindowRecord {
    pub handle: WindowId,
    pub state: WindowState,
    /// Geometry captured at registration, refreshed when the window enters
    /// Maximized so the toggle can restore it.
    pub geometry: Geometry,
}

/// Ordered collection of window records, head = most recently mapped.
#[derive(Debug, Default)]
pub struct WindowRegistry {
    records: Vec<WindowRecord>,
}

impl WindowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a window at the head of the list.
    ///
    /// Captures the window's current geometry, tags it with the constant
    /// desktop index and republishes the client list. A handle that is
    /// already registered is left untouched.
    pub fn add<B: DisplayBackend>(&mut self, backend: &mut B, handle: WindowId) {
        if self.find(handle).is_some() {
            warn!("window {handle:#x} is already registered");
            return;
        }

        let geometry = match backend.window_geometry(handle) {
            Ok(geometry) => geometry,
            Err(err) => {
                warn!("geometry query for {handle:#x} failed: {err}");
                Geometry::default()
            }
        };

        self.records.insert(
            0,
            WindowRecord {
                handle,
                state: WindowState::Normal,
                geometry,
            },
        );

        best_effort("tag desktop", backend.set_desktop_tag(handle));
        self.publish_client_list(backend);
    }

    /// Unlink a record. No-op if the handle is absent.
    ///
    /// Does not touch the focus selection; callers re-derive it.
    pub fn remove<B: DisplayBackend>(&mut self, backend: &mut B, handle: WindowId) {
        let before = self.records.len();
        self.records.retain(|record| record.handle != handle);
        if self.records.len() == before {
            return;
        }
        self.publish_client_list(backend);
    }

    pub fn find(&self, handle: WindowId) -> Option<&WindowRecord> {
        self.records.iter().find(|record| record.handle == handle)
    }

    pub fn find_mut(&mut self, handle: WindowId) -> Option<&mut WindowRecord> {
        self.records
            .iter_mut()
            .find(|record| record.handle == handle)
    }

    pub fn iter(&self) -> impl Iterator<Item = &WindowRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// First focus-eligible record from the head of the list.
    pub fn first_eligible(&self) -> Option<WindowId> {
        self.records
            .iter()
            .find(|record| record.state.is_eligible())
            .map(|record| record.handle)
    }

    /// Next focus-eligible record after `anchor` in list order, wrapping to
    /// the head. Returns None when the walk comes back around to the anchor
    /// without finding anything else, so a registry full of minimized and
    /// hidden windows cannot loop forever.
    pub fn next_eligible_after(&self, anchor: WindowId) -> Option<WindowId> {
        let pos = self
            .records
            .iter()
            .position(|record| record.handle == anchor)?;
        let len = self.records.len();
        for step in 1..=len {
            let record = &self.records[(pos + step) % len];
            if record.state.is_eligible() {
                if record.handle == anchor {
                    return None;
                }
                return Some(record.handle);
            }
        }
        None
    }

    /// Front-to-back handles for the published client list, capped.
    pub fn publish_client_list<B: DisplayBackend>(&self, backend: &mut B) {
        let handles: Vec<WindowId> = self
            .records
            .iter()
            .take(MAX_CLIENT_LIST)
            .map(|record| record.handle)
            .collect();
        best_effort("publish client list", backend.publish_client_list(&handles));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wm::backend::testing::FakeBackend;

    fn geom(x: i16, y: i16, width: u16, height: u16) -> Geometry {
        Geometry {
            x,
            y,
            width,
            height,
        }
    }

    #[test]
    fn add_inserts_at_head() {
        let mut backend = FakeBackend::new();
        backend.add_window(1, geom(0, 0, 100, 100));
        backend.add_window(2, geom(10, 10, 200, 200));

        let mut registry = WindowRegistry::new();
        registry.add(&mut backend, 1);
        registry.add(&mut backend, 2);

        let order: Vec<WindowId> = registry.iter().map(|r| r.handle).collect();
        assert_eq!(order, vec![2, 1]);
        assert_eq!(backend.client_list, vec![2, 1]);
    }

    #[test]
    fn add_captures_geometry_and_tags_desktop() {
        let mut backend = FakeBackend::new();
        backend.add_window(7, geom(5, 6, 640, 480));

        let mut registry = WindowRegistry::new();
        registry.add(&mut backend, 7);

        let record = registry.find(7).unwrap();
        assert_eq!(record.geometry, geom(5, 6, 640, 480));
        assert_eq!(record.state, WindowState::Normal);
        assert!(backend.desktop_tagged.contains(&7));
    }

    #[test]
    fn duplicate_add_is_ignored() {
        let mut backend = FakeBackend::new();
        backend.add_window(1, geom(0, 0, 100, 100));

        let mut registry = WindowRegistry::new();
        registry.add(&mut backend, 1);
        registry.add(&mut backend, 1);

        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn remove_absent_handle_is_noop() {
        let mut backend = FakeBackend::new();
        backend.add_window(1, geom(0, 0, 100, 100));

        let mut registry = WindowRegistry::new();
        registry.add(&mut backend, 1);
        registry.remove(&mut backend, 99);

        assert_eq!(registry.len(), 1);
        assert_eq!(backend.client_list, vec![1]);
    }

    #[test]
    fn remove_republishes_client_list() {
        let mut backend = FakeBackend::new();
        backend.add_window(1, geom(0, 0, 100, 100));
        backend.add_window(2, geom(0, 0, 100, 100));

        let mut registry = WindowRegistry::new();
        registry.add(&mut backend, 1);
        registry.add(&mut backend, 2);
        registry.remove(&mut backend, 2);

        assert_eq!(backend.client_list, vec![1]);
        assert!(registry.find(2).is_none());
    }

    #[test]
    fn client_list_is_capped() {
        let mut backend = FakeBackend::new();
        let mut registry = WindowRegistry::new();
        for handle in 1..=(MAX_CLIENT_LIST as WindowId + 20) {
            backend.add_window(handle, geom(0, 0, 10, 10));
            registry.add(&mut backend, handle);
        }

        assert_eq!(backend.client_list.len(), MAX_CLIENT_LIST);
    }

    #[test]
    fn next_eligible_wraps_and_skips() {
        let mut backend = FakeBackend::new();
        let mut registry = WindowRegistry::new();
        for handle in [1, 2, 3] {
            backend.add_window(handle, geom(0, 0, 10, 10));
            registry.add(&mut backend, handle);
        }
        // Order is [3, 2, 1].
        registry.find_mut(2).unwrap().state = WindowState::Minimized;

        assert_eq!(registry.next_eligible_after(3), Some(1));
        assert_eq!(registry.next_eligible_after(1), Some(3));
    }

    #[test]
    fn next_eligible_aborts_when_alone() {
        let mut backend = FakeBackend::new();
        let mut registry = WindowRegistry::new();
        for handle in [1, 2] {
            backend.add_window(handle, geom(0, 0, 10, 10));
            registry.add(&mut backend, handle);
        }
        registry.find_mut(1).unwrap().state = WindowState::Hidden;

        assert_eq!(registry.next_eligible_after(2), None);
    }

    #[test]
    fn next_eligible_none_when_all_stashed() {
        let mut backend = FakeBackend::new();
        let mut registry = WindowRegistry::new();
        for handle in [1, 2] {
            backend.add_window(handle, geom(0, 0, 10, 10));
            registry.add(&mut backend, handle);
        }
        registry.find_mut(1).unwrap().state = WindowState::Hidden;
        registry.find_mut(2).unwrap().state = WindowState::Minimized;

        assert_eq!(registry.next_eligible_after(2), None);
        assert_eq!(registry.first_eligible(), None);
    }

    #[test]
    fn first_eligible_skips_stashed_head() {
        let mut backend = FakeBackend::new();
        let mut registry = WindowRegistry::new();
        for handle in [1, 2] {
            backend.add_window(handle, geom(0, 0, 10, 10));
            registry.add(&mut backend, handle);
        }
        // Head is 2.
        registry.find_mut(2).unwrap().state = WindowState::Minimized;

        assert_eq!(registry.first_eligible(), Some(1));
    }
}
