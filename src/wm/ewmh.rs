//! EWMH (Extended Window Manager Hints) support
//!
//! Projects window-manager state onto the standardized root and per-window
//! properties that panels and taskbars read. Output only: nothing in here
//! reacts to client messages.

use x11rb::connection::Connection;
use x11rb::protocol::xproto::*;
use x11rb::wrapper::ConnectionExt as _;

use crate::wm::backend::{BackendError, WindowId};

/// Holds all interned EWMH atoms
#[derive(Debug)]
pub struct Atoms {
    pub net_supported: Atom,
    pub net_client_list: Atom,
    pub net_active_window: Atom,
    pub net_wm_name: Atom,
    pub net_wm_state: Atom,
    pub net_wm_state_maximized_vert: Atom,
    pub net_wm_state_maximized_horz: Atom,
    pub net_wm_state_hidden: Atom,
    pub net_wm_desktop: Atom,
    pub net_current_desktop: Atom,
    pub wm_protocols: Atom,
    pub wm_delete_window: Atom,
    pub utf8_string: Atom,
}

impl Atoms {
    /// Intern all required atoms
    pub fn new<C: Connection>(conn: &C) -> Result<Self, BackendError> {
        let intern = |name: &str| -> Result<Atom, BackendError> {
            Ok(conn.intern_atom(false, name.as_bytes())?.reply()?.atom)
        };

        Ok(Self {
            net_supported: intern("_NET_SUPPORTED")?,
            net_client_list: intern("_NET_CLIENT_LIST")?,
            net_active_window: intern("_NET_ACTIVE_WINDOW")?,
            net_wm_name: intern("_NET_WM_NAME")?,
            net_wm_state: intern("_NET_WM_STATE")?,
            net_wm_state_maximized_vert: intern("_NET_WM_STATE_MAXIMIZED_VERT")?,
            net_wm_state_maximized_horz: intern("_NET_WM_STATE_MAXIMIZED_HORZ")?,
            net_wm_state_hidden: intern("_NET_WM_STATE_HIDDEN")?,
            net_wm_desktop: intern("_NET_WM_DESKTOP")?,
            net_current_desktop: intern("_NET_CURRENT_DESKTOP")?,
            wm_protocols: intern("WM_PROTOCOLS")?,
            wm_delete_window: intern("WM_DELETE_WINDOW")?,
            utf8_string: intern("UTF8_STRING")?,
        })
    }

    /// Set up _NET_SUPPORTED and _NET_CURRENT_DESKTOP on the root window.
    ///
    /// There are no virtual desktops; the current desktop is always 0.
    pub fn setup_root<C: Connection>(&self, conn: &C, root: Window) -> Result<(), BackendError> {
        let supported = [
            self.net_supported,
            self.net_client_list,
            self.net_active_window,
            self.net_wm_name,
            self.net_wm_state,
            self.net_wm_state_maximized_vert,
            self.net_wm_state_maximized_horz,
            self.net_wm_state_hidden,
            self.net_wm_desktop,
            self.net_current_desktop,
        ];
        conn.change_property32(
            PropMode::REPLACE,
            root,
            self.net_supported,
            AtomEnum::ATOM,
            &supported,
        )?;

        conn.change_property32(
            PropMode::REPLACE,
            root,
            self.net_current_desktop,
            AtomEnum::CARDINAL,
            &[0],
        )?;

        Ok(())
    }

    /// Update _NET_CLIENT_LIST with the managed windows, front to back.
    pub fn update_client_list<C: Connection>(
        &self,
        conn: &C,
        root: Window,
        windows: &[WindowId],
    ) -> Result<(), BackendError> {
        conn.change_property32(
            PropMode::REPLACE,
            root,
            self.net_client_list,
            AtomEnum::WINDOW,
            windows,
        )?;
        Ok(())
    }

    /// Update _NET_ACTIVE_WINDOW
    pub fn update_active_window<C: Connection>(
        &self,
        conn: &C,
        root: Window,
        window: Option<WindowId>,
    ) -> Result<(), BackendError> {
        let win = window.unwrap_or(x11rb::NONE);
        conn.change_property32(
            PropMode::REPLACE,
            root,
            self.net_active_window,
            AtomEnum::WINDOW,
            &[win],
        )?;
        Ok(())
    }

    /// Tag a window with its desktop index (always 0).
    pub fn set_desktop<C: Connection>(&self, conn: &C, window: Window) -> Result<(), BackendError> {
        conn.change_property32(
            PropMode::REPLACE,
            window,
            self.net_wm_desktop,
            AtomEnum::CARDINAL,
            &[0],
        )?;
        Ok(())
    }

    /// Mark a window hidden (minimized and hidden share the same state atom).
    pub fn set_state_hidden<C: Connection>(
        &self,
        conn: &C,
        window: Window,
    ) -> Result<(), BackendError> {
        conn.change_property32(
            PropMode::REPLACE,
            window,
            self.net_wm_state,
            AtomEnum::ATOM,
            &[self.net_wm_state_hidden],
        )?;
        Ok(())
    }

    /// Mark a window maximized in both directions.
    pub fn set_state_maximized<C: Connection>(
        &self,
        conn: &C,
        window: Window,
    ) -> Result<(), BackendError> {
        conn.change_property32(
            PropMode::REPLACE,
            window,
            self.net_wm_state,
            AtomEnum::ATOM,
            &[
                self.net_wm_state_maximized_vert,
                self.net_wm_state_maximized_horz,
            ],
        )?;
        Ok(())
    }

    /// Drop the state property entirely; absence means Normal.
    pub fn clear_state<C: Connection>(&self, conn: &C, window: Window) -> Result<(), BackendError> {
        conn.delete_property(window, self.net_wm_state)?;
        Ok(())
    }

    /// Check if window supports the WM_DELETE_WINDOW protocol
    pub fn supports_delete_protocol<C: Connection>(
        &self,
        conn: &C,
        window: Window,
    ) -> Result<bool, BackendError> {
        let reply = conn
            .get_property(false, window, self.wm_protocols, AtomEnum::ATOM, 0, 1024)?
            .reply()?;
        if let Some(value32) = reply.value32() {
            let protocols: Vec<u32> = value32.collect();
            return Ok(protocols.contains(&self.wm_delete_window));
        }
        Ok(false)
    }

    /// Send WM_DELETE_WINDOW to close a window gracefully.
    ///
    /// Fire and forget: the record is removed once the resulting unmap or
    /// destroy notification arrives.
    pub fn send_delete_window<C: Connection>(
        &self,
        conn: &C,
        window: Window,
    ) -> Result<(), BackendError> {
        let event = ClientMessageEvent::new(
            32,
            window,
            self.wm_protocols,
            [self.wm_delete_window, 0, 0, 0, 0],
        );
        conn.send_event(false, window, EventMask::NO_EVENT, event)?;
        Ok(())
    }

    /// Window title from _NET_WM_NAME, falling back to WM_NAME.
    pub fn window_title<C: Connection>(
        &self,
        conn: &C,
        window: Window,
    ) -> Result<String, BackendError> {
        let reply = conn
            .get_property(false, window, self.net_wm_name, self.utf8_string, 0, 1024)?
            .reply()?;
        if !reply.value.is_empty() {
            return Ok(String::from_utf8_lossy(&reply.value).into_owned());
        }

        let reply = conn
            .get_property(false, window, AtomEnum::WM_NAME, AtomEnum::STRING, 0, 1024)?
            .reply()?;
        Ok(String::from_utf8_lossy(&reply.value).into_owned())
    }
}
