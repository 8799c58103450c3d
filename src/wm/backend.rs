//! Display backend abstraction
//!
//! Every X11 request the core makes goes through [`DisplayBackend`], so the
//! state machine can be driven against a fake server in tests. The real
//! implementation is [`X11Backend`] on top of x11rb.

use std::sync::Arc;

use anyhow::{Context, Result};
use thiserror::Error;
use tracing::warn;
use x11rb::connection::Connection;
use x11rb::protocol::xproto::*;
use x11rb::rust_connection::RustConnection;

use crate::wm::ewmh::Atoms;

/// Opaque identifier for a client window, as handed out by the server.
pub type WindowId = u32;

/// Window geometry in root coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Geometry {
    pub x: i16,
    pub y: i16,
    pub width: u16,
    pub height: u16,
}

/// A failed request at the display boundary.
///
/// Never fatal: one misbehaving client must not halt management of the
/// others, so call sites log and continue.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("connection error: {0}")]
    Connection(#[from] x11rb::errors::ConnectionError),
    #[error("request failed: {0}")]
    Reply(#[from] x11rb::errors::ReplyError),
    #[error("id allocation failed: {0}")]
    Id(#[from] x11rb::errors::ReplyOrIdError),
}

/// Log a failed display request and carry on.
pub fn best_effort<T>(op: &str, res: Result<T, BackendError>) -> Option<T> {
    match res {
        Ok(value) => Some(value),
        Err(err) => {
            warn!("{op}: {err}");
            None
        }
    }
}

/// The server operations the window-tracking core depends on.
pub trait DisplayBackend {
    /// Root screen size in pixels.
    fn screen_size(&self) -> (u16, u16);

    /// Live-attribute probe: does the window still exist on the server?
    fn window_exists(&self, window: WindowId) -> bool;

    fn window_geometry(&self, window: WindowId) -> Result<Geometry, BackendError>;

    /// Current title of a window, if it has one.
    fn window_title(&self, window: WindowId) -> Option<String>;

    fn map_window(&mut self, window: WindowId) -> Result<(), BackendError>;
    fn unmap_window(&mut self, window: WindowId) -> Result<(), BackendError>;
    fn raise_window(&mut self, window: WindowId) -> Result<(), BackendError>;
    fn set_input_focus(&mut self, window: WindowId) -> Result<(), BackendError>;
    fn move_resize(&mut self, window: WindowId, geometry: Geometry) -> Result<(), BackendError>;
    fn set_border_color(&mut self, window: WindowId, color: u32) -> Result<(), BackendError>;
    fn set_border_width(&mut self, window: WindowId, width: u16) -> Result<(), BackendError>;

    /// Forward a configure request to the server unchanged.
    fn forward_configure(&mut self, event: &ConfigureRequestEvent) -> Result<(), BackendError>;

    /// Does the client advertise the graceful-close protocol?
    fn supports_delete(&self, window: WindowId) -> bool;
    fn send_delete(&mut self, window: WindowId) -> Result<(), BackendError>;
    fn kill_client(&mut self, window: WindowId) -> Result<(), BackendError>;

    fn publish_client_list(&mut self, windows: &[WindowId]) -> Result<(), BackendError>;
    fn publish_active_window(&mut self, window: Option<WindowId>) -> Result<(), BackendError>;
    fn set_desktop_tag(&mut self, window: WindowId) -> Result<(), BackendError>;
    fn set_state_hidden(&mut self, window: WindowId) -> Result<(), BackendError>;
    fn set_state_maximized(&mut self, window: WindowId) -> Result<(), BackendError>;
    fn clear_state(&mut self, window: WindowId) -> Result<(), BackendError>;
}

/// x11rb-backed implementation of [`DisplayBackend`].
pub struct X11Backend {
    conn: Arc<RustConnection>,
    screen_num: usize,
    root: WindowId,
    width: u16,
    height: u16,
    atoms: Atoms,
}

impl X11Backend {
    /// Intern atoms, claim substructure redirection on the root window and
    /// publish the root properties.
    ///
    /// Failing to acquire the redirect means another window manager is
    /// running; that is one of the two fatal startup conditions.
    pub fn new(conn: Arc<RustConnection>, screen_num: usize) -> Result<Self> {
        let screen = &conn.setup().roots[screen_num];
        let root = screen.root;
        let width = screen.width_in_pixels;
        let height = screen.height_in_pixels;

        let mask = EventMask::SUBSTRUCTURE_REDIRECT
            | EventMask::SUBSTRUCTURE_NOTIFY
            | EventMask::KEY_PRESS
            | EventMask::KEY_RELEASE;
        conn.change_window_attributes(root, &ChangeWindowAttributesAux::new().event_mask(mask))?
            .check()
            .context("another window manager is already running")?;

        let atoms = Atoms::new(conn.as_ref())?;
        atoms.setup_root(conn.as_ref(), root)?;
        conn.flush()?;

        Ok(Self {
            conn,
            screen_num,
            root,
            width,
            height,
            atoms,
        })
    }

    pub fn conn(&self) -> &Arc<RustConnection> {
        &self.conn
    }

    pub fn screen_num(&self) -> usize {
        self.screen_num
    }

    pub fn root(&self) -> WindowId {
        self.root
    }
}

impl DisplayBackend for X11Backend {
    fn screen_size(&self) -> (u16, u16) {
        (self.width, self.height)
    }

    fn window_exists(&self, window: WindowId) -> bool {
        match self.conn.get_window_attributes(window) {
            Ok(cookie) => cookie.reply().is_ok(),
            Err(_) => false,
        }
    }

    fn window_geometry(&self, window: WindowId) -> Result<Geometry, BackendError> {
        let reply = self.conn.get_geometry(window)?.reply()?;
        Ok(Geometry {
            x: reply.x,
            y: reply.y,
            width: reply.width,
            height: reply.height,
        })
    }

    fn window_title(&self, window: WindowId) -> Option<String> {
        self.atoms.window_title(self.conn.as_ref(), window).ok()
    }

    fn map_window(&mut self, window: WindowId) -> Result<(), BackendError> {
        self.conn.map_window(window)?;
        Ok(())
    }

    fn unmap_window(&mut self, window: WindowId) -> Result<(), BackendError> {
        self.conn.unmap_window(window)?;
        Ok(())
    }

    fn raise_window(&mut self, window: WindowId) -> Result<(), BackendError> {
        self.conn.configure_window(
            window,
            &ConfigureWindowAux::new().stack_mode(StackMode::ABOVE),
        )?;
        Ok(())
    }

    fn set_input_focus(&mut self, window: WindowId) -> Result<(), BackendError> {
        self.conn
            .set_input_focus(InputFocus::POINTER_ROOT, window, x11rb::CURRENT_TIME)?;
        Ok(())
    }

    fn move_resize(&mut self, window: WindowId, geometry: Geometry) -> Result<(), BackendError> {
        self.conn.configure_window(
            window,
            &ConfigureWindowAux::new()
                .x(i32::from(geometry.x))
                .y(i32::from(geometry.y))
                .width(u32::from(geometry.width))
                .height(u32::from(geometry.height)),
        )?;
        Ok(())
    }

    fn set_border_color(&mut self, window: WindowId, color: u32) -> Result<(), BackendError> {
        self.conn
            .change_window_attributes(window, &ChangeWindowAttributesAux::new().border_pixel(color))?;
        Ok(())
    }

    fn set_border_width(&mut self, window: WindowId, width: u16) -> Result<(), BackendError> {
        self.conn.configure_window(
            window,
            &ConfigureWindowAux::new().border_width(u32::from(width)),
        )?;
        Ok(())
    }

    fn forward_configure(&mut self, event: &ConfigureRequestEvent) -> Result<(), BackendError> {
        let aux = ConfigureWindowAux::from_configure_request(event);
        self.conn.configure_window(event.window, &aux)?;
        Ok(())
    }

    fn supports_delete(&self, window: WindowId) -> bool {
        self.atoms
            .supports_delete_protocol(self.conn.as_ref(), window)
            .unwrap_or(false)
    }

    fn send_delete(&mut self, window: WindowId) -> Result<(), BackendError> {
        self.atoms.send_delete_window(self.conn.as_ref(), window)
    }

    fn kill_client(&mut self, window: WindowId) -> Result<(), BackendError> {
        self.conn.kill_client(window)?;
        Ok(())
    }

    fn publish_client_list(&mut self, windows: &[WindowId]) -> Result<(), BackendError> {
        self.atoms
            .update_client_list(self.conn.as_ref(), self.root, windows)
    }

    fn publish_active_window(&mut self, window: Option<WindowId>) -> Result<(), BackendError> {
        self.atoms
            .update_active_window(self.conn.as_ref(), self.root, window)
    }

    fn set_desktop_tag(&mut self, window: WindowId) -> Result<(), BackendError> {
        self.atoms.set_desktop(self.conn.as_ref(), window)
    }

    fn set_state_hidden(&mut self, window: WindowId) -> Result<(), BackendError> {
        self.atoms.set_state_hidden(self.conn.as_ref(), window)
    }

    fn set_state_maximized(&mut self, window: WindowId) -> Result<(), BackendError> {
        self.atoms.set_state_maximized(self.conn.as_ref(), window)
    }

    fn clear_state(&mut self, window: WindowId) -> Result<(), BackendError> {
        self.atoms.clear_state(self.conn.as_ref(), window)
    }
}
