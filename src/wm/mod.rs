//! Window Manager Core
//!
//! The session aggregate: registry, stacks, focus selection and the
//! single-threaded event dispatch loop that drives every state transition.

pub mod backend;
pub mod ewmh;
pub mod focus;
pub mod keyboard;
pub mod registry;
pub mod stacks;

use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info, warn};
use x11rb::connection::Connection;
use x11rb::protocol::xproto::{ConfigureRequestEvent, KeyPressEvent};
use x11rb::protocol::Event;

use crate::config::Config;
use crate::shell::lock::LockScreen;
use crate::shell::rundlg::RunDialog;
use backend::{best_effort, DisplayBackend, WindowId, X11Backend};
use focus::{FocusController, FocusedTitle};
use keyboard::{Action, KeyboardMap};
use registry::WindowRegistry;
use stacks::{StackKind, StackTracker};

/// The whole window-manager session, generic over the display backend so
/// the state machine can be exercised without a server.
pub struct Wm<B: DisplayBackend> {
    backend: B,
    registry: WindowRegistry,
    stacks: StackTracker,
    focus: FocusController,
    config: Config,
    running: bool,
}

impl<B: DisplayBackend> Wm<B> {
    pub fn new(backend: B, config: Config) -> Self {
        let focus = FocusController::new(
            config.window.focused_color,
            config.window.unfocused_color,
        );
        Self {
            backend,
            registry: WindowRegistry::new(),
            stacks: StackTracker::new(config.stacks.capacity),
            focus,
            config,
            running: true,
        }
    }

    /// Shared focused-title slot for the status surface.
    pub fn focused_title(&self) -> FocusedTitle {
        self.focus.title_handle()
    }

    /// Register an unknown window, map it, focus it, give it a border.
    pub fn handle_map_request(&mut self, window: WindowId) {
        debug!("map request: {window:#x}");
        if self.registry.find(window).is_none() {
            self.registry.add(&mut self.backend, window);
        }
        best_effort("map window", self.backend.map_window(window));
        self.focus.focus(&mut self.backend, &self.registry, window);
        best_effort(
            "set border width",
            self.backend
                .set_border_width(window, self.config.window.border_width),
        );
        best_effort(
            "set border color",
            self.backend
                .set_border_color(window, self.config.window.focused_color),
        );
    }

    /// A window was unmapped by someone.
    ///
    /// Minimize and hide unmap their own window, so a record already in one
    /// of those states is the manager seeing its own unmap come back and
    /// must not be dropped. The check reads the state recorded at the time
    /// the notification is processed, which classifies a client unmapping
    /// itself in the same instant as a minimize as manager-initiated; the
    /// distinction is best-effort.
    pub fn handle_unmap_notify(&mut self, window: WindowId) {
        let Some(record) = self.registry.find(window) else {
            return;
        };
        if !record.state.is_eligible() {
            debug!("ignoring self-initiated unmap of {window:#x}");
            return;
        }

        debug!("unmap notify: {window:#x}");
        self.stacks.purge(StackKind::Hidden, window);
        let was_current = self.focus.current() == Some(window);
        self.registry.remove(&mut self.backend, window);
        if was_current {
            self.focus.clear_current();
            self.focus.focus_first(&mut self.backend, &self.registry);
        }
    }

    /// A window is gone for good. Unconditional cleanup and refocus.
    pub fn handle_destroy_notify(&mut self, window: WindowId) {
        if self.registry.find(window).is_none() {
            return;
        }

        debug!("destroy notify: {window:#x}");
        self.stacks.purge(StackKind::Hidden, window);
        if self.focus.current() == Some(window) {
            self.focus.clear_current();
        }
        self.registry.remove(&mut self.backend, window);
        self.focus.focus_first(&mut self.backend, &self.registry);
    }

    /// Forward a configure request to the server unchanged; the manager
    /// never vetoes geometry or stacking it did not itself initiate.
    pub fn handle_configure_request(&mut self, event: &ConfigureRequestEvent) {
        best_effort("forward configure", self.backend.forward_configure(event));
    }

    pub fn cycle_focus(&mut self) {
        self.focus.next(&mut self.backend, &self.registry);
    }

    pub fn close_focused(&mut self) {
        self.focus.close(&mut self.backend);
    }

    pub fn minimize_focused(&mut self) {
        self.focus
            .minimize(&mut self.backend, &mut self.registry, &mut self.stacks);
    }

    pub fn restore_minimized(&mut self) {
        self.focus
            .restore(&mut self.backend, &mut self.registry, &mut self.stacks);
    }

    pub fn hide_focused(&mut self) {
        self.focus
            .hide(&mut self.backend, &mut self.registry, &mut self.stacks);
    }

    pub fn unhide_last(&mut self) {
        self.focus
            .unhide(&mut self.backend, &mut self.registry, &mut self.stacks);
    }

    pub fn toggle_maximize(&mut self) {
        self.focus.maximize(&mut self.backend, &mut self.registry);
    }

    /// Finish the current loop iteration, then stop.
    pub fn quit(&mut self) {
        self.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }
}

impl Wm<X11Backend> {
    /// Run the dispatch loop: block for exactly one event per iteration and
    /// route it. Registry records are dropped on the way out; there is no
    /// shutdown handshake with clients.
    pub fn run(&mut self, keymap: &KeyboardMap) -> Result<()> {
        info!("entering event loop");
        while self.running {
            let event = self.backend.conn().wait_for_event()?;
            match event {
                Event::KeyPress(press) => self.handle_key_press(keymap, &press),
                Event::MapRequest(request) => self.handle_map_request(request.window),
                Event::UnmapNotify(notify) => self.handle_unmap_notify(notify.window),
                Event::DestroyNotify(notify) => self.handle_destroy_notify(notify.window),
                Event::ConfigureRequest(request) => self.handle_configure_request(&request),
                Event::Error(err) => {
                    warn!(
                        "X11 error: error_code={}, request_code={}, minor_code={}",
                        err.error_code, err.major_opcode, err.minor_opcode
                    );
                }
                _ => {}
            }
            self.backend.conn().flush()?;
        }
        info!("event loop finished");
        Ok(())
    }

    fn handle_key_press(&mut self, keymap: &KeyboardMap, press: &KeyPressEvent) {
        let keysym = keymap.keysym(press.detail);
        let Some(action) = keyboard::action_for(u16::from(press.state), keysym) else {
            return;
        };
        debug!("key action: {action:?}");

        match action {
            Action::CycleFocus => self.cycle_focus(),
            Action::CloseWindow => self.close_focused(),
            Action::Minimize => self.minimize_focused(),
            Action::RestoreMinimized => self.restore_minimized(),
            Action::Hide => self.hide_focused(),
            Action::UnhideLast => self.unhide_last(),
            Action::ToggleMaximize => self.toggle_maximize(),
            Action::Quit => {
                info!("quit requested");
                self.quit();
            }
            // The modal surfaces grab input and run their own nested loop;
            // dispatch resumes when they return.
            Action::LockScreen => {
                let conn = Arc::clone(self.backend.conn());
                match LockScreen::init(
                    &conn,
                    self.backend.screen_num(),
                    keymap,
                    &self.config.lock,
                ) {
                    Ok(mut lock) => {
                        if let Err(err) = lock.show() {
                            warn!("lock screen failed: {err}");
                        }
                    }
                    Err(err) => warn!("cannot initialize lock screen: {err}"),
                }
            }
            Action::RunDialog => {
                let conn = Arc::clone(self.backend.conn());
                match RunDialog::init(&conn, self.backend.screen_num(), keymap) {
                    Ok(mut dialog) => {
                        if let Err(err) = dialog.show() {
                            warn!("run dialog failed: {err}");
                        }
                    }
                    Err(err) => warn!("cannot initialize run dialog: {err}"),
                }
            }
        }
    }
}
