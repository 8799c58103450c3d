//! Run dialog
//!
//! A small command prompt with an exclusive keyboard and pointer grab.
//! Enter spawns the typed command through the shell and closes the dialog;
//! Escape clears the input. Core dispatch is suspended while it is up.

use anyhow::{Context, Result};
use tracing::debug;
use x11rb::connection::Connection;
use x11rb::protocol::xproto::*;
use x11rb::protocol::Event;
use x11rb::rust_connection::RustConnection;
use x11rb::COPY_DEPTH_FROM_PARENT;

use crate::shell::spawn;
use crate::wm::keyboard::{
    KeyboardMap, MOD_SHIFT, XK_ASCIITILDE, XK_BACKSPACE, XK_ESCAPE, XK_RETURN, XK_SPACE,
};

/// Maximum command length, terminator included.
const MAX_COMMAND: usize = 64;
const DIALOG_WIDTH: u16 = 400;
const DIALOG_HEIGHT: u16 = 200;
const FIELD_WIDTH: u16 = 300;
const FIELD_HEIGHT: u16 = 20;

pub struct RunDialog<'a> {
    conn: &'a RustConnection,
    keymap: &'a KeyboardMap,
    root: Window,
    window: Window,
    input_field: Window,
    gc: Gcontext,
    font: Option<Font>,
    prev_focus: Window,
    prev_revert: InputFocus,
    input: String,
}

impl<'a> RunDialog<'a> {
    pub fn init(
        conn: &'a RustConnection,
        screen_num: usize,
        keymap: &'a KeyboardMap,
    ) -> Result<Self> {
        let screen = &conn.setup().roots[screen_num];
        let root = screen.root;

        let focus_reply = conn
            .get_input_focus()?
            .reply()
            .context("failed to query current input focus")?;

        let window = conn.generate_id()?;
        conn.create_window(
            COPY_DEPTH_FROM_PARENT,
            window,
            root,
            0,
            0,
            DIALOG_WIDTH,
            DIALOG_HEIGHT,
            1,
            WindowClass::INPUT_OUTPUT,
            0,
            &CreateWindowAux::new()
                .background_pixel(screen.white_pixel)
                .event_mask(EventMask::EXPOSURE | EventMask::KEY_PRESS),
        )?;

        let gc = conn.generate_id()?;
        let font_id = conn.generate_id()?;
        let font = conn
            .open_font(font_id, b"fixed")
            .ok()
            .and_then(|cookie| cookie.check().ok())
            .map(|_| font_id);
        let mut gc_aux = CreateGCAux::new().foreground(screen.black_pixel);
        if let Some(font) = font {
            gc_aux = gc_aux.font(font);
        }
        conn.create_gc(gc, window, &gc_aux)?;

        let input_field = conn.generate_id()?;
        conn.create_window(
            COPY_DEPTH_FROM_PARENT,
            input_field,
            window,
            ((DIALOG_WIDTH - FIELD_WIDTH) / 2) as i16,
            (DIALOG_HEIGHT / 2) as i16 - 10,
            FIELD_WIDTH,
            FIELD_HEIGHT,
            1,
            WindowClass::INPUT_OUTPUT,
            0,
            &CreateWindowAux::new()
                .background_pixel(screen.white_pixel)
                .event_mask(EventMask::KEY_PRESS),
        )?;

        Ok(Self {
            conn,
            keymap,
            root,
            window,
            input_field,
            gc,
            font,
            prev_focus: focus_reply.focus,
            prev_revert: focus_reply.revert_to,
            input: String::new(),
        })
    }

    /// Grab input and block until a command is launched or dismissed.
    pub fn show(&mut self) -> Result<()> {
        self.conn
            .grab_keyboard(
                true,
                self.root,
                x11rb::CURRENT_TIME,
                GrabMode::ASYNC,
                GrabMode::ASYNC,
            )?
            .reply()?;
        self.conn
            .grab_pointer(
                true,
                self.root,
                EventMask::BUTTON_PRESS | EventMask::BUTTON_RELEASE | EventMask::POINTER_MOTION,
                GrabMode::ASYNC,
                GrabMode::ASYNC,
                x11rb::NONE,
                x11rb::NONE,
                x11rb::CURRENT_TIME,
            )?
            .reply()?;

        self.conn.map_window(self.window)?;
        self.conn.configure_window(
            self.window,
            &ConfigureWindowAux::new().stack_mode(StackMode::ABOVE),
        )?;
        self.conn.map_window(self.input_field)?;
        self.conn
            .set_input_focus(InputFocus::PARENT, self.window, x11rb::CURRENT_TIME)?;
        self.conn.flush()?;
        debug!("run dialog shown");

        loop {
            match self.conn.wait_for_event()? {
                Event::Expose(_) => self.redraw()?,
                Event::KeyPress(press) => {
                    let keysym = self.keymap.keysym(press.detail);
                    match keysym {
                        XK_ESCAPE => {
                            self.input.clear();
                        }
                        XK_RETURN => {
                            spawn(&self.input);
                            self.input.clear();
                            self.conn.unmap_window(self.input_field)?;
                            self.conn.unmap_window(self.window)?;
                            break;
                        }
                        XK_BACKSPACE => {
                            self.input.pop();
                        }
                        _ => {
                            let shifted = u16::from(press.state) & MOD_SHIFT != 0;
                            let sym = self.keymap.lookup(press.detail, shifted);
                            if (XK_SPACE..=XK_ASCIITILDE).contains(&sym)
                                && self.input.len() < MAX_COMMAND - 1
                            {
                                self.input.push(sym as u8 as char);
                            }
                        }
                    }
                    self.redraw()?;
                }
                _ => {}
            }
        }

        self.conn.ungrab_keyboard(x11rb::CURRENT_TIME)?;
        self.conn.ungrab_pointer(x11rb::CURRENT_TIME)?;

        if self.prev_focus != x11rb::NONE {
            self.conn
                .set_input_focus(self.prev_revert, self.prev_focus, x11rb::CURRENT_TIME)?;
        } else {
            self.conn
                .set_input_focus(InputFocus::POINTER_ROOT, self.root, x11rb::CURRENT_TIME)?;
        }
        self.conn.flush()?;
        Ok(())
    }

    fn redraw(&self) -> Result<()> {
        self.conn.clear_area(false, self.input_field, 0, 0, 0, 0)?;
        if !self.input.is_empty() {
            self.conn
                .image_text8(self.input_field, self.gc, 5, 12, self.input.as_bytes())?;
        }
        self.conn.flush()?;
        Ok(())
    }
}

impl Drop for RunDialog<'_> {
    fn drop(&mut self) {
        let _ = self.conn.free_gc(self.gc);
        if let Some(font) = self.font {
            let _ = self.conn.close_font(font);
        }
        let _ = self.conn.destroy_window(self.input_field);
        let _ = self.conn.destroy_window(self.window);
        let _ = self.conn.flush();
    }
}
