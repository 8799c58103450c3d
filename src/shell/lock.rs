//! Lock screen
//!
//! Full-screen override-redirect surface with an exclusive keyboard and
//! pointer grab. Escape toggles a password field, Enter checks the typed
//! passphrase against a stored SHA-512 digest, and the nested loop only
//! returns once the digest matches. Core dispatch is suspended for the
//! whole duration.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use sha2::{Digest, Sha512};
use tracing::{debug, warn};
use x11rb::connection::Connection;
use x11rb::protocol::xproto::*;
use x11rb::protocol::Event;
use x11rb::rust_connection::RustConnection;
use x11rb::COPY_DEPTH_FROM_PARENT;

use crate::config::LockConfig;
use crate::shell::create_blank_cursor;
use crate::wm::keyboard::{
    KeyboardMap, MOD_SHIFT, XK_ASCIITILDE, XK_BACKSPACE, XK_ESCAPE, XK_RETURN, XK_SPACE,
};

/// Maximum passphrase length, terminator included.
const MAX_PASSPHRASE: usize = 16;
/// Digest used when no hash file exists.
const DEFAULT_PASSPHRASE: &str = "password";

pub struct LockScreen<'a> {
    conn: &'a RustConnection,
    keymap: &'a KeyboardMap,
    root: Window,
    window: Window,
    input_field: Window,
    gc: Gcontext,
    font: Option<Font>,
    cursor: Cursor,
    digest: [u8; 64],
    prev_focus: Window,
    prev_revert: InputFocus,
    input: String,
}

impl<'a> LockScreen<'a> {
    pub fn init(
        conn: &'a RustConnection,
        screen_num: usize,
        keymap: &'a KeyboardMap,
        config: &LockConfig,
    ) -> Result<Self> {
        let screen = &conn.setup().roots[screen_num];
        let root = screen.root;
        let digest = load_digest(config);

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
            screen.width_in_pixels,
            screen.height_in_pixels,
            1,
            WindowClass::INPUT_OUTPUT,
            0,
            &CreateWindowAux::new()
                .background_pixel(screen.black_pixel)
                .override_redirect(1)
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
            (screen.width_in_pixels / 2) as i16 - 50,
            (screen.height_in_pixels / 2) as i16 - 10,
            100,
            20,
            1,
            WindowClass::INPUT_OUTPUT,
            0,
            &CreateWindowAux::new()
                .background_pixel(screen.white_pixel)
                .event_mask(EventMask::KEY_PRESS),
        )?;

        let cursor = create_blank_cursor(conn, window)?;

        Ok(Self {
            conn,
            keymap,
            root,
            window,
            input_field,
            gc,
            font,
            cursor,
            digest,
            prev_focus: focus_reply.focus,
            prev_revert: focus_reply.revert_to,
            input: String::new(),
        })
    }

    /// Grab input and block until the passphrase is accepted.
    pub fn show(&mut self) -> Result<()> {
        let keyboard = self
            .conn
            .grab_keyboard(
                true,
                self.root,
                x11rb::CURRENT_TIME,
                GrabMode::ASYNC,
                GrabMode::ASYNC,
            )?
            .reply()?;
        if keyboard.status != GrabStatus::SUCCESS {
            warn!("lock screen keyboard grab refused: {:?}", keyboard.status);
        }
        let pointer = self
            .conn
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
        if pointer.status != GrabStatus::SUCCESS {
            warn!("lock screen pointer grab refused: {:?}", pointer.status);
        }

        self.conn.map_window(self.window)?;
        self.conn.configure_window(
            self.window,
            &ConfigureWindowAux::new().stack_mode(StackMode::ABOVE),
        )?;
        self.conn
            .set_input_focus(InputFocus::PARENT, self.window, x11rb::CURRENT_TIME)?;
        self.conn.change_window_attributes(
            self.window,
            &ChangeWindowAttributesAux::new().cursor(self.cursor),
        )?;
        self.conn.flush()?;
        debug!("screen locked");

        let mut showing = false;
        loop {
            match self.conn.wait_for_event()? {
                Event::Expose(_) => self.redraw()?,
                Event::KeyPress(press) => {
                    let keysym = self.keymap.keysym(press.detail);
                    match keysym {
                        XK_ESCAPE => {
                            showing = !showing;
                            if showing {
                                self.conn.map_window(self.input_field)?;
                                self.conn.configure_window(
                                    self.input_field,
                                    &ConfigureWindowAux::new().stack_mode(StackMode::ABOVE),
                                )?;
                                self.conn.set_input_focus(
                                    InputFocus::PARENT,
                                    self.input_field,
                                    x11rb::CURRENT_TIME,
                                )?;
                            } else {
                                self.conn.unmap_window(self.input_field)?;
                                self.conn.set_input_focus(
                                    InputFocus::PARENT,
                                    self.window,
                                    x11rb::CURRENT_TIME,
                                )?;
                            }
                            self.input.clear();
                        }
                        XK_RETURN => {
                            if showing && self.digest_matches() {
                                break;
                            }
                            self.input.clear();
                        }
                        XK_BACKSPACE => {
                            self.input.pop();
                        }
                        _ => {
                            let shifted = u16::from(press.state) & MOD_SHIFT != 0;
                            let sym = self.keymap.lookup(press.detail, shifted);
                            if showing
                                && (XK_SPACE..=XK_ASCIITILDE).contains(&sym)
                                && self.input.len() < MAX_PASSPHRASE - 1
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
        self.conn.change_window_attributes(
            self.window,
            &ChangeWindowAttributesAux::new().cursor(x11rb::NONE),
        )?;

        if self.prev_focus != x11rb::NONE {
            self.conn
                .set_input_focus(self.prev_revert, self.prev_focus, x11rb::CURRENT_TIME)?;
        } else {
            self.conn
                .set_input_focus(InputFocus::POINTER_ROOT, self.root, x11rb::CURRENT_TIME)?;
        }
        self.conn.flush()?;
        debug!("screen unlocked");
        Ok(())
    }

    fn digest_matches(&self) -> bool {
        let typed = Sha512::digest(self.input.as_bytes());
        typed.as_slice() == self.digest.as_slice()
    }

    /// Redraw the masked passphrase echo.
    fn redraw(&self) -> Result<()> {
        self.conn.clear_area(false, self.input_field, 0, 0, 0, 0)?;
        let mask = "*".repeat(self.input.len());
        if !mask.is_empty() {
            self.conn
                .image_text8(self.input_field, self.gc, 5, 12, mask.as_bytes())?;
        }
        self.conn.flush()?;
        Ok(())
    }
}

impl Drop for LockScreen<'_> {
    fn drop(&mut self) {
        let _ = self.conn.free_cursor(self.cursor);
        let _ = self.conn.free_gc(self.gc);
        if let Some(font) = self.font {
            let _ = self.conn.close_font(font);
        }
        let _ = self.conn.destroy_window(self.input_field);
        let _ = self.conn.destroy_window(self.window);
        let _ = self.conn.flush();
    }
}

/// Load the stored passphrase digest, or fall back to the default.
fn load_digest(config: &LockConfig) -> [u8; 64] {
    let path = config.hash_path.clone().or_else(|| {
        std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".swmhash"))
    });

    if let Some(path) = path {
        match fs::read(&path) {
            Ok(bytes) => match <[u8; 64]>::try_from(bytes.as_slice()) {
                Ok(digest) => return digest,
                Err(_) => warn!("{path:?} is not a SHA-512 digest, using default passphrase"),
            },
            Err(err) => debug!("no passphrase digest at {path:?}: {err}"),
        }
    }

    let mut digest = [0u8; 64];
    digest.copy_from_slice(&Sha512::digest(DEFAULT_PASSPHRASE.as_bytes()));
    digest
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_digest_matches_default_passphrase() {
        let digest = load_digest(&LockConfig {
            hash_path: Some(PathBuf::from("/nonexistent/.swmhash")),
        });
        let expected = Sha512::digest(DEFAULT_PASSPHRASE.as_bytes());
        assert_eq!(digest.as_slice(), expected.as_slice());
    }

    #[test]
    fn stored_digest_is_used_when_well_formed() {
        let dir = std::env::temp_dir().join("stratum-lock-test");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("hash");
        let stored = Sha512::digest(b"hunter2");
        fs::write(&path, stored.as_slice()).unwrap();

        let digest = load_digest(&LockConfig {
            hash_path: Some(path.clone()),
        });
        assert_eq!(digest.as_slice(), stored.as_slice());

        fs::remove_file(path).unwrap();
    }

    #[test]
    fn malformed_digest_falls_back_to_default() {
        let dir = std::env::temp_dir().join("stratum-lock-test");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("short");
        fs::write(&path, b"too short").unwrap();

        let digest = load_digest(&LockConfig {
            hash_path: Some(path.clone()),
        });
        let expected = Sha512::digest(DEFAULT_PASSPHRASE.as_bytes());
        assert_eq!(digest.as_slice(), expected.as_slice());

        fs::remove_file(path).unwrap();
    }
}
