//! Keyboard command surface
//!
//! Fixed, compile-time key bindings. A key press decodes to a
//! modifier+keysym pair which maps to exactly one action; there is no
//! chord queueing.

use anyhow::{Context, Result};
use tracing::{debug, warn};
use x11rb::connection::Connection;
use x11rb::protocol::xproto::*;
use x11rb::rust_connection::RustConnection;

use crate::wm::backend::WindowId;

/// Mod1 (Alt)
pub const MOD_ALT: u16 = 0x0008;
/// Mod4 (Super)
pub const MOD_SUPER: u16 = 0x0040;
/// Shift
pub const MOD_SHIFT: u16 = 0x0001;

// Keysyms from X11/keysymdef.h
pub const XK_TAB: u32 = 0xff09;
pub const XK_RETURN: u32 = 0xff0d;
pub const XK_ESCAPE: u32 = 0xff1b;
pub const XK_BACKSPACE: u32 = 0xff08;
pub const XK_F4: u32 = 0xffc1;
pub const XK_SPACE: u32 = 0x0020;
pub const XK_ASCIITILDE: u32 = 0x007e;
const XK_Q: u32 = 0x0071;
const XK_D: u32 = 0x0064;
const XK_N: u32 = 0x006e;
const XK_L: u32 = 0x006c;
const XK_M: u32 = 0x006d;
const XK_R: u32 = 0x0072;
const XK_X: u32 = 0x0078;
const XK_Z: u32 = 0x007a;

/// One bound window-manager action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    CycleFocus,
    CloseWindow,
    Quit,
    RunDialog,
    Minimize,
    LockScreen,
    ToggleMaximize,
    RestoreMinimized,
    Hide,
    UnhideLast,
}

/// The fixed binding table.
pub const BINDINGS: &[(u16, u32, Action)] = &[
    (MOD_ALT, XK_TAB, Action::CycleFocus),
    (MOD_ALT, XK_F4, Action::CloseWindow),
    (MOD_SUPER, XK_Q, Action::Quit),
    (MOD_SUPER, XK_D, Action::RunDialog),
    (MOD_SUPER, XK_N, Action::Minimize),
    (MOD_SUPER, XK_L, Action::LockScreen),
    (MOD_SUPER, XK_M, Action::ToggleMaximize),
    (MOD_SUPER, XK_R, Action::RestoreMinimized),
    (MOD_SUPER, XK_X, Action::Hide),
    (MOD_SUPER, XK_Z, Action::UnhideLast),
];

/// Resolve a modifier state and keysym to a bound action.
pub fn action_for(state: u16, keysym: u32) -> Option<Action> {
    BINDINGS
        .iter()
        .find(|(modifiers, sym, _)| state & modifiers == *modifiers && keysym == *sym)
        .map(|(_, _, action)| *action)
}

/// Snapshot of the server's keycode-to-keysym table.
pub struct KeyboardMap {
    min_keycode: u8,
    keysyms_per_keycode: usize,
    keysyms: Vec<u32>,
}

impl KeyboardMap {
    pub fn load(conn: &RustConnection) -> Result<Self> {
        let setup = conn.setup();
        let min_keycode = setup.min_keycode;
        let max_keycode = setup.max_keycode;

        let reply = conn
            .get_keyboard_mapping(min_keycode, max_keycode - min_keycode + 1)?
            .reply()
            .context("failed to fetch keyboard mapping")?;

        Ok(Self {
            min_keycode,
            keysyms_per_keycode: reply.keysyms_per_keycode as usize,
            keysyms: reply.keysyms,
        })
    }

    /// Keysym for a keycode; column 0 (unshifted) unless `shifted`.
    pub fn lookup(&self, keycode: u8, shifted: bool) -> u32 {
        if keycode < self.min_keycode {
            return 0;
        }
        let column = usize::from(shifted && self.keysyms_per_keycode > 1);
        let index = (keycode - self.min_keycode) as usize * self.keysyms_per_keycode + column;
        self.keysyms.get(index).copied().unwrap_or(0)
    }

    /// Unshifted keysym for a keycode.
    pub fn keysym(&self, keycode: u8) -> u32 {
        self.lookup(keycode, false)
    }

    /// First keycode producing the given keysym in any shift column.
    pub fn keycode_for(&self, keysym: u32) -> Option<u8> {
        let per = self.keysyms_per_keycode.max(1);
        for (i, chunk) in self.keysyms.chunks(per).enumerate() {
            if chunk.contains(&keysym) {
                return Some(self.min_keycode + i as u8);
            }
        }
        None
    }

    /// Grab every binding on the root window.
    pub fn grab_bindings(&self, conn: &RustConnection, root: WindowId) -> Result<()> {
        for (modifiers, keysym, action) in BINDINGS {
            let Some(keycode) = self.keycode_for(*keysym) else {
                warn!("no keycode for keysym {keysym:#x} ({action:?}), binding skipped");
                continue;
            };
            conn.grab_key(
                true,
                root,
                ModMask::from(*modifiers),
                keycode,
                GrabMode::ASYNC,
                GrabMode::ASYNC,
            )?;
            debug!("grabbed {action:?}: modifiers={modifiers:#x} keycode={keycode}");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bindings_resolve_to_single_actions() {
        assert_eq!(action_for(MOD_ALT, XK_TAB), Some(Action::CycleFocus));
        assert_eq!(action_for(MOD_ALT, XK_F4), Some(Action::CloseWindow));
        assert_eq!(action_for(MOD_SUPER, XK_Q), Some(Action::Quit));
        assert_eq!(action_for(MOD_SUPER, XK_Z), Some(Action::UnhideLast));
    }

    #[test]
    fn unbound_combinations_resolve_to_none() {
        assert_eq!(action_for(0, XK_TAB), None);
        assert_eq!(action_for(MOD_SUPER, XK_TAB), None);
        assert_eq!(action_for(MOD_ALT, XK_Q), None);
    }

    #[test]
    fn extra_modifier_bits_do_not_mask_a_binding() {
        // NumLock or CapsLock held alongside the bound modifier.
        assert_eq!(action_for(MOD_ALT | 0x0010, XK_TAB), Some(Action::CycleFocus));
    }

    #[test]
    fn lookup_reads_shift_column() {
        let map = KeyboardMap {
            min_keycode: 8,
            keysyms_per_keycode: 2,
            keysyms: vec![0x61, 0x41, 0x62, 0x42],
        };
        assert_eq!(map.lookup(8, false), 0x61);
        assert_eq!(map.lookup(8, true), 0x41);
        assert_eq!(map.lookup(9, false), 0x62);
        assert_eq!(map.keycode_for(0x42), Some(9));
        assert_eq!(map.keycode_for(0x7f), None);
    }
}
