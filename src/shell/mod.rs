//! Desktop shell collaborators
//!
//! The modal surfaces (lock screen, run dialog) and the status bar. These
//! sit outside the window-tracking core: the modals grab input and run
//! their own nested event loop, the status bar runs on its own thread with
//! its own connection.

pub mod lock;
pub mod rundlg;
pub mod status;

use std::os::unix::process::CommandExt;
use std::process::Command;

use anyhow::Result;
use tracing::{debug, warn};
use x11rb::connection::Connection;
use x11rb::protocol::xproto::*;
use x11rb::rust_connection::RustConnection;

/// Run a command line through the shell, detached from our process group.
pub fn spawn(command: &str) {
    let command = command.trim();
    if command.is_empty() {
        return;
    }

    let mut child = Command::new("/bin/sh");
    child.arg("-c").arg(command).process_group(0);
    match child.spawn() {
        Ok(child) => debug!("spawned '{command}' (pid {})", child.id()),
        Err(err) => warn!("failed to spawn '{command}': {err}"),
    }
}

/// Create an invisible cursor for the lock screen.
pub(crate) fn create_blank_cursor(conn: &RustConnection, window: Window) -> Result<Cursor> {
    let pixmap = conn.generate_id()?;
    conn.create_pixmap(1, pixmap, window, 1, 1)?;
    let cursor = conn.generate_id()?;
    conn.create_cursor(cursor, pixmap, pixmap, 0, 0, 0, 0, 0, 0, 0, 0)?;
    conn.free_pixmap(pixmap)?;
    Ok(cursor)
}
