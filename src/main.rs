//! Stratum
//!
//! A stacking window manager for X11, written in Rust.

mod config;
mod shell;
mod wm;

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use x11rb::connection::Connection;

use config::Config;
use shell::status::StatusBar;
use wm::backend::X11Backend;
use wm::keyboard::KeyboardMap;
use wm::Wm;

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "stratum=debug,info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Stratum window manager");

    let config = Config::load().context("failed to load configuration")?;

    // The two fatal conditions: no server, or no substructure redirect.
    let (conn, screen_num) =
        x11rb::connect(None).context("failed to connect to X server")?;
    let conn = Arc::new(conn);
    info!("connected to X server, screen {screen_num}");

    let backend = X11Backend::new(Arc::clone(&conn), screen_num)?;
    let root = backend.root();

    let keymap = KeyboardMap::load(&conn).context("failed to load keyboard mapping")?;
    keymap.grab_bindings(&conn, root)?;
    conn.flush()?;

    info!("shortcuts: Alt+Tab cycle, Alt+F4 close, Super+Q quit, Super+D run dialog");
    info!("shortcuts: Super+N minimize, Super+R restore, Super+X hide, Super+Z unhide");
    info!("shortcuts: Super+M maximize/restore, Super+L lock screen");

    let mut manager = Wm::new(backend, config.clone());

    // The status surface is optional: a missing font or connection must not
    // keep the window manager from running.
    let status = match StatusBar::init(&config.bar, manager.focused_title()) {
        Ok(status) => Some(status),
        Err(err) => {
            warn!("status bar unavailable: {err}");
            None
        }
    };

    let result = manager.run(&keymap);

    if let Some(status) = status {
        status.shutdown();
    }
    info!("Stratum exiting");
    result
}
