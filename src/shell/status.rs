//! Status bar
//!
//! A bottom strip drawn directly on the root window: the focused window's
//! title centered, a clock right-aligned. Runs on its own thread with its
//! own X connection and redraws on a fixed cadence; the only thing it
//! reads from the core is the shared focused-title slot.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Local;
use tracing::{debug, warn};
use x11rb::connection::Connection;
use x11rb::protocol::xproto::*;
use x11rb::rust_connection::RustConnection;

use crate::config::BarConfig;
use crate::wm::backend::BackendError;
use crate::wm::focus::FocusedTitle;

/// Longest title the bar will render.
const MAX_TITLE_LEN: usize = 127;
/// Right padding of the clock, in pixels.
const CLOCK_PADDING: i16 = 10;

/// Handle to the running status bar thread.
pub struct StatusBar {
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl StatusBar {
    /// Connect, load the font and start the redraw thread.
    pub fn init(config: &BarConfig, title: FocusedTitle) -> Result<Self> {
        let (conn, screen_num) =
            x11rb::connect(None).context("status bar: failed to connect to X server")?;
        let screen = &conn.setup().roots[screen_num];

        let font = conn.generate_id()?;
        conn.open_font(font, config.font.as_bytes())?
            .check()
            .with_context(|| format!("failed to load status bar font '{}'", config.font))?;

        let gc = conn.generate_id()?;
        conn.create_gc(
            gc,
            screen.root,
            &CreateGCAux::new()
                .font(font)
                .foreground(screen.white_pixel)
                .background(screen.black_pixel),
        )?;

        let painter = Painter {
            root: screen.root,
            screen_width: screen.width_in_pixels,
            screen_height: screen.height_in_pixels,
            black: screen.black_pixel,
            white: screen.white_pixel,
            bar_height: config.height,
            font,
            gc,
            conn,
        };

        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let interval = Duration::from_secs(config.interval_secs.max(1));
        let thread = std::thread::spawn(move || {
            debug!("status bar thread started");
            while flag.load(Ordering::Relaxed) {
                if let Err(err) = painter.draw(&title) {
                    warn!("status bar draw failed: {err}");
                }
                std::thread::sleep(interval);
            }
            debug!("status bar thread finished");
        });

        Ok(Self {
            running,
            thread: Some(thread),
        })
    }

    /// Cooperative stop: flip the flag and join. Latency is bounded by the
    /// thread's own redraw interval.
    pub fn shutdown(mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

struct Painter {
    root: Window,
    screen_width: u16,
    screen_height: u16,
    black: u32,
    white: u32,
    bar_height: u16,
    font: Font,
    gc: Gcontext,
    conn: RustConnection,
}

impl Painter {
    fn draw(&self, title: &FocusedTitle) -> Result<(), BackendError> {
        let clock = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        let title = truncate(title.copy_out(), MAX_TITLE_LEN);

        let bar_y = (self.screen_height - self.bar_height) as i16;
        let (title_width, ascent) = self.text_extents(&title)?;
        let (clock_width, _) = self.text_extents(&clock)?;
        let baseline = bar_y + (self.bar_height as i16 + ascent) / 2;

        self.conn
            .change_gc(self.gc, &ChangeGCAux::new().foreground(self.black))?;
        self.conn.poly_fill_rectangle(
            self.root,
            self.gc,
            &[Rectangle {
                x: 0,
                y: bar_y,
                width: self.screen_width,
                height: self.bar_height,
            }],
        )?;

        self.conn
            .change_gc(self.gc, &ChangeGCAux::new().foreground(self.white))?;
        if !title.is_empty() {
            let title_x = (self.screen_width as i16 - title_width) / 2;
            self.conn
                .image_text8(self.root, self.gc, title_x, baseline, title.as_bytes())?;
        }
        let clock_x = self.screen_width as i16 - clock_width - CLOCK_PADDING;
        self.conn
            .image_text8(self.root, self.gc, clock_x, baseline, clock.as_bytes())?;

        self.conn.flush()?;
        Ok(())
    }

    /// Pixel width and font ascent for a string in the bar font.
    fn text_extents(&self, text: &str) -> Result<(i16, i16), BackendError> {
        let chars: Vec<Char2b> = text
            .bytes()
            .map(|byte| Char2b {
                byte1: 0,
                byte2: byte,
            })
            .collect();
        let reply = self.conn.query_text_extents(self.font, &chars)?.reply()?;
        Ok((reply.overall_width as i16, reply.font_ascent))
    }
}

fn truncate(mut text: String, max_bytes: usize) -> String {
    if text.len() > max_bytes {
        let mut end = max_bytes;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        text.truncate(end);
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("hello".into(), 127), "hello");
        assert_eq!(truncate("abcdef".into(), 4), "abcd");
        // Two-byte characters must not be split in half.
        assert_eq!(truncate("ééé".into(), 3), "é");
    }
}
