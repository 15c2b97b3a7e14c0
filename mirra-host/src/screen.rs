//! Host window state and geometry.
//!
//! The actual renderer is an external collaborator reached through the
//! [`Display`] trait; [`Screen`] keeps the geometry the translator and
//! the session loop need: device frame size, window size, fullscreen
//! state, and the renderer transform used to map window coordinates
//! into device frame space.

use std::time::{Duration, Instant};

use mirra_core::{Point, Size};
use tracing::{debug, info, warn};

/// Renderer / window backend seam.
pub trait Display: Send {
    fn show_window(&mut self, title: &str);
    fn render(&mut self);
    fn set_fullscreen(&mut self, fullscreen: bool);
    fn resize(&mut self, width: u32, height: u32);
    /// Surface a setup failure to the user.
    fn alert(&self, message: &str);
}

/// Display that only logs; used for record-only sessions and tests.
pub struct HeadlessDisplay;

impl Display for HeadlessDisplay {
    fn show_window(&mut self, title: &str) {
        info!("window shown: {title}");
    }

    fn render(&mut self) {}

    fn set_fullscreen(&mut self, fullscreen: bool) {
        debug!("fullscreen: {fullscreen}");
    }

    fn resize(&mut self, width: u32, height: u32) {
        debug!("window resized to {width}x{height}");
    }

    fn alert(&self, message: &str) {
        warn!("{message}");
    }
}

// ── FpsCounter ───────────────────────────────────────────────────

/// Frame-rate counter toggled from the keyboard.
pub struct FpsCounter {
    started: bool,
    frames: u32,
    since: Instant,
}

impl FpsCounter {
    pub fn new() -> Self {
        Self {
            started: false,
            frames: 0,
            since: Instant::now(),
        }
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Flip the counter on or off.
    pub fn toggle(&mut self) {
        if self.started {
            self.started = false;
            info!("FPS counter stopped");
        } else {
            self.started = true;
            self.frames = 0;
            self.since = Instant::now();
            info!("FPS counter started");
        }
    }

    /// Record one rendered frame.
    pub fn tick(&mut self) {
        if !self.started {
            return;
        }
        self.frames += 1;
        if self.since.elapsed() >= Duration::from_secs(1) {
            info!("{} fps", self.frames);
            self.frames = 0;
            self.since = Instant::now();
        }
    }
}

impl Default for FpsCounter {
    fn default() -> Self {
        Self::new()
    }
}

// ── Screen ───────────────────────────────────────────────────────

/// Window state owned by the session loop.
pub struct Screen {
    display: Box<dyn Display>,
    title: String,
    /// Device frame size from the session header.
    pub frame_size: Size,
    /// Current host window size.
    pub window_size: (u32, u32),
    pub fullscreen: bool,
    pub has_frame: bool,
    /// Renderer scale factors (window pixels per renderer unit).
    scale: (f32, f32),
    /// Renderer viewport offset.
    viewport: (i32, i32),
    /// Last known pointer position, frame coordinates.
    mouse: Point,
    fps: FpsCounter,
}

impl Screen {
    pub fn new(display: Box<dyn Display>, frame_size: Size, title: impl Into<String>) -> Self {
        Self {
            display,
            title: title.into(),
            frame_size,
            window_size: (frame_size.width as u32, frame_size.height as u32),
            fullscreen: false,
            has_frame: false,
            scale: (1.0, 1.0),
            viewport: (0, 0),
            mouse: Point { x: 0, y: 0 },
            fps: FpsCounter::new(),
        }
    }

    /// Show the window (called on the first decoded frame).
    pub fn show(&mut self) {
        self.display.show_window(&self.title);
    }

    pub fn render(&mut self) {
        self.display.render();
        self.fps.tick();
    }

    /// Surface a user-visible failure.
    pub fn alert(&self, message: &str) {
        self.display.alert(message);
    }

    pub fn set_window_size(&mut self, width: u32, height: u32) {
        self.window_size = (width, height);
    }

    /// Install the renderer transform reported by the backend.
    pub fn set_render_transform(&mut self, scale: (f32, f32), viewport: (i32, i32)) {
        self.scale = scale;
        self.viewport = viewport;
    }

    /// Convert window coordinates to device frame coordinates:
    /// divide by the renderer scale, subtract the viewport offset.
    pub fn window_to_frame(&self, x: i32, y: i32) -> Point {
        Point {
            x: (x as f32 / self.scale.0) as i32 - self.viewport.0,
            y: (y as f32 / self.scale.1) as i32 - self.viewport.1,
        }
    }

    /// Whether a frame-space point lands on the letterbox borders.
    pub fn is_outside_frame(&self, p: Point) -> bool {
        p.x < 0
            || p.x >= self.frame_size.width as i32
            || p.y < 0
            || p.y >= self.frame_size.height as i32
    }

    /// Remember the pointer position (frame coordinates).
    pub fn note_mouse(&mut self, window_x: i32, window_y: i32) {
        self.mouse = self.window_to_frame(window_x, window_y);
    }

    /// Last known pointer position, frame coordinates.
    pub fn mouse_position(&self) -> Point {
        self.mouse
    }

    pub fn toggle_fullscreen(&mut self) {
        self.fullscreen = !self.fullscreen;
        self.display.set_fullscreen(self.fullscreen);
        self.render();
    }

    /// Resize the window to the largest size that fits the current
    /// window bounds while matching the device frame aspect ratio.
    pub fn resize_to_fit(&mut self) {
        if self.fullscreen {
            return;
        }
        let (ww, wh) = self.window_size;
        let fw = self.frame_size.width as u64;
        let fh = self.frame_size.height as u64;
        if fw == 0 || fh == 0 {
            return;
        }
        let (w, h) = if ww as u64 * fh <= wh as u64 * fw {
            (ww, (ww as u64 * fh / fw) as u32)
        } else {
            ((wh as u64 * fw / fh) as u32, wh)
        };
        debug!("resize to fit: {w}x{h}");
        self.window_size = (w, h);
        self.display.resize(w, h);
    }

    /// Resize the window to exactly one window pixel per frame pixel.
    pub fn resize_to_pixel_perfect(&mut self) {
        if self.fullscreen {
            return;
        }
        let (w, h) = (self.frame_size.width as u32, self.frame_size.height as u32);
        debug!("resize to pixel-perfect: {w}x{h}");
        self.window_size = (w, h);
        self.display.resize(w, h);
    }

    /// Whether the window and frame orientations disagree.
    pub fn aspect_mismatch(&self) -> bool {
        let (ww, wh) = self.window_size;
        (ww < wh) != (self.frame_size.width < self.frame_size.height)
    }

    pub fn fps_counter(&mut self) -> &mut FpsCounter {
        &mut self.fps
    }
}

// ── Tests ────────────────────────────────────────────────────────
