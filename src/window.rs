//! Window collaborator

use std::sync::Arc;

use raw_window_handle::{HasDisplayHandle, HasWindowHandle, RawDisplayHandle, RawWindowHandle};
use winit::{
    dpi::PhysicalSize,
    error::OsError,
    event::WindowEvent,
    event_loop::EventLoop,
    window::{Window as WinitWindow, WindowBuilder},
};

/// What the renderer needs to know about its window, queried once per tick
pub trait WindowState {
    fn width(&self) -> u32;

    fn height(&self) -> u32;

    fn is_minimized(&self) -> bool;

    fn display_handle(&self) -> Option<RawDisplayHandle> {
        None
    }

    fn window_handle(&self) -> Option<RawWindowHandle> {
        None
    }
}

/// A winit window tracking the size and minimized state the renderer polls
pub struct Window {
    window: Arc<WinitWindow>,
    width: u32,
    height: u32,
    minimized: bool,
    close_requested: bool,
}

impl Window {
    /// Open a window with an inner size of `width`x`height`
    pub fn new(
        event_loop: &EventLoop<()>,
        title: &str,
        width: u32,
        height: u32,
    ) -> Result<Self, OsError> {
        let window = Arc::new(
            WindowBuilder::new()
                .with_title(title)
                .with_inner_size(PhysicalSize::new(width, height))
                .build(event_loop)?,
        );

        Ok(Self {
            window,
            width,
            height,
            minimized: false,
            close_requested: false,
        })
    }

    /// Underlying winit window, for surface creation
    pub fn window(&self) -> &WinitWindow {
        &self.window
    }

    pub fn should_close(&self) -> bool {
        self.close_requested
    }

    /// Track resizes and close requests. A zero-sized resize means minimized.
    pub fn handle_event(&mut self, event: &WindowEvent) {
        match event {
            WindowEvent::Resized(size) => {
                self.width = size.width;
                self.height = size.height;
                self.minimized = size.width == 0 || size.height == 0;
            }
            WindowEvent::CloseRequested => {
                self.close_requested = true;
            }
            _ => {}
        }
    }

    pub fn request_redraw(&self) {
        self.window.request_redraw();
    }
}

impl WindowState for Window {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn is_minimized(&self) -> bool {
        self.minimized || self.window.is_minimized().unwrap_or(false)
    }

    fn display_handle(&self) -> Option<RawDisplayHandle> {
        self.window.display_handle().ok().map(|handle| handle.as_raw())
    }

    fn window_handle(&self) -> Option<RawWindowHandle> {
        self.window.window_handle().ok().map(|handle| handle.as_raw())
    }
}

/// Fixed-size window without a surface, for headless rendering
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeadlessWindow {
    pub width: u32,
    pub height: u32,
    pub minimized: bool,
}

impl HeadlessWindow {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            minimized: false,
        }
    }
}

impl WindowState for HeadlessWindow {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn is_minimized(&self) -> bool {
        self.minimized
    }
}
