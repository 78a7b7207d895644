// Window creation and the event loop that owns all display state.

use std::sync::{Arc, Mutex};

use winit::application::ApplicationHandler;
use winit::dpi::{LogicalPosition, LogicalSize};
use winit::error::EventLoopError;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowAttributes, WindowId};

use crate::config::types::Config;
use crate::config::Color;
use crate::display::{DisplayState, Submitter, TaskQueue};
use crate::grid::CellGrid;
use crate::renderer::Renderer;

/// Default window width in logical pixels.
pub const DEFAULT_WIDTH: f64 = 1024.0;
/// Default window height in logical pixels.
pub const DEFAULT_HEIGHT: f64 = 640.0;
pub const DEFAULT_TITLE: &str = "glyphgrid";

/// Optional settings for the window. Unset fields fall back to the config.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WindowOptions {
    pub fg: Option<Color>,
    pub bg: Option<Color>,
    pub title: Option<String>,
    /// Top-left corner in logical pixels.
    pub position: Option<(i32, i32)>,
    /// Inner size in logical pixels.
    pub size: Option<(f64, f64)>,
}

impl WindowOptions {
    /// Fill every unset field from `fallback`.
    pub fn or(self, fallback: WindowOptions) -> WindowOptions {
        WindowOptions {
            fg: self.fg.or(fallback.fg),
            bg: self.bg.or(fallback.bg),
            title: self.title.or(fallback.title),
            position: self.position.or(fallback.position),
            size: self.size.or(fallback.size),
        }
    }

    pub fn to_window_attributes(&self) -> WindowAttributes {
        let (width, height) = self.size.unwrap_or((DEFAULT_WIDTH, DEFAULT_HEIGHT));
        let title = self.title.as_deref().unwrap_or(DEFAULT_TITLE);
        let attrs = Window::default_attributes()
            .with_title(title)
            .with_inner_size(LogicalSize::new(width, height));
        match self.position {
            Some((x, y)) => attrs.with_position(LogicalPosition::new(x, y)),
            None => attrs,
        }
    }
}

/// Events delivered to the event loop from other threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserEvent {
    /// A task was submitted and the queue needs draining.
    TasksQueued,
}

/// Build the event loop `App::run` expects. Must be called on the main thread.
pub fn create_event_loop() -> Result<EventLoop<UserEvent>, EventLoopError> {
    EventLoop::<UserEvent>::with_user_event().build()
}

type GridSizeCallback = Box<dyn FnMut(usize, usize)>;

/// Reports grid sizes to the registered callback: always for the first size, then
/// only when (columns, rows) changes.
struct GridSizeNotifier {
    callback: Option<GridSizeCallback>,
    last: Option<(usize, usize)>,
}

impl GridSizeNotifier {
    fn new() -> Self {
        Self {
            callback: None,
            last: None,
        }
    }

    fn set_callback(&mut self, callback: GridSizeCallback) {
        self.callback = Some(callback);
    }

    /// Returns whether the size differed from the last one reported.
    fn report(&mut self, columns: usize, rows: usize) -> bool {
        if self.last == Some((columns, rows)) {
            return false;
        }
        self.last = Some((columns, rows));
        if let Some(callback) = &mut self.callback {
            callback(columns, rows);
        }
        true
    }
}

/// The window, its renderer, and the display state they draw.
pub struct App {
    options: WindowOptions,
    config: Config,
    window: Option<Arc<Window>>,
    renderer: Option<Renderer>,
    state: DisplayState,
    tasks: TaskQueue,
    grid_size: GridSizeNotifier,
}

impl App {
    pub fn new(options: WindowOptions, config: Config, event_loop: &EventLoop<UserEvent>) -> Self {
        let options = options.or(config.window_options());
        let fg = options.fg.unwrap_or(config.colors.foreground);
        let bg = options.bg.unwrap_or(config.colors.background);

        let proxy = Mutex::new(event_loop.create_proxy());
        let tasks = TaskQueue::with_waker(move || {
            if let Ok(proxy) = proxy.lock() {
                // Fails only once the loop has exited; the task is then never run.
                let _ = proxy.send_event(UserEvent::TasksQueued);
            }
        });

        Self {
            options,
            config,
            window: None,
            renderer: None,
            state: DisplayState::new(CellGrid::new(0, 0, fg, bg)),
            tasks,
            grid_size: GridSizeNotifier::new(),
        }
    }

    /// Handle for queueing display tasks from any thread.
    pub fn submitter(&self) -> Submitter {
        self.tasks.submitter()
    }

    /// Called with (columns, rows) when the window is first shown and whenever the
    /// grid size changes afterwards.
    pub fn set_grid_size_callback(&mut self, callback: impl FnMut(usize, usize) + 'static) {
        self.grid_size.set_callback(Box::new(callback));
    }

    pub fn run(mut self, event_loop: EventLoop<UserEvent>) -> anyhow::Result<()> {
        event_loop.set_control_flow(ControlFlow::Wait);
        event_loop.run_app(&mut self)?;
        Ok(())
    }

    fn apply_grid_size(&mut self, columns: usize, rows: usize) {
        if self.state.grid().size() != (columns, rows) {
            self.state.grid_mut().resize(columns, rows);
        }
        if self.grid_size.report(columns, rows) {
            log::debug!("Grid size now {columns}x{rows}");
        }
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        let (Some(window), Some(renderer)) = (&self.window, &mut self.renderer) else {
            return;
        };

        let ran = self.tasks.drain(&mut self.state);
        if ran > 0 {
            log::trace!("Ran {ran} display tasks");
        }
        if let Some(title) = self.state.take_title() {
            window.set_title(&title);
        }

        match renderer.render(&mut self.state) {
            Ok(()) => {}
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                renderer.reconfigure();
                window.request_redraw();
            }
            Err(wgpu::SurfaceError::OutOfMemory) => {
                log::error!("GPU out of memory");
                event_loop.exit();
            }
            Err(e) => {
                log::warn!("Surface error: {e}");
            }
        }
    }
}

impl ApplicationHandler<UserEvent> for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        let window = match event_loop.create_window(self.options.to_window_attributes()) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                log::error!("Failed to create window: {e}");
                event_loop.exit();
                return;
            }
        };
        let size = window.inner_size();
        log::info!(
            "Window created: {}x{} (scale factor: {:.2})",
            size.width,
            size.height,
            window.scale_factor()
        );

        let background = self.options.bg.unwrap_or(self.config.colors.background);
        let renderer = match pollster::block_on(Renderer::new(
            window.clone(),
            background,
            &self.config.font,
            self.config.atlas.initial_glyph_capacity,
        )) {
            Ok(renderer) => renderer,
            Err(e) => {
                log::error!("Failed to initialize renderer: {e}");
                event_loop.exit();
                return;
            }
        };
        log::info!("Renderer initialized");

        let (columns, rows) = renderer.grid_size();
        self.renderer = Some(renderer);
        self.window = Some(window.clone());
        self.apply_grid_size(columns, rows);
        window.request_redraw();
    }

    fn user_event(&mut self, _event_loop: &ActiveEventLoop, event: UserEvent) {
        match event {
            UserEvent::TasksQueued => {
                if let Some(window) = &self.window {
                    window.request_redraw();
                }
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Window close requested");
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                log::debug!("Window resized to {}x{}", size.width, size.height);
                let Some(renderer) = &mut self.renderer else {
                    return;
                };
                let (columns, rows) = renderer.resize(size.width, size.height);
                self.apply_grid_size(columns, rows);
                if let Some(window) = &self.window {
                    window.request_redraw();
                }
            }
            WindowEvent::RedrawRequested => self.redraw(event_loop),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn recording_notifier() -> (GridSizeNotifier, Rc<RefCell<Vec<(usize, usize)>>>) {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&calls);
        let mut notifier = GridSizeNotifier::new();
        notifier.set_callback(Box::new(move |columns, rows| {
            sink.borrow_mut().push((columns, rows))
        }));
        (notifier, calls)
    }

    // ── WindowOptions defaults ─────────────────────────────────────

    #[test]
    fn default_options_are_unset() {
        let options = WindowOptions::default();
        assert_eq!(options.fg, None);
        assert_eq!(options.title, None);
        assert_eq!(options.size, None);
    }

    #[test]
    fn or_prefers_set_fields() {
        let options = WindowOptions {
            title: Some("mine".into()),
            bg: Some(Color::BLACK),
            ..Default::default()
        };
        let fallback = WindowOptions {
            fg: Some(Color::WHITE),
            bg: Some(Color::WHITE),
            title: Some("config".into()),
            position: Some((1, 2)),
            size: Some((300.0, 200.0)),
        };
        let merged = options.or(fallback);
        assert_eq!(merged.title.as_deref(), Some("mine"));
        assert_eq!(merged.bg, Some(Color::BLACK));
        assert_eq!(merged.fg, Some(Color::WHITE));
        assert_eq!(merged.position, Some((1, 2)));
        assert_eq!(merged.size, Some((300.0, 200.0)));
    }

    #[test]
    fn config_defaults_fill_options() {
        let merged = WindowOptions::default().or(Config::default().window_options());
        assert_eq!(merged.title.as_deref(), Some(DEFAULT_TITLE));
        assert_eq!(merged.size, Some((DEFAULT_WIDTH, DEFAULT_HEIGHT)));
        assert_eq!(merged.position, None);
    }

    // ── WindowAttributes construction ──────────────────────────────

    #[test]
    fn unset_options_use_default_size_and_title() {
        let attrs = WindowOptions::default().to_window_attributes();
        assert_eq!(
            attrs.inner_size,
            Some(LogicalSize::new(DEFAULT_WIDTH, DEFAULT_HEIGHT).into())
        );
        assert_eq!(attrs.title, "glyphgrid");
        assert_eq!(attrs.position, None);
    }

    #[test]
    fn attributes_carry_size_title_and_position() {
        let options = WindowOptions {
            title: Some("Demo".into()),
            size: Some((800.0, 600.0)),
            position: Some((10, 20)),
            ..Default::default()
        };
        let attrs = options.to_window_attributes();
        assert_eq!(attrs.title, "Demo");
        assert_eq!(attrs.inner_size, Some(LogicalSize::new(800.0, 600.0).into()));
        assert_eq!(attrs.position, Some(LogicalPosition::new(10, 20).into()));
    }

    // ── Grid size notifications ────────────────────────────────────

    #[rstest]
    #[case::first_show(&[(80, 24)], &[(80, 24)])]
    #[case::size_change(&[(80, 24), (100, 30)], &[(80, 24), (100, 30)])]
    #[case::same_size(&[(80, 24), (80, 24)], &[(80, 24)])]
    #[case::shrink_then_restore(&[(80, 24), (40, 24), (80, 24)], &[(80, 24), (40, 24), (80, 24)])]
    fn grid_size_callback_fires_on_first_show_and_changes(
        #[case] sizes: &[(usize, usize)],
        #[case] expected: &[(usize, usize)],
    ) {
        let (mut notifier, calls) = recording_notifier();
        for &(columns, rows) in sizes {
            notifier.report(columns, rows);
        }
        assert_eq!(calls.borrow().as_slice(), expected);
    }

    #[test]
    fn first_report_fires_even_for_an_empty_grid() {
        let (mut notifier, calls) = recording_notifier();
        assert!(notifier.report(0, 0));
        assert!(!notifier.report(0, 0));
        assert_eq!(calls.borrow().as_slice(), &[(0, 0)]);
    }

    #[test]
    fn report_without_callback_still_tracks_size() {
        let mut notifier = GridSizeNotifier::new();
        assert!(notifier.report(10, 5));
        assert!(!notifier.report(10, 5));
        assert!(notifier.report(11, 5));
    }
}
