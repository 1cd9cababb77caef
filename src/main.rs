//! ASL Detector - Main Entry Point
//!
//! Opens the detector window, loads the model and runs the event loop. Any
//! startup failure is reported once on stderr.

use std::sync::Arc;
use std::time::Instant;

use asl_detector::app::load_detector;
use asl_detector::config::DetectorSettings;
use asl_detector::error::AppError;
use asl_detector::ml::OnnxDetector;
use asl_detector::App;
use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowAttributes, WindowId};

const WINDOW_TITLE: &str = "ASL Detector";

/// Application state machine
enum AppState {
    /// Initial state before window is created, holding the loaded model
    Uninitialized { detector: Option<OnnxDetector> },
    /// Window and graphics context are ready
    Running { window: Arc<Window>, app: App },
}

/// Main application handler implementing winit's ApplicationHandler trait
struct DetectorApp {
    settings: DetectorSettings,
    state: AppState,
    /// Startup failure raised inside the event loop
    error: Option<AppError>,
}

impl DetectorApp {
    fn new(settings: DetectorSettings, detector: OnnxDetector) -> Self {
        Self {
            settings,
            state: AppState::Uninitialized {
                detector: Some(detector),
            },
            error: None,
        }
    }

    fn init(&mut self, event_loop: &ActiveEventLoop, detector: OnnxDetector) -> Result<(), AppError> {
        log::info!("Creating window...");

        let window_attributes = WindowAttributes::default()
            .with_title(WINDOW_TITLE)
            .with_inner_size(LogicalSize::new(
                self.settings.window_width,
                self.settings.window_height,
            ));

        let window = Arc::new(
            event_loop
                .create_window(window_attributes)
                .map_err(|e| AppError::Graphics(format!("Failed to create window: {}", e)))?,
        );

        log::info!(
            "Window created: {}x{}",
            window.inner_size().width,
            window.inner_size().height
        );

        let app = pollster::block_on(App::new(window.clone(), &self.settings, detector))?;

        log::info!("ASL Detector ready!");
        log::info!("Press SPACE to start/stop detection, ESC to exit");

        window.request_redraw();
        self.state = AppState::Running { window, app };
        Ok(())
    }
}

impl ApplicationHandler for DetectorApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        let AppState::Uninitialized { detector } = &mut self.state else {
            return;
        };
        let Some(detector) = detector.take() else {
            return;
        };

        if let Err(e) = self.init(event_loop, detector) {
            self.error = Some(e);
            event_loop.exit();
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        let AppState::Running { window, app } = &mut self.state else {
            return;
        };

        // Let egui handle the event first
        let response = app.handle_window_event(&event);
        if response.repaint {
            window.request_redraw();
        }

        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, exiting...");
                event_loop.exit();
            }

            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(key_code),
                        state: ElementState::Pressed,
                        repeat: false,
                        ..
                    },
                ..
            } if !response.consumed => match key_code {
                KeyCode::Escape => {
                    log::info!("Escape pressed, exiting...");
                    event_loop.exit();
                }
                KeyCode::Space => {
                    app.toggle_detection();
                    window.request_redraw();
                }
                _ => {}
            },

            WindowEvent::Resized(physical_size) => {
                app.resize(physical_size);
                window.request_redraw();
            }

            WindowEvent::RedrawRequested => match app.render() {
                Ok(_) => {}
                Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                    log::warn!("Surface lost, reconfiguring...");
                    app.resize(app.size());
                }
                Err(wgpu::SurfaceError::OutOfMemory) => {
                    log::error!("Out of GPU memory!");
                    event_loop.exit();
                }
                Err(e) => {
                    log::warn!("Surface error: {:?}", e);
                }
            },

            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        let AppState::Running { window, app } = &mut self.state else {
            event_loop.set_control_flow(ControlFlow::Wait);
            return;
        };

        if app.run_due_tick(Instant::now()) {
            window.request_redraw();
        }

        match app.next_tick_deadline() {
            Some(deadline) => event_loop.set_control_flow(ControlFlow::WaitUntil(deadline)),
            None => event_loop.set_control_flow(ControlFlow::Wait),
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        if let AppState::Running { app, .. } = &mut self.state {
            app.stop_detection();
        }
    }
}

fn run() -> Result<(), AppError> {
    log::info!("ASL Detector v{}", env!("CARGO_PKG_VERSION"));

    let settings = DetectorSettings::load();
    let detector = load_detector(&settings)?;

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Wait);

    let mut handler = DetectorApp::new(settings, detector);
    event_loop.run_app(&mut handler)?;

    match handler.error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn main() {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run() {
        log::error!("{}", e);
        eprintln!("Error occurred: {}", e);
    }
}
