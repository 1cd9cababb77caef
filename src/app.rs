//! Application window: wgpu surface, egui controls and the detection loop
//!
//! The window shows the latest annotated frame on the left and a control
//! panel on the right. Ticks of the detection loop are fired from the event
//! loop whenever the [`FrameTimer`] deadline has passed.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use winit::dpi::PhysicalSize;
use winit::event::WindowEvent;
use winit::window::Window;

use crate::camera::{self, NokhwaCameraProvider};
use crate::config::DetectorSettings;
use crate::error::{AppError, DetectionError};
use crate::frame::DisplayFrame;
use crate::ml::yolo::find_model;
use crate::ml::{LabelTable, OnnxDetector};
use crate::pipeline::{DetectionLoop, DisplaySurface, FrameTimer, TickOutcome};

type AslDetectionLoop = DetectionLoop<NokhwaCameraProvider, OnnxDetector, FrameTimer>;

const PANEL_WIDTH: f32 = 300.0;
const BACKGROUND: egui::Color32 = egui::Color32::WHITE;
const TEXT: egui::Color32 = egui::Color32::from_rgb(0x2D, 0x34, 0x36);
const HIGHLIGHT: egui::Color32 = egui::Color32::from_rgb(0x09, 0x84, 0xE3);
const ERROR_TEXT: egui::Color32 = egui::Color32::from_rgb(200, 40, 40);

/// Load the model named in `settings`, with the optional labels override
pub fn load_detector(settings: &DetectorSettings) -> Result<OnnxDetector, AppError> {
    let model_path = find_model(&settings.model_path)
        .ok_or_else(|| AppError::ModelNotFound(settings.model_path.clone()))?;
    log::info!("Loading model from {:?}", model_path);

    let detector = OnnxDetector::load(&model_path, settings.yolo.clone())?;

    match &settings.labels_path {
        Some(path) => Ok(detector.with_labels(load_labels(path)?)),
        None => Ok(detector),
    }
}

fn load_labels(path: &Path) -> Result<LabelTable, AppError> {
    let labels = LabelTable::load_json(path).map_err(|e| AppError::Labels {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    log::info!("Loaded {} labels from {:?}", labels.len(), path);
    Ok(labels)
}

/// Video surface backed by an egui texture
struct VideoPanel {
    ctx: egui::Context,
    texture: Option<egui::TextureHandle>,
    results: Vec<String>,
    fps: f32,
}

impl VideoPanel {
    fn new(ctx: egui::Context) -> Self {
        Self {
            ctx,
            texture: None,
            results: Vec::new(),
            fps: 0.0,
        }
    }
}

impl DisplaySurface for VideoPanel {
    fn show_frame(&mut self, frame: DisplayFrame) {
        let image = egui::ColorImage::from_rgba_unmultiplied(frame.size(), &frame.rgba);
        match &mut self.texture {
            Some(texture) => texture.set(image, egui::TextureOptions::LINEAR),
            None => {
                self.texture = Some(self.ctx.load_texture("video", image, egui::TextureOptions::LINEAR));
            }
        }
    }

    fn show_results(&mut self, lines: &[String]) {
        self.results = lines.to_vec();
    }

    fn show_fps(&mut self, fps: f32) {
        self.fps = fps;
    }
}

/// Main application state
pub struct App {
    /// Reference to the window
    window: Arc<Window>,
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    /// Current window size in physical pixels
    size: PhysicalSize<u32>,

    // egui integration
    egui_ctx: egui::Context,
    egui_state: egui_winit::State,
    egui_renderer: egui_wgpu::Renderer,

    // Detection
    detection: AslDetectionLoop,
    video: VideoPanel,
    /// Slider value, pushed into the session before every tick
    confidence_threshold: f32,
    /// Last camera or detection error shown under the controls
    status: Option<String>,
}

impl App {
    /// Create the graphics context and the detection loop around `detector`
    pub async fn new(
        window: Arc<Window>,
        settings: &DetectorSettings,
        detector: OnnxDetector,
    ) -> Result<Self, AppError> {
        let size = window.inner_size();

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let surface = instance
            .create_surface(window.clone())
            .map_err(|e| AppError::Graphics(format!("Failed to create surface: {}", e)))?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| AppError::Graphics("No suitable GPU adapter".to_string()))?;

        log::info!("Using GPU: {}", adapter.get_info().name);
        log::info!("Backend: {:?}", adapter.get_info().backend);

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("ASL Detector Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: adapter.limits(),
                    memory_hints: wgpu::MemoryHints::default(),
                },
                None,
            )
            .await
            .map_err(|e| AppError::Graphics(format!("Failed to create device: {}", e)))?;

        let surface_caps = surface.get_capabilities(&adapter);

        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .or_else(|| surface_caps.formats.first())
            .copied()
            .ok_or_else(|| AppError::Graphics("Surface has no supported formats".to_string()))?;

        log::info!("Surface format: {:?}", surface_format);

        let present_mode = if surface_caps
            .present_modes
            .contains(&wgpu::PresentMode::Mailbox)
        {
            wgpu::PresentMode::Mailbox
        } else {
            wgpu::PresentMode::Fifo
        };

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode,
            alpha_mode: surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };

        surface.configure(&device, &config);

        // Initialize egui with a light theme
        let egui_ctx = egui::Context::default();
        egui_ctx.set_visuals(light_visuals());

        let egui_state = egui_winit::State::new(
            egui_ctx.clone(),
            egui::ViewportId::ROOT,
            &window,
            Some(window.scale_factor() as f32),
            None,
            None,
        );

        let egui_renderer = egui_wgpu::Renderer::new(&device, surface_format, None, 1, false);

        for info in camera::list_cameras() {
            log::info!("Found camera {}: {}", info.index, info.name);
        }

        let detection = DetectionLoop::new(
            NokhwaCameraProvider::new(settings.camera_index),
            detector,
            FrameTimer::new(),
            settings,
        );
        let confidence_threshold = detection.session().confidence_threshold();

        Ok(Self {
            window,
            surface,
            device,
            queue,
            config,
            size,
            video: VideoPanel::new(egui_ctx.clone()),
            egui_ctx,
            egui_state,
            egui_renderer,
            detection,
            confidence_threshold,
            status: None,
        })
    }

    /// Handle a window event, returning egui's response to it
    pub fn handle_window_event(&mut self, event: &WindowEvent) -> egui_winit::EventResponse {
        self.egui_state.on_window_event(&self.window, event)
    }

    /// Resize the surface
    pub fn resize(&mut self, new_size: PhysicalSize<u32>) {
        if new_size.width > 0 && new_size.height > 0 {
            self.size = new_size;
            self.config.width = new_size.width;
            self.config.height = new_size.height;
            self.surface.configure(&self.device, &self.config);
        }
    }

    pub fn size(&self) -> PhysicalSize<u32> {
        self.size
    }

    /// Start or stop detection
    pub fn toggle_detection(&mut self) {
        self.detection
            .session_mut()
            .set_confidence_threshold(self.confidence_threshold);

        match self.detection.toggle() {
            Ok(_) => self.status = None,
            Err(e) => {
                log::error!("{}", e);
                self.status = Some(e.to_string());
            }
        }
    }

    /// Stop detection and release the camera
    pub fn stop_detection(&mut self) {
        self.detection.stop();
    }

    /// When the detection loop wants its next tick
    pub fn next_tick_deadline(&self) -> Option<Instant> {
        self.detection.scheduler().deadline()
    }

    /// Run a tick if one is due. Returns true if a tick ran.
    pub fn run_due_tick(&mut self, now: Instant) -> bool {
        if !self.detection.scheduler_mut().take_due(now) {
            return false;
        }

        self.detection
            .session_mut()
            .set_confidence_threshold(self.confidence_threshold);

        let result = self.detection.tick(&mut self.video);
        update_status(&mut self.status, result);
        true
    }

    pub fn render(&mut self) -> Result<(), wgpu::SurfaceError> {
        let output = self.surface.get_current_texture()?;
        let view = output.texture.create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Render Encoder"),
        });

        self.render_ui(&mut encoder, &view);

        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();

        Ok(())
    }

    fn render_ui(&mut self, encoder: &mut wgpu::CommandEncoder, view: &wgpu::TextureView) {
        let raw_input = self.egui_state.take_egui_input(&self.window);

        // Copy UI state so the egui closure doesn't borrow self
        let running = self.detection.is_running();
        let fps = self.video.fps;
        let results = self.video.results.join("\n");
        let status = self.status.clone();
        let video = self
            .video
            .texture
            .as_ref()
            .map(|texture| (texture.id(), texture.size_vec2()));
        let mut confidence_threshold = self.confidence_threshold;
        let mut toggle_clicked = false;

        let full_output = self.egui_ctx.run(raw_input, |ctx| {
            egui::SidePanel::right("controls")
                .exact_width(PANEL_WIDTH)
                .resizable(false)
                .show(ctx, |ui| {
                    ui.add_space(8.0);
                    ui.heading("ASL Detection");
                    ui.separator();

                    let label = if running { "Stop Detection" } else { "Start Detection" };
                    if ui
                        .add_sized([ui.available_width(), 32.0], egui::Button::new(label))
                        .clicked()
                    {
                        toggle_clicked = true;
                    }

                    ui.add_space(12.0);
                    ui.label("Confidence Threshold");
                    ui.add(egui::Slider::new(&mut confidence_threshold, 0.0..=1.0).fixed_decimals(2));

                    ui.add_space(12.0);
                    ui.label("Detection Results");
                    egui::Frame::group(ui.style()).show(ui, |ui| {
                        ui.set_min_size(egui::vec2(ui.available_width(), 200.0));
                        egui::ScrollArea::vertical().show(ui, |ui| {
                            ui.label(results.as_str());
                        });
                    });

                    ui.add_space(12.0);
                    ui.label(format!("FPS: {:.0}", fps));

                    if let Some(status) = &status {
                        ui.add_space(12.0);
                        ui.colored_label(ERROR_TEXT, status);
                    }
                });

            egui::CentralPanel::default().show(ctx, |ui| {
                let Some((texture_id, frame_size)) = video else {
                    ui.centered_and_justified(|ui| {
                        ui.label("Press Start Detection to open the camera");
                    });
                    return;
                };

                let available = ui.available_size();
                let scale = (available.x / frame_size.x).min(available.y / frame_size.y);
                let size = frame_size * scale.max(0.0);
                ui.centered_and_justified(|ui| {
                    ui.add(egui::Image::new(egui::load::SizedTexture::new(texture_id, size)));
                });
            });
        });

        if confidence_threshold != self.confidence_threshold {
            self.confidence_threshold = confidence_threshold;
            self.detection
                .session_mut()
                .set_confidence_threshold(confidence_threshold);
        }

        if toggle_clicked {
            self.toggle_detection();
            self.window.request_redraw();
        }

        let repaint_now = full_output
            .viewport_output
            .get(&egui::ViewportId::ROOT)
            .is_some_and(|viewport| viewport.repaint_delay.is_zero());
        if repaint_now {
            self.window.request_redraw();
        }

        self.egui_state.handle_platform_output(&self.window, full_output.platform_output);

        let paint_jobs = self.egui_ctx.tessellate(full_output.shapes, full_output.pixels_per_point);

        for (id, image_delta) in &full_output.textures_delta.set {
            self.egui_renderer.update_texture(&self.device, &self.queue, *id, image_delta);
        }

        let screen_descriptor = egui_wgpu::ScreenDescriptor {
            size_in_pixels: [self.config.width, self.config.height],
            pixels_per_point: self.window.scale_factor() as f32,
        };

        self.egui_renderer.update_buffers(
            &self.device,
            &self.queue,
            encoder,
            &paint_jobs,
            &screen_descriptor,
        );

        {
            let mut render_pass = encoder
                .begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("egui Pass"),
                    color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                        view,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: wgpu::LoadOp::Clear(wgpu::Color::WHITE),
                            store: wgpu::StoreOp::Store,
                        },
                    })],
                    depth_stencil_attachment: None,
                    timestamp_writes: None,
                    occlusion_query_set: None,
                })
                .forget_lifetime();

            self.egui_renderer.render(&mut render_pass, &paint_jobs, &screen_descriptor);
        }

        for id in &full_output.textures_delta.free {
            self.egui_renderer.free_texture(id);
        }
    }
}

/// Show detection errors until the next frame renders
fn update_status(status: &mut Option<String>, result: Result<TickOutcome, DetectionError>) {
    match result {
        Ok(TickOutcome::Rendered { .. }) => *status = None,
        Ok(_) => {}
        Err(e) => {
            log::warn!("Detection failed: {}", e);
            *status = Some(e.to_string());
        }
    }
}

/// White background, dark gray text, blue highlight
fn light_visuals() -> egui::Visuals {
    let mut visuals = egui::Visuals::light();
    visuals.panel_fill = BACKGROUND;
    visuals.window_fill = BACKGROUND;
    visuals.override_text_color = Some(TEXT);
    visuals.selection.bg_fill = HIGHLIGHT;
    visuals.widgets.active.bg_fill = HIGHLIGHT;
    visuals.window_shadow = egui::epaint::Shadow::NONE;
    visuals
}
