//! Window, event loop and per-frame driving of the pipeline.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use glam::Vec3;
use log::info;
use pollster::block_on;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode as WinitKey, PhysicalKey};
use winit::window::{Window, WindowId};

use crate::camera::{Camera, CameraController};
use crate::config::Config;
use crate::input::{InputState, KeyCode, NamedKey};
use crate::render::{Pipeline, WgpuDevice};
use crate::scene::SceneDescription;
use crate::shaders::ShaderSources;

/// Opens the window and renders until it is closed.
pub fn run(config: Config, shaders: ShaderSources) -> Result<()> {
    let event_loop = EventLoop::new().context("failed to create event loop")?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(config, shaders);
    event_loop
        .run_app(&mut app)
        .context("event loop terminated with error")?;

    match app.last_error.take() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

struct Running {
    // Dropped before the device so stage resources are released first.
    pipeline: Pipeline<WgpuDevice>,
    device: Arc<WgpuDevice>,
    camera: Camera,
    controller: CameraController,
    last_frame: Instant,
}

struct App {
    config: Config,
    shaders: Option<ShaderSources>,
    scene: SceneDescription,
    input: InputState,
    running: Option<Running>,
    last_error: Option<anyhow::Error>,
}

impl App {
    fn new(config: Config, shaders: ShaderSources) -> Self {
        Self {
            config,
            shaders: Some(shaders),
            scene: SceneDescription::demo(),
            input: InputState::new(),
            running: None,
            last_error: None,
        }
    }

    fn start(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let shaders = self
            .shaders
            .take()
            .ok_or_else(|| anyhow!("pipeline was already started"))?;
        let viewport = self.config.viewport;
        let attributes = Window::default_attributes()
            .with_title(self.config.title.clone())
            .with_inner_size(PhysicalSize::new(viewport.width, viewport.height))
            .with_resizable(false);
        let window = Arc::new(
            event_loop
                .create_window(attributes)
                .context("failed to create window")?,
        );

        let device = Arc::new(
            block_on(WgpuDevice::new(Arc::clone(&window), self.config.vsync))
                .context("failed to initialize GPU")?,
        );
        let mut pipeline = Pipeline::new(Arc::clone(&device), viewport, shaders);
        pipeline
            .initialize()
            .context("failed to initialize render pipeline")?;

        let camera = Camera::new(Vec3::ZERO, Camera::DEFAULT_FOV_DEGREES, viewport.aspect());
        info!(
            "rendering {} spheres and {} lights at {}x{}",
            self.scene.sphere_count(),
            self.scene.light_count(),
            viewport.width,
            viewport.height
        );
        window.request_redraw();

        self.running = Some(Running {
            pipeline,
            device,
            camera,
            controller: CameraController::new(),
            last_frame: Instant::now(),
        });
        Ok(())
    }

    fn redraw(&mut self) -> Result<()> {
        let Some(running) = self.running.as_mut() else {
            return Ok(());
        };
        let now = Instant::now();
        let delta = now.duration_since(running.last_frame).as_secs_f32();
        running.last_frame = now;

        running
            .controller
            .update(&mut running.camera, &self.input, delta);
        running.pipeline.frame(&running.camera, &self.scene)?;
        running.device.present()?;
        Ok(())
    }

    fn handle_key(&mut self, event: &KeyEvent, event_loop: &ActiveEventLoop) {
        let PhysicalKey::Code(code) = event.physical_key else {
            return;
        };
        let Some(key) = map_keycode(code) else {
            return;
        };
        match event.state {
            ElementState::Pressed => {
                if key == KeyCode::Named(NamedKey::Escape) {
                    event_loop.exit();
                }
                self.input.set_key_down(key);
            }
            ElementState::Released => self.input.set_key_up(key),
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        self.last_error = Some(err);
        event_loop.exit();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.running.is_some() {
            return;
        }
        if let Err(err) = self.start(event_loop) {
            self.fail(event_loop, err);
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::Focused(false) => self.input.clear(),
            WindowEvent::KeyboardInput { event, .. } => self.handle_key(&event, event_loop),
            WindowEvent::RedrawRequested => {
                if let Err(err) = self.redraw() {
                    self.fail(event_loop, err);
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(running) = self.running.as_ref() {
            running.device.window().request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(mut running) = self.running.take() {
            running.pipeline.release();
        }
    }
}

fn map_keycode(code: WinitKey) -> Option<KeyCode> {
    Some(match code {
        WinitKey::Space => KeyCode::Named(NamedKey::Space),
        WinitKey::Escape => KeyCode::Named(NamedKey::Escape),
        WinitKey::ArrowLeft => KeyCode::Named(NamedKey::Left),
        WinitKey::ArrowRight => KeyCode::Named(NamedKey::Right),
        WinitKey::ArrowUp => KeyCode::Named(NamedKey::Up),
        WinitKey::ArrowDown => KeyCode::Named(NamedKey::Down),
        WinitKey::ShiftLeft => KeyCode::Named(NamedKey::LeftShift),
        WinitKey::KeyW => KeyCode::Character('W'),
        WinitKey::KeyA => KeyCode::Character('A'),
        WinitKey::KeyS => KeyCode::Character('S'),
        WinitKey::KeyD => KeyCode::Character('D'),
        _ => return None,
    })
}
