//! ember - demo driving the frame loop.
//!
//! A fly camera, six orbiting point lights and a compute-driven particle
//! emitter. Configuration comes from a TOML file, overridden by flags.

use std::f32::consts::TAU;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use glam::{Quat, Vec3};
use tracing::{error, info};
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::WindowId;

use ember_core::{EmberConfig, Timer};
use ember_platform::{InputState, KeyCode, Window};
use ember_renderer::ubo::orbit;
use ember_renderer::{FrameInputs, GpuPointLight, Renderer};
use ember_scene::{
    Camera, Color, ComponentStore, Entity, MovementController, ParticleEmitter, PointLight,
    SceneResult, Transform,
};

const FOV_Y_DEGREES: f32 = 50.0;
const NEAR_PLANE: f32 = 0.1;
const FAR_PLANE: f32 = 100.0;

const LIGHT_COLORS: [Vec3; 6] = [
    Vec3::new(1.0, 0.1, 0.1),
    Vec3::new(0.1, 0.1, 1.0),
    Vec3::new(0.1, 1.0, 0.1),
    Vec3::new(1.0, 1.0, 0.1),
    Vec3::new(0.1, 1.0, 1.0),
    Vec3::new(1.0, 1.0, 1.0),
];
const LIGHT_INTENSITY: f32 = 0.2;

#[derive(Debug, Parser)]
#[command(name = "ember", version, about = "Vulkan frame loop with compute particles")]
struct Args {
    /// TOML configuration file. Missing files fall back to defaults.
    #[arg(long, default_value = "ember.toml")]
    config: PathBuf,

    /// Enable the Khronos validation layer.
    #[arg(long)]
    validation: bool,

    /// Override `particles.max_particles`.
    #[arg(long)]
    max_particles: Option<u32>,
}

impl Args {
    fn load_config(&self) -> Result<EmberConfig> {
        let mut config = EmberConfig::load(&self.config)
            .with_context(|| format!("loading {}", self.config.display()))?;
        if self.validation {
            config.render.validation = true;
        }
        if let Some(max_particles) = self.max_particles {
            config.particles.max_particles = max_particles;
        }
        config.validate()?;
        Ok(config)
    }
}

/// Entities the frame loop reads every frame.
struct Scene {
    store: ComponentStore,
    viewer: Entity,
    emitter: Entity,
}

impl Scene {
    fn new(config: &EmberConfig) -> SceneResult<Self> {
        let mut store = ComponentStore::new();

        for (i, color) in LIGHT_COLORS.iter().enumerate() {
            let angle = i as f32 * TAU / LIGHT_COLORS.len() as f32;
            let position = Quat::from_rotation_y(angle) * Vec3::new(-1.0, 1.0, -1.0);
            let light = store.spawn();
            store
                .with(light, Transform::new().with_translation(position))?
                .with(
                    light,
                    PointLight {
                        intensity: LIGHT_INTENSITY,
                        color: *color,
                    },
                )?
                .with(light, Color(*color))?;
        }

        let viewer = store.spawn();
        store.insert(viewer, Transform::new().with_translation(Vec3::new(0.0, 0.0, -2.5)))?;

        let emitter = store.spawn();
        store
            .with(emitter, Transform::new().with_translation(Vec3::new(0.0, -0.5, 1.0)))?
            .with(emitter, ParticleEmitter::from(&config.particles))?;

        info!("Scene ready with {} entities", store.entity_count());
        Ok(Self {
            store,
            viewer,
            emitter,
        })
    }

    /// Orbit the lights by one frame and collect them for the uniform block.
    fn update_lights(&mut self, frame_time: f32) -> Vec<GpuPointLight> {
        self.store
            .lights_mut()
            .map(|(_, light, transform)| {
                transform.translation = orbit(transform.translation, frame_time);
                GpuPointLight::new(transform.translation, light.color, light.intensity)
            })
            .collect()
    }

    fn emitter_position(&self) -> Vec3 {
        match self.store.get::<ParticleEmitter>(self.emitter) {
            Some(emitter) if emitter.active => self
                .store
                .get::<Transform>(self.emitter)
                .map(|t| t.translation)
                .unwrap_or_default(),
            _ => Vec3::ZERO,
        }
    }
}

struct App {
    config: EmberConfig,
    // Field order is drop order: the renderer owns the window's surface.
    renderer: Option<Renderer>,
    window: Option<Window>,
    scene: Scene,
    camera: Camera,
    controller: MovementController,
    input: InputState,
    timer: Timer,
    error: Option<anyhow::Error>,
}

impl App {
    fn new(config: EmberConfig) -> Result<Self> {
        let scene = Scene::new(&config)?;
        Ok(Self {
            config,
            renderer: None,
            window: None,
            scene,
            camera: Camera::new(),
            controller: MovementController::new(),
            input: InputState::new(),
            timer: Timer::new(),
            error: None,
        })
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        error!("{:#}", err);
        self.error = Some(err);
        event_loop.exit();
    }

    fn redraw(&mut self) -> Result<()> {
        let frame_time = self.timer.delta_secs();
        let rand_seed = self.timer.monotonic_seed();
        let (Some(window), Some(renderer)) = (self.window.as_mut(), self.renderer.as_mut()) else {
            return Ok(());
        };

        if let Some(viewer) = self.scene.store.get_mut::<Transform>(self.scene.viewer) {
            self.controller
                .move_in_plane_xz(&self.input, frame_time, viewer);
            self.camera.set_view_yxz(viewer.translation, viewer.rotation);
        }

        let (scene, camera) = (&mut self.scene, &mut self.camera);
        renderer.render_frame(window, frame_time, |frame| {
            frame_inputs(scene, camera, frame.aspect_ratio(), frame_time, rand_seed)
        })?;
        self.input.end_frame();
        Ok(())
    }
}

/// Projection and uniforms for a frame whose chain has the given aspect ratio.
fn frame_inputs(
    scene: &mut Scene,
    camera: &mut Camera,
    aspect: f32,
    frame_time: f32,
    rand_seed: f32,
) -> FrameInputs {
    camera.set_perspective_projection(FOV_Y_DEGREES.to_radians(), aspect, NEAR_PLANE, FAR_PLANE);
    FrameInputs {
        projection: camera.projection(),
        view: camera.view(),
        inverse_view: camera.inverse_view(),
        lights: scene.update_lights(frame_time),
        emitter_pos: scene.emitter_position(),
        rand_seed,
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let window = match Window::new(event_loop, &self.config.window) {
            Ok(window) => window,
            Err(e) => return self.fail(event_loop, anyhow::Error::from(e).context("creating window")),
        };
        match Renderer::new(&window, &self.config) {
            Ok(renderer) => {
                info!("Initialization complete, entering main loop");
                self.renderer = Some(renderer);
                self.window = Some(window);
                self.timer.reset();
            }
            Err(e) => self.fail(event_loop, anyhow::Error::from(e).context("creating renderer")),
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested, shutting down");
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                // Only the flag is raised here; the orchestrator rebuilds in end_frame.
                if let Some(window) = self.window.as_mut() {
                    window.resize(size.width, size.height);
                }
            }
            WindowEvent::KeyboardInput { event, .. } => {
                self.input.handle_key_event(&event);
                if self.input.is_just_pressed(KeyCode::Escape) {
                    event_loop.exit();
                }
            }
            WindowEvent::RedrawRequested => {
                if let Err(e) = self.redraw() {
                    self.fail(event_loop, e.context("rendering frame"));
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = self.window.as_ref() {
            window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        // Renderer first: it waits for the device and needs the window's surface.
        self.renderer = None;
        self.window = None;
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    ember_core::init_logging();
    info!("Starting ember");

    let config = args.load_config()?;

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(config)?;
    event_loop.run_app(&mut app)?;

    match app.error.take() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_override_config() {
        let args = Args::parse_from([
            "ember",
            "--config",
            "does-not-exist.toml",
            "--validation",
            "--max-particles",
            "512",
        ]);
        let config = args.load_config().unwrap();
        assert!(config.render.validation);
        assert_eq!(config.particles.max_particles, 512);
    }

    #[test]
    fn test_zero_particles_rejected() {
        let args = Args::parse_from(["ember", "--config", "does-not-exist.toml", "--max-particles", "0"]);
        assert!(args.load_config().is_err());
    }

    #[test]
    fn test_scene_layout() {
        let mut scene = Scene::new(&EmberConfig::default()).unwrap();
        assert_eq!(scene.store.entity_count(), LIGHT_COLORS.len() + 2);

        let lights = scene.update_lights(0.0);
        assert_eq!(lights.len(), LIGHT_COLORS.len());
        assert!(lights.iter().all(|l| l.color.w == LIGHT_INTENSITY));
        assert_eq!(scene.emitter_position(), Vec3::new(0.0, -0.5, 1.0));
    }

    #[test]
    fn test_lights_keep_height_while_orbiting() {
        let mut scene = Scene::new(&EmberConfig::default()).unwrap();
        let before = scene.update_lights(0.0);
        let after = scene.update_lights(1.0);
        for (a, b) in before.iter().zip(&after) {
            assert!((a.position.y - b.position.y).abs() < 1e-5);
            assert!((a.position.truncate().length() - b.position.truncate().length()).abs() < 1e-5);
            assert_ne!(a.position, b.position);
        }
    }

    #[test]
    fn test_projection_uses_frame_aspect() {
        let mut scene = Scene::new(&EmberConfig::default()).unwrap();
        let mut camera = Camera::new();

        let inputs = frame_inputs(&mut scene, &mut camera, 2.0, 0.0, 1.0);
        let mut expected = Camera::new();
        expected.set_perspective_projection(FOV_Y_DEGREES.to_radians(), 2.0, NEAR_PLANE, FAR_PLANE);
        assert_eq!(inputs.projection, expected.projection());

        // Width scale halves when the frame gets twice as wide.
        let wider = frame_inputs(&mut scene, &mut camera, 4.0, 0.0, 1.0);
        let ratio = inputs.projection.x_axis.x / wider.projection.x_axis.x;
        assert!((ratio - 2.0).abs() < 1e-5);
        assert_eq!(wider.lights.len(), LIGHT_COLORS.len());
    }
}
