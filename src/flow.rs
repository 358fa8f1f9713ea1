//! Frame timing and the application event loop.
//!
//! [`FrameClock`] turns the real time between two redraws into a number of
//! fixed updates plus one variable frame. [`run`] opens a window (or binds the
//! page canvas on wasm32), builds the [`World`] on top of a wgpu device and
//! drives it from winit's redraw events.
//!
//! # Frame order
//!
//! 1. fixed updates (physics, then scripts), as many as the accumulator holds
//!    up to the catch-up cap
//! 2. update
//! 3. late update
//! 4. pre-render
//! 5. render
//! 6. post-render
//! 7. draw-overlay

use std::{fmt::Debug, pin::Pin, sync::Arc};

use instant::{Duration, Instant};
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    window::Window,
};

use crate::{config::EngineConfig, context::WgpuDevice, world::World};

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

/// Timing values handed to scripts.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FrameTime {
    /// Scaled seconds since the previous frame.
    pub delta: f32,
    pub unscaled_delta: f32,
    pub fixed_delta: f32,
    /// Scaled seconds since start.
    pub time: f32,
    /// Real seconds since start, paused time included.
    pub realtime: f32,
    pub frame: u64,
}

/// What one call to [`FrameClock::advance`] asks the world to do.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameSteps {
    pub fixed_steps: u32,
    /// False while paused: no update, no render.
    pub run: bool,
}

const DEFAULT_FIXED_DELTA: f32 = 1.0 / 50.0;

#[derive(Debug, Clone)]
pub struct FrameClock {
    fixed_delta: f32,
    pub max_catch_up_steps: u32,
    pub time_scale: f32,
    accumulator: f32,
    delta: f32,
    unscaled_delta: f32,
    time: f32,
    realtime: f32,
    frame: u64,
    paused: bool,
    step_requested: bool,
    fps: u32,
    fps_frames: u32,
    fps_window: f32,
}

impl FrameClock {
    /// A non-positive or non-finite `fixed_delta` falls back to 1/50 s.
    pub fn new(fixed_delta: f32, max_catch_up_steps: u32, time_scale: f32) -> Self {
        let mut clock = Self {
            fixed_delta: DEFAULT_FIXED_DELTA,
            max_catch_up_steps,
            time_scale,
            accumulator: 0.0,
            delta: 0.0,
            unscaled_delta: 0.0,
            time: 0.0,
            realtime: 0.0,
            frame: 0,
            paused: false,
            step_requested: false,
            fps: 0,
            fps_frames: 0,
            fps_window: 0.0,
        };
        clock.set_fixed_delta(fixed_delta);
        clock
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.fixed_delta, config.max_catch_up_steps, config.time_scale)
    }

    pub fn fixed_delta(&self) -> f32 {
        self.fixed_delta
    }

    /// Refuses steps that are not a positive, finite number of seconds and
    /// keeps the previous one.
    pub fn set_fixed_delta(&mut self, fixed_delta: f32) -> bool {
        if !(fixed_delta.is_finite() && fixed_delta > 0.0) {
            log::warn!(
                "Ignoring fixed delta {}, keeping {}",
                fixed_delta,
                self.fixed_delta
            );
            return false;
        }
        self.fixed_delta = fixed_delta;
        true
    }

    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        self.paused = false;
        self.step_requested = false;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Lets exactly one frame through on the next advance. Ignored unless
    /// paused.
    pub fn step(&mut self) {
        if self.paused {
            self.step_requested = true;
        }
    }

    /// Frames counted over the last full second.
    pub fn fps(&self) -> u32 {
        self.fps
    }

    pub fn accumulator(&self) -> f32 {
        self.accumulator
    }

    pub fn time(&self) -> FrameTime {
        FrameTime {
            delta: self.delta,
            unscaled_delta: self.unscaled_delta,
            fixed_delta: self.fixed_delta,
            time: self.time,
            realtime: self.realtime,
            frame: self.frame,
        }
    }

    pub fn advance(&mut self, real_delta: Duration) -> FrameSteps {
        let unscaled = real_delta.as_secs_f32();
        self.realtime += unscaled;

        if self.paused && !self.step_requested {
            self.delta = 0.0;
            self.unscaled_delta = 0.0;
            return FrameSteps {
                fixed_steps: 0,
                run: false,
            };
        }
        self.step_requested = false;

        self.unscaled_delta = unscaled;
        self.delta = unscaled * self.time_scale;
        self.time += self.delta;
        self.accumulator += self.delta;

        let mut fixed_steps = 0;
        while self.accumulator >= self.fixed_delta && fixed_steps < self.max_catch_up_steps {
            self.accumulator -= self.fixed_delta;
            fixed_steps += 1;
        }
        if self.accumulator >= self.fixed_delta {
            log::debug!(
                "Dropping {:.3}s of fixed update backlog",
                self.accumulator - self.accumulator % self.fixed_delta
            );
            self.accumulator %= self.fixed_delta;
        }

        self.frame += 1;
        self.fps_frames += 1;
        self.fps_window += unscaled;
        if self.fps_window >= 1.0 {
            self.fps = self.fps_frames;
            self.fps_frames = 0;
            self.fps_window = 0.0;
        }
        FrameSteps {
            fixed_steps,
            run: true,
        }
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

/// Output of the setup callback.
///
/// `FutFn` futures are resolved off the frame loop; each yields a mutation
/// that is applied to the world once it is ready. This is how assets loaded
/// asynchronously reach the scene without borrowing the world across an
/// await.
pub enum Out {
    FutFn(Vec<Box<dyn Future<Output = Box<dyn FnOnce(&mut World)>>>>),
    Empty,
}

impl Default for Out {
    fn default() -> Self {
        Self::Empty
    }
}

/// Builds the initial scene. Runs once, after the device is ready.
pub type Setup = Box<dyn FnOnce(&mut World) -> Out>;

pub(crate) enum FlowEvent {
    #[allow(dead_code)]
    Initialized(Box<World>),
    #[allow(dead_code)]
    Mut(Box<dyn FnOnce(&mut World)>),
    #[allow(dead_code)]
    Exit,
}

impl Debug for FlowEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initialized(_) => f.write_str("Initialized"),
            Self::Mut(_) => f.write_str("Mut(|&mut World| -> {...})"),
            Self::Exit => f.write_str("Exit"),
        }
    }
}

pub struct App {
    #[cfg(not(target_arch = "wasm32"))]
    async_runtime: tokio::runtime::Runtime,
    proxy: winit::event_loop::EventLoopProxy<FlowEvent>,
    config: EngineConfig,
    window: Option<Arc<Window>>,
    world: Option<World>,
    setup: Option<Setup>,
    last_time: Instant,
}

impl App {
    fn new(
        event_loop: &EventLoop<FlowEvent>,
        config: EngineConfig,
        setup: Setup,
    ) -> anyhow::Result<Self> {
        let proxy = event_loop.create_proxy();
        #[cfg(not(target_arch = "wasm32"))]
        let async_runtime = tokio::runtime::Runtime::new()?;
        Ok(Self {
            #[cfg(not(target_arch = "wasm32"))]
            async_runtime,
            proxy,
            config,
            window: None,
            world: None,
            setup: Some(setup),
            last_time: Instant::now(),
        })
    }

    /// Sizes the world to the window, runs the setup callback and starts
    /// the scripts.
    fn initialize(&mut self, mut world: World) {
        if let Some(window) = &self.window {
            let size = window.inner_size();
            world.resize(size.width, size.height);
        }
        if let Some(setup) = self.setup.take() {
            let out = setup(&mut world);
            handle_flow_output(
                #[cfg(not(target_arch = "wasm32"))]
                &self.async_runtime,
                &mut world,
                self.proxy.clone(),
                out,
            );
        }
        world.start();
        self.world = Some(world);
        self.last_time = Instant::now();
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }
}

impl ApplicationHandler<FlowEvent> for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        #[allow(unused_mut)]
        let mut window_attributes =
            Window::default_attributes().with_title(self.config.window_title.clone());

        #[cfg(target_arch = "wasm32")]
        {
            use wasm_bindgen::JsCast;
            use winit::platform::web::WindowAttributesExtWebSys;

            let window = wgpu::web_sys::window().unwrap_throw();
            let document = window.document().unwrap_throw();
            let canvas = document
                .get_element_by_id(&self.config.canvas_id)
                .unwrap_throw();
            let html_canvas_element = canvas.unchecked_into();
            window_attributes = window_attributes.with_canvas(Some(html_canvas_element));
        }

        let window = match event_loop.create_window(window_attributes) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                log::error!("Could not create a window: {}", e);
                event_loop.exit();
                return;
            }
        };
        self.window = Some(window.clone());

        let config = self.config.clone();
        let init_future = async move {
            let device = WgpuDevice::new(window).await?;
            anyhow::Ok(World::new(config, device))
        };

        #[cfg(not(target_arch = "wasm32"))]
        {
            match self.async_runtime.block_on(init_future) {
                Ok(world) => self.initialize(world),
                Err(e) => {
                    log::error!("App initialization failed. Cannot create the device: {}", e);
                    event_loop.exit();
                }
            }
        }

        #[cfg(target_arch = "wasm32")]
        {
            let proxy = self.proxy.clone();
            wasm_bindgen_futures::spawn_local(async move {
                match init_future.await {
                    Ok(world) => {
                        assert!(proxy.send_event(FlowEvent::Initialized(Box::new(world))).is_ok());
                    }
                    Err(e) => {
                        log::error!("App initialization failed. Cannot create the device: {}", e);
                        let _ = proxy.send_event(FlowEvent::Exit);
                    }
                }
            });
        }
    }

    fn user_event(&mut self, event_loop: &ActiveEventLoop, event: FlowEvent) {
        match event {
            // This is the message from our wasm `spawn_local`
            FlowEvent::Initialized(world) => self.initialize(*world),
            FlowEvent::Mut(mutation) => {
                if let Some(world) = &mut self.world {
                    mutation(world);
                }
            }
            FlowEvent::Exit => event_loop.exit(),
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        let Some(world) = &mut self.world else {
            return;
        };
        match event {
            WindowEvent::CloseRequested => {
                world.shutdown();
                event_loop.exit();
            }
            WindowEvent::Resized(size) => world.resize(size.width, size.height),
            WindowEvent::RedrawRequested => {
                let dt = self.last_time.elapsed();
                self.last_time = Instant::now();
                world.frame(dt);
                if let Some(window) = &self.window {
                    window.request_redraw();
                }
            }
            _ => {}
        }
    }
}

fn handle_flow_output(
    #[cfg(not(target_arch = "wasm32"))] async_runtime: &tokio::runtime::Runtime,
    #[allow(unused_variables)] world: &mut World,
    #[allow(unused_variables)] proxy: winit::event_loop::EventLoopProxy<FlowEvent>,
    out: Out,
) {
    match out {
        // Mutate the world if the arch supports blocking, create an event otherwise
        Out::FutFn(futures) => {
            let mutations: Vec<Pin<Box<dyn Future<Output = Box<dyn FnOnce(&mut World)>>>>> =
                futures.into_iter().map(Pin::from).collect();
            let fut = async move { futures::future::join_all(mutations).await };
            #[cfg(not(target_arch = "wasm32"))]
            {
                let resolved: Vec<Box<dyn FnOnce(&mut World)>> = async_runtime.block_on(fut);
                resolved.into_iter().for_each(|mutation| mutation(world));
            }

            #[cfg(target_arch = "wasm32")]
            {
                wasm_bindgen_futures::spawn_local(async move {
                    let resolved = fut.await;
                    for mutation in resolved {
                        assert!(proxy.send_event(FlowEvent::Mut(mutation)).is_ok());
                    }
                });
            }
        }
        Out::Empty => (),
    }
}

/// `RUST_LOG` style filtering with the configured level as the default.
#[cfg(not(target_arch = "wasm32"))]
fn native_logger(config: &EngineConfig) -> env_logger::Builder {
    let mut builder = env_logger::Builder::from_default_env();
    builder.filter_level(config.log_level.to_level_filter());
    builder
}

/// Opens the window, builds the world and runs until the window closes.
pub fn run(config: EngineConfig, setup: Setup) -> anyhow::Result<()> {
    #[cfg(not(target_arch = "wasm32"))]
    {
        if let Err(e) = native_logger(&config).try_init() {
            println!("Warning: Could not initialize logger: {}", e);
        };
    }

    #[cfg(target_arch = "wasm32")]
    {
        console_log::init_with_level(config.log_level).unwrap_throw();
    }

    let event_loop: EventLoop<FlowEvent> = EventLoop::with_user_event().build()?;
    let mut app = App::new(&event_loop, config, setup)?;
    event_loop.run_app(&mut app)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fps_counts_frames_per_second() {
        let mut clock = FrameClock::default();
        for _ in 0..4 {
            clock.advance(Duration::from_millis(250));
        }
        assert_eq!(clock.fps(), 4);
    }

    #[cfg(not(target_arch = "wasm32"))]
    #[test]
    fn native_logger_uses_the_configured_level() {
        let config = EngineConfig {
            log_level: log::Level::Warn,
            ..EngineConfig::default()
        };
        assert_eq!(
            native_logger(&config).build().filter(),
            log::LevelFilter::Warn
        );
    }

    #[test]
    fn non_positive_fixed_delta_is_refused() {
        let mut clock = FrameClock::new(0.0, 5, 1.0);
        assert_eq!(clock.fixed_delta(), DEFAULT_FIXED_DELTA);
        assert!(!clock.set_fixed_delta(-1.0));
        assert!(!clock.set_fixed_delta(f32::NAN));
        assert_eq!(clock.fixed_delta(), DEFAULT_FIXED_DELTA);

        let steps = clock.advance(Duration::from_millis(50));
        assert_eq!(steps.fixed_steps, 2);
        assert!(clock.accumulator().is_finite());
    }
}
