//! scene-ngin
//!
//! A cross-platform entity/component 3D engine focused on native and WASM
//! compatibility. Game objects carry a transform and a small closed set of
//! components, live in scenes and are drawn in material batches: opaque
//! first, then transparent objects back to front. Scenes can be imported from
//! binary glTF (GLB) files.
//!
//! High-level modules
//! - `config`: engine settings
//! - `context`: the wgpu implementation of the graphics device
//! - `data_structures`: entities, transforms, components, scenes and assets
//! - `device`: the graphics device boundary and a recording device for tests
//! - `error`: engine errors and the diagnostics sink
//! - `flow`: frame timing and the winit event loop
//! - `pipelines`: render pipelines and WGSL shaders
//! - `render`: render batching and the draw pass
//! - `resources`: GPU buffers, uniform blocks and GLB loading
//! - `world`: the application root that owns all of the above
//!

pub mod config;
pub mod context;
pub mod data_structures;
pub mod device;
pub mod error;
pub mod flow;
pub mod pipelines;
pub mod render;
pub mod resources;
pub mod world;

// Re-exports commonly used types for convenience in downstream code.
pub use cgmath::*;
pub use config::EngineConfig;
pub use data_structures::{
    component::{Component, ComponentKind},
    entity::EntityId,
    game_object::GameObject,
    scene::Scene,
};
pub use error::EngineError;
pub use flow::{run, FrameTime, Out, Setup};
pub use winit::event::WindowEvent;
pub use world::World;
