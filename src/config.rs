//! Engine configuration.

/// Settings read when the world is built. Timing fields can also be changed
/// later through [`crate::world::World::config_mut`]; the clock picks them up
/// on the next frame.
#[derive(Clone, Debug, PartialEq)]
pub struct EngineConfig {
    /// Seconds per fixed update.
    pub fixed_delta: f32,
    /// Fixed updates allowed in a single frame before the backlog is dropped.
    pub max_catch_up_steps: u32,
    pub time_scale: f32,
    /// Id of the canvas element the engine renders into on wasm32.
    pub canvas_id: String,
    pub window_title: String,
    /// Directory (native) or URL path (wasm32) assets are loaded from.
    pub asset_root: String,
    pub log_level: log::Level,
    /// Whether errors are recorded in [`crate::error::Diagnostics`].
    pub trace_errors: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fixed_delta: 1.0 / 50.0,
            max_catch_up_steps: 5,
            time_scale: 1.0,
            canvas_id: "canvas".to_string(),
            window_title: "scene-ngin".to_string(),
            asset_root: "assets".to_string(),
            log_level: log::Level::Info,
            trace_errors: true,
        }
    }
}
