//! Render pipeline definitions and their WGSL shaders.
//!
//! - `basic` builds the scene pipelines, one per [`basic::PipelineKey`]
//! - `shader.wgsl` is the lit material shader
//! - `unlit.wgsl` outputs base colour and emission only

pub mod basic;
