//! Engine data structures: entities, the transform hierarchy, components and
//! the assets they reference.
//!
//! - `entity` hands out generation-checked ids
//! - `registry` is the indexed store meshes and materials live in
//! - `transform` holds local TRS, parent links and cached world matrices
//! - `component` is the closed set of components a game object can carry
//! - `game_object` and `scene` own the objects of a level
//! - `mesh`, `material` and `texture` describe what gets drawn
//! - `camera`, `light`, `physics` and `script` are component payloads

pub mod camera;
pub mod component;
pub mod entity;
pub mod game_object;
pub mod light;
pub mod material;
pub mod mesh;
pub mod physics;
pub mod registry;
pub mod scene;
pub mod script;
pub mod texture;
pub mod transform;
