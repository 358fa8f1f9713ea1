//! Render batching and the draw pass.
//!
//! [`RenderBatches::collect`] sorts the renderers of a scene into material
//! keyed batches, split into an opaque and a transparent list. Both keep the
//! order in which objects and materials were first seen. [`RenderBatches::draw`]
//! then issues the opaque pass followed by the transparent pass:
//!
//! - opaque: depth test and depth write on, blending off
//! - transparent: alpha blending, each batch sorted back to front by the
//!   distance between the object and the camera
//!
//! Blending is switched off and depth writes back on once both passes ran.

use std::collections::HashSet;

use cgmath::{InnerSpace, Vector3};

use crate::{
    data_structures::{
        component::{ComponentGroup, ComponentId},
        entity::EntityId,
        material::{Material, MaterialId},
        mesh::MeshId,
        registry::IndexedRegistry,
        scene::Scene,
    },
    device::{BlendMode, UniformSlot},
    error::EngineError,
    resources::buffers::GpuResources,
};

/// One renderer of one object.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderItem {
    pub object: EntityId,
    pub renderer: ComponentId,
    pub mesh: MeshId,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RenderBatch {
    pub material: MaterialId,
    pub items: Vec<RenderItem>,
}

/// Counters and per-object failures of one draw.
#[derive(Debug, Default)]
pub struct DrawStats {
    pub draw_calls: usize,
    pub skipped: usize,
    pub errors: Vec<EngineError>,
}

#[derive(Debug, Default)]
pub struct RenderBatches {
    opaque: Vec<RenderBatch>,
    transparent: Vec<RenderBatch>,
    warned_materials: HashSet<MaterialId>,
    warned_meshes: HashSet<MeshId>,
}

fn bucket(batches: &mut Vec<RenderBatch>, material: MaterialId) -> &mut RenderBatch {
    let index = match batches.iter().position(|batch| batch.material == material) {
        Some(index) => index,
        None => {
            batches.push(RenderBatch {
                material,
                items: Vec::new(),
            });
            batches.len() - 1
        }
    };
    &mut batches[index]
}

impl RenderBatches {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn opaque(&self) -> &[RenderBatch] {
        &self.opaque
    }

    pub fn transparent(&self) -> &[RenderBatch] {
        &self.transparent
    }

    /// Rebuilds the batches from the active objects of `scene`.
    ///
    /// Renderers whose material is unknown, or whose object has no mesh, are
    /// left out.
    pub fn collect(&mut self, scene: &Scene, materials: &IndexedRegistry<Material>) {
        self.opaque.clear();
        self.transparent.clear();
        for object in scene.game_objects().filter(|object| object.is_active) {
            let Some(mesh) = object.mesh_filter().and_then(|filter| filter.mesh) else {
                continue;
            };
            for component in object.components_in_group(ComponentGroup::Renderer) {
                if !component.is_active {
                    continue;
                }
                let Some(material_id) = component.as_renderer().and_then(|r| r.material()) else {
                    continue;
                };
                let Some(material) = materials.get(material_id) else {
                    continue;
                };
                let item = RenderItem {
                    object: object.id(),
                    renderer: component.id(),
                    mesh,
                };
                let list = if material.is_transparent() {
                    &mut self.transparent
                } else {
                    &mut self.opaque
                };
                bucket(list, material_id).items.push(item);
            }
        }
    }

    /// Draws what [`RenderBatches::collect`] gathered. Problems with single
    /// objects do not stop the pass; they are returned in the stats.
    pub fn draw(
        &mut self,
        scene: &mut Scene,
        materials: &mut IndexedRegistry<Material>,
        gpu: &mut GpuResources,
        camera_position: Vector3<f32>,
    ) -> DrawStats {
        let Self {
            opaque,
            transparent,
            warned_materials,
            warned_meshes,
        } = self;
        let mut stats = DrawStats::default();
        let mut pass = Pass {
            scene,
            materials,
            gpu,
            warned_materials,
            warned_meshes,
            stats: &mut stats,
        };

        let device = pass.gpu.device();
        device.set_depth_test(true);
        device.set_depth_write(true);
        device.set_blend(BlendMode::Disabled);
        for batch in opaque.iter() {
            pass.batch(batch);
        }

        for batch in transparent.iter_mut() {
            sort_back_to_front(pass.scene, &mut batch.items, camera_position);
        }
        pass.gpu.device().set_blend(BlendMode::Alpha);
        for batch in transparent.iter() {
            pass.batch(batch);
        }

        let device = pass.gpu.device();
        device.set_blend(BlendMode::Disabled);
        device.set_depth_write(true);
        stats
    }
}

/// Farthest first. Equal distances keep their collection order.
fn sort_back_to_front(scene: &Scene, items: &mut Vec<RenderItem>, camera: Vector3<f32>) {
    let mut keyed: Vec<(f32, RenderItem)> = items
        .drain(..)
        .map(|item| {
            let distance = scene
                .world_matrix(item.object)
                .map(|world| (world.w.truncate() - camera).magnitude())
                .unwrap_or(0.0);
            (distance, item)
        })
        .collect();
    keyed.sort_by(|a, b| b.0.total_cmp(&a.0));
    items.extend(keyed.into_iter().map(|(_, item)| item));
}

struct Pass<'a> {
    scene: &'a mut Scene,
    materials: &'a mut IndexedRegistry<Material>,
    gpu: &'a mut GpuResources,
    warned_materials: &'a mut HashSet<MaterialId>,
    warned_meshes: &'a mut HashSet<MeshId>,
    stats: &'a mut DrawStats,
}

impl Pass<'_> {
    fn batch(&mut self, batch: &RenderBatch) {
        let Some(material) = self.materials.get_mut(batch.material) else {
            self.stats.skipped += batch.items.len();
            return;
        };
        match material.bind(self.gpu) {
            Ok(true) => (),
            Ok(false) => {
                if self.warned_materials.insert(batch.material) {
                    log::warn!("Material {} has no shader, skipping it", material.name);
                }
                self.stats.skipped += batch.items.len();
                return;
            }
            Err(e) => {
                self.stats.skipped += batch.items.len();
                self.stats.errors.push(e);
                return;
            }
        }
        for item in &batch.items {
            match self.item(item) {
                Ok(true) => self.stats.draw_calls += 1,
                Ok(false) => self.stats.skipped += 1,
                Err(e) => {
                    self.stats.skipped += 1;
                    self.stats.errors.push(e);
                }
            }
        }
    }

    /// Uploads the model matrix and draws. Ok(false) when the item had to be
    /// skipped.
    fn item(&mut self, item: &RenderItem) -> Result<bool, EngineError> {
        let Some(buffers) = self.gpu.mesh_buffer(item.mesh).cloned() else {
            if self.warned_meshes.insert(item.mesh) {
                log::warn!("Mesh {} has no GPU buffers, skipping its objects", item.mesh);
            }
            return Ok(false);
        };
        let Some(world) = self.scene.world_matrix(item.object) else {
            return Ok(false);
        };
        let Some(renderer) = self
            .scene
            .game_object_mut(item.object)
            .and_then(|object| object.component_mut(item.renderer))
            .and_then(|component| component.as_mesh_renderer_mut())
        else {
            return Ok(false);
        };
        renderer.sync_model_matrix(self.gpu, item.renderer, world)?;
        let uniforms = self
            .gpu
            .uniform_buffer(item.renderer)
            .ok_or(EngineError::MissingBuffer(item.renderer))?;
        let device = self.gpu.device();
        device.bind_uniform_buffer(UniformSlot::Object, uniforms)?;
        device.draw_indexed(
            buffers.vertex_array,
            buffers.topology,
            buffers.index_type,
            buffers.index_count,
        )?;
        Ok(true)
    }
}
