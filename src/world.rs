//! The application root.
//!
//! [`World`] owns everything the engine keeps between frames: id allocation,
//! scenes, meshes, materials, GPU resources, diagnostics and the frame clock.
//! There are no globals; hosts and scripts reach engine state through a
//! `&mut World` or a [`ScriptContext`].

use cgmath::{InnerSpace, Vector3, Vector4};
use instant::Duration;

use crate::{
    config::EngineConfig,
    data_structures::{
        camera::{self, Camera},
        component::{Component, ComponentGroup, ComponentKind, LightSource},
        entity::{EntityAllocator, EntityId},
        game_object::GameObject,
        light::LightKind,
        material::{Material, MaterialId},
        mesh::{Mesh, MeshId},
        physics::{Pose, Ray, IGNORE_RAYCAST_TAG},
        registry::{IndexedRegistry, RegistryKeys},
        scene::{Scene, SceneManager},
        script::{LifecyclePhase, Script, ScriptContext},
        transform::{self, TransformLookup},
    },
    device::{GraphicsDevice, UniformSlot},
    error::{Diagnostics, EngineError},
    flow::{FrameClock, FrameTime},
    render::{DrawStats, RenderBatches},
    resources::{
        blob::BlobStore, buffers::GpuResources, convert::LoadedTexture,
        uniform_block::UniformBlock,
    },
};

/// Nearest collider hit of [`World::raycast`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RaycastHit {
    pub object: EntityId,
    pub point: Vector3<f32>,
    pub distance: f32,
}

const AMBIENT_COLOR: &str = "ambient_color";
const AMBIENT_INTENSITY: &str = "ambient_intensity";
const LIGHT_DIRECTION: &str = "light_direction";
const LIGHT_PADDING: &str = "light_padding";
const LIGHT_COLOR: &str = "light_color";
const LIGHT_INTENSITY: &str = "light_intensity";

/// Ambient term used when the scene has no ambient light.
const DEFAULT_AMBIENT: ([f32; 3], f32) = ([1.0; 3], 0.1);

fn lighting_block() -> Result<UniformBlock, EngineError> {
    let mut block = UniformBlock::new();
    block.define_vec3(AMBIENT_COLOR, DEFAULT_AMBIENT.0)?;
    block.define_float(AMBIENT_INTENSITY, DEFAULT_AMBIENT.1)?;
    block.define_vec3(LIGHT_DIRECTION, [0.0, 0.0, 1.0])?;
    block.define_float(LIGHT_PADDING, 0.0)?;
    block.define_vec3(LIGHT_COLOR, [1.0; 3])?;
    block.define_float(LIGHT_INTENSITY, 0.0)?;
    Ok(block)
}

pub struct World {
    config: EngineConfig,
    pub ids: EntityAllocator,
    pub scenes: SceneManager,
    pub gpu: GpuResources,
    pub meshes: IndexedRegistry<Mesh>,
    pub materials: IndexedRegistry<Material>,
    pub diagnostics: Diagnostics,
    pub blobs: BlobStore,
    clock: FrameClock,
    batches: RenderBatches,
    lighting: UniformBlock,
    lighting_owner: EntityId,
    started: bool,
    viewport: (u32, u32),
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("scenes", &self.scenes.len())
            .field("meshes", &self.meshes.len())
            .field("materials", &self.materials.len())
            .field("gpu", &self.gpu)
            .field("started", &self.started)
            .finish()
    }
}

impl World {
    pub fn new(config: EngineConfig, device: impl GraphicsDevice + 'static) -> Self {
        let mut ids = EntityAllocator::new();
        let lighting_owner = ids.create();
        let lighting = lighting_block().unwrap_or_else(|e| {
            log::error!("Lighting block layout: {}", e);
            UniformBlock::new()
        });
        let mut diagnostics = Diagnostics::new();
        diagnostics.set_enabled(config.trace_errors);
        Self {
            clock: FrameClock::from_config(&config),
            config,
            ids,
            scenes: SceneManager::new(),
            gpu: GpuResources::new(device),
            meshes: IndexedRegistry::new(),
            materials: IndexedRegistry::new(),
            diagnostics,
            blobs: BlobStore::new(),
            batches: RenderBatches::new(),
            lighting,
            lighting_owner,
            started: false,
            viewport: (0, 0),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut EngineConfig {
        &mut self.config
    }

    pub fn clock(&self) -> &FrameClock {
        &self.clock
    }

    pub fn time(&self) -> FrameTime {
        self.clock.time()
    }

    pub fn pause(&mut self) {
        self.clock.pause();
    }

    pub fn resume(&mut self) {
        self.clock.resume();
    }

    /// Runs a single frame on the next redraw while paused.
    pub fn step(&mut self) {
        self.clock.step();
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn viewport(&self) -> (u32, u32) {
        self.viewport
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.viewport = (width, height);
        self.gpu.device().resize(width, height);
    }

    /// Creates an empty scene and makes it current.
    pub fn create_scene(&mut self, name: impl Into<String>) -> usize {
        let scene = Scene::new(&mut self.ids, name);
        self.scenes.add_scene(scene)
    }

    pub fn scene(&self) -> Result<&Scene, EngineError> {
        self.scenes.current()
    }

    pub fn scene_mut(&mut self) -> Result<&mut Scene, EngineError> {
        self.scenes.current_mut()
    }

    /// A new game object with ids from this world. It is not part of any
    /// scene until [`World::add_game_object`].
    pub fn spawn(&mut self, name: impl Into<String>) -> GameObject {
        GameObject::new(&mut self.ids, name)
    }

    /// Adds `object` to the current scene.
    pub fn add_game_object(&mut self, object: GameObject) -> Result<EntityId, EngineError> {
        self.scenes.current_mut()?.add_game_object(object)
    }

    /// Uploads `mesh` and registers it under its name.
    pub fn add_mesh(&mut self, mesh: Mesh) -> Result<MeshId, EngineError> {
        let id = mesh.id();
        self.gpu.create_mesh_buffer(&mesh)?;
        let name = mesh.name.clone();
        if let Err(e) = self.meshes.add(id, mesh, RegistryKeys::named(name)) {
            self.gpu.release_mesh(id);
            return Err(e);
        }
        Ok(id)
    }

    pub fn add_material(&mut self, material: Material) -> Result<MaterialId, EngineError> {
        let id = material.id();
        let name = material.name.clone();
        self.materials.add(id, material, RegistryKeys::named(name))?;
        Ok(id)
    }

    pub fn destroy_mesh(&mut self, id: MeshId) -> bool {
        if self.meshes.remove(id).is_none() {
            return false;
        }
        self.gpu.release_mesh(id);
        self.ids.destroy(id);
        true
    }

    pub fn destroy_material(&mut self, id: MaterialId) -> bool {
        let Some(mut material) = self.materials.remove(id) else {
            return false;
        };
        material.release(&mut self.gpu);
        self.ids.destroy(id);
        true
    }

    /// Removes `id` and its descendants from the current scene, releases
    /// their GPU resources and recycles their ids.
    pub fn destroy_game_object(&mut self, id: EntityId) -> Result<bool, EngineError> {
        let scene = self.scenes.current_mut()?;
        if !scene.contains(id) {
            return Ok(false);
        }
        let mut pending = vec![id];
        let mut doomed = Vec::new();
        while let Some(next) = pending.pop() {
            if let Some(transform) = scene.transform(next) {
                pending.extend_from_slice(transform.children());
            }
            doomed.push(next);
        }
        // leaves first so every removal detaches from a live parent
        for object_id in doomed.into_iter().rev() {
            let Some(mut object) = scene.remove_game_object(object_id) else {
                continue;
            };
            for component in object.components_mut() {
                component.release(&mut self.gpu);
                self.ids.destroy(component.id());
            }
            self.ids.destroy(object.transform().id());
            self.ids.destroy(object.id());
        }
        Ok(true)
    }

    /// Runs the start hooks of the current scene.
    ///
    /// Looking up the scene is a probe: when nothing is loaded yet the error
    /// is not recorded and scripts start with the first frame instead.
    pub fn start(&mut self) {
        let tracing = self.diagnostics.is_enabled();
        self.diagnostics.set_enabled(false);
        let probe = self.scenes.current().map(|_| ());
        if let Err(e) = &probe {
            self.diagnostics.report(e);
        }
        self.diagnostics.set_enabled(tracing);
        match probe {
            Ok(()) => self.dispatch(LifecyclePhase::Start),
            Err(e) => log::info!("Starting without a scene: {}", e),
        }
        self.started = true;
        log::info!("World started");
    }

    /// Advances the clock by `real_delta` and runs one frame.
    pub fn frame(&mut self, real_delta: Duration) {
        if !self.started {
            self.start();
        }
        if self.config.fixed_delta != self.clock.fixed_delta()
            && !self.clock.set_fixed_delta(self.config.fixed_delta)
        {
            self.config.fixed_delta = self.clock.fixed_delta();
        }
        self.clock.max_catch_up_steps = self.config.max_catch_up_steps;
        self.clock.time_scale = self.config.time_scale;

        let steps = self.clock.advance(real_delta);
        if !steps.run {
            return;
        }
        for _ in 0..steps.fixed_steps {
            self.physics_step(self.clock.fixed_delta());
            self.dispatch(LifecyclePhase::FixedUpdate);
        }
        self.dispatch(LifecyclePhase::Update);
        self.dispatch(LifecyclePhase::LateUpdate);
        self.dispatch(LifecyclePhase::PreRender);
        if let Err(e) = self.render_frame() {
            self.diagnostics.report(&e);
        }
        self.dispatch(LifecyclePhase::PostRender);
        self.dispatch(LifecyclePhase::DrawOverlay);
    }

    fn physics_step(&mut self, dt: f32) {
        let Ok(scene) = self.scenes.current_mut() else {
            return;
        };
        for id in scene.object_ids() {
            if let Some(object) = scene.game_object_mut(id).filter(|o| o.is_active) {
                object.step_physics(dt);
            }
        }
    }

    /// Calls `phase` on every active script of the current scene, in object
    /// insertion order.
    pub fn dispatch(&mut self, phase: LifecyclePhase) {
        let time = self.clock.time();
        let mut doomed = Vec::new();
        let Ok(scene) = self.scenes.current_mut() else {
            return;
        };
        for object in scene.object_ids() {
            let scripts = match scene.game_object(object) {
                Some(o) if o.is_active => o.component_ids_of_kind(ComponentKind::Script),
                _ => continue,
            };
            for script in scripts {
                let taken = scene
                    .game_object_mut(object)
                    .and_then(|o| o.component_mut(script))
                    .filter(|c| c.is_active)
                    .and_then(Component::as_script_mut)
                    .and_then(Script::take);
                let Some((mut behaviour, started)) = taken else {
                    continue;
                };
                let mut ctx = ScriptContext::new(
                    object,
                    &mut *scene,
                    &mut self.gpu,
                    &mut self.ids,
                    time,
                    &mut doomed,
                );
                let started = Script::run(behaviour.as_mut(), started, phase, &mut ctx);
                if let Some(slot) = scene
                    .game_object_mut(object)
                    .and_then(|o| o.component_mut(script))
                    .and_then(Component::as_script_mut)
                {
                    slot.restore(behaviour, started);
                }
            }
        }
        for id in doomed {
            if let Err(e) = self.destroy_game_object(id) {
                self.diagnostics.report(&e);
            }
        }
    }

    /// Draws the current scene through its main camera.
    pub fn render_frame(&mut self) -> Result<DrawStats, EngineError> {
        let scene = self.scenes.current_mut()?;
        let (camera_object, camera_component) = camera::main_camera(scene)?;
        let camera_world = scene
            .world_matrix(camera_object)
            .ok_or(EngineError::UnknownObject(camera_object))?;
        let camera = scene
            .game_object_mut(camera_object)
            .and_then(|o| o.component_mut(camera_component))
            .and_then(Component::as_camera_mut)
            .ok_or(EngineError::UnknownObject(camera_component))?;
        let (width, height) = self.viewport;
        if width > 0 && height > 0 {
            camera.set_aspect(width as f32 / height as f32);
        }
        camera.sync(&mut self.gpu, camera_component, camera_world)?;
        let clear_color = camera.clear_color;
        let camera_position = camera_world.w.truncate();
        let camera_buffer = self
            .gpu
            .uniform_buffer(camera_component)
            .ok_or(EngineError::MissingBuffer(camera_component))?;

        sync_lighting(&mut self.lighting, &mut self.gpu, self.lighting_owner, scene)?;
        let lighting_buffer = self
            .gpu
            .uniform_buffer(self.lighting_owner)
            .ok_or(EngineError::MissingBuffer(self.lighting_owner))?;

        let device = self.gpu.device();
        device.bind_uniform_buffer(UniformSlot::Camera, camera_buffer)?;
        device.bind_uniform_buffer(UniformSlot::Lighting, lighting_buffer)?;
        device.begin_frame(clear_color)?;

        self.batches.collect(scene, &self.materials);
        let stats = self
            .batches
            .draw(scene, &mut self.materials, &mut self.gpu, camera_position);
        for e in &stats.errors {
            self.diagnostics.report(e);
        }
        self.gpu.device().end_frame()?;
        Ok(stats)
    }

    /// Nearest collider hit within `max_distance`. Inactive objects and
    /// objects tagged [`IGNORE_RAYCAST_TAG`] are skipped.
    pub fn raycast(
        &self,
        origin: Vector3<f32>,
        direction: Vector3<f32>,
        max_distance: f32,
    ) -> Option<RaycastHit> {
        let scene = self.scenes.current().ok()?;
        let ray = Ray::new(origin, direction);
        let mut nearest: Option<RaycastHit> = None;
        for object in scene.game_objects() {
            if !object.is_active || object.has_tag(IGNORE_RAYCAST_TAG) {
                continue;
            }
            let Some(position) = transform::world_position(scene, object.id()) else {
                continue;
            };
            let pose = Pose {
                position,
                ..Pose::from(object.transform())
            };
            for component in object.components_in_group(ComponentGroup::Collider) {
                let Some(collider) = component.as_collider().filter(|_| component.is_active)
                else {
                    continue;
                };
                let Some(point) = collider.raycast(&pose, &ray) else {
                    continue;
                };
                let distance = (point - origin).magnitude();
                if distance > max_distance {
                    continue;
                }
                if nearest.is_none_or(|hit| distance < hit.distance) {
                    nearest = Some(RaycastHit {
                        object: object.id(),
                        point,
                        distance,
                    });
                }
            }
        }
        nearest
    }

    /// Ray through `screen` (pixels, origin top left) from the main camera.
    pub fn screen_point_to_ray(&self, x: f32, y: f32) -> Result<Ray, EngineError> {
        let scene = self.scenes.current()?;
        let (object, component) = camera::main_camera(scene)?;
        let world = scene
            .world_matrix(object)
            .ok_or(EngineError::UnknownObject(object))?;
        let camera: &Camera = scene
            .game_object(object)
            .and_then(|o| o.component(component))
            .and_then(Component::as_camera)
            .ok_or(EngineError::UnknownObject(component))?;
        Ok(camera.screen_point_to_ray(cgmath::Vector2::new(x, y), self.viewport, world))
    }

    /// Hands asynchronously loaded textures to their materials. Results for
    /// materials destroyed in the meantime are dropped. Returns how many
    /// textures were applied.
    pub fn apply_textures(&mut self, loaded: Vec<LoadedTexture>) -> usize {
        let mut applied = 0;
        for LoadedTexture { target, data } in loaded {
            if !self.ids.is_current(target.material) {
                log::debug!("Dropping texture {} for a destroyed material", target.uri);
                continue;
            }
            let Some(material) = self.materials.get_mut(target.material.id) else {
                continue;
            };
            let texture = match self.gpu.create_texture(&target.uri, &data) {
                Ok(texture) => texture,
                Err(e) => {
                    self.diagnostics.report(&e);
                    continue;
                }
            };
            if let Some(previous) = material.set_texture(&mut self.gpu, target.slot, Some(texture))
            {
                self.gpu.release_texture(previous);
            }
            applied += 1;
        }
        applied
    }

    /// Releases every GPU resource the world created.
    pub fn shutdown(&mut self) {
        for material in self.materials.values_mut() {
            material.release(&mut self.gpu);
        }
        self.lighting.release(&mut self.gpu);
        self.gpu.release_all();
        log::info!("World shut down");
    }
}

/// Writes the first active ambient and directional light of `scene` into
/// the lighting block.
fn sync_lighting(
    block: &mut UniformBlock,
    gpu: &mut GpuResources,
    owner: EntityId,
    scene: &Scene,
) -> Result<(), EngineError> {
    let mut ambient = None;
    let mut directional = None;
    for object in scene.game_objects().filter(|o| o.is_active) {
        for component in object.components_in_group(ComponentGroup::Light) {
            let (Some(light), true) = (component.as_light(), component.is_active) else {
                continue;
            };
            match light.light_kind() {
                LightKind::Ambient if ambient.is_none() => ambient = Some(light.clone()),
                LightKind::Directional if directional.is_none() => {
                    let direction = scene
                        .world_matrix(object.id())
                        .map(|world| (world * Vector4::new(0.0, 0.0, 1.0, 0.0)).truncate())
                        .filter(|d| d.magnitude2() > 0.0)
                        .map(InnerSpace::normalize)
                        .unwrap_or(Vector3::unit_z());
                    directional = Some((light.clone(), direction));
                }
                _ => (),
            }
        }
    }

    let (ambient_color, ambient_intensity) = ambient
        .map(|light| (light.color, light.intensity))
        .unwrap_or(DEFAULT_AMBIENT);
    block.set_vec3(gpu, AMBIENT_COLOR, ambient_color);
    block.set_float(gpu, AMBIENT_INTENSITY, ambient_intensity);
    match directional {
        Some((light, direction)) => {
            block.set_vec3(gpu, LIGHT_DIRECTION, direction.into());
            block.set_vec3(gpu, LIGHT_COLOR, light.color);
            block.set_float(gpu, LIGHT_INTENSITY, light.intensity);
        }
        None => {
            block.set_float(gpu, LIGHT_INTENSITY, 0.0);
        }
    }
    if !block.is_created() {
        block.create_buffer(gpu, owner)?;
    }
    Ok(())
}
