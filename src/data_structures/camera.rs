//! Perspective camera component.
//!
//! The projection matrix is cached and rebuilt only after one of the
//! projection parameters changed. The view matrix is the inverse of the
//! owning object's world matrix, so it is passed in rather than stored.

use std::cell::Cell;

use cgmath::{
    Deg, EuclideanSpace, InnerSpace, Matrix4, Point3, SquareMatrix, Transform as _, Vector2,
    Vector3, Vector4,
};

use crate::{
    data_structures::{
        component::{ComponentId, ComponentKind},
        entity::EntityId,
        physics::Ray,
        scene::Scene,
    },
    error::EngineError,
    resources::{buffers::GpuResources, uniform_block::UniformBlock},
};

/// Tag that marks the object whose camera renders the scene.
pub const MAIN_CAMERA_TAG: &str = "MainCamera";

pub const CHARCOAL: [f64; 4] = [0.21, 0.27, 0.31, 1.0];

#[derive(Debug)]
pub struct Camera {
    fov: f32,
    aspect: f32,
    near: f32,
    far: f32,
    pub depth: bool,
    pub clear_color: [f64; 4],
    projection: Cell<Option<Matrix4<f32>>>,
    projection_changed: Cell<bool>,
    uniforms: UniformBlock,
}

impl Default for Camera {
    fn default() -> Self {
        Self::new(60.0, 16.0 / 9.0, 0.03, 300.0)
    }
}

impl Camera {
    pub const VIEW: &'static str = "camera_view";
    pub const PROJECTION: &'static str = "camera_projection";
    pub const POSITION: &'static str = "camera_position";

    /// `fov` is the vertical field of view in degrees.
    pub fn new(fov: f32, aspect: f32, near: f32, far: f32) -> Self {
        Self {
            fov,
            aspect,
            near,
            far,
            depth: true,
            clear_color: CHARCOAL,
            projection: Cell::new(None),
            projection_changed: Cell::new(true),
            uniforms: UniformBlock::new(),
        }
    }

    pub fn fov(&self) -> f32 {
        self.fov
    }

    pub fn aspect(&self) -> f32 {
        self.aspect
    }

    pub fn near(&self) -> f32 {
        self.near
    }

    pub fn far(&self) -> f32 {
        self.far
    }

    fn invalidate(&self) {
        self.projection.set(None);
        self.projection_changed.set(true);
    }

    pub fn set_fov(&mut self, fov: f32) {
        if self.fov != fov {
            self.fov = fov;
            self.invalidate();
        }
    }

    pub fn set_aspect(&mut self, aspect: f32) {
        if self.aspect != aspect {
            self.aspect = aspect;
            self.invalidate();
        }
    }

    pub fn set_near(&mut self, near: f32) {
        if self.near != near {
            self.near = near;
            self.invalidate();
        }
    }

    pub fn set_far(&mut self, far: f32) {
        if self.far != far {
            self.far = far;
            self.invalidate();
        }
    }

    /// True from a parameter change until the projection is rebuilt.
    pub fn projection_changed(&self) -> bool {
        self.projection_changed.get()
    }

    pub fn projection(&self) -> Matrix4<f32> {
        if let Some(projection) = self.projection.get() {
            return projection;
        }
        let projection = cgmath::perspective(Deg(self.fov), self.aspect, self.near, self.far);
        self.projection.set(Some(projection));
        self.projection_changed.set(false);
        projection
    }

    /// `world` is the world matrix of the camera's game object.
    pub fn view(&self, world: Matrix4<f32>) -> Matrix4<f32> {
        world.invert().unwrap_or_else(Matrix4::identity)
    }

    pub fn view_projection(&self, world: Matrix4<f32>) -> Matrix4<f32> {
        self.projection() * self.view(world)
    }

    pub fn uniforms(&self) -> &UniformBlock {
        &self.uniforms
    }

    /// Writes view, projection and eye position into the camera block,
    /// creating it under `owner` on first use. The projection is only
    /// re-uploaded after it changed.
    pub fn sync(
        &mut self,
        gpu: &mut GpuResources,
        owner: ComponentId,
        world: Matrix4<f32>,
    ) -> Result<(), EngineError> {
        let upload_projection = self.projection.get().is_none();
        let view: [[f32; 4]; 4] = self.view(world).into();
        let projection: [[f32; 4]; 4] = self.projection().into();
        let position: [f32; 3] = world.w.truncate().into();

        if !self.uniforms.is_created() {
            if self.uniforms.property(Self::VIEW).is_none() {
                self.uniforms.define_mat4(Self::VIEW, view)?;
                self.uniforms.define_mat4(Self::PROJECTION, projection)?;
                self.uniforms.define_vec3(Self::POSITION, position)?;
            } else {
                // no buffer yet, so these only refresh the stored values
                self.uniforms.set_mat4(gpu, Self::VIEW, view);
                self.uniforms.set_mat4(gpu, Self::PROJECTION, projection);
                self.uniforms.set_vec3(gpu, Self::POSITION, position);
            }
            self.uniforms.create_buffer(gpu, owner)?;
            return Ok(());
        }
        self.uniforms.set_mat4(gpu, Self::VIEW, view);
        if upload_projection {
            self.uniforms.set_mat4(gpu, Self::PROJECTION, projection);
        }
        self.uniforms.set_vec3(gpu, Self::POSITION, position);
        Ok(())
    }

    /// Ray from the near plane through `screen` (pixels, origin top left).
    pub fn screen_point_to_ray(
        &self,
        screen: Vector2<f32>,
        viewport: (u32, u32),
        world: Matrix4<f32>,
    ) -> Ray {
        let (width, height) = (viewport.0.max(1) as f32, viewport.1.max(1) as f32);
        let ndc = Vector2::new(screen.x / width * 2.0 - 1.0, 1.0 - screen.y / height * 2.0);
        let inverse = self.projection().invert().unwrap_or_else(Matrix4::identity);
        let unproject = |z: f32| {
            let clip = inverse * Vector4::new(ndc.x, ndc.y, z, 1.0);
            let camera = clip.truncate() / clip.w;
            world.transform_point(Point3::from_vec(camera)).to_vec()
        };
        let near = unproject(-1.0);
        let far = unproject(1.0);
        Ray::new(near, (far - near).normalize())
    }

    /// Pixel coordinates plus depth in `[0, 1]`.
    pub fn world_to_screen_point(
        &self,
        point: Vector3<f32>,
        viewport: (u32, u32),
        world: Matrix4<f32>,
    ) -> Vector3<f32> {
        let clip = self.view_projection(world) * point.extend(1.0);
        let ndc = clip.truncate() / clip.w;
        Vector3::new(
            (ndc.x + 1.0) * 0.5 * viewport.0 as f32,
            (1.0 - ndc.y) * 0.5 * viewport.1 as f32,
            (ndc.z + 1.0) * 0.5,
        )
    }

    pub(crate) fn release(&mut self, gpu: &mut GpuResources) {
        self.uniforms.release(gpu);
    }
}

/// The object tagged [`MAIN_CAMERA_TAG`] and its camera component.
pub fn main_camera(scene: &Scene) -> Result<(EntityId, ComponentId), EngineError> {
    let object = scene
        .game_objects_by_tag(MAIN_CAMERA_TAG)
        .into_iter()
        .next()
        .ok_or_else(|| {
            EngineError::null_reference(
                "[Camera]",
                "main camera not found",
                format!("no object in scene `{}` is tagged {}", scene.name(), MAIN_CAMERA_TAG),
            )
        })?;
    let component = object
        .component_of_kind(ComponentKind::Camera)
        .ok_or_else(|| {
            EngineError::null_reference(
                "[Camera]",
                "main camera object has no camera component",
                format!("add a camera component to `{}`", object.name),
            )
        })?;
    Ok((object.id(), component.id()))
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn projection_is_cached_until_a_parameter_changes() {
        let mut camera = Camera::default();
        assert!(camera.projection_changed());
        let first = camera.projection();
        assert!(!camera.projection_changed());

        camera.set_fov(60.0);
        assert!(!camera.projection_changed());

        camera.set_fov(90.0);
        assert!(camera.projection_changed());
        assert_ne!(camera.projection(), first);
    }

    #[test]
    fn centre_of_screen_projects_back_onto_the_view_axis() {
        let camera = Camera::default();
        let world = Matrix4::from_translation(Vector3::new(0.0, 1.0, 5.0));
        let ray = camera.screen_point_to_ray(Vector2::new(400.0, 300.0), (800, 600), world);
        assert_relative_eq!(ray.direction, -Vector3::unit_z(), epsilon = 1e-4);

        let target = Vector3::new(0.0, 1.0, -10.0);
        let screen = camera.world_to_screen_point(target, (800, 600), world);
        assert_relative_eq!(screen.x, 400.0, epsilon = 1e-2);
        assert_relative_eq!(screen.y, 300.0, epsilon = 1e-2);
    }
}
