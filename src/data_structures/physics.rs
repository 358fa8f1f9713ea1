//! A minimal force integrator and box collider.
//!
//! Nothing here resolves contacts. Bodies integrate accumulated forces once
//! per fixed step and colliders answer ray and overlap queries.

use cgmath::{Euler, InnerSpace, Quaternion, Rad, Rotation, Vector3, Zero};

use crate::data_structures::{component::Collider, transform::Transform};

/// Tag that hides an object from ray casts.
pub const IGNORE_RAYCAST_TAG: &str = "ignoreRaycast";

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Ray {
    pub origin: Vector3<f32>,
    pub direction: Vector3<f32>,
}

impl Ray {
    /// `direction` is normalized.
    pub fn new(origin: Vector3<f32>, direction: Vector3<f32>) -> Self {
        let direction = if direction.magnitude2() > 0.0 {
            direction.normalize()
        } else {
            direction
        };
        Self { origin, direction }
    }

    pub fn point_at(&self, distance: f32) -> Vector3<f32> {
        self.origin + self.direction * distance
    }

    /// Möller-Trumbore. Returns the distance along the ray.
    pub fn intersect_triangle(
        &self,
        v0: Vector3<f32>,
        v1: Vector3<f32>,
        v2: Vector3<f32>,
    ) -> Option<f32> {
        let edge1 = v1 - v0;
        let edge2 = v2 - v0;
        let h = self.direction.cross(edge2);
        let a = edge1.dot(h);
        if a.abs() < 1e-6 {
            return None;
        }
        let f = 1.0 / a;
        let s = self.origin - v0;
        let u = f * s.dot(h);
        if !(0.0..=1.0).contains(&u) {
            return None;
        }
        let q = s.cross(edge1);
        let v = f * self.direction.dot(q);
        if v < 0.0 || u + v > 1.0 {
            return None;
        }
        let t = f * edge2.dot(q);
        (t > 1e-6).then_some(t)
    }
}

/// Axis aligned bounding box.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    pub min: Vector3<f32>,
    pub max: Vector3<f32>,
}

impl Aabb {
    pub fn from_points(points: impl IntoIterator<Item = Vector3<f32>>) -> Self {
        let mut min = Vector3::new(f32::INFINITY, f32::INFINITY, f32::INFINITY);
        let mut max = Vector3::new(f32::NEG_INFINITY, f32::NEG_INFINITY, f32::NEG_INFINITY);
        for p in points {
            min = Vector3::new(min.x.min(p.x), min.y.min(p.y), min.z.min(p.z));
            max = Vector3::new(max.x.max(p.x), max.y.max(p.y), max.z.max(p.z));
        }
        Self { min, max }
    }

    pub fn contains(&self, point: Vector3<f32>) -> bool {
        (self.min.x..=self.max.x).contains(&point.x)
            && (self.min.y..=self.max.y).contains(&point.y)
            && (self.min.z..=self.max.z).contains(&point.z)
    }

    pub fn overlaps(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }
}

/// Position, rotation and scale a collider is evaluated with.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Pose {
    pub position: Vector3<f32>,
    pub rotation: Quaternion<f32>,
    pub scale: Vector3<f32>,
}

impl From<&Transform> for Pose {
    fn from(transform: &Transform) -> Self {
        Self {
            position: transform.position(),
            rotation: transform.rotation(),
            scale: transform.scale(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ForceMode {
    /// Accumulates until the next step, scaled by the step length.
    #[default]
    Force,
    Impulse,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RigidBody {
    pub mass: f32,
    pub drag: f32,
    pub angular_drag: f32,
    pub use_gravity: bool,
    pub gravity: Vector3<f32>,
    pub velocity: Vector3<f32>,
    /// Radians per second around each axis.
    pub angular_velocity: Vector3<f32>,
    pub center_of_mass: Vector3<f32>,
    forces: Vector3<f32>,
    impulses: Vector3<f32>,
    torque: Vector3<f32>,
}

impl Default for RigidBody {
    fn default() -> Self {
        Self {
            mass: 1.0,
            drag: 0.1,
            angular_drag: 0.05,
            use_gravity: true,
            gravity: Vector3::new(0.0, -9.807, 0.0),
            velocity: Vector3::zero(),
            angular_velocity: Vector3::zero(),
            center_of_mass: Vector3::zero(),
            forces: Vector3::zero(),
            impulses: Vector3::zero(),
            torque: Vector3::zero(),
        }
    }
}

fn drag_factor(drag: f32, dt: f32) -> f32 {
    (1.0 - drag * dt).max(0.0)
}

impl RigidBody {
    pub fn add_force(&mut self, force: Vector3<f32>, mode: ForceMode) {
        match mode {
            ForceMode::Force => self.forces += force,
            ForceMode::Impulse => self.impulses += force,
        }
    }

    /// Adds the force and the torque it produces around the centre of mass.
    pub fn add_force_at_position(
        &mut self,
        force: Vector3<f32>,
        position: Vector3<f32>,
        mode: ForceMode,
    ) {
        let effective = match mode {
            ForceMode::Force => force,
            ForceMode::Impulse => force / self.mass,
        };
        self.add_force(effective, mode);
        self.torque += (position - self.center_of_mass).cross(effective);
    }

    pub fn reset_velocity(&mut self) {
        self.velocity = Vector3::zero();
        self.angular_velocity = Vector3::zero();
        self.torque = Vector3::zero();
    }

    /// One explicit Euler step of length `dt`. Accumulated forces are
    /// consumed.
    pub fn integrate(&mut self, transform: &mut Transform, dt: f32) {
        if self.use_gravity {
            self.forces += self.gravity * self.mass;
        }
        let acceleration = (self.forces + self.impulses) / self.mass;
        self.velocity += acceleration * dt;
        self.impulses = Vector3::zero();
        self.velocity *= drag_factor(self.drag, dt);
        transform.set_position(transform.position() + self.velocity * dt);

        let angular_acceleration = self.torque / self.mass;
        self.angular_velocity += angular_acceleration * dt;
        self.angular_velocity *= drag_factor(self.angular_drag, dt);
        if self.angular_velocity != Vector3::zero() {
            let step = self.angular_velocity * dt;
            let delta = Quaternion::from(Euler::new(Rad(step.x), Rad(step.y), Rad(step.z)));
            transform.set_rotation((transform.rotation() * delta).normalize());
        }

        self.forces = Vector3::zero();
        self.torque = Vector3::zero();
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct BoxCollider {
    pub center: Vector3<f32>,
    pub size: Vector3<f32>,
}

impl Default for BoxCollider {
    fn default() -> Self {
        Self {
            center: Vector3::zero(),
            size: Vector3::new(1.0, 1.0, 1.0),
        }
    }
}

impl BoxCollider {
    pub fn overlaps(&self, pose: &Pose, other: &BoxCollider, other_pose: &Pose) -> bool {
        self.bounds(pose).overlaps(&other.bounds(other_pose))
    }
}

impl Collider for BoxCollider {
    /// Slab test in the box's local frame. Scale is not applied.
    fn raycast(&self, pose: &Pose, ray: &Ray) -> Option<Vector3<f32>> {
        let inverse = pose.rotation.invert();
        let centre = pose.position + self.center;
        let origin = inverse.rotate_vector(ray.origin - centre);
        let direction = inverse.rotate_vector(ray.direction);
        if direction == Vector3::zero() {
            return None;
        }
        let half = self.size * 0.5;
        let mut t_min = f32::NEG_INFINITY;
        let mut t_max = f32::INFINITY;
        for axis in 0..3 {
            let d = if direction[axis] == 0.0 { 1e-6 } else { direction[axis] };
            let mut t0 = (-half[axis] - origin[axis]) / d;
            let mut t1 = (half[axis] - origin[axis]) / d;
            if t0 > t1 {
                std::mem::swap(&mut t0, &mut t1);
            }
            t_min = t_min.max(t0);
            t_max = t_max.min(t1);
            if t_min > t_max {
                return None;
            }
        }
        if t_max < 0.0 {
            return None;
        }
        let local = origin + direction * t_min.max(0.0);
        Some(pose.rotation.rotate_vector(local) + centre)
    }

    fn bounds(&self, pose: &Pose) -> Aabb {
        let half = Vector3::new(
            self.size.x * pose.scale.x,
            self.size.y * pose.scale.y,
            self.size.z * pose.scale.z,
        ) * 0.5;
        let centre = pose.position + self.center;
        let corners = (0..8).map(|i| {
            let corner = Vector3::new(
                if i & 1 == 0 { -half.x } else { half.x },
                if i & 2 == 0 { -half.y } else { half.y },
                if i & 4 == 0 { -half.z } else { half.z },
            );
            pose.rotation.rotate_vector(corner) + centre
        });
        Aabb::from_points(corners)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use cgmath::{Deg, Rotation3};

    use super::*;

    fn pose_at(position: Vector3<f32>) -> Pose {
        Pose {
            position,
            rotation: Quaternion::from_angle_y(Deg(0.0)),
            scale: Vector3::new(1.0, 1.0, 1.0),
        }
    }

    #[test]
    fn ray_hits_front_face_of_box() {
        let collider = BoxCollider::default();
        let ray = Ray::new(Vector3::new(0.0, 0.0, -5.0), Vector3::unit_z());
        let hit = collider
            .raycast(&pose_at(Vector3::zero()), &ray)
            .expect("ray should hit");
        assert_relative_eq!(hit, Vector3::new(0.0, 0.0, -0.5), epsilon = 1e-5);
    }

    #[test]
    fn ray_pointing_away_misses() {
        let collider = BoxCollider::default();
        let ray = Ray::new(Vector3::new(0.0, 0.0, -5.0), -Vector3::unit_z());
        assert!(collider.raycast(&pose_at(Vector3::zero()), &ray).is_none());
    }

    #[test]
    fn rotated_bounds_grow() {
        let collider = BoxCollider::default();
        let pose = Pose {
            rotation: Quaternion::from_angle_y(Deg(45.0)),
            ..pose_at(Vector3::zero())
        };
        let bounds = collider.bounds(&pose);
        assert_relative_eq!(bounds.max.x, 0.5 * 2f32.sqrt(), epsilon = 1e-5);
        assert_relative_eq!(bounds.max.y, 0.5, epsilon = 1e-5);
    }

    #[test]
    fn gravity_and_drag_move_the_body_down() {
        let mut body = RigidBody::default();
        let mut transform = Transform::new(1, 0);
        body.integrate(&mut transform, 0.02);
        let expected_velocity = -9.807 * 0.02 * (1.0 - 0.1 * 0.02);
        assert_relative_eq!(body.velocity.y, expected_velocity, epsilon = 1e-6);
        assert_relative_eq!(transform.position().y, expected_velocity * 0.02, epsilon = 1e-7);
    }

    #[test]
    fn impulses_apply_once() {
        let mut body = RigidBody {
            use_gravity: false,
            drag: 0.0,
            ..RigidBody::default()
        };
        let mut transform = Transform::new(1, 0);
        body.add_force(Vector3::new(50.0, 0.0, 0.0), ForceMode::Impulse);
        body.integrate(&mut transform, 0.02);
        body.integrate(&mut transform, 0.02);
        assert_relative_eq!(body.velocity.x, 1.0, epsilon = 1e-6);
    }
}
