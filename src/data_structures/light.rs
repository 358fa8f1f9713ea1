//! Light components.
//!
//! Lights carry colour and intensity only. A directional light shines along
//! the forward axis of its game object; ambient light has no direction.

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum LightKind {
    #[default]
    Ambient,
    Directional,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Light {
    pub kind: LightKind,
    pub color: [f32; 3],
    pub intensity: f32,
}

impl Default for Light {
    fn default() -> Self {
        Self::ambient([1.0; 3], 1.0)
    }
}

impl Light {
    pub fn ambient(color: [f32; 3], intensity: f32) -> Self {
        Self {
            kind: LightKind::Ambient,
            color,
            intensity,
        }
    }

    pub fn directional() -> Self {
        Self {
            kind: LightKind::Directional,
            color: [1.0; 3],
            intensity: 1.0,
        }
    }
}
