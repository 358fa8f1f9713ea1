//! CPU-side mesh data.

use cgmath::{InnerSpace, Vector2, Vector3, Zero};

use crate::{
    data_structures::entity::{EntityAllocator, EntityId},
    error::EngineError,
};

pub type MeshId = EntityId;

/// Element width of an index buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IndexType {
    U8,
    U16,
    U32,
}

impl IndexType {
    /// Smallest width that holds every value of `indices`.
    pub fn for_indices(indices: &[u32]) -> Result<Self, EngineError> {
        let max = indices
            .iter()
            .copied()
            .max()
            .ok_or(EngineError::EmptyIndexBuffer)?;
        Ok(if max <= u8::MAX as u32 {
            Self::U8
        } else if max <= u16::MAX as u32 {
            Self::U16
        } else {
            Self::U32
        })
    }

    pub fn size(self) -> usize {
        match self {
            Self::U8 => 1,
            Self::U16 => 2,
            Self::U32 => 4,
        }
    }

    /// Packs `indices` into little-endian elements of this width. Values that
    /// do not fit are truncated.
    pub fn encode(self, indices: &[u32]) -> Vec<u8> {
        match self {
            Self::U8 => indices.iter().map(|i| *i as u8).collect(),
            Self::U16 => {
                let narrowed: Vec<u16> = indices.iter().map(|i| *i as u16).collect();
                bytemuck::cast_slice(&narrowed).to_vec()
            }
            Self::U32 => bytemuck::cast_slice(indices).to_vec(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum Topology {
    Points,
    Lines,
    LineStrip,
    #[default]
    Triangles,
    TriangleStrip,
}

#[derive(Clone, Debug)]
pub struct Mesh {
    id: MeshId,
    pub name: String,
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub uvs: Vec<[f32; 2]>,
    pub tangents: Vec<[f32; 3]>,
    pub indices: Vec<u32>,
    pub topology: Topology,
}

impl Mesh {
    pub fn new(
        ids: &mut EntityAllocator,
        name: impl Into<String>,
        positions: Vec<[f32; 3]>,
        indices: Vec<u32>,
    ) -> Self {
        Self {
            id: ids.create(),
            name: name.into(),
            positions,
            normals: Vec::new(),
            uvs: Vec::new(),
            tangents: Vec::new(),
            indices,
            topology: Topology::Triangles,
        }
    }

    pub fn with_normals(mut self, normals: Vec<[f32; 3]>) -> Self {
        self.normals = normals;
        self
    }

    pub fn with_uvs(mut self, uvs: Vec<[f32; 2]>) -> Self {
        self.uvs = uvs;
        self
    }

    pub fn with_tangents(mut self, tangents: Vec<[f32; 3]>) -> Self {
        self.tangents = tangents;
        self
    }

    pub fn with_topology(mut self, topology: Topology) -> Self {
        self.topology = topology;
        self
    }

    /// A unit quad in the XY plane facing +Z.
    pub fn quad(ids: &mut EntityAllocator, name: impl Into<String>) -> Self {
        Self::new(
            ids,
            name,
            vec![
                [-0.5, -0.5, 0.0],
                [0.5, -0.5, 0.0],
                [0.5, 0.5, 0.0],
                [-0.5, 0.5, 0.0],
            ],
            vec![0, 1, 2, 0, 2, 3],
        )
        .with_normals(vec![[0.0, 0.0, 1.0]; 4])
        .with_uvs(vec![[0.0, 1.0], [1.0, 1.0], [1.0, 0.0], [0.0, 0.0]])
    }

    /// A unit cube centred on the origin with per-face normals.
    pub fn cube(ids: &mut EntityAllocator, name: impl Into<String>) -> Self {
        let faces: [([f32; 3], [f32; 3], [f32; 3]); 6] = [
            ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
            ([0.0, 0.0, -1.0], [-1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
            ([1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, 1.0, 0.0]),
            ([-1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]),
            ([0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, -1.0]),
            ([0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
        ];
        let mut positions: Vec<[f32; 3]> = Vec::with_capacity(24);
        let mut normals: Vec<[f32; 3]> = Vec::with_capacity(24);
        let mut uvs: Vec<[f32; 2]> = Vec::with_capacity(24);
        let mut indices: Vec<u32> = Vec::with_capacity(36);
        for (normal, u, v) in faces {
            let (n, u, v) = (Vector3::from(normal), Vector3::from(u), Vector3::from(v));
            let base = positions.len() as u32;
            for (du, dv, uv) in [
                // corner offsets along u and v, with the matching uv
                (-0.5, -0.5, [0.0, 1.0]),
                (0.5, -0.5, [1.0, 1.0]),
                (0.5, 0.5, [1.0, 0.0]),
                (-0.5, 0.5, [0.0, 0.0]),
            ] {
                positions.push((n * 0.5 + u * du + v * dv).into());
                normals.push(normal);
                uvs.push(uv);
            }
            indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }
        Self::new(ids, name, positions, indices)
            .with_normals(normals)
            .with_uvs(uvs)
    }

    pub fn id(&self) -> MeshId {
        self.id
    }

    pub fn index_type(&self) -> Result<IndexType, EngineError> {
        IndexType::for_indices(&self.indices)
    }

    /// Computes tangents if none were supplied.
    pub fn ensure_tangents(&mut self) {
        if self.tangents.is_empty() {
            self.recalculate_tangents();
        }
    }

    /// Derives per-vertex tangents from UV edge deltas.
    ///
    /// Needs at least three positions, indices and UVs; returns false without
    /// touching the mesh otherwise. Triangles whose UV determinant is zero are
    /// skipped with a warning.
    pub fn recalculate_tangents(&mut self) -> bool {
        if self.positions.len() < 3 || self.indices.len() < 3 || self.uvs.len() < 3 {
            return false;
        }
        let mut tangents = vec![Vector3::<f32>::zero(); self.positions.len()];
        for (triangle, corners) in self.indices.chunks_exact(3).enumerate() {
            let [i0, i1, i2] = [corners[0] as usize, corners[1] as usize, corners[2] as usize];
            let in_range = |i: usize| i < self.positions.len() && i < self.uvs.len();
            if !(in_range(i0) && in_range(i1) && in_range(i2)) {
                log::warn!(
                    "Mesh {}: triangle {} references a vertex without position or uv",
                    self.name,
                    triangle
                );
                continue;
            }
            let p0 = Vector3::from(self.positions[i0]);
            let edge1 = Vector3::from(self.positions[i1]) - p0;
            let edge2 = Vector3::from(self.positions[i2]) - p0;
            let uv0 = Vector2::from(self.uvs[i0]);
            let duv1 = Vector2::from(self.uvs[i1]) - uv0;
            let duv2 = Vector2::from(self.uvs[i2]) - uv0;

            let det = duv1.x * duv2.y - duv2.x * duv1.y;
            if det == 0.0 {
                log::warn!(
                    "Mesh {}: triangle {} has a degenerate uv mapping, skipping its tangent",
                    self.name,
                    triangle
                );
                continue;
            }
            let r = 1.0 / det;
            let tangent = (edge1 * duv2.y - edge2 * duv1.y) * r;
            tangents[i0] += tangent;
            tangents[i1] += tangent;
            tangents[i2] += tangent;
        }
        self.tangents = tangents
            .into_iter()
            .map(|t| {
                if t.magnitude2() > 0.0 {
                    t.normalize().into()
                } else {
                    [0.0; 3]
                }
            })
            .collect();
        true
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn index_width_follows_largest_value() {
        assert_eq!(IndexType::for_indices(&[0, 1, 2]).unwrap(), IndexType::U8);
        let wide: Vec<u32> = (0..=300).collect();
        assert_eq!(IndexType::for_indices(&wide).unwrap(), IndexType::U16);
        assert_eq!(IndexType::for_indices(&[70_000]).unwrap(), IndexType::U32);
        assert!(matches!(
            IndexType::for_indices(&[]),
            Err(EngineError::EmptyIndexBuffer)
        ));
    }

    #[test]
    fn encodes_little_endian() {
        assert_eq!(IndexType::U16.encode(&[1, 258]), vec![1, 0, 2, 1]);
        assert_eq!(IndexType::U8.encode(&[3, 4]), vec![3, 4]);
    }

    #[test]
    fn quad_tangents_point_along_u() {
        let mut ids = EntityAllocator::new();
        let mut quad = Mesh::quad(&mut ids, "quad");
        assert!(quad.recalculate_tangents());
        for tangent in &quad.tangents {
            assert_relative_eq!(Vector3::from(*tangent), Vector3::unit_x(), epsilon = 1e-5);
        }
    }

    #[test]
    fn degenerate_uvs_are_skipped() {
        let mut ids = EntityAllocator::new();
        let mut mesh = Mesh::new(
            &mut ids,
            "flat",
            vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            vec![0, 1, 2],
        )
        .with_uvs(vec![[0.5, 0.5]; 3]);
        assert!(mesh.recalculate_tangents());
        assert!(mesh.tangents.iter().all(|t| *t == [0.0; 3]));
    }

    #[test]
    fn too_little_data_leaves_tangents_alone() {
        let mut ids = EntityAllocator::new();
        let mut mesh = Mesh::new(&mut ids, "line", vec![[0.0; 3], [1.0; 3]], vec![0, 1]);
        assert!(!mesh.recalculate_tangents());
        assert!(mesh.tangents.is_empty());
    }
}
