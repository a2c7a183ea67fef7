//! Scene bounds from glTF 2.0 assets.
//!
//! Only the JSON part is needed: every POSITION accessor must carry `min`
//! and `max`, so bounds never require touching vertex buffers.

use crate::bounds::{Aabb, Mat4};
use crate::error::PreviewError;
use serde::Deserialize;
use std::collections::HashMap;

const GLB_MAGIC: &[u8; 4] = b"glTF";
const CHUNK_JSON: u32 = 0x4E4F_534A;
const MAX_NODE_DEPTH: usize = 64;

#[derive(Debug, Default, Deserialize)]
struct Document {
    #[serde(default)]
    scene: Option<usize>,
    #[serde(default)]
    scenes: Vec<Scene>,
    #[serde(default)]
    nodes: Vec<Node>,
    #[serde(default)]
    meshes: Vec<Mesh>,
    #[serde(default)]
    accessors: Vec<Accessor>,
}

#[derive(Debug, Default, Deserialize)]
struct Scene {
    #[serde(default)]
    nodes: Vec<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct Node {
    #[serde(default)]
    mesh: Option<usize>,
    #[serde(default)]
    children: Vec<usize>,
    #[serde(default)]
    matrix: Option<[f32; 16]>,
    #[serde(default)]
    translation: Option<[f32; 3]>,
    #[serde(default)]
    rotation: Option<[f32; 4]>,
    #[serde(default)]
    scale: Option<[f32; 3]>,
}

impl Node {
    fn local(&self) -> Mat4 {
        match self.matrix {
            Some(m) => Mat4(m),
            None => Mat4::from_trs(
                self.translation.unwrap_or([0.0; 3]),
                self.rotation.unwrap_or([0.0, 0.0, 0.0, 1.0]),
                self.scale.unwrap_or([1.0; 3]),
            ),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct Mesh {
    #[serde(default)]
    primitives: Vec<Primitive>,
}

#[derive(Debug, Default, Deserialize)]
struct Primitive {
    #[serde(default)]
    attributes: HashMap<String, usize>,
}

#[derive(Debug, Default, Deserialize)]
struct Accessor {
    #[serde(default)]
    min: Option<Vec<f32>>,
    #[serde(default)]
    max: Option<Vec<f32>>,
}

/// Bounds of the default scene in world space. Accepts a binary `.glb`
/// container or a JSON `.gltf` document.
pub fn scene_bounds(bytes: &[u8]) -> Result<Aabb, PreviewError> {
    let json = if bytes.starts_with(GLB_MAGIC) {
        json_chunk(bytes)?
    } else {
        bytes
    };
    let doc: Document = serde_json::from_slice(json)
        .map_err(|e| PreviewError::InvalidModel(format!("glTF JSON: {e}")))?;
    doc.bounds()
}

fn json_chunk(bytes: &[u8]) -> Result<&[u8], PreviewError> {
    let word = |offset: usize| -> Result<u32, PreviewError> {
        bytes
            .get(offset..offset + 4)
            .and_then(|b| b.try_into().ok())
            .map(u32::from_le_bytes)
            .ok_or_else(|| PreviewError::InvalidModel("truncated GLB header".into()))
    };

    let version = word(4)?;
    if version != 2 {
        return Err(PreviewError::InvalidModel(format!(
            "unsupported glTF version {version}"
        )));
    }
    let total = word(8)? as usize;
    if total > bytes.len() {
        return Err(PreviewError::InvalidModel(format!(
            "GLB declares {total} bytes but only {} present",
            bytes.len()
        )));
    }

    let chunk_len = word(12)? as usize;
    let chunk_type = word(16)?;
    if chunk_type != CHUNK_JSON {
        return Err(PreviewError::InvalidModel(
            "first GLB chunk is not JSON".into(),
        ));
    }
    bytes
        .get(20..20 + chunk_len)
        .ok_or_else(|| PreviewError::InvalidModel("truncated GLB JSON chunk".into()))
}

impl Document {
    fn bounds(&self) -> Result<Aabb, PreviewError> {
        let roots = self.roots();
        let mut bounds = Aabb::EMPTY;

        if roots.is_empty() {
            // Node-less assets: meshes in model space.
            for mesh in 0..self.meshes.len() {
                bounds = bounds.union(&self.mesh_bounds(mesh)?);
            }
            return Ok(bounds);
        }

        let mut stack: Vec<(usize, Mat4, usize)> =
            roots.into_iter().map(|n| (n, Mat4::IDENTITY, 0)).collect();
        while let Some((index, parent, depth)) = stack.pop() {
            if depth > MAX_NODE_DEPTH {
                return Err(PreviewError::InvalidModel(
                    "node hierarchy too deep or cyclic".into(),
                ));
            }
            let node = self.nodes.get(index).ok_or_else(|| {
                PreviewError::InvalidModel(format!("node {index} does not exist"))
            })?;
            let world = parent.mul(&node.local());
            if let Some(mesh) = node.mesh {
                bounds = bounds.union(&self.mesh_bounds(mesh)?.transformed(&world));
            }
            stack.extend(node.children.iter().map(|c| (*c, world, depth + 1)));
        }
        Ok(bounds)
    }

    fn roots(&self) -> Vec<usize> {
        let scene = self.scene.unwrap_or(0);
        if let Some(scene) = self.scenes.get(scene) {
            return scene.nodes.clone();
        }
        // No scene: every node that is nobody's child.
        let mut is_child = vec![false; self.nodes.len()];
        for node in &self.nodes {
            for child in &node.children {
                if let Some(flag) = is_child.get_mut(*child) {
                    *flag = true;
                }
            }
        }
        (0..self.nodes.len()).filter(|i| !is_child[*i]).collect()
    }

    fn mesh_bounds(&self, index: usize) -> Result<Aabb, PreviewError> {
        let mesh = self
            .meshes
            .get(index)
            .ok_or_else(|| PreviewError::InvalidModel(format!("mesh {index} does not exist")))?;

        let mut bounds = Aabb::EMPTY;
        for primitive in &mesh.primitives {
            let Some(accessor) = primitive.attributes.get("POSITION") else {
                continue;
            };
            let accessor = self.accessors.get(*accessor).ok_or_else(|| {
                PreviewError::InvalidModel(format!("accessor {accessor} does not exist"))
            })?;
            let (Some(min), Some(max)) = (accessor.min.as_deref(), accessor.max.as_deref()) else {
                return Err(PreviewError::InvalidModel(
                    "POSITION accessor without min/max".into(),
                ));
            };
            if min.len() < 3 || max.len() < 3 {
                return Err(PreviewError::InvalidModel(
                    "POSITION min/max must have three components".into(),
                ));
            }
            bounds = bounds.union(&Aabb::new([min[0], min[1], min[2]], [max[0], max[1], max[2]]));
        }
        Ok(bounds)
    }
}

/// Wraps a glTF JSON document in a GLB container (JSON chunk only).
#[cfg(test)]
pub(crate) fn pack_glb(json: &str) -> Vec<u8> {
    let mut chunk = json.as_bytes().to_vec();
    while chunk.len() % 4 != 0 {
        chunk.push(b' ');
    }
    let total = 12 + 8 + chunk.len();
    let mut out = Vec::with_capacity(total);
    out.extend_from_slice(GLB_MAGIC);
    out.extend_from_slice(&2u32.to_le_bytes());
    out.extend_from_slice(&(total as u32).to_le_bytes());
    out.extend_from_slice(&(chunk.len() as u32).to_le_bytes());
    out.extend_from_slice(&CHUNK_JSON.to_le_bytes());
    out.extend_from_slice(&chunk);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const CUBE: &str = r#"{
        "asset": {"version": "2.0"},
        "scene": 0,
        "scenes": [{"nodes": [0]}],
        "nodes": [
            {"children": [1], "translation": [10, 0, 0]},
            {"mesh": 0, "scale": [2, 2, 2]}
        ],
        "meshes": [{"primitives": [{"attributes": {"POSITION": 0, "NORMAL": 1}}]}],
        "accessors": [
            {"min": [-1, -1, -1], "max": [1, 1, 1]},
            {}
        ]
    }"#;

    #[test]
    fn test_bounds_follow_node_transforms() {
        let bounds = scene_bounds(&pack_glb(CUBE)).unwrap();
        assert_eq!(bounds, Aabb::new([8.0, -2.0, -2.0], [12.0, 2.0, 2.0]));

        // Same document as plain .gltf JSON.
        assert_eq!(scene_bounds(CUBE.as_bytes()).unwrap(), bounds);
    }

    #[test]
    fn test_sceneless_document_uses_root_nodes() {
        let json = r#"{
            "nodes": [{"mesh": 0, "translation": [0, 5, 0]}],
            "meshes": [{"primitives": [{"attributes": {"POSITION": 0}}]}],
            "accessors": [{"min": [0, 0, 0], "max": [1, 1, 1]}]
        }"#;
        let bounds = scene_bounds(json.as_bytes()).unwrap();
        assert_eq!(bounds, Aabb::new([0.0, 5.0, 0.0], [1.0, 6.0, 1.0]));
    }

    #[test]
    fn test_empty_scene_is_empty_bounds() {
        let bounds = scene_bounds(br#"{"asset": {"version": "2.0"}}"#).unwrap();
        assert!(bounds.is_empty());
    }

    #[test]
    fn test_rejects_broken_assets() {
        assert!(matches!(
            scene_bounds(b"glTF\x01\x00\x00\x00"),
            Err(PreviewError::InvalidModel(_))
        ));
        assert!(matches!(
            scene_bounds(b"\x89PNG not a model"),
            Err(PreviewError::InvalidModel(_))
        ));

        let mut truncated = pack_glb(CUBE);
        truncated.truncate(30);
        assert!(scene_bounds(&truncated).is_err());

        let cyclic = r#"{
            "scenes": [{"nodes": [0]}],
            "nodes": [{"children": [1]}, {"children": [0]}]
        }"#;
        assert!(scene_bounds(cyclic.as_bytes()).is_err());

        let no_minmax = r#"{
            "nodes": [{"mesh": 0}],
            "meshes": [{"primitives": [{"attributes": {"POSITION": 0}}]}],
            "accessors": [{}]
        }"#;
        assert!(scene_bounds(no_minmax.as_bytes()).is_err());
    }
}
