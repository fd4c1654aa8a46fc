use baby_shark::io::{Builder, IndexedBuilder};
use baby_shark::mesh::corner_table::CornerTableF;
use std::path::Path;
use tracing::{debug, info};

use crate::quadriflow::CollaboratorError;

/// Load mesh from file (supports .obj, .glb and .gltf)
pub fn load_mesh(input: &Path, mesh_name: Option<&str>) -> Result<CornerTableF, CollaboratorError> {
    let extension = input
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_lowercase())
        .ok_or("File has no extension")?;

    match extension.as_str() {
        "obj" => {
            use baby_shark::io::read_from_file;
            read_from_file(input).map_err(|e| format!("Failed to read OBJ file: {:?}", e).into())
        }
        "glb" | "gltf" => load_mesh_from_glb(input, mesh_name),
        _ => Err(format!("Unsupported file format: {}", extension).into()),
    }
}

/// Load the selected mesh from a GLB/glTF file
pub fn load_mesh_from_glb(
    path: &Path,
    mesh_name: Option<&str>,
) -> Result<CornerTableF, CollaboratorError> {
    let (document, buffers, _images) =
        gltf::import(path).map_err(|e| format!("Failed to read glTF file: {}", e))?;

    let meshes: Vec<_> = document.meshes().collect();

    if meshes.is_empty() {
        return Err("GLB file contains no meshes".into());
    }

    let available = || {
        meshes
            .iter()
            .map(|m| m.name().unwrap_or("<unnamed>").to_string())
            .collect::<Vec<_>>()
            .join(", ")
    };

    // A single mesh is the selection; otherwise the caller must name one
    let selected_mesh = match (meshes.len(), mesh_name) {
        (1, None) => &meshes[0],
        (_, None) => {
            return Err(format!(
                "GLB file contains {} meshes. Please select one with --mesh <name>.\nAvailable meshes: {}",
                meshes.len(),
                available()
            )
            .into());
        }
        (_, Some(name)) => meshes
            .iter()
            .find(|m| m.name() == Some(name))
            .ok_or_else(|| {
                format!(
                    "Mesh '{}' not found in GLB file.\nAvailable meshes: {}",
                    name,
                    available()
                )
            })?,
    };

    info!(
        "Loading mesh: {}",
        selected_mesh.name().unwrap_or("<unnamed>")
    );

    let mut all_positions: Vec<[f32; 3]> = Vec::new();
    let mut all_indices: Vec<u32> = Vec::new();
    let mut vertex_offset = 0u32;

    for primitive in selected_mesh.primitives() {
        let reader = primitive.reader(|buffer| Some(&buffers[buffer.index()]));

        let positions = reader
            .read_positions()
            .ok_or("Primitive has no position data")?;

        let pos_vec: Vec<[f32; 3]> = positions.collect();
        all_positions.extend_from_slice(&pos_vec);

        if let Some(indices) = reader.read_indices() {
            all_indices.extend(indices.into_u32().map(|i| i + vertex_offset));
        } else {
            // Non-indexed geometry is a triangle list
            all_indices.extend(vertex_offset..vertex_offset + pos_vec.len() as u32);
        }

        vertex_offset += pos_vec.len() as u32;
    }

    debug!(
        vertices = all_positions.len(),
        indices = all_indices.len(),
        "Collected glTF primitives"
    );

    if all_indices.len() % 3 != 0 {
        return Err("Index count is not a multiple of 3 (non-triangular faces)".into());
    }

    let mut builder = CornerTableF::builder_indexed();

    builder.set_num_vertices(all_positions.len());
    for pos in all_positions {
        builder
            .add_vertex(pos)
            .map_err(|e| format!("Failed to add vertex: {:?}", e))?;
    }

    builder.set_num_faces(all_indices.len() / 3);
    for chunk in all_indices.chunks(3) {
        builder
            .add_face(chunk[0] as usize, chunk[1] as usize, chunk[2] as usize)
            .map_err(|e| format!("Failed to add face: {:?}", e))?;
    }

    builder
        .finish()
        .map_err(|e| format!("Failed to build mesh: {:?}", e).into())
}
