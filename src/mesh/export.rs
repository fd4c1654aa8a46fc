use baby_shark::io::write_to_file;
use std::path::{Path, PathBuf};
use tracing::info;

use super::loader::load_mesh;
use crate::quadriflow::{CollaboratorError, ExportSettings, MeshExporter};

/// Exports the selected mesh of a source file as bare OBJ geometry
#[derive(Debug, Clone)]
pub struct ObjExporter {
    source: PathBuf,
    mesh_name: Option<String>,
}

impl ObjExporter {
    /// `mesh_name` selects a mesh inside a multi-mesh GLB
    pub fn new(source: impl Into<PathBuf>, mesh_name: Option<String>) -> Self {
        Self {
            source: source.into(),
            mesh_name,
        }
    }
}

impl MeshExporter for ObjExporter {
    fn export(&mut self, path: &Path, settings: &ExportSettings) -> Result<(), CollaboratorError> {
        if settings.include_materials {
            return Err("Material export is not supported".into());
        }

        let selection = if settings.selection_only {
            self.mesh_name.as_deref()
        } else {
            None
        };

        info!("Loading mesh from {:?}...", self.source);
        let mesh = load_mesh(&self.source, selection)?;

        info!(
            "Exporting {} vertices, {} faces",
            mesh.count_vertices(),
            mesh.count_faces()
        );

        write_to_file(&mesh, path).map_err(|e| format!("Failed to write mesh: {:?}", e))?;
        Ok(())
    }
}
