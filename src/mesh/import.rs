use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::quadriflow::{CollaboratorError, MeshImporter};

/// Polygon counts of an OBJ mesh
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PolyStats {
    pub vertices: usize,
    pub faces: usize,
    pub triangles: usize,
    pub quads: usize,
    pub other: usize,
}

impl PolyStats {
    /// Share of faces that are quads, 0.0 for an empty mesh
    pub fn quad_ratio(&self) -> f64 {
        if self.faces == 0 {
            0.0
        } else {
            self.quads as f64 / self.faces as f64
        }
    }

    fn count_face(&mut self, arity: u32) {
        self.faces += 1;
        match arity {
            3 => self.triangles += 1,
            4 => self.quads += 1,
            _ => self.other += 1,
        }
    }
}

/// Count vertices and faces by arity, keeping polygons as written
pub fn poly_stats(path: &Path) -> Result<PolyStats, CollaboratorError> {
    let (models, _materials) = tobj::load_obj(
        path,
        &tobj::LoadOptions {
            triangulate: false,
            single_index: false,
            ignore_points: true,
            ignore_lines: true,
            ..Default::default()
        },
    )
    .map_err(|e| format!("Failed to read OBJ file {:?}: {}", path, e))?;

    let mut stats = PolyStats::default();
    for model in &models {
        let mesh = &model.mesh;
        debug!("OBJ model '{}': {} indices", model.name, mesh.indices.len());

        stats.vertices += mesh.positions.len() / 3;
        if mesh.face_arities.is_empty() {
            // tobj leaves arities empty when every face is a triangle
            for _ in 0..mesh.indices.len() / 3 {
                stats.count_face(3);
            }
        } else {
            for &arity in &mesh.face_arities {
                stats.count_face(arity);
            }
        }
    }

    Ok(stats)
}

/// Where the remeshed result ended up
#[derive(Debug, Clone, Serialize)]
pub struct ImportedMesh {
    pub path: PathBuf,
    pub stats: PolyStats,
}

/// Takes the remesher output, checks it holds a mesh and stores it at `destination`
#[derive(Debug, Clone)]
pub struct ObjImporter {
    destination: PathBuf,
}

impl ObjImporter {
    pub fn new(destination: impl Into<PathBuf>) -> Self {
        Self {
            destination: destination.into(),
        }
    }
}

impl MeshImporter for ObjImporter {
    type Output = ImportedMesh;

    fn import(&mut self, path: &Path) -> Result<ImportedMesh, CollaboratorError> {
        if !path.is_file() {
            return Err("Remesher did not produce an output file".into());
        }

        let stats = poly_stats(path)?;
        if stats.faces == 0 {
            return Err("Remeshed mesh contains no faces".into());
        }

        if let Some(parent) = self.destination.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::copy(path, &self.destination)?;

        info!(
            "Imported {} vertices, {} faces ({} quads) into {:?}",
            stats.vertices, stats.faces, stats.quads, self.destination
        );

        Ok(ImportedMesh {
            path: self.destination.clone(),
            stats,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    // Two quads and a triangle sharing edges
    const MIXED: &str = "\
v 0 0 0
v 1 0 0
v 1 1 0
v 0 1 0
v 2 0 0
v 2 1 0
v 3 0 0
f 1 2 3 4
f 2 5 6 3
f 5 7 6
";

    #[test]
    fn test_poly_stats_mixed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mixed.obj");
        std::fs::write(&path, MIXED).unwrap();

        let stats = poly_stats(&path).unwrap();
        assert_eq!(stats.vertices, 7);
        assert_eq!(stats.faces, 3);
        assert_eq!(stats.quads, 2);
        assert_eq!(stats.triangles, 1);
        assert_eq!(stats.other, 0);
        assert!((stats.quad_ratio() - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_quad_ratio_empty() {
        assert_eq!(PolyStats::default().quad_ratio(), 0.0);
    }

    #[test]
    fn test_import_copies_to_destination() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("in.obj.output");
        std::fs::write(&output, MIXED).unwrap();
        let destination = dir.path().join("results").join("remeshed.obj");

        let imported = ObjImporter::new(&destination).import(&output).unwrap();

        assert_eq!(imported.path, destination);
        assert_eq!(imported.stats.quads, 2);
        assert_eq!(std::fs::read_to_string(&destination).unwrap(), MIXED);
    }

    #[test]
    fn test_import_missing_output() {
        let dir = TempDir::new().unwrap();
        let destination = dir.path().join("remeshed.obj");
        let err = ObjImporter::new(&destination)
            .import(&dir.path().join("never-written.output"))
            .unwrap_err();
        assert!(err.to_string().contains("did not produce"));
        assert!(!destination.exists());
    }

    #[test]
    fn test_import_rejects_mesh_without_faces() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("points.output");
        std::fs::write(&output, "v 0 0 0\nv 1 0 0\n").unwrap();
        let destination = dir.path().join("remeshed.obj");

        assert!(ObjImporter::new(&destination).import(&output).is_err());
        assert!(!destination.exists());
    }
}
