pub mod command;
pub mod error;
pub mod options;
pub mod orchestrator;
pub mod resolver;
pub mod runner;
pub mod workspace;

pub use error::CollaboratorError;
pub use options::{RemeshOptions, DEFAULT_FACE_COUNT};
pub use orchestrator::{ExportSettings, MeshExporter, MeshImporter, RemeshStage, Remesher};
pub use resolver::{ExecutableResolver, Platform};
pub use runner::SystemRunner;
