pub mod export;
pub mod import;
pub mod loader;

pub use export::ObjExporter;
pub use import::{poly_stats, ObjImporter, PolyStats};
