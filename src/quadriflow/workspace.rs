use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::error::CleanupWarning;

const TEMP_PREFIX: &str = "msh_quadriflow";
const INPUT_SUFFIX: &str = ".obj";
const OUTPUT_SUFFIX: &str = ".output";

/// Pair of temp files used to hand a mesh to the remesher and get it back.
///
/// The input file is created empty by `acquire`; the output file is left for
/// the remesher to create. Both are removed by `release`, which runs at most
/// once. Dropping an unreleased workspace releases it, so an early return or
/// a panic cannot leak the files.
#[derive(Debug)]
pub struct Workspace {
    input_path: PathBuf,
    output_path: PathBuf,
    released: bool,
}

impl Workspace {
    /// Acquire a workspace in the system temp directory
    pub fn acquire() -> io::Result<Self> {
        Self::acquire_in(std::env::temp_dir())
    }

    pub fn acquire_in(dir: impl AsRef<Path>) -> io::Result<Self> {
        let input_path = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .suffix(INPUT_SUFFIX)
            .tempfile_in(dir)?
            .into_temp_path()
            .keep()
            .map_err(|e| e.error)?;

        let output_path = output_path_for(&input_path);

        debug!(input = ?input_path, output = ?output_path, "Acquired workspace");

        Ok(Self {
            input_path,
            output_path,
            released: false,
        })
    }

    pub fn input_path(&self) -> &Path {
        &self.input_path
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    /// Delete whichever of the two files exist.
    ///
    /// Returns the deletions that failed; each is also logged. Calling this
    /// again after the first time does nothing.
    pub fn release(&mut self) -> Vec<CleanupWarning> {
        if self.released {
            return Vec::new();
        }
        self.released = true;

        let mut warnings = Vec::new();
        for path in [&self.input_path, &self.output_path] {
            if !path.is_file() {
                continue;
            }
            match std::fs::remove_file(path) {
                Ok(()) => debug!(path = ?path, "Removed temporary file"),
                Err(error) => {
                    let warning = CleanupWarning {
                        path: path.clone(),
                        error,
                    };
                    warn!("{}", warning);
                    warnings.push(warning);
                }
            }
        }
        warnings
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if !self.released {
            self.release();
        }
    }
}

/// `<input>.output`, next to the input file
fn output_path_for(input: &Path) -> PathBuf {
    let mut name: OsString = input.as_os_str().to_owned();
    name.push(OUTPUT_SUFFIX);
    PathBuf::from(name)
}
