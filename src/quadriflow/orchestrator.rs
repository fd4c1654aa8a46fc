use serde::Serialize;
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, error, info};

use super::command::build_arguments;
use super::error::{CollaboratorError, RemeshError};
use super::options::RemeshOptions;
use super::resolver::{ExecutableDescriptor, ExecutableResolver, Platform};
use super::runner::{ExitOutcome, ProcessRunner, SystemRunner};
use super::workspace::Workspace;

/// States a remesh invocation passes through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RemeshStage {
    Idle,
    Exporting,
    Resolving,
    Running,
    Importing,
    CleaningUp,
    Done,
    Failed,
}

/// How the exporter should write the mesh handed to the remesher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportSettings {
    pub selection_only: bool,
    pub include_materials: bool,
}

impl ExportSettings {
    /// The remesher only understands bare geometry of the selected mesh
    pub const SELECTION_WITHOUT_MATERIALS: Self = Self {
        selection_only: true,
        include_materials: false,
    };
}

/// Writes the mesh to be remeshed to a file
pub trait MeshExporter {
    fn export(&mut self, path: &Path, settings: &ExportSettings) -> Result<(), CollaboratorError>;
}

/// Reads the remeshed result back
pub trait MeshImporter {
    type Output;

    fn import(&mut self, path: &Path) -> Result<Self::Output, CollaboratorError>;
}

/// A completed run
#[derive(Debug)]
pub struct RemeshReport<T> {
    pub imported: T,
    pub executable: ExecutableDescriptor,
    pub arguments: Vec<OsString>,
    pub stages: Vec<RemeshStage>,
}

/// A failed run, with the stages it went through before failing
#[derive(Debug, Error)]
#[error("{error}")]
pub struct RemeshFailure {
    pub error: RemeshError,
    pub stages: Vec<RemeshStage>,
}

struct StageTrace {
    stages: Vec<RemeshStage>,
}

impl StageTrace {
    fn new() -> Self {
        Self {
            stages: vec![RemeshStage::Idle],
        }
    }

    fn enter(&mut self, stage: RemeshStage) {
        debug!(stage = ?stage, "Remesh stage");
        self.stages.push(stage);
    }
}

struct Completed<T> {
    imported: T,
    executable: ExecutableDescriptor,
    arguments: Vec<OsString>,
}

/// Runs the export → remesh → import pipeline around a temp workspace.
///
/// Every invocation gets its own workspace, and the workspace is released
/// exactly once whatever step fails.
pub struct Remesher<R = SystemRunner> {
    resolver: ExecutableResolver,
    platform_id: String,
    runner: R,
    temp_dir: Option<PathBuf>,
}

impl<R: ProcessRunner> Remesher<R> {
    /// Create a remesher for the host OS using the system temp directory
    pub fn new(resolver: ExecutableResolver, runner: R) -> Self {
        Self {
            resolver,
            platform_id: std::env::consts::OS.to_string(),
            runner,
            temp_dir: None,
        }
    }

    /// Override the OS identifier used to pick the binary
    pub fn with_platform(mut self, platform_id: impl Into<String>) -> Self {
        self.platform_id = platform_id.into();
        self
    }

    /// Put workspaces in `temp_dir` instead of the system temp directory
    pub fn with_temp_dir(mut self, temp_dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(temp_dir.into());
        self
    }

    pub fn remesh<E, I>(
        &self,
        options: &RemeshOptions,
        exporter: &mut E,
        importer: &mut I,
    ) -> Result<RemeshReport<I::Output>, RemeshFailure>
    where
        E: MeshExporter,
        I: MeshImporter,
    {
        let mut trace = StageTrace::new();
        trace.enter(RemeshStage::Exporting);

        let acquired = match &self.temp_dir {
            Some(dir) => Workspace::acquire_in(dir),
            None => Workspace::acquire(),
        };

        let result = match acquired {
            Ok(mut workspace) => {
                let result = self.run_pipeline(&workspace, options, exporter, importer, &mut trace);
                trace.enter(RemeshStage::CleaningUp);
                workspace.release();
                result
            }
            Err(e) => {
                trace.enter(RemeshStage::CleaningUp);
                Err(RemeshError::WorkspaceFailed(e))
            }
        };

        match result {
            Ok(completed) => {
                trace.enter(RemeshStage::Done);
                info!("Remesh finished");
                Ok(RemeshReport {
                    imported: completed.imported,
                    executable: completed.executable,
                    arguments: completed.arguments,
                    stages: trace.stages,
                })
            }
            Err(error) => {
                trace.enter(RemeshStage::Failed);
                error!(stage = ?error.stage(), "Remesh failed: {}", error);
                Err(RemeshFailure {
                    error,
                    stages: trace.stages,
                })
            }
        }
    }

    fn run_pipeline<E, I>(
        &self,
        workspace: &Workspace,
        options: &RemeshOptions,
        exporter: &mut E,
        importer: &mut I,
        trace: &mut StageTrace,
    ) -> Result<Completed<I::Output>, RemeshError>
    where
        E: MeshExporter,
        I: MeshImporter,
    {
        info!("Exporting mesh to {:?}...", workspace.input_path());
        exporter
            .export(
                workspace.input_path(),
                &ExportSettings::SELECTION_WITHOUT_MATERIALS,
            )
            .map_err(|source| RemeshError::ExportFailed {
                path: workspace.input_path().to_path_buf(),
                source,
            })?;

        trace.enter(RemeshStage::Resolving);
        let platform: Platform = self.platform_id.parse()?;
        let executable = self
            .resolver
            .resolve(platform, options.use_hardware_acceleration());
        if !executable.exists() {
            return Err(RemeshError::MissingExecutable {
                path: executable.path,
            });
        }

        trace.enter(RemeshStage::Running);
        let arguments = build_arguments(&executable.path, workspace, options);
        info!("Launching: {:?}", arguments);
        match self.runner.run(&arguments) {
            outcome if outcome.is_success() => {}
            ExitOutcome::Exited { code } => return Err(RemeshError::ToolReportedFailure { code }),
            ExitOutcome::TimedOut { after } => return Err(RemeshError::ToolTimedOut { after }),
            ExitOutcome::LaunchFailed { kind, message } => {
                return Err(match kind {
                    io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => {
                        RemeshError::MissingExecutable {
                            path: executable.path,
                        }
                    }
                    _ => RemeshError::LaunchFailed {
                        path: executable.path,
                        message,
                    },
                });
            }
        }

        trace.enter(RemeshStage::Importing);
        info!("Importing remeshed mesh from {:?}...", workspace.output_path());
        let imported = importer
            .import(workspace.output_path())
            .map_err(|source| RemeshError::ImportFailed {
                path: workspace.output_path().to_path_buf(),
                source,
            })?;

        Ok(Completed {
            imported,
            executable,
            arguments,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use tempfile::TempDir;
    use super::RemeshStage::*;

    struct FakeExporter {
        fail: bool,
        settings: Option<ExportSettings>,
    }

    impl FakeExporter {
        fn new() -> Self {
            Self {
                fail: false,
                settings: None,
            }
        }
    }

    impl MeshExporter for FakeExporter {
        fn export(&mut self, path: &Path, settings: &ExportSettings) -> Result<(), CollaboratorError> {
            self.settings = Some(*settings);
            if self.fail {
                return Err("selection is empty".into());
            }
            std::fs::write(path, "v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n")?;
            Ok(())
        }
    }

    struct FakeImporter {
        fail: bool,
        calls: usize,
    }

    impl FakeImporter {
        fn new() -> Self {
            Self {
                fail: false,
                calls: 0,
            }
        }
    }

    impl MeshImporter for FakeImporter {
        type Output = String;

        fn import(&mut self, path: &Path) -> Result<String, CollaboratorError> {
            self.calls += 1;
            if self.fail {
                return Err("not a mesh".into());
            }
            Ok(std::fs::read_to_string(path)?)
        }
    }

    /// Pretends to be the remesher: writes the `-o` file, then reports `outcome`
    struct FakeRunner {
        outcome: ExitOutcome,
        write_output: bool,
        calls: Cell<usize>,
        argv: RefCell<Vec<OsString>>,
    }

    impl FakeRunner {
        fn new(outcome: ExitOutcome) -> Self {
            Self {
                outcome,
                write_output: true,
                calls: Cell::new(0),
                argv: RefCell::new(Vec::new()),
            }
        }
    }

    impl ProcessRunner for FakeRunner {
        fn run(&self, argv: &[OsString]) -> ExitOutcome {
            self.calls.set(self.calls.get() + 1);
            *self.argv.borrow_mut() = argv.to_vec();
            if self.write_output {
                std::fs::write(&argv[4], "v 0 0 0\nf 1 1 1 1\n").unwrap();
            }
            self.outcome.clone()
        }
    }

    struct Fixture {
        install: TempDir,
        temp: TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                install: TempDir::new().unwrap(),
                temp: TempDir::new().unwrap(),
            }
        }

        fn with_binary(name: &str) -> Self {
            let fixture = Self::new();
            let bin = fixture.install.path().join("bin");
            std::fs::create_dir_all(&bin).unwrap();
            std::fs::write(bin.join(name), "").unwrap();
            fixture
        }

        /// Installs `script` as bin/quadriflow with the given permission bits
        #[cfg(unix)]
        fn with_script(script: &str, mode: u32) -> Self {
            use std::os::unix::fs::PermissionsExt;

            let fixture = Self::new();
            let bin = fixture.install.path().join("bin");
            std::fs::create_dir_all(&bin).unwrap();
            let exe = bin.join("quadriflow");
            std::fs::write(&exe, script).unwrap();
            std::fs::set_permissions(&exe, std::fs::Permissions::from_mode(mode)).unwrap();
            fixture
        }

        fn remesher<R: ProcessRunner>(&self, runner: R) -> Remesher<R> {
            Remesher::new(ExecutableResolver::new(self.install.path()), runner)
                .with_platform("linux")
                .with_temp_dir(self.temp.path())
        }

        fn temp_is_empty(&self) -> bool {
            std::fs::read_dir(self.temp.path()).unwrap().count() == 0
        }
    }

    fn plain_options() -> RemeshOptions {
        RemeshOptions::new(800)
            .unwrap()
            .with_adaptive(true)
            .with_acceleration(false)
    }

    fn cleanup_count(stages: &[RemeshStage]) -> usize {
        stages.iter().filter(|s| **s == CleaningUp).count()
    }

    #[test]
    fn test_successful_run() {
        let fixture = Fixture::with_binary("quadriflow");
        let remesher = fixture.remesher(FakeRunner::new(ExitOutcome::Exited { code: Some(0) }));
        let mut exporter = FakeExporter::new();
        let mut importer = FakeImporter::new();

        let report = remesher
            .remesh(&plain_options(), &mut exporter, &mut importer)
            .unwrap();

        assert_eq!(
            report.stages,
            vec![Idle, Exporting, Resolving, Running, Importing, CleaningUp, Done]
        );
        assert_eq!(report.imported, "v 0 0 0\nf 1 1 1 1\n");
        assert_eq!(
            report.executable.path,
            fixture.install.path().join("bin").join("quadriflow")
        );
        assert_eq!(
            exporter.settings,
            Some(ExportSettings::SELECTION_WITHOUT_MATERIALS)
        );
        assert!(fixture.temp_is_empty());

        let args: Vec<String> = report
            .arguments
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(args[0], report.executable.path.to_string_lossy());
        assert_eq!(args[1], "-i");
        assert_eq!(args[3], "-o");
        assert_eq!(args[4], format!("{}.output", args[2]));
        assert_eq!(&args[5..], ["-f", "800", "-adaptive"]);
    }

    #[test]
    fn test_accelerated_binary_is_used() {
        let fixture = Fixture::with_binary("cuda_quadriflow");
        let runner = FakeRunner::new(ExitOutcome::Exited { code: Some(0) });
        let remesher = fixture.remesher(runner);

        let report = remesher
            .remesh(
                &RemeshOptions::default(),
                &mut FakeExporter::new(),
                &mut FakeImporter::new(),
            )
            .unwrap();

        assert!(report.executable.accelerated);
        assert!(report.executable.path.ends_with("bin/cuda_quadriflow"));
    }

    #[test]
    fn test_missing_executable_skips_run_and_cleans_up() {
        let fixture = Fixture::new();
        let runner = FakeRunner::new(ExitOutcome::Exited { code: Some(0) });
        let remesher = fixture.remesher(runner);
        let mut importer = FakeImporter::new();

        let failure = remesher
            .remesh(&plain_options(), &mut FakeExporter::new(), &mut importer)
            .unwrap_err();

        assert!(matches!(failure.error, RemeshError::MissingExecutable { .. }));
        assert_eq!(failure.stages, vec![Idle, Exporting, Resolving, CleaningUp, Failed]);
        assert_eq!(remesher.runner.calls.get(), 0);
        assert_eq!(importer.calls, 0);
        assert!(fixture.temp_is_empty());
    }

    #[test]
    fn test_nonzero_exit_skips_import_and_cleans_up() {
        let fixture = Fixture::with_binary("quadriflow");
        let remesher = fixture.remesher(FakeRunner::new(ExitOutcome::Exited { code: Some(2) }));
        let mut importer = FakeImporter::new();

        let failure = remesher
            .remesh(&plain_options(), &mut FakeExporter::new(), &mut importer)
            .unwrap_err();

        assert!(matches!(
            failure.error,
            RemeshError::ToolReportedFailure { code: Some(2) }
        ));
        assert_eq!(
            failure.stages,
            vec![Idle, Exporting, Resolving, Running, CleaningUp, Failed]
        );
        assert_eq!(importer.calls, 0);
        assert_eq!(cleanup_count(&failure.stages), 1);
        // The partial output written by the tool is removed too
        assert!(fixture.temp_is_empty());
    }

    #[test]
    fn test_import_failure_cleans_up() {
        let fixture = Fixture::with_binary("quadriflow");
        let remesher = fixture.remesher(FakeRunner::new(ExitOutcome::Exited { code: Some(0) }));
        let mut importer = FakeImporter::new();
        importer.fail = true;

        let failure = remesher
            .remesh(&plain_options(), &mut FakeExporter::new(), &mut importer)
            .unwrap_err();

        assert!(matches!(failure.error, RemeshError::ImportFailed { .. }));
        assert_eq!(failure.error.stage(), Importing);
        assert_eq!(cleanup_count(&failure.stages), 1);
        assert_eq!(failure.stages.last(), Some(&Failed));
        assert!(fixture.temp_is_empty());
    }

    #[test]
    fn test_export_failure_skips_everything_else() {
        let fixture = Fixture::with_binary("quadriflow");
        let remesher = fixture.remesher(FakeRunner::new(ExitOutcome::Exited { code: Some(0) }));
        let mut exporter = FakeExporter::new();
        exporter.fail = true;

        let failure = remesher
            .remesh(&plain_options(), &mut exporter, &mut FakeImporter::new())
            .unwrap_err();

        assert!(matches!(failure.error, RemeshError::ExportFailed { .. }));
        assert_eq!(failure.stages, vec![Idle, Exporting, CleaningUp, Failed]);
        assert_eq!(remesher.runner.calls.get(), 0);
        assert!(fixture.temp_is_empty());
    }

    #[test]
    fn test_unsupported_platform() {
        let fixture = Fixture::with_binary("quadriflow");
        let remesher = fixture
            .remesher(FakeRunner::new(ExitOutcome::Exited { code: Some(0) }))
            .with_platform("plan9");

        let failure = remesher
            .remesh(&plain_options(), &mut FakeExporter::new(), &mut FakeImporter::new())
            .unwrap_err();

        assert!(matches!(failure.error, RemeshError::UnsupportedPlatform(_)));
        assert_eq!(failure.stages, vec![Idle, Exporting, Resolving, CleaningUp, Failed]);
        assert!(fixture.temp_is_empty());
    }

    #[test]
    fn test_launch_errors_are_classified() {
        let fixture = Fixture::with_binary("quadriflow");

        let mut runner = FakeRunner::new(ExitOutcome::LaunchFailed {
            kind: io::ErrorKind::PermissionDenied,
            message: "permission denied".to_string(),
        });
        runner.write_output = false;
        let failure = fixture
            .remesher(runner)
            .remesh(&plain_options(), &mut FakeExporter::new(), &mut FakeImporter::new())
            .unwrap_err();
        assert!(matches!(failure.error, RemeshError::MissingExecutable { .. }));

        let mut runner = FakeRunner::new(ExitOutcome::LaunchFailed {
            kind: io::ErrorKind::OutOfMemory,
            message: "out of memory".to_string(),
        });
        runner.write_output = false;
        let failure = fixture
            .remesher(runner)
            .remesh(&plain_options(), &mut FakeExporter::new(), &mut FakeImporter::new())
            .unwrap_err();
        assert!(matches!(failure.error, RemeshError::LaunchFailed { .. }));
        assert!(fixture.temp_is_empty());
    }

    #[test]
    fn test_timeout_fails_and_cleans_up() {
        let fixture = Fixture::with_binary("quadriflow");
        let after = std::time::Duration::from_secs(30);
        let remesher = fixture.remesher(FakeRunner::new(ExitOutcome::TimedOut { after }));

        let failure = remesher
            .remesh(&plain_options(), &mut FakeExporter::new(), &mut FakeImporter::new())
            .unwrap_err();

        assert!(matches!(failure.error, RemeshError::ToolTimedOut { .. }));
        assert!(fixture.temp_is_empty());
    }

    #[test]
    fn test_missing_temp_dir_fails_before_export() {
        let fixture = Fixture::with_binary("quadriflow");
        let remesher = fixture
            .remesher(FakeRunner::new(ExitOutcome::Exited { code: Some(0) }))
            .with_temp_dir(fixture.temp.path().join("does-not-exist"));
        let mut exporter = FakeExporter::new();

        let failure = remesher
            .remesh(&plain_options(), &mut exporter, &mut FakeImporter::new())
            .unwrap_err();

        assert!(matches!(failure.error, RemeshError::WorkspaceFailed(_)));
        assert_eq!(exporter.settings, None);
        assert_eq!(cleanup_count(&failure.stages), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_non_executable_binary_is_missing_executable() {
        let fixture = Fixture::with_script("#!/bin/sh\nexit 0\n", 0o644);
        let mut importer = FakeImporter::new();

        let failure = fixture
            .remesher(SystemRunner::new())
            .remesh(&plain_options(), &mut FakeExporter::new(), &mut importer)
            .unwrap_err();

        assert!(matches!(failure.error, RemeshError::MissingExecutable { .. }));
        assert_eq!(
            failure.stages,
            vec![Idle, Exporting, Resolving, Running, CleaningUp, Failed]
        );
        assert_eq!(importer.calls, 0);
        assert!(fixture.temp_is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_system_runner_end_to_end() {
        let script = r#"#!/bin/sh
out=""
while [ $# -gt 0 ]; do
    case "$1" in
        -o) out="$2"; shift ;;
    esac
    shift
done
echo "writing $out"
printf 'v 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\nf 1 2 3 4\n' > "$out"
"#;
        let fixture = Fixture::with_script(script, 0o755);
        let mut importer = FakeImporter::new();

        let report = fixture
            .remesher(SystemRunner::new())
            .remesh(&plain_options(), &mut FakeExporter::new(), &mut importer)
            .unwrap();

        assert_eq!(report.imported, "v 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\nf 1 2 3 4\n");
        let tail: Vec<String> = report.arguments[5..]
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(tail, vec!["-f", "800", "-adaptive"]);
        assert_eq!(
            report.stages,
            vec![Idle, Exporting, Resolving, Running, Importing, CleaningUp, Done]
        );
        assert_eq!(importer.calls, 1);
        assert!(fixture.temp_is_empty());
    }
}
