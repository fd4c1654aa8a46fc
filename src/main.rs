//! quadmsh: remesh triangle meshes into quad-dominant meshes with QuadriFlow.
//!
//! The heavy lifting is done by a prebuilt `quadriflow` binary shipped under
//! `<install-dir>/bin`. This program exports the selected mesh to a temp OBJ,
//! runs the binary on it, and stores the result.
//!
//! Set `RUST_LOG` (e.g. `RUST_LOG=quadmsh=debug`) or pass `-v`/`-vv` to see
//! what is going on, including the remesher's own output.

use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod mesh;
mod quadriflow;

use mesh::{ObjExporter, ObjImporter, PolyStats};
use quadriflow::{
    ExecutableResolver, Platform, RemeshOptions, RemeshStage, Remesher, SystemRunner,
    DEFAULT_FACE_COUNT,
};

#[derive(Parser)]
#[command(name = "quadmsh")]
#[command(version, about = "Quad-dominant remeshing with QuadriFlow", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Only report errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// Where the remesher binaries live and which build to pick
#[derive(clap::Args)]
struct ToolArgs {
    /// Directory containing bin/<quadriflow binary> (default: next to this program)
    #[arg(long, env = "QUADMSH_HOME")]
    install_dir: Option<PathBuf>,

    /// Platform whose binary to use: linux, macos or windows (default: host)
    #[arg(long)]
    platform: Option<String>,

    /// Use the plain build instead of the CUDA one
    #[arg(long)]
    no_cuda: bool,
}

impl ToolArgs {
    fn platform_id(&self) -> String {
        self.platform
            .clone()
            .unwrap_or_else(|| std::env::consts::OS.to_string())
    }

    fn resolver(&self) -> Result<ExecutableResolver, Box<dyn std::error::Error>> {
        let install_dir = match &self.install_dir {
            Some(dir) => dir.clone(),
            None => default_install_dir()?,
        };
        Ok(ExecutableResolver::new(install_dir))
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Remesh a mesh file (.obj, .glb or .gltf) into a quad-dominant OBJ
    Remesh {
        /// Input mesh file
        input: PathBuf,

        /// Output mesh file (.obj)
        #[arg(short, long)]
        out: PathBuf,

        /// Mesh to remesh (required if GLB contains multiple meshes)
        #[arg(short, long)]
        mesh: Option<String>,

        /// Target number of faces
        #[arg(short, long, default_value_t = DEFAULT_FACE_COUNT,
              value_parser = clap::value_parser!(u32).range(1..))]
        faces: u32,

        /// Try to follow sharp edges
        #[arg(long)]
        sharp: bool,

        /// Adaptive mode
        #[arg(long)]
        adaptive: bool,

        /// Minimum cost flow
        #[arg(long)]
        mcf: bool,

        /// Kill the remesher after this many seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        tool: ToolArgs,
    },

    /// Display polygon statistics of an OBJ file
    Stats {
        /// Input mesh file (.obj)
        input: PathBuf,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show which remesher binary would be used
    Which {
        #[command(flatten)]
        tool: ToolArgs,
    },
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    let prefix = error_prefix(&cli.command);
    let result = match cli.command {
        Commands::Remesh {
            input,
            out,
            mesh,
            faces,
            sharp,
            adaptive,
            mcf,
            timeout,
            json,
            tool,
        } => {
            let options = RemeshOptions::new(faces).map(|options| {
                options
                    .with_sharp(sharp)
                    .with_adaptive(adaptive)
                    .with_minimum_cost_flow(mcf)
                    .with_acceleration(!tool.no_cuda)
            });
            match options {
                Ok(options) => remesh(
                    &input,
                    &out,
                    mesh,
                    &options,
                    timeout.map(Duration::from_secs),
                    &tool,
                    json,
                ),
                Err(e) => Err(e.into()),
            }
        }
        Commands::Stats { input, json } => show_stats(&input, json),
        Commands::Which { tool } => which(&tool),
    };

    if let Err(e) = result {
        eprintln!("{}: {}", prefix, e);
        std::process::exit(1);
    }
}

/// Leading text of the message printed when `command` fails
fn error_prefix(command: &Commands) -> &'static str {
    match command {
        Commands::Remesh { .. } => "Error during remeshing",
        Commands::Stats { .. } => "Error reading mesh stats",
        Commands::Which { .. } => "Error locating remesher",
    }
}

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match (quiet, verbose) {
            (true, _) => "error",
            (false, 0) => "warn",
            (false, 1) => "quadmsh=info",
            (false, 2) => "quadmsh=debug",
            _ => "trace",
        };
        EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .with(filter)
        .init();
}

/// Directory holding this executable, where `bin/` is expected
fn default_install_dir() -> Result<PathBuf, Box<dyn std::error::Error>> {
    let exe = std::env::current_exe()?;
    exe.parent()
        .map(Path::to_path_buf)
        .ok_or_else(|| "Cannot determine install directory; pass --install-dir".into())
}

#[derive(Serialize)]
struct RemeshSummary<'a> {
    executable: &'a Path,
    arguments: Vec<String>,
    output: &'a Path,
    options: &'a RemeshOptions,
    stages: &'a [RemeshStage],
    stats: &'a PolyStats,
}

fn remesh(
    input: &Path,
    output: &Path,
    mesh_name: Option<String>,
    options: &RemeshOptions,
    timeout: Option<Duration>,
    tool: &ToolArgs,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let resolver = tool.resolver()?;
    info!("Using remesher install directory {:?}", resolver.install_dir());

    let remesher = Remesher::new(resolver, SystemRunner::new().with_timeout(timeout))
        .with_platform(tool.platform_id());

    let mut exporter = ObjExporter::new(input, mesh_name);
    let mut importer = ObjImporter::new(output);

    let report = remesher
        .remesh(options, &mut exporter, &mut importer)
        .map_err(|failure| {
            debug!(stages = ?failure.stages, "Remesh stages before failure");
            failure
        })?;
    let stats = &report.imported.stats;

    if json {
        let summary = RemeshSummary {
            executable: &report.executable.path,
            arguments: report
                .arguments
                .iter()
                .map(|arg| arg.to_string_lossy().into_owned())
                .collect(),
            output: &report.imported.path,
            options,
            stages: &report.stages,
            stats,
        };
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("Remeshed with {:?}", report.executable.path);
        print_stats(stats);
        println!("Wrote {:?}", report.imported.path);
    }

    Ok(())
}

fn show_stats(input: &Path, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let stats = mesh::poly_stats(input).map_err(|e| e.to_string())?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        print_stats(&stats);
    }

    Ok(())
}

fn print_stats(stats: &PolyStats) {
    println!("\n=== Mesh Statistics ===");
    println!("Vertices:  {}", stats.vertices);
    println!("Faces:     {}", stats.faces);
    println!("Quads:     {}", stats.quads);
    println!("Triangles: {}", stats.triangles);
    println!("Other:     {}", stats.other);
    println!("Quad ratio: {:.1}%", stats.quad_ratio() * 100.0);
}

fn which(tool: &ToolArgs) -> Result<(), Box<dyn std::error::Error>> {
    let platform: Platform = tool.platform_id().parse()?;
    let executable = tool.resolver()?.resolve(platform, !tool.no_cuda);

    println!("{}", executable.path.display());
    if executable.exists() {
        println!("✓ Found {} build for {}", build_name(executable.accelerated), platform);
    } else {
        println!(
            "✗ Missing {} build for {}",
            build_name(executable.accelerated),
            platform
        );
    }

    Ok(())
}

fn build_name(accelerated: bool) -> &'static str {
    if accelerated { "CUDA" } else { "CPU" }
}
