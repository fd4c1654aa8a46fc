use std::ffi::OsString;
use std::path::Path;

use super::options::RemeshOptions;
use super::workspace::Workspace;

/// Build the remesher argument vector, program path first:
///
/// `<exe> -i <input> -o <output> -f <faces> [-sharp] [-adaptive] [-mcf]`
pub fn build_arguments(
    executable: &Path,
    workspace: &Workspace,
    options: &RemeshOptions,
) -> Vec<OsString> {
    build_arguments_for_paths(
        executable,
        workspace.input_path(),
        workspace.output_path(),
        options,
    )
}

fn build_arguments_for_paths(
    executable: &Path,
    input: &Path,
    output: &Path,
    options: &RemeshOptions,
) -> Vec<OsString> {
    let mut argv: Vec<OsString> = vec![
        executable.into(),
        "-i".into(),
        input.into(),
        "-o".into(),
        output.into(),
        "-f".into(),
        options.target_face_count().to_string().into(),
    ];

    if options.sharp() {
        argv.push("-sharp".into());
    }
    if options.adaptive() {
        argv.push("-adaptive".into());
    }
    if options.minimum_cost_flow() {
        argv.push("-mcf".into());
    }

    argv
}
