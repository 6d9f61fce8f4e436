use std::path::Path;

pub(super) struct SubstError;

/// In-place global text substitution, delegated to `sed`. The pattern
/// recorded by the legacy system describes its token alphabet and is
/// not needed here. Any stderr output is fatal.
pub(super) fn substitute(
    work_dir: &Path,
    path: &str,
    old_text: &str,
    new_text: &str,
) -> Result<(), SubstError> {
    let script = format!("s/{old_text}/{new_text}/g");
    tracing::debug!("running sed {script:?} on {path}");

    let mut cmd = std::process::Command::new("sed");
    cmd.current_dir(work_dir);
    cmd.stdin(std::process::Stdio::null());
    cmd.arg("-i").arg(&script).arg("--").arg(path);

    let output = cmd.output().map_err(|e| {
        tracing::error!("failed to run sed: {e}");
        SubstError
    })?;

    if !output.status.success() || !output.stderr.is_empty() {
        tracing::error!(
            "sed {script:?} on {path} failed with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim_end(),
        );
        return Err(SubstError);
    }
    Ok(())
}
