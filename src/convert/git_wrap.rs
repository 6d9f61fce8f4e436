use std::path::{Path, PathBuf};

use super::GitCommitMeta;

pub(super) struct GitError;

/// Runs git against the destination repository. Any non-empty stderr
/// output, or a non-zero exit status, is treated as fatal.
pub(super) struct Git {
    repo_dir: PathBuf,
}

impl Git {
    pub(super) fn new(repo_dir: &Path) -> Self {
        Self {
            repo_dir: repo_dir.to_path_buf(),
        }
    }

    fn git_cmd(&self) -> std::process::Command {
        let mut cmd = std::process::Command::new("git");
        cmd.current_dir(&self.repo_dir);
        cmd.stdin(std::process::Stdio::null());
        cmd
    }

    fn run(&self, mut cmd: std::process::Command) -> Result<(), GitError> {
        let output = cmd.output().map_err(|e| {
            tracing::error!("failed to run {cmd:?}: {e}");
            GitError
        })?;

        if !output.status.success() || !output.stderr.is_empty() {
            tracing::error!(
                "{cmd:?} failed with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim_end(),
            );
            return Err(GitError);
        }
        Ok(())
    }

    /// `git add -- <paths>`
    pub(super) fn stage(&self, paths: &[String]) -> Result<(), GitError> {
        let mut cmd = self.git_cmd();
        cmd.args(["add", "--"]);
        cmd.args(paths);
        self.run(cmd)
    }

    /// `git add -u -- <paths>`
    pub(super) fn stage_update(&self, paths: &[String]) -> Result<(), GitError> {
        let mut cmd = self.git_cmd();
        cmd.args(["add", "-u", "--"]);
        cmd.args(paths);
        self.run(cmd)
    }

    /// `git add -u` over the whole tree; catches in-place edits and
    /// deletions of tracked paths.
    pub(super) fn stage_all_tracked(&self) -> Result<(), GitError> {
        let mut cmd = self.git_cmd();
        cmd.args(["add", "-u"]);
        self.run(cmd)
    }

    /// Commits the staged changes. The author and committer identity
    /// and dates are both pinned to the patch metadata. `--allow-empty`
    /// because a patch may reconcile to a net no-op and must still
    /// produce a commit.
    pub(super) fn commit(&self, meta: &GitCommitMeta) -> Result<(), GitError> {
        let author = format!("{} <{}>", meta.author.name, meta.author.email);
        let date = format!("{} +0000", meta.author.time.seconds);

        let mut cmd = self.git_cmd();
        cmd.args(["commit", "--allow-empty"]);
        cmd.arg("-m").arg(&meta.message);
        cmd.arg("--author").arg(&author);
        cmd.arg("--date").arg(&date);
        cmd.env("GIT_COMMITTER_NAME", meta.author.name.to_string());
        cmd.env("GIT_COMMITTER_EMAIL", meta.author.email.to_string());
        cmd.env("GIT_COMMITTER_DATE", &date);
        self.run(cmd)
    }
}
