use std::path::{Path, PathBuf};

use super::{git_wrap, subst, GitMetaMaker};
use crate::darcs::inventory::PatchInfo;
use crate::darcs::patch::{HandlerError, PatchHandler};
use crate::FHashSet;

// Git chokes on very long command lines; stage paths in batches.
const STAGE_CHUNK: usize = 80;

const KEEP_FILE: &str = ".keepme";

/// Per-patch bookkeeping of pending additions, renames and deletions,
/// reset after every commit. These sets exist only to compute the
/// minimal staging commands; the working tree itself is the source of
/// truth for content. A path is in at most one of `added`, the rename
/// keys, or `deleted` at any time.
struct ReplayState {
    added: FHashSet<String>,
    /// added this patch and still known to hold no content
    empty_added: FHashSet<String>,
    renamed: Vec<(String, String)>,
    deleted: FHashSet<String>,
}

#[derive(Debug, PartialEq, Eq)]
enum StageOp {
    Update(Vec<String>),
    Add(Vec<String>),
    UpdateAll,
}

impl ReplayState {
    fn new() -> Self {
        Self {
            added: FHashSet::default(),
            empty_added: FHashSet::default(),
            renamed: Vec::new(),
            deleted: FHashSet::default(),
        }
    }

    fn record_added(&mut self, path: &str) {
        self.added.insert(path.to_owned());
    }

    fn record_added_empty(&mut self, path: &str) {
        self.added.insert(path.to_owned());
        self.empty_added.insert(path.to_owned());
    }

    /// The path may have been added, renamed and removed all within
    /// one patch; only the net effect must reach git.
    fn record_removed(&mut self, path: &str) {
        self.added.remove(path);
        self.empty_added.remove(path);
        self.renamed
            .retain(|(from, to)| from != path && to != path);
        self.deleted.insert(path.to_owned());
    }

    /// Like `record_removed`, but also forgets everything pending
    /// beneath the directory (its placeholder included).
    fn record_removed_tree(&mut self, path: &str) {
        let prefix = format!("{path}/");
        self.added
            .retain(|p| p != path && !p.starts_with(&prefix));
        self.empty_added
            .retain(|p| p != path && !p.starts_with(&prefix));
        self.renamed.retain(|(from, to)| {
            from != path && to != path && !from.starts_with(&prefix) && !to.starts_with(&prefix)
        });
        self.deleted.insert(path.to_owned());
    }

    /// Returns true if `from` was a pending addition of this same
    /// patch; it is then relabeled instead of recorded as a rename.
    fn record_moved(&mut self, from: &str, to: &str) -> bool {
        if self.added.remove(from) {
            self.added.insert(to.to_owned());
            if self.empty_added.remove(from) {
                self.empty_added.insert(to.to_owned());
            }
            true
        } else {
            self.renamed.push((from.to_owned(), to.to_owned()));
            false
        }
    }

    fn mark_written(&mut self, path: &str) {
        self.empty_added.remove(path);
    }

    fn is_empty_added(&self, path: &str) -> bool {
        self.empty_added.contains(path)
    }

    /// The order matters against git's staging semantics: old rename
    /// locations first (captures the deletions), then new locations,
    /// then the surviving additions, then a blanket update for
    /// in-place edits and deletions not otherwise covered.
    fn staging_plan(&self) -> Vec<StageOp> {
        let mut plan = Vec::new();

        for chunk in self.renamed.chunks(STAGE_CHUNK) {
            plan.push(StageOp::Update(
                chunk.iter().map(|(from, _)| from.clone()).collect(),
            ));
        }
        for chunk in self.renamed.chunks(STAGE_CHUNK) {
            plan.push(StageOp::Add(
                chunk.iter().map(|(_, to)| to.clone()).collect(),
            ));
        }

        let mut to_add: Vec<String> = self
            .added
            .iter()
            .filter(|path| !self.deleted.contains(*path))
            .cloned()
            .collect();
        to_add.sort_unstable();
        for chunk in to_add.chunks(STAGE_CHUNK) {
            plan.push(StageOp::Add(chunk.to_vec()));
        }

        plan.push(StageOp::UpdateAll);
        plan
    }

    fn clear(&mut self) {
        self.added.clear();
        self.empty_added.clear();
        self.renamed.clear();
        self.deleted.clear();
    }
}

/// Applies the edit operations of one patch to the destination working
/// tree and commits the net result when the patch ends.
pub(super) struct ReplayHandler<'a> {
    work_dir: &'a Path,
    git: git_wrap::Git,
    meta_maker: &'a dyn GitMetaMaker,
    patch_filename: &'a str,
    skip_binaries: bool,
    meta: Option<PatchInfo>,
    state: ReplayState,
}

impl<'a> ReplayHandler<'a> {
    pub(super) fn new(
        work_dir: &'a Path,
        meta_maker: &'a dyn GitMetaMaker,
        patch_filename: &'a str,
        skip_binaries: bool,
    ) -> Self {
        Self {
            work_dir,
            git: git_wrap::Git::new(work_dir),
            meta_maker,
            patch_filename,
            skip_binaries,
            meta: None,
            state: ReplayState::new(),
        }
    }

    fn tree_path(&self, path: &str) -> PathBuf {
        self.work_dir.join(path)
    }
}

impl PatchHandler for ReplayHandler<'_> {
    fn begin(&mut self, meta: &PatchInfo) -> Result<(), HandlerError> {
        self.meta = Some(meta.clone());
        Ok(())
    }

    fn addfile(&mut self, path: &str) -> Result<(), HandlerError> {
        tracing::debug!("adding file {path}");
        std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(self.tree_path(path))
            .map_err(|e| {
                tracing::error!("failed to create file {path}: {e}");
                HandlerError
            })?;
        self.state.record_added_empty(path);
        Ok(())
    }

    fn adddir(&mut self, path: &str) -> Result<(), HandlerError> {
        tracing::debug!("adding dir {path}");
        std::fs::create_dir(self.tree_path(path)).map_err(|e| {
            tracing::error!("failed to create dir {path}: {e}");
            HandlerError
        })?;

        // empty directories are not representable in git
        let keep_path = format!("{path}/{KEEP_FILE}");
        std::fs::write(self.tree_path(&keep_path), b"").map_err(|e| {
            tracing::error!("failed to create {keep_path}: {e}");
            HandlerError
        })?;

        self.state.record_added(path);
        self.state.record_added(&keep_path);
        Ok(())
    }

    fn rmfile(&mut self, path: &str) -> Result<(), HandlerError> {
        tracing::debug!("removing file {path}");
        match std::fs::remove_file(self.tree_path(path)) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // two patches may each remove the same path without
                // conflicting
                tracing::warn!("removing absent file {path}");
            }
            Err(e) => {
                tracing::error!("failed to remove file {path}: {e}");
                return Err(HandlerError);
            }
        }
        self.state.record_removed(path);
        Ok(())
    }

    fn rmdir(&mut self, path: &str) -> Result<(), HandlerError> {
        tracing::debug!("removing dir {path}");
        match std::fs::remove_dir_all(self.tree_path(path)) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!("removing absent dir {path}");
            }
            Err(e) => {
                tracing::error!("failed to remove dir {path}: {e}");
                return Err(HandlerError);
            }
        }
        self.state.record_removed_tree(path);
        Ok(())
    }

    fn move_path(&mut self, from: &str, to: &str) -> Result<(), HandlerError> {
        tracing::debug!("moving {from} -> {to}");
        if self.state.record_moved(from, to) {
            // added earlier in this same patch; the rename stays a
            // pending addition under its new name
            let from_full = self.tree_path(from);
            if from_full.exists() {
                std::fs::rename(&from_full, self.tree_path(to)).map_err(|e| {
                    tracing::error!("failed to move {from} -> {to}: {e}");
                    HandlerError
                })?;
            }
        } else {
            std::fs::rename(self.tree_path(from), self.tree_path(to)).map_err(|e| {
                tracing::error!("failed to move {from} -> {to}: {e}");
                HandlerError
            })?;
        }
        Ok(())
    }

    fn hunk(
        &mut self,
        path: &str,
        first_line: usize,
        inserted: Vec<Vec<u8>>,
        deleted: Vec<Vec<u8>>,
    ) -> Result<(), HandlerError> {
        let full = self.tree_path(path);

        // a file added within this patch is known to be empty; write
        // the insertions without reading it back
        if self.state.is_empty_added(path) {
            let mut data = Vec::new();
            for line in &inserted {
                data.extend_from_slice(line);
            }
            std::fs::write(&full, data).map_err(|e| {
                tracing::error!("failed to write {path}: {e}");
                HandlerError
            })?;
            if !inserted.is_empty() {
                self.state.mark_written(path);
            }
            return Ok(());
        }

        match std::fs::read(&full) {
            Ok(content) => {
                let new_content = splice_lines(&content, first_line, &inserted, deleted.len());
                std::fs::write(&full, new_content).map_err(|e| {
                    tracing::error!("failed to write {path}: {e}");
                    HandlerError
                })?;
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!("hunk against missing file {path}");
                if inserted.is_empty() || only_whitespace(&inserted) {
                    tracing::warn!("no lines inserted, continuing");
                    Ok(())
                } else {
                    tracing::error!("hunk inserts lines into missing file {path}");
                    Err(HandlerError)
                }
            }
            Err(e) => {
                tracing::error!("failed to read {path}: {e}");
                Err(HandlerError)
            }
        }
    }

    fn binary(&mut self, path: &str, data: Option<Vec<u8>>) -> Result<(), HandlerError> {
        match data {
            Some(data) => {
                tracing::debug!("writing binary file {path} ({} bytes)", data.len());
                std::fs::write(self.tree_path(path), data).map_err(|e| {
                    tracing::error!("failed to write binary file {path}: {e}");
                    HandlerError
                })?;
                self.state.mark_written(path);
            }
            None => {
                tracing::info!("not writing binary file {path}, skipping");
            }
        }
        Ok(())
    }

    fn replace(
        &mut self,
        path: &str,
        _pattern: &str,
        old_text: &str,
        new_text: &str,
    ) -> Result<(), HandlerError> {
        tracing::debug!("replacing {old_text} -> {new_text} in {path}");
        subst::substitute(self.work_dir, path, old_text, new_text).map_err(|subst::SubstError| {
            tracing::error!("text substitution failed in {path}");
            HandlerError
        })?;
        self.state.mark_written(path);
        Ok(())
    }

    fn changepref(&mut self) -> Result<(), HandlerError> {
        // no git equivalent
        tracing::debug!("ignoring changepref");
        Ok(())
    }

    fn merger(&mut self) -> Result<(), HandlerError> {
        tracing::debug!("ignoring merger");
        Ok(())
    }

    fn finished(&mut self) -> Result<(), HandlerError> {
        let Some(meta) = self.meta.take() else {
            tracing::error!("patch finished before its header was seen");
            return Err(HandlerError);
        };

        for stage_op in self.state.staging_plan() {
            let r = match stage_op {
                StageOp::Update(paths) => self.git.stage_update(&paths),
                StageOp::Add(paths) => self.git.stage(&paths),
                StageOp::UpdateAll => self.git.stage_all_tracked(),
            };
            r.map_err(|git_wrap::GitError| HandlerError)?;
        }

        let commit_meta = self
            .meta_maker
            .make_git_commit_meta(&meta, self.patch_filename)
            .map_err(|e| {
                tracing::error!("failed to build commit metadata: {e}");
                HandlerError
            })?;
        self.git
            .commit(&commit_meta)
            .map_err(|git_wrap::GitError| HandlerError)?;

        self.state.clear();
        Ok(())
    }

    fn skip_binaries(&self) -> bool {
        self.skip_binaries
    }
}

/// Removes `delete_count` lines at 1-based `first_line` and splices in
/// `inserted` at the same position. Deleted content is not verified;
/// only the count matters. Out-of-range positions are clamped.
fn splice_lines(
    content: &[u8],
    first_line: usize,
    inserted: &[Vec<u8>],
    delete_count: usize,
) -> Vec<u8> {
    let lines: Vec<&[u8]> = content.split_inclusive(|&byte| byte == b'\n').collect();
    let index = (first_line - 1).min(lines.len());
    let end = (index + delete_count).min(lines.len());

    let mut out = Vec::with_capacity(content.len());
    for line in &lines[..index] {
        out.extend_from_slice(line);
    }
    for line in inserted {
        out.extend_from_slice(line);
    }
    for line in &lines[end..] {
        out.extend_from_slice(line);
    }
    out
}

fn only_whitespace(lines: &[Vec<u8>]) -> bool {
    lines
        .iter()
        .all(|line| line.iter().all(u8::is_ascii_whitespace))
}

#[cfg(test)]
mod test {
    use super::{splice_lines, ReplayState, StageOp};

    #[test]
    fn test_splice_replace_line() {
        let out = splice_lines(b"one\ntwo\nthree\n", 2, &[b"TWO\n".to_vec()], 1);
        assert_eq!(out, b"one\nTWO\nthree\n");
    }

    #[test]
    fn test_splice_insert_only() {
        let out = splice_lines(b"one\nthree\n", 2, &[b"two\n".to_vec()], 0);
        assert_eq!(out, b"one\ntwo\nthree\n");
    }

    #[test]
    fn test_splice_delete_only() {
        let out = splice_lines(b"one\ntwo\nthree\n", 1, &[], 2);
        assert_eq!(out, b"three\n");
    }

    #[test]
    fn test_splice_clamps_out_of_range() {
        let out = splice_lines(b"one\n", 5, &[b"two\n".to_vec()], 3);
        assert_eq!(out, b"one\ntwo\n");
    }

    #[test]
    fn test_splice_inverse_restores_original() {
        let original = b"alpha\nbeta\ngamma\ndelta\n";
        let inserted = vec![b"BETA\n".to_vec(), b"EXTRA\n".to_vec()];
        let deleted = vec![b"beta\n".to_vec(), b"gamma\n".to_vec()];

        let patched = splice_lines(original, 2, &inserted, deleted.len());
        assert_eq!(patched, b"alpha\nBETA\nEXTRA\ndelta\n");

        let restored = splice_lines(&patched, 2, &deleted, inserted.len());
        assert_eq!(restored, original);
    }

    #[test]
    fn test_add_move_remove_nets_out() {
        let mut state = ReplayState::new();
        state.record_added_empty("a");
        assert!(state.record_moved("a", "b"));
        state.record_removed("b");

        // net no-op: nothing staged as an addition or rename
        assert_eq!(state.staging_plan(), [StageOp::UpdateAll]);
    }

    #[test]
    fn test_rename_then_remove_drops_rename() {
        let mut state = ReplayState::new();
        assert!(!state.record_moved("old", "new"));
        state.record_removed("new");
        assert_eq!(state.staging_plan(), [StageOp::UpdateAll]);
    }

    #[test]
    fn test_staging_plan_order() {
        let mut state = ReplayState::new();
        state.record_added("fresh");
        assert!(!state.record_moved("old", "new"));

        assert_eq!(
            state.staging_plan(),
            [
                StageOp::Update(vec!["old".into()]),
                StageOp::Add(vec!["new".into()]),
                StageOp::Add(vec!["fresh".into()]),
                StageOp::UpdateAll,
            ],
        );
    }

    #[test]
    fn test_deleted_additions_are_not_staged() {
        let mut state = ReplayState::new();
        state.record_added("keep");
        state.record_added("drop");
        state.record_removed("drop");

        assert_eq!(
            state.staging_plan(),
            [StageOp::Add(vec!["keep".into()]), StageOp::UpdateAll],
        );
    }

    #[test]
    fn test_removed_tree_forgets_children() {
        let mut state = ReplayState::new();
        state.record_added("dir");
        state.record_added("dir/.keepme");
        state.record_added_empty("dir/file");
        state.record_removed_tree("dir");

        assert_eq!(state.staging_plan(), [StageOp::UpdateAll]);
        assert!(!state.is_empty_added("dir/file"));
    }

    #[test]
    fn test_empty_added_tracking() {
        let mut state = ReplayState::new();
        state.record_added_empty("a");
        assert!(state.is_empty_added("a"));

        state.record_moved("a", "b");
        assert!(!state.is_empty_added("a"));
        assert!(state.is_empty_added("b"));

        state.mark_written("b");
        assert!(!state.is_empty_added("b"));
    }
}
