use crate::darcs;
use crate::term_out::ProgressPrint;

mod git_wrap;
mod replay;
mod subst;

pub(crate) struct ConvertError;

pub(crate) struct GitCommitMeta {
    pub(crate) author: gix_actor::Signature,
    pub(crate) message: String,
}

pub(crate) trait GitMetaMaker {
    fn make_git_commit_meta(
        &self,
        patch: &darcs::inventory::PatchInfo,
        patch_filename: &str,
    ) -> Result<GitCommitMeta, String>;
}

pub(crate) struct Options {
    pub(crate) skip_binaries: bool,
    pub(crate) dry_run: bool,
}

/// Replays the whole patch history, strictly in inventory order, onto
/// the destination working tree, committing once per patch. Any fatal
/// error aborts the conversion; patches committed so far stay
/// committed.
pub(crate) fn convert(
    progress_print: &ProgressPrint,
    options: &Options,
    meta_maker: &dyn GitMetaMaker,
    src_path: &std::path::Path,
    dst_path: &std::path::Path,
) -> Result<(), ConvertError> {
    if !options.dry_run && !dst_path.join(".git").is_dir() {
        tracing::error!("destination {dst_path:?} is not an initialized git repository");
        return Err(ConvertError);
    }

    progress_print.set_progress("reading inventory".into());

    let inventory_path = src_path.join("_darcs").join("inventory");
    let inventory_file = std::fs::OpenOptions::new()
        .read(true)
        .open(&inventory_path)
        .map_err(|e| {
            tracing::error!("failed to open inventory {inventory_path:?}: {e}");
            ConvertError
        })?;

    let mut inventory_stream = std::io::BufReader::new(inventory_file);
    let mut inventory_reader = darcs::inventory::InventoryReader::new(&mut inventory_stream);
    let mut patches = Vec::new();
    loop {
        match inventory_reader.next_entry() {
            Ok(Some(info)) => patches.push(info),
            Ok(None) => break,
            Err(e) => {
                tracing::error!("failed to read inventory {inventory_path:?}: {e}");
                return Err(ConvertError);
            }
        }
    }

    tracing::info!("read {} patches from the inventory", patches.len());

    let header = darcs::patch::HeaderPattern::new();
    let patches_dir = src_path.join("_darcs").join("patches");
    let total = patches.len();

    for (patch_i, info) in patches.iter().enumerate() {
        let filename = info.content_filename();
        progress_print.set_progress(format!(
            "converting patch {}/{total} {filename}",
            patch_i + 1,
        ));
        tracing::debug!("converting patch {filename}");

        let body_path = patches_dir.join(&filename);
        let mut source = darcs::source::PatchSource::open(&body_path).map_err(|e| {
            tracing::error!("failed to open patch {filename}: {e}");
            ConvertError
        })?;

        let result = if options.dry_run {
            let mut handler = darcs::patch::TraceHandler::new(options.skip_binaries);
            darcs::patch::PatchParser::new(source.stream(), &header, &mut handler).parse()
        } else {
            let mut handler =
                replay::ReplayHandler::new(dst_path, meta_maker, &filename, options.skip_binaries);
            darcs::patch::PatchParser::new(source.stream(), &header, &mut handler).parse()
        };

        result.map_err(|e| {
            tracing::error!("failed to convert patch {filename}: {e}");
            ConvertError
        })?;
    }

    Ok(())
}
