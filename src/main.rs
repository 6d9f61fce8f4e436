#![warn(
    rust_2018_idioms,
    trivial_casts,
    trivial_numeric_casts,
    unreachable_pub,
    unused_qualifications
)]

use std::path::{Path, PathBuf};
use std::process::ExitCode;

mod author_map;
mod cli;
mod convert;
mod darcs;
mod make_meta;
mod params_file;
mod term_out;

use term_out::ProgressPrint;

pub(crate) type FHashMap<K, V> = std::collections::HashMap<K, V, foldhash::fast::RandomState>;
pub(crate) type FHashSet<T> = std::collections::HashSet<T, foldhash::fast::RandomState>;

enum RunError {
    Generic,
    Usage,
}

fn main() -> ExitCode {
    match main_inner() {
        Ok(()) => ExitCode::SUCCESS,
        Err(RunError::Generic) => ExitCode::from(1),
        Err(RunError::Usage) => ExitCode::from(2),
    }
}

fn main_inner() -> Result<(), RunError> {
    let start = std::time::Instant::now();

    let args = match <cli::Cli as clap::Parser>::try_parse() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{e}");
            return Err(RunError::Usage);
        }
    };

    let term_out = term_out::init(start, !args.no_progress);
    let progress_print = term_out.get_progress_print();

    let stderr_log_level = args
        .stderr_log_level
        .unwrap_or(cli::LogLevel::Warn)
        .to_log_level_filter();
    let file_log_level = args.file_log_level.map(cli::LogLevel::to_log_level_filter);

    if let Err(e) = init_logger(
        Some(stderr_log_level),
        args.log_file.as_deref(),
        file_log_level,
        progress_print.clone(),
    ) {
        eprintln!("failed to initialize logging: {e}");
        return Err(RunError::Generic);
    }

    let (params, params_dir) = match args.conv_params {
        Some(ref conv_params_path) => {
            let params_raw = match std::fs::read_to_string(conv_params_path) {
                Ok(r) => r,
                Err(e) => {
                    tracing::error!("failed to read {conv_params_path:?}: {e}");
                    return Err(RunError::Generic);
                }
            };
            let params: params_file::ConvParams = match toml::from_str(&params_raw) {
                Ok(r) => r,
                Err(e) => {
                    tracing::error!("failed to parse {conv_params_path:?}: {e}");
                    return Err(RunError::Generic);
                }
            };
            (params, conv_params_path.parent().map(Path::to_path_buf))
        }
        None => (params_file::ConvParams::default(), None),
    };

    let author_map = match params.authors_file {
        None => author_map::AuthorMap::new(),
        Some(ref authors_path) => {
            let authors_path: PathBuf = if authors_path.is_relative() {
                match params_dir {
                    Some(ref params_dir) => params_dir.join(authors_path),
                    None => authors_path.clone(),
                }
            } else {
                authors_path.clone()
            };

            let authors_file = std::fs::OpenOptions::new()
                .read(true)
                .open(&authors_path)
                .map_err(|e| {
                    tracing::error!("failed to open authors file {authors_path:?}: {e}");
                    RunError::Generic
                })?;

            author_map::AuthorMap::parse(&mut std::io::BufReader::new(authors_file)).map_err(
                |e| {
                    tracing::error!("failed to read authors file {authors_path:?}: {e}");
                    RunError::Generic
                },
            )?
        }
    };

    let author_fallback_template = params.author_fallback_template.as_deref().unwrap_or(
        r#"{% if "<" in darcs_author %}{{ darcs_author }}{% else %}{{ darcs_author }} <{{ darcs_author }}>{% endif %}"#,
    );
    let commit_msg_template = params
        .commit_msg_template
        .as_deref()
        .unwrap_or(indoc::indoc! {r#"
            {{ darcs_name }}
            {% if darcs_log %}{{ darcs_log }}{% endif %}
            Exported from Darcs patch: {{ darcs_patch }}
        "#});

    let meta_maker = make_meta::GitMetaMaker::new(
        &author_map,
        author_fallback_template,
        commit_msg_template,
    )
    .map_err(|e| {
        tracing::error!("{e}");
        RunError::Generic
    })?;

    let options = convert::Options {
        skip_binaries: params.skip_binaries,
        dry_run: args.dry_run,
    };

    let r = convert::convert(
        &progress_print,
        &options,
        &meta_maker,
        &args.src,
        &args.dest,
    );

    term_out.finish();

    r.map_err(|convert::ConvertError| RunError::Generic)
}

fn init_logger(
    stderr_level: Option<tracing::Level>,
    file_path: Option<&Path>,
    file_level: Option<tracing::Level>,
    progress_print: ProgressPrint,
) -> Result<(), std::io::Error> {
    use tracing_subscriber::layer::{Layer as _, SubscriberExt as _};
    use tracing_subscriber::util::SubscriberInitExt as _;

    let stderr_sub = if let Some(stderr_level) = stderr_level {
        let filter = tracing_subscriber::filter::LevelFilter::from_level(stderr_level);
        Some(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(MakeLogPrinter::new(progress_print))
                .with_filter(filter),
        )
    } else {
        None
    };

    let file_sub = if let Some(file_path) = file_path {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(file_path)?;

        let filter = tracing_subscriber::filter::LevelFilter::from_level(
            file_level.unwrap_or(tracing::Level::DEBUG),
        );
        Some(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(file)
                .with_filter(filter),
        )
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(stderr_sub)
        .with(file_sub)
        .init();

    Ok(())
}

struct MakeLogPrinter {
    progress_print: ProgressPrint,
}

impl MakeLogPrinter {
    fn new(progress_print: ProgressPrint) -> Self {
        Self { progress_print }
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for MakeLogPrinter {
    type Writer = LogPrinter<'a>;

    fn make_writer(&'a self) -> LogPrinter<'a> {
        LogPrinter {
            progress_print: &self.progress_print,
            buf: Vec::new(),
        }
    }
}

struct LogPrinter<'a> {
    progress_print: &'a ProgressPrint,
    buf: Vec<u8>,
}

impl Drop for LogPrinter<'_> {
    fn drop(&mut self) {
        self.progress_print.print_raw_line(self.buf.clone());
    }
}

impl std::io::Write for LogPrinter<'_> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buf.extend(buf);
        Ok(buf.len())
    }

    fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()> {
        self.buf.extend(buf);
        Ok(())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
