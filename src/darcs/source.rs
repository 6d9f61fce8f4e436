use std::io::{Read as _, Seek as _};
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub(crate) enum OpenError {
    FileOpenError {
        path: PathBuf,
        error: std::io::Error,
    },
    FileReadError {
        path: PathBuf,
        error: std::io::Error,
    },
    FileSeekError {
        path: PathBuf,
        error: std::io::Error,
    },
}

impl std::fmt::Display for OpenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FileOpenError { path, error } => {
                write!(f, "failed to open file {path:?}: {error}")
            }
            Self::FileReadError { path, error } => {
                write!(f, "failed to read file {path:?}: {error}")
            }
            Self::FileSeekError { path, error } => {
                write!(f, "failed to seek file {path:?}: {error}")
            }
        }
    }
}

/// One patch body under `_darcs/patches/`. Bodies are gzip-compressed;
/// a body without the gzip magic is read as-is.
pub(crate) enum PatchSource {
    Gzip(std::io::BufReader<flate2::read::GzDecoder<std::fs::File>>),
    Plain(std::io::BufReader<std::fs::File>),
}

impl PatchSource {
    pub(crate) fn open(path: &Path) -> Result<Self, OpenError> {
        let mut file = std::fs::OpenOptions::new()
            .read(true)
            .open(path)
            .map_err(|e| OpenError::FileOpenError {
                path: path.to_path_buf(),
                error: e,
            })?;

        const GZIP_MAGIC: &[u8] = &[0x1F, 0x8B];

        let mut header = Vec::<u8>::with_capacity(GZIP_MAGIC.len());
        while header.len() < GZIP_MAGIC.len() {
            let mut buf = [0; 2];
            match file.read(&mut buf[..(GZIP_MAGIC.len() - header.len())]) {
                Ok(0) => break,
                Ok(n) => header.extend(&buf[..n]),
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(e) => {
                    return Err(OpenError::FileReadError {
                        path: path.to_path_buf(),
                        error: e,
                    });
                }
            }
        }

        file.seek(std::io::SeekFrom::Start(0))
            .map_err(|e| OpenError::FileSeekError {
                path: path.to_path_buf(),
                error: e,
            })?;

        if header.starts_with(GZIP_MAGIC) {
            Ok(Self::Gzip(std::io::BufReader::new(
                flate2::read::GzDecoder::new(file),
            )))
        } else {
            Ok(Self::Plain(std::io::BufReader::new(file)))
        }
    }

    pub(crate) fn stream(&mut self) -> &mut dyn std::io::BufRead {
        match self {
            Self::Gzip(stream) => stream,
            Self::Plain(stream) => stream,
        }
    }
}
