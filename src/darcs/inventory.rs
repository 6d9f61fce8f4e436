// Reads the `_darcs/inventory` stream: the repository's ordered index
// of patch identities. Entry grammar:
//
//   [<short message>
//   <author>**<14-digit-timestamp>]
//
// or, with a long message (`*-` instead of `**` marks an inverted patch):
//
//   [<short message>
//   <author>**<14-digit-timestamp>
//    <long message line>
//    <long message line>
//   ]

#[derive(Debug)]
pub(crate) enum InventoryError {
    Io(std::io::Error),
    InvalidEntry(Vec<u8>),
}

impl From<std::io::Error> for InventoryError {
    #[inline]
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl std::fmt::Display for InventoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Self::Io(ref e) => write!(f, "failed to read inventory: {e}"),
            Self::InvalidEntry(ref line) => {
                write!(f, "invalid inventory entry: \"{}\"", line.escape_ascii())
            }
        }
    }
}

/// Identity of one historical change, as recorded in the inventory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct PatchInfo {
    pub(crate) name: Vec<u8>,
    pub(crate) author: Vec<u8>,
    pub(crate) date: chrono::NaiveDateTime,
    pub(crate) log: Option<Vec<u8>>,
    pub(crate) inverted: bool,
}

impl PatchInfo {
    pub(crate) fn timestamp(&self) -> String {
        self.date.format("%Y%m%d%H%M%S").to_string()
    }

    /// The name of the compressed patch body under `_darcs/patches/`.
    /// Must reproduce the legacy naming scheme bit-for-bit: the
    /// timestamp, a 5-digit prefix of the author digest, and a digest
    /// of (name, author, timestamp, newline-stripped log, polarity).
    pub(crate) fn content_filename(&self) -> String {
        let timestamp = self.timestamp();

        let mut data = Vec::new();
        data.extend_from_slice(&self.name);
        data.extend_from_slice(&self.author);
        data.extend_from_slice(timestamp.as_bytes());
        if let Some(ref log) = self.log {
            data.extend(log.iter().copied().filter(|&byte| byte != b'\n'));
        }
        data.push(if self.inverted { b't' } else { b'f' });

        let author_digest = sha1_hex(&self.author);
        format!("{timestamp}-{}-{}.gz", &author_digest[..5], sha1_hex(&data))
    }
}

fn sha1_hex(data: &[u8]) -> String {
    let mut hasher = gix_hash::hasher(gix_hash::Kind::Sha1);
    hasher.update(data);
    hasher
        .try_finalize()
        .expect("SHA-1 collision attack detected")
        .to_string()
}

pub(crate) struct InventoryReader<'a> {
    source: &'a mut dyn std::io::BufRead,
}

impl<'a> InventoryReader<'a> {
    pub(crate) fn new(source: &'a mut dyn std::io::BufRead) -> Self {
        Self { source }
    }

    /// Produces the next `PatchInfo` in recorded order. End of stream
    /// before an entry begins is normal termination, not an error.
    pub(crate) fn next_entry(&mut self) -> Result<Option<PatchInfo>, InventoryError> {
        let mut line = Vec::new();
        loop {
            line.clear();
            self.source.read_until(b'\n', &mut line)?;
            if line.is_empty() {
                return Ok(None);
            }
            if !line.iter().all(|byte| byte.is_ascii_whitespace()) {
                break;
            }
        }

        let Some(name_line) = line.strip_prefix(b"[") else {
            return Err(InventoryError::InvalidEntry(line));
        };
        let name = strip_newline(name_line).to_vec();

        let mut author_line = Vec::new();
        self.source.read_until(b'\n', &mut author_line)?;
        let (author, inverted, timestamp, closed) = parse_author_line(&author_line)
            .ok_or_else(|| InventoryError::InvalidEntry(author_line.clone()))?;

        let date = chrono::NaiveDateTime::parse_from_str(&timestamp, "%Y%m%d%H%M%S")
            .map_err(|_| InventoryError::InvalidEntry(author_line.clone()))?;

        let mut log = None;
        if !closed {
            let log_buf = log.insert(Vec::new());
            loop {
                let mut log_line = Vec::new();
                self.source.read_until(b'\n', &mut log_line)?;
                if log_line.starts_with(b"]") {
                    break;
                } else if let Some(rest) = log_line.strip_prefix(b" ") {
                    log_buf.extend_from_slice(rest);
                } else {
                    return Err(InventoryError::InvalidEntry(log_line));
                }
            }
        }

        Ok(Some(PatchInfo {
            name,
            author,
            date,
            log,
            inverted,
        }))
    }
}

fn strip_newline(line: &[u8]) -> &[u8] {
    line.strip_suffix(b"\n").unwrap_or(line)
}

/// Parses `<author>**<14-digit-timestamp>` (`*-` = inverted), optionally
/// closed by `]`. Returns (author, inverted, timestamp, closed).
fn parse_author_line(line: &[u8]) -> Option<(Vec<u8>, bool, String, bool)> {
    let mut rem = strip_newline(line);
    while let Some(new_rem) = rem.strip_suffix(b" ").or_else(|| rem.strip_suffix(b"\t")) {
        rem = new_rem;
    }

    let closed = if let Some(new_rem) = rem.strip_suffix(b"]") {
        rem = new_rem;
        true
    } else {
        false
    };

    if rem.len() < 16 {
        return None;
    }
    let (rem, digits) = rem.split_at(rem.len() - 14);
    if !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }

    let inverted = if let Some(author) = rem.strip_suffix(b"**") {
        Some((author, false))
    } else {
        rem.strip_suffix(b"*-").map(|author| (author, true))
    };
    let (author, inverted) = inverted?;
    if author.is_empty() {
        return None;
    }

    let timestamp = std::str::from_utf8(digits).unwrap().to_owned();
    Some((author.to_vec(), inverted, timestamp, closed))
}
