use crate::FHashMap;

/// Maps the free-form author strings recorded by Darcs to git
/// identities, loaded once from a flat file of `key=value` lines where
/// the value is a `Name <email>` identity.
pub(crate) struct AuthorMap {
    map: FHashMap<Vec<u8>, String>,
}

pub(crate) enum AuthorMapParseError {
    Io(std::io::Error),
    BadLine(usize, Vec<u8>),
}

impl From<std::io::Error> for AuthorMapParseError {
    fn from(error: std::io::Error) -> Self {
        Self::Io(error)
    }
}

impl std::fmt::Display for AuthorMapParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Self::Io(ref e) => e.fmt(f),
            Self::BadLine(line, ref line_data) => {
                write!(f, "bad line {}: \"{}\"", line + 1, line_data.escape_ascii())
            }
        }
    }
}

impl AuthorMap {
    pub(crate) fn new() -> Self {
        Self {
            map: FHashMap::default(),
        }
    }

    pub(crate) fn parse(src: &mut dyn std::io::BufRead) -> Result<Self, AuthorMapParseError> {
        let mut map = FHashMap::default();

        let mut line_i = 0;
        let mut line = Vec::new();
        loop {
            line.clear();
            src.read_until(b'\n', &mut line)?;

            match parse_line(&line) {
                Some(Some((author, identity))) => {
                    map.insert(author, identity);
                }
                Some(None) => {}
                None => return Err(AuthorMapParseError::BadLine(line_i, line)),
            }

            if !line.ends_with(b"\n") {
                break;
            }

            line_i += 1;
        }

        Ok(Self { map })
    }

    pub(crate) fn get(&self, author: &[u8]) -> Option<&str> {
        self.map.get(author).map(String::as_str)
    }
}

/// `None` = malformed, `Some(None)` = blank or comment line. The key
/// is everything before the first `=`, kept verbatim (darcs author
/// strings routinely contain spaces and `<...>`).
fn parse_line(line: &[u8]) -> Option<Option<(Vec<u8>, String)>> {
    let mut rem = line;
    rem = rem.strip_suffix(b"\n").unwrap_or(rem);
    rem = rem.strip_suffix(b"\r").unwrap_or(rem);

    if rem.iter().all(|&b| matches!(b, b' ' | b'\t')) {
        return Some(None);
    }
    if rem.starts_with(b"#") {
        return Some(None);
    }

    let eq_pos = rem.iter().position(|&b| b == b'=').filter(|&p| p != 0)?;
    let author = rem[..eq_pos].to_vec();

    let mut value = &rem[(eq_pos + 1)..];
    while let Some(new_value) = value
        .strip_suffix(b" ")
        .or_else(|| value.strip_suffix(b"\t"))
    {
        value = new_value;
    }
    if value.is_empty() {
        return None;
    }
    let identity = String::from(std::str::from_utf8(value).ok()?);

    Some(Some((author, identity)))
}
