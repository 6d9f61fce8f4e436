use super::inventory::PatchInfo;
use super::stream::{ReadError, TokenStream};

// Darcs 1 patch grammar. A patch is a header followed by a sequence of
// primitive patches, optionally grouped by braces (groups may nest but
// carry no meaning of their own). Paths encode embedded spaces as the
// legacy `\32\` escape.

#[derive(Debug)]
pub(crate) enum ParseError {
    Io(std::io::Error),
    MalformedHeader,
    UnexpectedToken(Vec<u8>),
    TruncatedPatch,
    BadLine {
        context: &'static str,
        line: Vec<u8>,
    },
    BadHex(Vec<u8>),
    InvalidPath(Vec<u8>),
    Handler(HandlerError),
}

impl From<std::io::Error> for ParseError {
    #[inline]
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Self::Io(ref e) => write!(f, "failed to read patch: {e}"),
            Self::MalformedHeader => write!(f, "malformed patch header"),
            Self::UnexpectedToken(ref token) => {
                write!(f, "unexpected token \"{}\"", token.escape_ascii())
            }
            Self::TruncatedPatch => write!(f, "patch truncated inside a group"),
            Self::BadLine { context, ref line } => {
                write!(f, "bad {context} line: \"{}\"", line.escape_ascii())
            }
            Self::BadHex(ref line) => {
                write!(f, "bad hex data: \"{}\"", line.escape_ascii())
            }
            Self::InvalidPath(ref path) => {
                write!(f, "invalid path: \"{}\"", path.escape_ascii())
            }
            Self::Handler(HandlerError) => write!(f, "patch handler failed"),
        }
    }
}

/// Opaque handler failure. Diagnostics are logged at the failure site.
#[derive(Debug)]
pub(crate) struct HandlerError;

/// Consumer of the edit-operation stream of one patch. Operations are
/// delivered in encounter order regardless of grouping depth.
pub(crate) trait PatchHandler {
    fn begin(&mut self, meta: &PatchInfo) -> Result<(), HandlerError>;
    fn addfile(&mut self, path: &str) -> Result<(), HandlerError>;
    fn adddir(&mut self, path: &str) -> Result<(), HandlerError>;
    fn rmfile(&mut self, path: &str) -> Result<(), HandlerError>;
    fn rmdir(&mut self, path: &str) -> Result<(), HandlerError>;
    fn move_path(&mut self, from: &str, to: &str) -> Result<(), HandlerError>;
    fn hunk(
        &mut self,
        path: &str,
        first_line: usize,
        inserted: Vec<Vec<u8>>,
        deleted: Vec<Vec<u8>>,
    ) -> Result<(), HandlerError>;
    /// `data` is `None` when binaries are being skipped.
    fn binary(&mut self, path: &str, data: Option<Vec<u8>>) -> Result<(), HandlerError>;
    fn replace(
        &mut self,
        path: &str,
        pattern: &str,
        old_text: &str,
        new_text: &str,
    ) -> Result<(), HandlerError>;
    fn changepref(&mut self) -> Result<(), HandlerError>;
    fn merger(&mut self) -> Result<(), HandlerError>;
    fn finished(&mut self) -> Result<(), HandlerError>;

    fn skip_binaries(&self) -> bool {
        false
    }
}

/// The multi-line header pattern, built once and shared across patches:
///
///   [<short message>
///   <author>*<polarity><14-digit-timestamp>
///   <optional space-prefixed long message lines>]
pub(crate) struct HeaderPattern {
    regex: regex_automata::meta::Regex,
}

impl HeaderPattern {
    pub(crate) fn new() -> Self {
        // byte-oriented: author and message bytes are not necessarily
        // UTF-8
        let regex = regex_automata::meta::Builder::new()
            .syntax(
                regex_automata::util::syntax::Config::new()
                    .unicode(false)
                    .utf8(false),
            )
            .build(r"\[([^\n]+)\n([^*]+)\*([-*])([0-9]{14})(?:\n((?: [^\n]*\n)+))?\]")
            .expect("failed to build header regex");
        Self { regex }
    }
}

pub(crate) struct PatchParser<'a> {
    stream: TokenStream<'a>,
    header: &'a HeaderPattern,
    handler: &'a mut dyn PatchHandler,
}

impl<'a> PatchParser<'a> {
    pub(crate) fn new(
        source: &'a mut dyn std::io::BufRead,
        header: &'a HeaderPattern,
        handler: &'a mut dyn PatchHandler,
    ) -> Self {
        Self {
            stream: TokenStream::new(source),
            header,
            handler,
        }
    }

    /// Parses one whole patch, invoking the handler for each operation.
    /// End of input at the top level (or a `}` closing the outermost
    /// group) ends the patch normally and fires `finished`.
    pub(crate) fn parse(mut self) -> Result<(), ParseError> {
        let meta = self.parse_header()?;
        self.handler.begin(&meta).map_err(ParseError::Handler)?;

        loop {
            let token = match self.stream.next_token() {
                Ok(token) => token,
                Err(ReadError::EndOfInput) => break,
                Err(ReadError::Io(e)) => return Err(ParseError::Io(e)),
            };
            match token.as_slice() {
                b"{" => self.parse_group()?,
                b"}" => break,
                _ => self.parse_primitive(&token)?,
            }
        }

        self.handler.finished().map_err(ParseError::Handler)
    }

    fn parse_header(&mut self) -> Result<PatchInfo, ParseError> {
        let mut buf = Vec::new();
        let mut caps = self.header.regex.create_captures();
        loop {
            match self.stream.read_line() {
                Ok(line) => buf.extend_from_slice(&line),
                Err(ReadError::EndOfInput) => return Err(ParseError::MalformedHeader),
                Err(ReadError::Io(e)) => return Err(ParseError::Io(e)),
            }

            self.header.regex.captures(&buf, &mut caps);
            if caps.is_match() {
                break;
            }
        }

        let group = |i: usize| {
            let span = caps.get_group(i).unwrap();
            &buf[span.start..span.end]
        };

        let name = group(1).to_vec();
        let author = group(2).to_vec();
        let inverted = group(3) == b"-";
        let timestamp = std::str::from_utf8(group(4)).unwrap();
        let date = chrono::NaiveDateTime::parse_from_str(timestamp, "%Y%m%d%H%M%S")
            .map_err(|_| ParseError::MalformedHeader)?;

        let log = caps.get_group(5).map(|span| {
            let raw = &buf[span.start..span.end];
            let mut log = Vec::with_capacity(raw.len());
            for line in raw.split_inclusive(|&byte| byte == b'\n') {
                log.extend_from_slice(line.strip_prefix(b" ").unwrap_or(line));
            }
            log
        });

        let match_end = caps.get_match().unwrap().end();
        self.stream.push_back_line(&buf[match_end..]);

        Ok(PatchInfo {
            name,
            author,
            date,
            log,
            inverted,
        })
    }

    /// Parses a brace-enclosed group (the opening `{` has already been
    /// consumed). End of input here means a truncated patch.
    fn parse_group(&mut self) -> Result<(), ParseError> {
        loop {
            let token = match self.stream.next_token() {
                Ok(token) => token,
                Err(ReadError::EndOfInput) => return Err(ParseError::TruncatedPatch),
                Err(ReadError::Io(e)) => return Err(ParseError::Io(e)),
            };
            match token.as_slice() {
                b"{" => self.parse_group()?,
                b"}" => return Ok(()),
                _ => self.parse_primitive(&token)?,
            }
        }
    }

    fn parse_primitive(&mut self, token: &[u8]) -> Result<(), ParseError> {
        match token {
            b"<" => self.skip_tag(),
            b"addfile" => {
                let path = self.read_path_line()?;
                self.handler.addfile(&path).map_err(ParseError::Handler)
            }
            b"adddir" => {
                let path = self.read_path_line()?;
                self.handler.adddir(&path).map_err(ParseError::Handler)
            }
            b"rmfile" => {
                let path = self.read_path_line()?;
                self.handler.rmfile(&path).map_err(ParseError::Handler)
            }
            b"rmdir" => {
                let path = self.read_path_line()?;
                self.handler.rmdir(&path).map_err(ParseError::Handler)
            }
            b"hunk" => self.parse_hunk(),
            b"binary" => self.parse_binary(),
            b"move" => self.parse_move(),
            b"merger" => self.parse_merger(),
            b"changepref" => self.parse_changepref(),
            b"replace" => self.parse_replace(),
            _ => Err(ParseError::UnexpectedToken(token.to_vec())),
        }
    }

    /// Tag records carry no tree changes; skip to the closing `>` line.
    fn skip_tag(&mut self) -> Result<(), ParseError> {
        loop {
            let line = self.read_body_line()?;
            if line.starts_with(b">") {
                return Ok(());
            }
        }
    }

    fn parse_hunk(&mut self) -> Result<(), ParseError> {
        let line = self.read_body_line()?;
        let (path_raw, first_line_raw) =
            split_two_fields(&line).ok_or_else(|| ParseError::BadLine {
                context: "hunk",
                line: line.clone(),
            })?;
        let path = decode_path(path_raw)?;
        let first_line = std::str::from_utf8(first_line_raw)
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .filter(|&n| n >= 1)
            .ok_or_else(|| ParseError::BadLine {
                context: "hunk",
                line: line.clone(),
            })?;

        let mut inserted = Vec::new();
        let mut deleted = Vec::new();
        loop {
            match self.stream.read_line() {
                Ok(line) => {
                    if let Some(content) = line.strip_prefix(b"+") {
                        inserted.push(content.to_vec());
                    } else if let Some(content) = line.strip_prefix(b"-") {
                        deleted.push(content.to_vec());
                    } else {
                        self.stream.push_back_line(&line);
                        break;
                    }
                }
                Err(ReadError::EndOfInput) => break,
                Err(ReadError::Io(e)) => return Err(ParseError::Io(e)),
            }
        }

        self.handler
            .hunk(&path, first_line, inserted, deleted)
            .map_err(ParseError::Handler)
    }

    fn parse_binary(&mut self) -> Result<(), ParseError> {
        let path = decode_path(&self.read_body_line()?)?;

        let line = self.read_body_line()?;
        if !line.starts_with(b"oldhex") {
            return Err(ParseError::BadLine {
                context: "binary",
                line,
            });
        }
        loop {
            if self.read_body_line()?.starts_with(b"newhex") {
                break;
            }
        }

        // In skip mode the payload lines are still consumed so the
        // stream stays positioned at the next operation.
        let mut data = if self.handler.skip_binaries() {
            None
        } else {
            Some(Vec::new())
        };
        loop {
            match self.stream.read_line() {
                Ok(line) => {
                    if let Some(hex) = line.strip_prefix(b"*") {
                        if let Some(ref mut data) = data {
                            decode_hex_line(hex, data)?;
                        }
                    } else {
                        self.stream.push_back_line(&line);
                        break;
                    }
                }
                Err(ReadError::EndOfInput) => break,
                Err(ReadError::Io(e)) => return Err(ParseError::Io(e)),
            }
        }

        self.handler.binary(&path, data).map_err(ParseError::Handler)
    }

    fn parse_move(&mut self) -> Result<(), ParseError> {
        let line = self.read_body_line()?;
        let (from_raw, to_raw) = split_two_fields(&line).ok_or_else(|| ParseError::BadLine {
            context: "move",
            line: line.clone(),
        })?;
        let from = decode_path(from_raw)?;
        let to = decode_path(to_raw)?;
        self.handler
            .move_path(&from, &to)
            .map_err(ParseError::Handler)
    }

    /// A merger is an opaque conflict record. Track brace-like balance
    /// by lines: a line starting `merger` opens a region, a line
    /// starting `)` closes one; stop when the depth returns to zero.
    fn parse_merger(&mut self) -> Result<(), ParseError> {
        self.stream.push_back_line(b"merger");
        let mut depth = 0_usize;
        loop {
            let line = self.read_body_line()?;
            if line.starts_with(b"merger") {
                depth += 1;
            } else if line.starts_with(b")") {
                depth -= 1;
            }
            if depth == 0 {
                break;
            }
        }
        self.handler.merger().map_err(ParseError::Handler)
    }

    /// Preference name, old value, new value; none of them interpreted.
    fn parse_changepref(&mut self) -> Result<(), ParseError> {
        for _ in 0..3 {
            self.read_body_line()?;
        }
        self.handler.changepref().map_err(ParseError::Handler)
    }

    fn parse_replace(&mut self) -> Result<(), ParseError> {
        let line = self.read_body_line()?;
        let mut fields = line
            .trim_ascii()
            .split(|&byte| byte == b' ' || byte == b'\t')
            .filter(|field| !field.is_empty());

        let bad_line = || ParseError::BadLine {
            context: "replace",
            line: line.clone(),
        };
        let path_raw = fields.next().ok_or_else(bad_line)?;
        let pattern = field_to_str(fields.next().ok_or_else(bad_line)?).ok_or_else(bad_line)?;
        let old_text = field_to_str(fields.next().ok_or_else(bad_line)?).ok_or_else(bad_line)?;
        let new_text = field_to_str(fields.next().ok_or_else(bad_line)?).ok_or_else(bad_line)?;
        if fields.next().is_some() {
            return Err(bad_line());
        }

        let path = decode_path(path_raw)?;
        self.handler
            .replace(&path, pattern, old_text, new_text)
            .map_err(ParseError::Handler)
    }

    /// Remainder of the current line, decoded as a path.
    fn read_path_line(&mut self) -> Result<String, ParseError> {
        let line = self.read_body_line()?;
        decode_path(&line)
    }

    /// Missing input inside an operation means the patch is truncated.
    fn read_body_line(&mut self) -> Result<Vec<u8>, ParseError> {
        match self.stream.read_line() {
            Ok(line) => Ok(line),
            Err(ReadError::EndOfInput) => Err(ParseError::TruncatedPatch),
            Err(ReadError::Io(e)) => Err(ParseError::Io(e)),
        }
    }
}

fn split_two_fields(line: &[u8]) -> Option<(&[u8], &[u8])> {
    let mut fields = line
        .trim_ascii()
        .split(|&byte| byte == b' ' || byte == b'\t')
        .filter(|field| !field.is_empty());
    let first = fields.next()?;
    let second = fields.next()?;
    if fields.next().is_some() {
        return None;
    }
    Some((first, second))
}

fn field_to_str(field: &[u8]) -> Option<&str> {
    std::str::from_utf8(field).ok()
}

/// Decodes the legacy `\32\` escape for embedded spaces and requires
/// the result to be UTF-8.
fn decode_path(raw: &[u8]) -> Result<String, ParseError> {
    let trimmed = raw.trim_ascii();
    let mut out = Vec::with_capacity(trimmed.len());
    let mut rem = trimmed;
    while let Some(pos) = rem.windows(4).position(|window| window == b"\\32\\") {
        out.extend_from_slice(&rem[..pos]);
        out.push(b' ');
        rem = &rem[(pos + 4)..];
    }
    out.extend_from_slice(rem);
    String::from_utf8(out).map_err(|e| ParseError::InvalidPath(e.into_bytes()))
}

fn decode_hex_line(hex: &[u8], out: &mut Vec<u8>) -> Result<(), ParseError> {
    let hex = hex.strip_suffix(b"\n").unwrap_or(hex);
    if hex.len() % 2 != 0 {
        return Err(ParseError::BadHex(hex.to_vec()));
    }
    for pair in hex.chunks_exact(2) {
        let high = hex_value(pair[0]);
        let low = hex_value(pair[1]);
        match (high, low) {
            (Some(high), Some(low)) => out.push((high << 4) | low),
            _ => return Err(ParseError::BadHex(hex.to_vec())),
        }
    }
    Ok(())
}

fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

/// Diagnostic handler that logs every operation and changes nothing.
/// Substituted for the replay engine by `--dry-run`.
pub(crate) struct TraceHandler {
    skip_binaries: bool,
}

impl TraceHandler {
    pub(crate) fn new(skip_binaries: bool) -> Self {
        Self { skip_binaries }
    }
}

impl PatchHandler for TraceHandler {
    fn begin(&mut self, meta: &PatchInfo) -> Result<(), HandlerError> {
        tracing::info!(
            "patch \"{}\" by \"{}\" at {}{}",
            meta.name.escape_ascii(),
            meta.author.escape_ascii(),
            meta.timestamp(),
            if meta.inverted { " (inverted)" } else { "" },
        );
        Ok(())
    }

    fn addfile(&mut self, path: &str) -> Result<(), HandlerError> {
        tracing::info!("addfile {path}");
        Ok(())
    }

    fn adddir(&mut self, path: &str) -> Result<(), HandlerError> {
        tracing::info!("adddir {path}");
        Ok(())
    }

    fn rmfile(&mut self, path: &str) -> Result<(), HandlerError> {
        tracing::info!("rmfile {path}");
        Ok(())
    }

    fn rmdir(&mut self, path: &str) -> Result<(), HandlerError> {
        tracing::info!("rmdir {path}");
        Ok(())
    }

    fn move_path(&mut self, from: &str, to: &str) -> Result<(), HandlerError> {
        tracing::info!("move {from} -> {to}");
        Ok(())
    }

    fn hunk(
        &mut self,
        path: &str,
        first_line: usize,
        inserted: Vec<Vec<u8>>,
        deleted: Vec<Vec<u8>>,
    ) -> Result<(), HandlerError> {
        tracing::info!(
            "hunk {path} at line {first_line}: +{} -{}",
            inserted.len(),
            deleted.len(),
        );
        Ok(())
    }

    fn binary(&mut self, path: &str, data: Option<Vec<u8>>) -> Result<(), HandlerError> {
        match data {
            Some(data) => tracing::info!("binary {path} ({} bytes)", data.len()),
            None => tracing::info!("binary {path} (skipped)"),
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
        tracing::info!("replace {path}: {old_text} -> {new_text}");
        Ok(())
    }

    fn changepref(&mut self) -> Result<(), HandlerError> {
        tracing::info!("changepref (ignored)");
        Ok(())
    }

    fn merger(&mut self) -> Result<(), HandlerError> {
        tracing::info!("merger (ignored)");
        Ok(())
    }

    fn finished(&mut self) -> Result<(), HandlerError> {
        tracing::info!("end of patch");
        Ok(())
    }

    fn skip_binaries(&self) -> bool {
        self.skip_binaries
    }
}

#[cfg(test)]
mod test {
    use super::super::inventory::PatchInfo;
    use super::{HandlerError, HeaderPattern, ParseError, PatchHandler, PatchParser};

    #[derive(Debug, PartialEq, Eq)]
    enum Op {
        Begin {
            name: Vec<u8>,
            author: Vec<u8>,
            log: Option<Vec<u8>>,
            inverted: bool,
        },
        AddFile(String),
        AddDir(String),
        RmFile(String),
        RmDir(String),
        Move(String, String),
        Hunk {
            path: String,
            first_line: usize,
            inserted: Vec<Vec<u8>>,
            deleted: Vec<Vec<u8>>,
        },
        Binary {
            path: String,
            data: Option<Vec<u8>>,
        },
        Replace {
            path: String,
            pattern: String,
            old_text: String,
            new_text: String,
        },
        ChangePref,
        Merger,
        Finished,
    }

    struct Recorder {
        ops: Vec<Op>,
        skip_binaries: bool,
    }

    impl PatchHandler for Recorder {
        fn begin(&mut self, meta: &PatchInfo) -> Result<(), HandlerError> {
            self.ops.push(Op::Begin {
                name: meta.name.clone(),
                author: meta.author.clone(),
                log: meta.log.clone(),
                inverted: meta.inverted,
            });
            Ok(())
        }

        fn addfile(&mut self, path: &str) -> Result<(), HandlerError> {
            self.ops.push(Op::AddFile(path.into()));
            Ok(())
        }

        fn adddir(&mut self, path: &str) -> Result<(), HandlerError> {
            self.ops.push(Op::AddDir(path.into()));
            Ok(())
        }

        fn rmfile(&mut self, path: &str) -> Result<(), HandlerError> {
            self.ops.push(Op::RmFile(path.into()));
            Ok(())
        }

        fn rmdir(&mut self, path: &str) -> Result<(), HandlerError> {
            self.ops.push(Op::RmDir(path.into()));
            Ok(())
        }

        fn move_path(&mut self, from: &str, to: &str) -> Result<(), HandlerError> {
            self.ops.push(Op::Move(from.into(), to.into()));
            Ok(())
        }

        fn hunk(
            &mut self,
            path: &str,
            first_line: usize,
            inserted: Vec<Vec<u8>>,
            deleted: Vec<Vec<u8>>,
        ) -> Result<(), HandlerError> {
            self.ops.push(Op::Hunk {
                path: path.into(),
                first_line,
                inserted,
                deleted,
            });
            Ok(())
        }

        fn binary(&mut self, path: &str, data: Option<Vec<u8>>) -> Result<(), HandlerError> {
            self.ops.push(Op::Binary {
                path: path.into(),
                data,
            });
            Ok(())
        }

        fn replace(
            &mut self,
            path: &str,
            pattern: &str,
            old_text: &str,
            new_text: &str,
        ) -> Result<(), HandlerError> {
            self.ops.push(Op::Replace {
                path: path.into(),
                pattern: pattern.into(),
                old_text: old_text.into(),
                new_text: new_text.into(),
            });
            Ok(())
        }

        fn changepref(&mut self) -> Result<(), HandlerError> {
            self.ops.push(Op::ChangePref);
            Ok(())
        }

        fn merger(&mut self) -> Result<(), HandlerError> {
            self.ops.push(Op::Merger);
            Ok(())
        }

        fn finished(&mut self) -> Result<(), HandlerError> {
            self.ops.push(Op::Finished);
            Ok(())
        }

        fn skip_binaries(&self) -> bool {
            self.skip_binaries
        }
    }

    const HEADER: &[u8] = b"[a patch\nme@example.com**20080314065051] ";

    fn parse(input: &[u8], skip_binaries: bool) -> Result<Vec<Op>, ParseError> {
        let mut src = std::io::Cursor::new(input.to_vec());
        let header = HeaderPattern::new();
        let mut recorder = Recorder {
            ops: Vec::new(),
            skip_binaries,
        };
        PatchParser::new(&mut src, &header, &mut recorder).parse()?;
        Ok(recorder.ops)
    }

    fn parse_body(body: &[u8]) -> Vec<Op> {
        let mut input = HEADER.to_vec();
        input.extend_from_slice(body);
        let mut ops = parse(&input, false).unwrap();
        // drop Begin and Finished, they are the same for every body
        assert!(matches!(ops.remove(0), Op::Begin { .. }));
        assert_eq!(ops.pop(), Some(Op::Finished));
        ops
    }

    #[test]
    fn test_header_only() {
        let ops = parse(b"[empty patch\nme@example.com**20080314065051]\n", false).unwrap();
        assert_eq!(ops.len(), 2);
        assert_eq!(
            ops[0],
            Op::Begin {
                name: b"empty patch".to_vec(),
                author: b"me@example.com".to_vec(),
                log: None,
                inverted: false,
            },
        );
        assert_eq!(ops[1], Op::Finished);
    }

    #[test]
    fn test_header_with_long_message() {
        let ops = parse(
            b"[named\nme@example.com**20080314065051\n line one\n line two\n] {\n}\n",
            false,
        )
        .unwrap();
        assert_eq!(
            ops[0],
            Op::Begin {
                name: b"named".to_vec(),
                author: b"me@example.com".to_vec(),
                log: Some(b"line one\nline two\n".to_vec()),
                inverted: false,
            },
        );
    }

    #[test]
    fn test_inverted_header() {
        let ops = parse(b"[undone\nme@example.com*-20080314065051]\n", false).unwrap();
        assert!(matches!(ops[0], Op::Begin { inverted: true, .. }));
    }

    #[test]
    fn test_header_pushback_round_trip() {
        // everything after the matched header must be parsed as body
        let ops = parse_body(b"{\naddfile ./foo\n}\n");
        assert_eq!(ops, [Op::AddFile("./foo".into())]);
    }

    #[test]
    fn test_malformed_header() {
        assert!(matches!(
            parse(b"no header here\n", false),
            Err(ParseError::MalformedHeader),
        ));
    }

    #[test]
    fn test_path_ops() {
        let ops = parse_body(b"{\naddfile ./a\nadddir ./d\nrmfile ./b\nrmdir ./e\n}\n");
        assert_eq!(
            ops,
            [
                Op::AddFile("./a".into()),
                Op::AddDir("./d".into()),
                Op::RmFile("./b".into()),
                Op::RmDir("./e".into()),
            ],
        );
    }

    #[test]
    fn test_escaped_space_in_path() {
        let ops = parse_body(b"addfile ./with\\32\\space\n");
        assert_eq!(ops, [Op::AddFile("./with space".into())]);
    }

    #[test]
    fn test_nested_groups_flatten() {
        let ops = parse_body(b"{\n{\naddfile ./a\n}\nrmfile ./b\n{\n{\nadddir ./c\n}\n}\n}\n");
        assert_eq!(
            ops,
            [
                Op::AddFile("./a".into()),
                Op::RmFile("./b".into()),
                Op::AddDir("./c".into()),
            ],
        );
    }

    #[test]
    fn test_hunk() {
        let ops = parse_body(b"hunk ./f 3\n+new line\n+another\n-old line\naddfile ./g\n");
        assert_eq!(
            ops,
            [
                Op::Hunk {
                    path: "./f".into(),
                    first_line: 3,
                    inserted: vec![b"new line\n".to_vec(), b"another\n".to_vec()],
                    deleted: vec![b"old line\n".to_vec()],
                },
                Op::AddFile("./g".into()),
            ],
        );
    }

    #[test]
    fn test_hunk_at_end_of_input() {
        let ops = parse_body(b"hunk ./f 1\n+only line\n");
        assert_eq!(
            ops,
            [Op::Hunk {
                path: "./f".into(),
                first_line: 1,
                inserted: vec![b"only line\n".to_vec()],
                deleted: vec![],
            }],
        );
    }

    #[test]
    fn test_bad_hunk_line_number() {
        let mut input = HEADER.to_vec();
        input.extend_from_slice(b"hunk ./f zero\n");
        assert!(matches!(
            parse(&input, false),
            Err(ParseError::BadLine {
                context: "hunk",
                ..
            }),
        ));
    }

    #[test]
    fn test_binary() {
        let body = b"binary ./logo\noldhex\n*cafe\nnewhex\n*48656c\n*6c6f\naddfile ./z\n";
        let ops = parse_body(body);
        assert_eq!(
            ops,
            [
                Op::Binary {
                    path: "./logo".into(),
                    data: Some(b"Hello".to_vec()),
                },
                Op::AddFile("./z".into()),
            ],
        );
    }

    #[test]
    fn test_binary_skip_keeps_stream_position() {
        let mut input = HEADER.to_vec();
        input.extend_from_slice(
            b"binary ./logo\noldhex\n*cafe\nnewhex\n*48656c\n*6c6f\naddfile ./z\n",
        );
        let ops = parse(&input, true).unwrap();
        assert_eq!(
            &ops[1..3],
            [
                Op::Binary {
                    path: "./logo".into(),
                    data: None,
                },
                Op::AddFile("./z".into()),
            ],
        );
    }

    #[test]
    fn test_bad_hex() {
        let mut input = HEADER.to_vec();
        input.extend_from_slice(b"binary ./logo\noldhex\nnewhex\n*xyz1\n");
        assert!(matches!(parse(&input, false), Err(ParseError::BadHex(_))));
    }

    #[test]
    fn test_move() {
        let ops = parse_body(b"move ./from ./to\n");
        assert_eq!(ops, [Op::Move("./from".into(), "./to".into())]);
    }

    #[test]
    fn test_merger_skipped_balanced() {
        let body =
            b"merger 0.0 (\nhunk ./a 1\n+x\nmerger 0.0 (\nrmfile ./b\n)\n)\naddfile ./after\n";
        let ops = parse_body(body);
        assert_eq!(ops, [Op::Merger, Op::AddFile("./after".into())]);
    }

    #[test]
    fn test_changepref() {
        let ops = parse_body(b"changepref test\nold value\nnew value\naddfile ./a\n");
        assert_eq!(ops, [Op::ChangePref, Op::AddFile("./a".into())]);
    }

    #[test]
    fn test_replace() {
        let ops = parse_body(b"replace ./f [A-Za-z_0-9] foo bar\n");
        assert_eq!(
            ops,
            [Op::Replace {
                path: "./f".into(),
                pattern: "[A-Za-z_0-9]".into(),
                old_text: "foo".into(),
                new_text: "bar".into(),
            }],
        );
    }

    #[test]
    fn test_tag_skipped() {
        let body = b"<\n[TAG 1.0\nme@example.com**20080314065051\n]\n>\naddfile ./a\n";
        let ops = parse_body(body);
        assert_eq!(ops, [Op::AddFile("./a".into())]);
    }

    #[test]
    fn test_unexpected_token() {
        let mut input = HEADER.to_vec();
        input.extend_from_slice(b"frobnicate ./a\n");
        assert!(matches!(
            parse(&input, false),
            Err(ParseError::UnexpectedToken(_)),
        ));
    }

    #[test]
    fn test_truncated_group_is_fatal() {
        let mut input = HEADER.to_vec();
        input.extend_from_slice(b"{\naddfile ./a\n");
        assert!(matches!(
            parse(&input, false),
            Err(ParseError::TruncatedPatch),
        ));
    }
}
