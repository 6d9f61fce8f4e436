#[derive(Debug)]
pub(crate) enum ReadError {
    Io(std::io::Error),
    EndOfInput,
}

impl From<std::io::Error> for ReadError {
    #[inline]
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl std::fmt::Display for ReadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Self::Io(ref e) => write!(f, "failed to read patch stream: {e}"),
            Self::EndOfInput => write!(f, "end of input"),
        }
    }
}

/// Cursor over a patch byte stream with single-character and whole-line
/// pushback. The pushback buffer is a LIFO stack, so pushed-back bytes
/// are re-read before anything from the underlying stream.
pub(crate) struct TokenStream<'a> {
    source: &'a mut dyn std::io::BufRead,
    pushback: Vec<u8>,
}

#[inline]
fn is_space(byte: u8) -> bool {
    matches!(byte, b' ' | b'\t' | b'\n')
}

impl<'a> TokenStream<'a> {
    pub(crate) fn new(source: &'a mut dyn std::io::BufRead) -> Self {
        Self {
            source,
            pushback: Vec::new(),
        }
    }

    pub(crate) fn next_char(&mut self) -> Result<u8, ReadError> {
        if let Some(byte) = self.pushback.pop() {
            return Ok(byte);
        }
        let buf = self.source.fill_buf()?;
        match buf.first() {
            Some(&byte) => {
                self.source.consume(1);
                Ok(byte)
            }
            None => Err(ReadError::EndOfInput),
        }
    }

    pub(crate) fn push_back_char(&mut self, byte: u8) {
        self.pushback.push(byte);
    }

    /// Reads everything up to and including the next newline. A final
    /// line without a terminating newline is returned as-is;
    /// `EndOfInput` is only returned when no bytes remain at all.
    pub(crate) fn read_line(&mut self) -> Result<Vec<u8>, ReadError> {
        let mut line = Vec::new();
        while let Some(byte) = self.pushback.pop() {
            line.push(byte);
            if byte == b'\n' {
                return Ok(line);
            }
        }
        self.source.read_until(b'\n', &mut line)?;
        if line.is_empty() {
            Err(ReadError::EndOfInput)
        } else {
            Ok(line)
        }
    }

    /// Reinserts bytes in front of the cursor. Multiple consecutive
    /// pushes stack up; the most recently pushed bytes are read first.
    pub(crate) fn push_back_line(&mut self, line: &[u8]) {
        self.pushback.extend(line.iter().rev());
    }

    /// Skips whitespace, then accumulates bytes until the next
    /// whitespace or end of input. The terminating whitespace byte is
    /// pushed back so it is visible to the next read. Fails with
    /// `EndOfInput` if nothing remains after skipping whitespace.
    pub(crate) fn next_token(&mut self) -> Result<Vec<u8>, ReadError> {
        let mut byte = self.next_char()?;
        while is_space(byte) {
            byte = self.next_char()?;
        }

        let mut token = vec![byte];
        loop {
            match self.next_char() {
                Ok(byte) if is_space(byte) => {
                    self.push_back_char(byte);
                    break;
                }
                Ok(byte) => token.push(byte),
                Err(ReadError::EndOfInput) => break,
                Err(e) => return Err(e),
            }
        }
        Ok(token)
    }
}

#[cfg(test)]
mod test {
    use super::{ReadError, TokenStream};

    #[test]
    fn test_tokens_and_pushback() {
        let mut src = std::io::Cursor::new(b"addfile ./a\nhunk ./a 1\n".to_vec());
        let mut stream = TokenStream::new(&mut src);

        assert_eq!(stream.next_token().unwrap(), b"addfile");
        assert_eq!(stream.read_line().unwrap(), b" ./a\n");
        assert_eq!(stream.next_token().unwrap(), b"hunk");

        let line = stream.read_line().unwrap();
        assert_eq!(line, b" ./a 1\n");
        stream.push_back_line(&line);
        assert_eq!(stream.read_line().unwrap(), b" ./a 1\n");

        assert!(matches!(stream.next_token(), Err(ReadError::EndOfInput)));
    }

    #[test]
    fn test_multiple_line_pushback() {
        let mut src = std::io::Cursor::new(b"third\n".to_vec());
        let mut stream = TokenStream::new(&mut src);

        stream.push_back_line(b"second\n");
        stream.push_back_line(b"first\n");
        assert_eq!(stream.read_line().unwrap(), b"first\n");
        assert_eq!(stream.read_line().unwrap(), b"second\n");
        assert_eq!(stream.read_line().unwrap(), b"third\n");
        assert!(matches!(stream.read_line(), Err(ReadError::EndOfInput)));
    }

    #[test]
    fn test_char_pushback_feeds_tokens() {
        let mut src = std::io::Cursor::new(b"bc d".to_vec());
        let mut stream = TokenStream::new(&mut src);

        let byte = stream.next_char().unwrap();
        assert_eq!(byte, b'b');
        stream.push_back_char(byte);
        stream.push_back_char(b'a');
        assert_eq!(stream.next_token().unwrap(), b"abc");
        assert_eq!(stream.next_token().unwrap(), b"d");
    }

    #[test]
    fn test_unterminated_final_line() {
        let mut src = std::io::Cursor::new(b"no newline".to_vec());
        let mut stream = TokenStream::new(&mut src);

        assert_eq!(stream.read_line().unwrap(), b"no newline");
        assert!(matches!(stream.read_line(), Err(ReadError::EndOfInput)));
    }

    #[test]
    fn test_whitespace_only_is_end_of_input() {
        let mut src = std::io::Cursor::new(b" \t\n \n".to_vec());
        let mut stream = TokenStream::new(&mut src);

        assert!(matches!(stream.next_token(), Err(ReadError::EndOfInput)));
    }
}
