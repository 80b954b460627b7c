use std::io::BufRead;

use encoding_rs::UTF_8;

use crate::error::{DriverError, DriverResult};

/// One item of a [`LineSource`]. `EndOfStream` is yielded exactly once, after
/// the last line (or immediately on empty input), so consumers can run a final
/// flush step without special-casing exhaustion.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Line {
    Text(String),
    EndOfStream,
}

pub struct LineSource<R> {
    reader: R,
    line_no: usize,
    finished: bool,
    buf: Vec<u8>,
}

impl<R: BufRead> LineSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line_no: 0,
            finished: false,
            buf: Vec::with_capacity(256),
        }
    }

    /// Number of text lines produced so far.
    pub fn lines_read(&self) -> usize {
        self.line_no
    }

    /// Reads the next raw line, or `None` once the reader is exhausted.
    /// This does not emit the end-of-stream marker; see the `Iterator` impl.
    pub fn read_line(&mut self) -> DriverResult<Option<String>> {
        self.buf.clear();
        let n = self
            .reader
            .read_until(b'\n', &mut self.buf)
            .map_err(|e| DriverError::io(format!("read line {}", self.line_no + 1), e))?;
        if n == 0 {
            return Ok(None);
        }
        let mut end = self.buf.len();
        if end > 0 && self.buf[end - 1] == b'\n' {
            end -= 1;
            if end > 0 && self.buf[end - 1] == b'\r' {
                end -= 1;
            }
        }
        let bytes = &self.buf[..end];
        let (text, _had_errors) = if self.line_no == 0 {
            UTF_8.decode_with_bom_removal(bytes)
        } else {
            UTF_8.decode_without_bom_handling(bytes)
        };
        self.line_no += 1;
        Ok(Some(text.into_owned()))
    }
}

impl<R: BufRead> Iterator for LineSource<R> {
    type Item = DriverResult<Line>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.read_line() {
            Ok(Some(text)) => Some(Ok(Line::Text(text))),
            Ok(None) => {
                self.finished = true;
                Some(Ok(Line::EndOfStream))
            }
            Err(err) => {
                self.finished = true;
                Some(Err(err))
            }
        }
    }
}

/// Reads the reference stream in lock-step with the source stream.
pub struct ReferenceReader<R> {
    lines: LineSource<R>,
}

impl<R: BufRead> ReferenceReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: LineSource::new(reader),
        }
    }

    /// Returns the reference line paired with source line `source_line`
    /// (1-based). Running out of reference lines first is an alignment error.
    pub fn line_for(&mut self, source_line: usize) -> DriverResult<String> {
        match self.lines.read_line()? {
            Some(text) => Ok(text),
            None => Err(DriverError::alignment(format!(
                "reference stream ended after {} lines, source has line {}",
                self.lines.lines_read(),
                source_line
            ))),
        }
    }
}
