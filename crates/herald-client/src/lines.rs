//! Splits the raw byte stream into text lines.
//!
//! The terminator is detected per read over the buffered bytes with the
//! priority CRLF, then LF, then CR. The segment after the last terminator is
//! kept until more bytes arrive.

use bytes::{Buf, BytesMut};

const CR: u8 = b'\r';
const LF: u8 = b'\n';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Eol {
    CrLf,
    Lf,
    Cr,
}

impl Eol {
    fn detect(buf: &[u8]) -> Option<Self> {
        if buf.windows(2).any(|w| w == [CR, LF]) {
            Some(Self::CrLf)
        } else if buf.contains(&LF) {
            Some(Self::Lf)
        } else if buf.contains(&CR) {
            Some(Self::Cr)
        } else {
            None
        }
    }

    fn len(self) -> usize {
        match self {
            Self::CrLf => 2,
            Self::Lf | Self::Cr => 1,
        }
    }

    fn find(self, buf: &[u8]) -> Option<usize> {
        match self {
            Self::CrLf => buf.windows(2).position(|w| w == [CR, LF]),
            Self::Lf => buf.iter().position(|&b| b == LF),
            Self::Cr => buf.iter().position(|&b| b == CR),
        }
    }
}

/// A line grew past the decoder's limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Line exceeds {limit} bytes")]
pub struct LineTooLong {
    pub limit: usize,
}

/// Incremental line decoder for one connection.
#[derive(Debug)]
pub struct LineDecoder {
    pending: BytesMut,
    /// The previous read ended on a lone CR; a leading LF completes it.
    trailing_cr: bool,
    max_line_length: usize,
}

impl Default for LineDecoder {
    fn default() -> Self {
        Self::with_max_line_length(usize::MAX)
    }
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// A decoder that rejects any line longer than `limit` bytes, whether
    /// complete or still waiting for its terminator.
    pub fn with_max_line_length(limit: usize) -> Self {
        Self {
            pending: BytesMut::new(),
            trailing_cr: false,
            max_line_length: limit,
        }
    }

    /// Feed one read's worth of bytes and return every complete line.
    pub fn decode(&mut self, chunk: &[u8]) -> Result<Vec<String>, LineTooLong> {
        let chunk = if self.trailing_cr && chunk.first() == Some(&LF) {
            &chunk[1..]
        } else {
            chunk
        };
        self.trailing_cr = false;
        if chunk.is_empty() {
            return Ok(Vec::new());
        }
        self.pending.extend_from_slice(chunk);

        let mut lines = Vec::new();
        if let Some(eol) = Eol::detect(&self.pending) {
            while let Some(pos) = eol.find(&self.pending) {
                self.check_length(pos)?;
                let line = self.pending.split_to(pos);
                self.pending.advance(eol.len());
                lines.push(String::from_utf8_lossy(&line).into_owned());
            }
            if eol == Eol::Cr && chunk.last() == Some(&CR) {
                self.trailing_cr = true;
            }
        }
        self.check_length(self.pending.len())?;
        Ok(lines)
    }

    /// Bytes held back because no terminator followed them yet.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    fn check_length(&self, len: usize) -> Result<(), LineTooLong> {
        if len > self.max_line_length {
            return Err(LineTooLong {
                limit: self.max_line_length,
            });
        }
        Ok(())
    }
}
