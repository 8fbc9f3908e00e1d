//! Line-wise rendering of received payloads
//!
//! [`PrintableData`] walks a byte buffer `width` bytes at a time and yields
//! one line per chunk, either as text (bytes that aren't printable ASCII
//! become `.`) or as space separated hex pairs.

use core::{fmt::Write, iter::FusedIterator};

#[derive(Debug, Clone)]
pub struct PrintableData<'a> {
    data: &'a [u8],
    width: usize,
    as_hex: bool,
    offset: usize,
}

impl<'a> PrintableData<'a> {
    /// A `width` of zero yields no lines at all.
    pub fn new(data: &'a [u8], width: usize, as_hex: bool) -> Self {
        Self {
            data,
            width,
            as_hex,
            offset: 0,
        }
    }

    /// Start over from the first line.
    pub fn reset(&mut self) {
        self.offset = 0;
    }

    fn render(&self, chunk: &[u8]) -> String {
        if self.as_hex {
            let mut line = String::with_capacity(chunk.len() * 3);
            for (i, b) in chunk.iter().enumerate() {
                if i != 0 {
                    line.push(' ');
                }
                // writing into a String can't fail
                let _ = write!(line, "{b:02x}");
            }
            line
        } else {
            chunk
                .iter()
                .map(|&b| {
                    if b.is_ascii_graphic() || b == b' ' {
                        b as char
                    } else {
                        '.'
                    }
                })
                .collect()
        }
    }
}

impl Iterator for PrintableData<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        if self.width == 0 || self.offset >= self.data.len() {
            return None;
        }
        let end = self.data.len().min(self.offset + self.width);
        let line = self.render(&self.data[self.offset..end]);
        self.offset = end;
        Some(line)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = if self.width == 0 {
            0
        } else {
            (self.data.len() - self.offset).div_ceil(self.width)
        };
        (left, Some(left))
    }
}

impl ExactSizeIterator for PrintableData<'_> {}
impl FusedIterator for PrintableData<'_> {}
