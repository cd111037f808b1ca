//! Token and byte cursors shared by the tree and forest loaders, plus the
//! matching writer helpers.

use crate::error::{LoadError, LoadResult};
use std::fmt::Display;
use std::io::{self, Write};
use std::iter::Enumerate;
use std::str::{FromStr, Lines};

/// Walks a text model one logical line at a time. Lines starting with `#`
/// and blank lines are skipped wherever they appear.
pub(crate) struct TextReader<'a> {
    lines: Enumerate<Lines<'a>>,
}

impl<'a> TextReader<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            lines: text.lines().enumerate(),
        }
    }

    fn next_line(&mut self, what: &'static str) -> LoadResult<(usize, Vec<&'a str>)> {
        for (idx, line) in self.lines.by_ref() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            return Ok((idx + 1, line.split_whitespace().collect()));
        }
        Err(LoadError::UnexpectedEof { what })
    }

    /// Next logical line, which must hold exactly `expected` tokens.
    pub fn tokens(&mut self, what: &'static str, expected: usize) -> LoadResult<(usize, Vec<&'a str>)> {
        let (line, tokens) = self.next_line(what)?;
        if tokens.len() != expected {
            return Err(LoadError::TokenCount {
                line,
                expected,
                found: tokens.len(),
            });
        }
        Ok((line, tokens))
    }

    pub fn row<T: FromStr>(&mut self, what: &'static str, expected: usize) -> LoadResult<Vec<T>> {
        let (line, tokens) = self.tokens(what, expected)?;
        tokens
            .into_iter()
            .map(|token| {
                token.parse().map_err(|_| LoadError::Parse {
                    line,
                    token: token.to_string(),
                })
            })
            .collect()
    }

    pub fn finish(mut self) -> LoadResult<()> {
        match self.next_line("trailing content") {
            Ok((line, _)) => Err(LoadError::Invalid(format!(
                "unexpected content after the model on line {line}"
            ))),
            Err(_) => Ok(()),
        }
    }
}

/// Sequential reader over native-endian `i32`/`f64` blocks.
pub(crate) struct BinaryReader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> BinaryReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    pub fn bytes(&mut self, len: usize, what: &'static str) -> LoadResult<&'a [u8]> {
        let end = self
            .offset
            .checked_add(len)
            .filter(|&end| end <= self.bytes.len())
            .ok_or(LoadError::UnexpectedEof { what })?;
        let chunk = &self.bytes[self.offset..end];
        self.offset = end;
        Ok(chunk)
    }

    pub fn i32s(&mut self, count: usize, what: &'static str) -> LoadResult<Vec<i32>> {
        let len = count
            .checked_mul(4)
            .ok_or(LoadError::UnexpectedEof { what })?;
        Ok(self
            .bytes(len, what)?
            .chunks_exact(4)
            .map(|chunk| i32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect())
    }

    pub fn f64s(&mut self, count: usize, what: &'static str) -> LoadResult<Vec<f64>> {
        let len = count
            .checked_mul(8)
            .ok_or(LoadError::UnexpectedEof { what })?;
        Ok(self
            .bytes(len, what)?
            .chunks_exact(8)
            .map(|chunk| {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(chunk);
                f64::from_ne_bytes(raw)
            })
            .collect())
    }

    pub fn finish(self) -> LoadResult<()> {
        let trailing = self.bytes.len() - self.offset;
        if trailing > 0 {
            return Err(LoadError::Invalid(format!(
                "{trailing} trailing bytes after the model"
            )));
        }
        Ok(())
    }
}

/// Converts a serialized count or label, rejecting negatives.
pub(crate) fn non_negative(value: i64, what: &str) -> LoadResult<usize> {
    usize::try_from(value)
        .map_err(|_| LoadError::Invalid(format!("{what} must be non-negative, got {value}")))
}

pub(crate) fn put_i32s(out: &mut Vec<u8>, values: impl IntoIterator<Item = i32>) {
    for value in values {
        out.extend_from_slice(&value.to_ne_bytes());
    }
}

pub(crate) fn put_f64s(out: &mut Vec<u8>, values: impl IntoIterator<Item = f64>) {
    for value in values {
        out.extend_from_slice(&value.to_ne_bytes());
    }
}

/// Writes one whitespace separated line.
pub(crate) fn write_row<W, T>(writer: &mut W, values: impl IntoIterator<Item = T>) -> io::Result<()>
where
    W: Write + ?Sized,
    T: Display,
{
    let mut first = true;
    for value in values {
        if first {
            write!(writer, "{value}")?;
            first = false;
        } else {
            write!(writer, " {value}")?;
        }
    }
    writeln!(writer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_reader_skips_comments_and_blank_lines() {
        let mut reader = TextReader::new("# header\n\n1 2 3\n  # indented comment\n4.5 x\n");
        assert_eq!(reader.row::<i32>("ints", 3).unwrap(), vec![1, 2, 3]);
        match reader.row::<f64>("floats", 2) {
            Err(LoadError::Parse { line, token }) => {
                assert_eq!(line, 5);
                assert_eq!(token, "x");
            }
            other => panic!("expected parse error, got {other:?}"),
        }
        assert!(reader.finish().is_ok());
    }

    #[test]
    fn token_count_mismatch_names_the_line() {
        let mut reader = TextReader::new("#c\n1 2\n");
        match reader.row::<i32>("pair", 3) {
            Err(LoadError::TokenCount {
                line,
                expected,
                found,
            }) => assert_eq!((line, expected, found), (2, 3, 2)),
            other => panic!("expected token count error, got {other:?}"),
        }
        assert!(matches!(
            reader.row::<i32>("missing", 1),
            Err(LoadError::UnexpectedEof { what: "missing" })
        ));
    }

    #[test]
    fn binary_reader_consumes_native_endian_blocks() {
        let mut bytes = Vec::new();
        put_i32s(&mut bytes, [7, -1]);
        put_f64s(&mut bytes, [0.125]);

        let mut reader = BinaryReader::new(&bytes);
        assert_eq!(reader.i32s(2, "ints").unwrap(), vec![7, -1]);
        assert_eq!(reader.f64s(1, "floats").unwrap(), vec![0.125]);
        assert!(matches!(
            reader.i32s(1, "past end"),
            Err(LoadError::UnexpectedEof { .. })
        ));
        assert!(reader.finish().is_ok());
    }

    #[test]
    fn rows_are_space_separated() {
        let mut out = Vec::new();
        write_row(&mut out, [1.5, -2.0, 3.0]).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "1.5 -2 3\n");
    }
}
