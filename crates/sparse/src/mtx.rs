//! Matrix Market coordinate reader.

use crate::error::{SparseError, SparseResult};
use crate::matrix::CooMatrix;
use std::fs;
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Real,
    Integer,
    Pattern,
}

pub fn read_matrix_market(path: impl AsRef<Path>) -> SparseResult<CooMatrix> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|source| SparseError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let matrix = parse_matrix_market(&text)?;
    info!(
        path = %path.display(),
        rows = matrix.nrows(),
        cols = matrix.ncols(),
        nnz = matrix.nnz(),
        "loaded matrix market file"
    );
    Ok(matrix)
}

/// Parses `coordinate` matrices with `real`, `integer` or `pattern` fields and
/// `general` or `symmetric` symmetry.
pub fn parse_matrix_market(text: &str) -> SparseResult<CooMatrix> {
    let mut lines = text
        .lines()
        .enumerate()
        .map(|(idx, line)| (idx + 1, line.trim()));

    let (_, banner) = lines.next().ok_or_else(|| malformed(1, "empty input"))?;
    let header: Vec<String> = banner
        .split_whitespace()
        .map(|token| token.to_ascii_lowercase())
        .collect();
    if header.len() != 5 || header[0] != "%%matrixmarket" || header[1] != "matrix" {
        return Err(malformed(1, "missing %%MatrixMarket matrix banner"));
    }
    if header[2] != "coordinate" {
        return Err(malformed(1, &format!("unsupported layout '{}'", header[2])));
    }
    let field = match header[3].as_str() {
        "real" | "double" => Field::Real,
        "integer" => Field::Integer,
        "pattern" => Field::Pattern,
        other => return Err(malformed(1, &format!("unsupported field '{other}'"))),
    };
    let symmetric = match header[4].as_str() {
        "general" => false,
        "symmetric" => true,
        other => return Err(malformed(1, &format!("unsupported symmetry '{other}'"))),
    };

    let mut body = lines.filter(|(_, line)| !line.is_empty() && !line.starts_with('%'));

    let (size_line, size) = body
        .next()
        .ok_or_else(|| malformed(1, "missing size line"))?;
    let dims = parse_usizes(size_line, size)?;
    let [rows, cols, declared] = dims[..] else {
        return Err(malformed(size_line, "size line needs rows, cols and nnz"));
    };

    let expected_tokens = if field == Field::Pattern { 2 } else { 3 };
    let mirrored = declared
        .checked_mul(if symmetric { 2 } else { 1 })
        .ok_or_else(|| malformed(size_line, &format!("entry count {declared} is too large")))?;
    // Every entry needs its own line, so the input length bounds the count.
    let mut triplets = Vec::with_capacity(mirrored.min(text.len()));
    let mut seen = 0usize;
    for (line_no, line) in body {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() != expected_tokens {
            return Err(malformed(
                line_no,
                &format!("expected {expected_tokens} tokens, found {}", tokens.len()),
            ));
        }
        let row = parse_index(line_no, tokens[0], rows)?;
        let col = parse_index(line_no, tokens[1], cols)?;
        let value = match field {
            Field::Pattern => 1.0,
            Field::Real | Field::Integer => tokens[2]
                .parse::<f64>()
                .map_err(|_| malformed(line_no, &format!("invalid value '{}'", tokens[2])))?,
        };

        triplets.push((row, col, value));
        if symmetric && row != col {
            triplets.push((col, row, value));
        }
        seen += 1;
    }

    if seen != declared {
        return Err(malformed(
            size_line,
            &format!("declared {declared} entries, found {seen}"),
        ));
    }

    CooMatrix::from_triplets(rows, cols, &triplets)
}

fn parse_usizes(line_no: usize, line: &str) -> SparseResult<Vec<usize>> {
    line.split_whitespace()
        .map(|token| {
            token
                .parse::<usize>()
                .map_err(|_| malformed(line_no, &format!("invalid integer '{token}'")))
        })
        .collect()
}

fn parse_index(line_no: usize, token: &str, bound: usize) -> SparseResult<usize> {
    let index = token
        .parse::<usize>()
        .map_err(|_| malformed(line_no, &format!("invalid index '{token}'")))?;
    if index == 0 || index > bound {
        return Err(malformed(
            line_no,
            &format!("index {index} outside 1..={bound}"),
        ));
    }
    Ok(index - 1)
}

fn malformed(line: usize, reason: &str) -> SparseError {
    SparseError::MatrixMarket {
        line,
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_symmetric_real_matrix() {
        let text = "%%MatrixMarket matrix coordinate real symmetric\n\
                    % a comment\n\
                    3 3 4\n\
                    1 1 4.0\n\
                    2 1 -1.0\n\
                    2 2 4.0\n\
                    3 3 2.5\n";
        let coo = parse_matrix_market(text).unwrap();
        assert_eq!((coo.nrows(), coo.ncols(), coo.nnz()), (3, 3, 5));
        assert_eq!(coo.row_indices(), &[0, 0, 1, 1, 2]);
        assert_eq!(coo.col_indices(), &[0, 1, 0, 1, 2]);
    }

    #[test]
    fn pattern_entries_default_to_one() {
        let text = "%%MatrixMarket matrix coordinate pattern general\n2 2 2\n1 2\n2 1\n";
        let coo = parse_matrix_market(text).unwrap();
        assert_eq!(coo.values(), &[1.0, 1.0]);
    }

    #[test]
    fn rejects_wrong_token_count_and_entry_count() {
        let short = "%%MatrixMarket matrix coordinate real general\n2 2 1\n1 1\n";
        assert!(matches!(
            parse_matrix_market(short),
            Err(SparseError::MatrixMarket { line: 3, .. })
        ));

        let missing = "%%MatrixMarket matrix coordinate real general\n2 2 2\n1 1 1.0\n";
        assert!(matches!(
            parse_matrix_market(missing),
            Err(SparseError::MatrixMarket { line: 2, .. })
        ));
    }

    #[test]
    fn huge_declared_count_is_an_error() {
        let overflow = "%%MatrixMarket matrix coordinate real symmetric\n\
                        2 2 9223372036854775807\n\
                        1 1 1.0\n";
        assert!(matches!(
            parse_matrix_market(overflow),
            Err(SparseError::MatrixMarket { line: 2, .. })
        ));

        let oversized = "%%MatrixMarket matrix coordinate real general\n2 2 4611686018427387903\n";
        assert!(matches!(
            parse_matrix_market(oversized),
            Err(SparseError::MatrixMarket { line: 2, .. })
        ));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = read_matrix_market("/definitely/not/here.mtx").unwrap_err();
        assert!(matches!(err, SparseError::Io { .. }));
    }
}
