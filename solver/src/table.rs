use ndarray::{Array1, Array2};

use crate::{Result, SolverErr};

/// The immutable nonnegative frequency table a swarm fits against.
///
/// Validated once at construction and shared read-only afterwards: every
/// cell is finite and >= 0, and every row and column sums to a strictly
/// positive value (the multiplier starting points divide by the marginals).
#[derive(Debug, Clone, PartialEq)]
pub struct FrequencyTable {
    row_labels: Vec<String>,
    column_labels: Vec<String>,
    data: Array2<f64>,
    row_sums: Array1<f64>,
    column_sums: Array1<f64>,
    total: f64,
}

impl FrequencyTable {
    /// Builds a table from row-major data, checking every invariant the
    /// solver relies on.
    pub fn new(
        row_labels: Vec<String>,
        column_labels: Vec<String>,
        rows: Vec<Vec<f64>>,
    ) -> Result<Self> {
        let nrow = row_labels.len();
        let ncol = column_labels.len();

        if nrow == 0 || ncol == 0 {
            return Err(SolverErr::ShapeMismatch {
                what: "table",
                got: 0,
                expected: 1,
            });
        }
        if rows.len() != nrow {
            return Err(SolverErr::ShapeMismatch {
                what: "rows",
                got: rows.len(),
                expected: nrow,
            });
        }

        let mut flat = Vec::with_capacity(nrow * ncol);
        for (i, row) in rows.iter().enumerate() {
            if row.len() != ncol {
                return Err(SolverErr::ShapeMismatch {
                    what: "row width",
                    got: row.len(),
                    expected: ncol,
                });
            }
            for (j, &value) in row.iter().enumerate() {
                if !value.is_finite() || value < 0.0 {
                    return Err(SolverErr::BadCell {
                        row: i,
                        col: j,
                        value,
                    });
                }
                flat.push(value);
            }
        }

        let data = Array2::from_shape_vec((nrow, ncol), flat).map_err(|_| {
            SolverErr::ShapeMismatch {
                what: "table",
                got: nrow * ncol,
                expected: nrow * ncol,
            }
        })?;

        let row_sums = Array1::from_shape_fn(nrow, |i| data.row(i).sum());
        let column_sums = Array1::from_shape_fn(ncol, |j| data.column(j).sum());

        for (i, &sum) in row_sums.iter().enumerate() {
            if sum <= 0.0 {
                return Err(SolverErr::ZeroMarginal {
                    axis: "row",
                    index: i,
                });
            }
        }
        for (j, &sum) in column_sums.iter().enumerate() {
            if sum <= 0.0 {
                return Err(SolverErr::ZeroMarginal {
                    axis: "column",
                    index: j,
                });
            }
        }

        let total = data.sum();

        Ok(Self {
            row_labels,
            column_labels,
            data,
            row_sums,
            column_sums,
            total,
        })
    }

    /// Parses the delimited text form: a header line of `corner,<column>...`
    /// followed by one `label,<value>...` line per row.
    pub fn from_csv_str(text: &str) -> Result<Self> {
        let mut lines = text
            .lines()
            .map(str::trim)
            .enumerate()
            .filter(|(_, l)| !l.is_empty());

        let (_, header) = lines.next().ok_or_else(|| SolverErr::Parse {
            line: 1,
            detail: "the table is empty".into(),
        })?;

        // The first header cell is the corner label and carries no data.
        let column_labels: Vec<String> = header.split(',').skip(1).map(str::trim).map(String::from).collect();
        if column_labels.is_empty() {
            return Err(SolverErr::Parse {
                line: 1,
                detail: "the header names no columns".into(),
            });
        }

        let mut row_labels = Vec::new();
        let mut rows = Vec::new();
        for (idx, line) in lines {
            let mut cells = line.split(',').map(str::trim);
            let label = cells.next().unwrap_or_default();
            let mut row = Vec::with_capacity(column_labels.len());
            for cell in cells {
                let value = cell.parse::<f64>().map_err(|e| SolverErr::Parse {
                    line: idx + 1,
                    detail: format!("bad frequency {cell:?}: {e}"),
                })?;
                row.push(value);
            }
            if row.len() != column_labels.len() {
                return Err(SolverErr::Parse {
                    line: idx + 1,
                    detail: format!(
                        "expected {} frequencies, found {}",
                        column_labels.len(),
                        row.len()
                    ),
                });
            }
            row_labels.push(label.to_string());
            rows.push(row);
        }

        Self::new(row_labels, column_labels, rows)
    }

    pub fn nrow(&self) -> usize {
        self.row_labels.len()
    }

    pub fn ncol(&self) -> usize {
        self.column_labels.len()
    }

    pub fn data(&self) -> &Array2<f64> {
        &self.data
    }

    pub fn row_labels(&self) -> &[String] {
        &self.row_labels
    }

    pub fn column_labels(&self) -> &[String] {
        &self.column_labels
    }

    pub fn row_sums(&self) -> &Array1<f64> {
        &self.row_sums
    }

    pub fn column_sums(&self) -> &Array1<f64> {
        &self.column_sums
    }

    pub fn total(&self) -> f64 {
        self.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(prefix: &str, n: usize) -> Vec<String> {
        (0..n).map(|i| format!("{prefix}{i}")).collect()
    }

    #[test]
    fn builds_and_exposes_marginals() {
        let table = FrequencyTable::new(
            labels("r", 2),
            labels("c", 3),
            vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]],
        )
        .unwrap();

        assert_eq!(table.nrow(), 2);
        assert_eq!(table.ncol(), 3);
        assert_eq!(table.row_sums().to_vec(), vec![6.0, 15.0]);
        assert_eq!(table.column_sums().to_vec(), vec![5.0, 7.0, 9.0]);
        assert_eq!(table.total(), 21.0);
        assert_eq!(table.data()[[1, 2]], 6.0);
    }

    #[test]
    fn rejects_negative_cells() {
        let err = FrequencyTable::new(
            labels("r", 2),
            labels("c", 2),
            vec![vec![1.0, 2.0], vec![3.0, -0.5]],
        )
        .unwrap_err();

        match err {
            SolverErr::BadCell { row: 1, col: 1, .. } => {}
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn rejects_zero_row_sums() {
        let err = FrequencyTable::new(
            labels("r", 2),
            labels("c", 2),
            vec![vec![0.0, 0.0], vec![3.0, 4.0]],
        )
        .unwrap_err();

        match err {
            SolverErr::ZeroMarginal { axis: "row", index: 0 } => {}
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn rejects_ragged_rows() {
        let err = FrequencyTable::new(
            labels("r", 2),
            labels("c", 2),
            vec![vec![1.0, 2.0], vec![3.0]],
        )
        .unwrap_err();

        match err {
            SolverErr::ShapeMismatch { what: "row width", got: 1, expected: 2 } => {}
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn parses_labelled_csv_text() {
        let text = "\
origin,near,mid,far
north,10,4,1
south,3,8,2
";
        let table = FrequencyTable::from_csv_str(text).unwrap();

        assert_eq!(table.row_labels(), ["north", "south"]);
        assert_eq!(table.column_labels(), ["near", "mid", "far"]);
        assert_eq!(table.data()[[0, 0]], 10.0);
        assert_eq!(table.data()[[1, 2]], 2.0);
    }

    #[test]
    fn csv_parse_reports_the_offending_line() {
        let text = "\
origin,a,b
r0,1,oops
";
        let err = FrequencyTable::from_csv_str(text).unwrap_err();

        match err {
            SolverErr::Parse { line: 2, .. } => {}
            other => panic!("unexpected error: {other}"),
        }
    }
}
