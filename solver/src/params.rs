use ndarray::Array1;
use rand::Rng;

use crate::{
    FrequencyTable, Result, SolverErr,
    stepper::{ParamId, ParamKind},
};

/// Starting step magnitude for row and column coordinates.
pub const COORD_DELTA: f64 = 0.1;
/// Starting step factor for row and column multipliers.
pub const MULT_DELTA: f64 = 1.1;
/// Starting step magnitude for the attenuation exponent.
pub const ATTEN_DELTA: f64 = 0.001;

/// The mutable optimization state: row and column coordinates, row and
/// column multipliers, and the shared attenuation exponent.
#[derive(Debug, Clone, PartialEq)]
pub struct Params {
    pub rx: Array1<f64>,
    pub cx: Array1<f64>,
    pub rm: Array1<f64>,
    pub cm: Array1<f64>,
    pub a: f64,
}

impl Params {
    /// Draws the standard starting point for `table`: coordinates uniform in
    /// [-1, 1], multipliers at their zero-correlation marginal values, and
    /// attenuation 2.
    pub fn random_start<R: Rng>(table: &FrequencyTable, rng: &mut R) -> Result<Self> {
        let sqrt_total = table.total().sqrt();
        let rm = table.row_sums().mapv(|s| s / sqrt_total);
        let cm = table.column_sums().mapv(|s| s / sqrt_total);
        let rx = Array1::from_shape_fn(table.nrow(), |_| rng.random_range(-1.0..=1.0));
        let cx = Array1::from_shape_fn(table.ncol(), |_| rng.random_range(-1.0..=1.0));

        let mut params = Self {
            rx,
            cx,
            rm,
            cm,
            a: 2.0,
        };
        params.standardize()?;
        Ok(params)
    }

    /// Rescales both multiplier blocks to a common geometric mean and
    /// recenters the coordinates so that `mean(rx) + mean(cx)` is zero.
    ///
    /// Neither adjustment changes any fitted frequency: multipliers only
    /// enter as pairwise products and coordinates only as differences.
    pub fn standardize(&mut self) -> Result<()> {
        let row_mean = geometric_mean(&self.rm, "row")?;
        let col_mean = geometric_mean(&self.cm, "column")?;
        let common = (row_mean * col_mean).sqrt();

        self.rm.mapv_inplace(|v| v * common / row_mean);
        self.cm.mapv_inplace(|v| v * common / col_mean);

        // Half the combined mean off each block zeroes the sum of the means.
        let shift = (mean(&self.rx) + mean(&self.cx)) / 2.0;
        self.rx.mapv_inplace(|v| v - shift);
        self.cx.mapv_inplace(|v| v - shift);

        Ok(())
    }

    pub fn nrow(&self) -> usize {
        self.rx.len()
    }

    pub fn ncol(&self) -> usize {
        self.cx.len()
    }

    /// Total count of scalar parameters.
    pub fn param_count(&self) -> usize {
        2 * self.nrow() + 2 * self.ncol() + 1
    }

    pub fn get(&self, id: ParamId) -> f64 {
        match id.kind {
            ParamKind::RowCoord => self.rx[id.index],
            ParamKind::ColCoord => self.cx[id.index],
            ParamKind::RowMult => self.rm[id.index],
            ParamKind::ColMult => self.cm[id.index],
            ParamKind::Attenuation => self.a,
        }
    }

    pub fn set(&mut self, id: ParamId, value: f64) {
        match id.kind {
            ParamKind::RowCoord => self.rx[id.index] = value,
            ParamKind::ColCoord => self.cx[id.index] = value,
            ParamKind::RowMult => self.rm[id.index] = value,
            ParamKind::ColMult => self.cm[id.index] = value,
            ParamKind::Attenuation => self.a = value,
        }
    }
}

/// One adaptive step size per scalar parameter.
///
/// Reset to the fixed starting magnitudes whenever a solve phase begins;
/// between epochs of one phase they keep whatever the stepper adapted them
/// to.
#[derive(Debug, Clone)]
pub struct StepDeltas {
    pub rx: Array1<f64>,
    pub cx: Array1<f64>,
    pub rm: Array1<f64>,
    pub cm: Array1<f64>,
    pub a: f64,
}

impl StepDeltas {
    pub fn new(nrow: usize, ncol: usize) -> Self {
        Self {
            rx: Array1::from_elem(nrow, COORD_DELTA),
            cx: Array1::from_elem(ncol, COORD_DELTA),
            rm: Array1::from_elem(nrow, MULT_DELTA),
            cm: Array1::from_elem(ncol, MULT_DELTA),
            a: ATTEN_DELTA,
        }
    }

    pub fn get(&self, id: ParamId) -> f64 {
        match id.kind {
            ParamKind::RowCoord => self.rx[id.index],
            ParamKind::ColCoord => self.cx[id.index],
            ParamKind::RowMult => self.rm[id.index],
            ParamKind::ColMult => self.cm[id.index],
            ParamKind::Attenuation => self.a,
        }
    }

    pub fn set(&mut self, id: ParamId, value: f64) {
        match id.kind {
            ParamKind::RowCoord => self.rx[id.index] = value,
            ParamKind::ColCoord => self.cx[id.index] = value,
            ParamKind::RowMult => self.rm[id.index] = value,
            ParamKind::ColMult => self.cm[id.index] = value,
            ParamKind::Attenuation => self.a = value,
        }
    }
}

fn mean(values: &Array1<f64>) -> f64 {
    values.sum() / values.len() as f64
}

/// Log-space geometric mean; any nonpositive or non-finite entry makes the
/// block degenerate.
fn geometric_mean(values: &Array1<f64>, axis: &'static str) -> Result<f64> {
    let mut log_sum = 0.0;
    for &v in values {
        if !v.is_finite() || v <= 0.0 {
            return Err(SolverErr::DegenerateMultipliers { axis });
        }
        log_sum += v.ln();
    }
    Ok((log_sum / values.len() as f64).exp())
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    fn table_2x3() -> FrequencyTable {
        FrequencyTable::new(
            vec!["r0".into(), "r1".into()],
            vec!["c0".into(), "c1".into(), "c2".into()],
            vec![vec![4.0, 2.0, 1.0], vec![1.0, 3.0, 5.0]],
        )
        .unwrap()
    }

    #[test]
    fn random_start_is_standardized() {
        let table = table_2x3();
        let mut rng = StdRng::seed_from_u64(11);
        let params = Params::random_start(&table, &mut rng).unwrap();

        assert_eq!(params.a, 2.0);
        assert_eq!(params.param_count(), 11);

        let combined = mean(&params.rx) + mean(&params.cx);
        assert!(combined.abs() < 1e-12, "combined mean {combined}");

        let rm_mean = geometric_mean(&params.rm, "row").unwrap();
        let cm_mean = geometric_mean(&params.cm, "column").unwrap();
        assert!((rm_mean - cm_mean).abs() < 1e-12 * rm_mean.max(1.0));

        for &x in params.rx.iter().chain(params.cx.iter()) {
            assert!(x.is_finite());
        }
    }

    #[test]
    fn standardize_preserves_products_and_differences() {
        let mut params = Params {
            rx: Array1::from_vec(vec![0.5, -1.5]),
            cx: Array1::from_vec(vec![2.0, 0.0]),
            rm: Array1::from_vec(vec![3.0, 1.0]),
            cm: Array1::from_vec(vec![0.25, 8.0]),
            a: 1.5,
        };
        let product_before = params.rm[0] * params.cm[1];
        let difference_before = params.rx[1] - params.cx[0];

        params.standardize().unwrap();

        let product_after = params.rm[0] * params.cm[1];
        let difference_after = params.rx[1] - params.cx[0];
        assert!((product_before - product_after).abs() < 1e-12);
        assert!((difference_before - difference_after).abs() < 1e-12);
    }

    #[test]
    fn standardize_rejects_nonpositive_multipliers() {
        let mut params = Params {
            rx: Array1::from_vec(vec![0.0]),
            cx: Array1::from_vec(vec![0.0]),
            rm: Array1::from_vec(vec![-1.0]),
            cm: Array1::from_vec(vec![1.0]),
            a: 2.0,
        };

        match params.standardize().unwrap_err() {
            SolverErr::DegenerateMultipliers { axis: "row" } => {}
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn delta_starting_magnitudes() {
        let deltas = StepDeltas::new(2, 3);
        assert_eq!(deltas.rx.to_vec(), vec![0.1, 0.1]);
        assert_eq!(deltas.cm.to_vec(), vec![1.1, 1.1, 1.1]);
        assert_eq!(deltas.a, 0.001);
    }
}
