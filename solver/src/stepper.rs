//! Per-parameter adaptive stepping.
//!
//! Each invocation tries the current step in its current direction, then the
//! opposite direction, and reverts while shrinking the step when both trials
//! make the fit worse. Step sizes grow while a direction keeps paying off,
//! so a parameter far from its optimum is crossed in accelerating strides.

use crate::{
    FrequencyTable, Result,
    model::EvalCache,
    params::{Params, StepDeltas},
};

const COORD_GROW: f64 = 1.1;
const COORD_SHRINK: f64 = 0.5;
const MULT_GROW: f64 = 1.01;
const ATTEN_GROW: f64 = 0.0001;

/// The five scalar parameter classes of the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamKind {
    RowCoord,
    RowMult,
    ColCoord,
    ColMult,
    Attenuation,
}

/// One scalar parameter of the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParamId {
    pub kind: ParamKind,
    pub index: usize,
}

impl ParamId {
    pub fn new(kind: ParamKind, index: usize) -> Self {
        Self { kind, index }
    }
}

/// Builds the canonical parameter list: row coordinates, row multipliers,
/// column coordinates, column multipliers, attenuation.
pub fn param_list(nrow: usize, ncol: usize) -> Vec<ParamId> {
    let mut ids = Vec::with_capacity(2 * nrow + 2 * ncol + 1);
    ids.extend((0..nrow).map(|i| ParamId::new(ParamKind::RowCoord, i)));
    ids.extend((0..nrow).map(|i| ParamId::new(ParamKind::RowMult, i)));
    ids.extend((0..ncol).map(|j| ParamId::new(ParamKind::ColCoord, j)));
    ids.extend((0..ncol).map(|j| ParamId::new(ParamKind::ColMult, j)));
    ids.push(ParamId::new(ParamKind::Attenuation, 0));
    ids
}

/// Steps one scalar parameter in place.
///
/// `minimum_error` is updated whenever a trial strictly improves on it. A
/// numeric failure rolls the trial back before propagating, so the vector
/// never keeps a value it could not evaluate.
pub fn step_param(
    table: &FrequencyTable,
    params: &mut Params,
    deltas: &mut StepDeltas,
    cache: &mut EvalCache,
    id: ParamId,
    minimum_error: &mut f64,
) -> Result<()> {
    match id.kind {
        ParamKind::RowCoord | ParamKind::ColCoord => {
            step_coordinate(table, params, deltas, cache, id, minimum_error)
        }
        ParamKind::RowMult | ParamKind::ColMult => {
            step_multiplier(table, params, deltas, cache, id, minimum_error)
        }
        ParamKind::Attenuation => {
            step_attenuation(table, params, deltas, cache, id, minimum_error)
        }
    }
}

fn step_coordinate(
    table: &FrequencyTable,
    params: &mut Params,
    deltas: &mut StepDeltas,
    cache: &mut EvalCache,
    id: ParamId,
    minimum_error: &mut f64,
) -> Result<()> {
    let v0 = params.get(id);
    let d = deltas.get(id);

    let trial = trial_eval(table, params, cache, id, v0 + d, v0)?;
    if trial < *minimum_error {
        *minimum_error = trial;
        deltas.set(id, d * COORD_GROW);
        return Ok(());
    }

    let trial = trial_eval(table, params, cache, id, v0 - d, v0)?;
    if trial < *minimum_error {
        *minimum_error = trial;
        deltas.set(id, d * -COORD_GROW);
        return Ok(());
    }

    revert(params, cache, id, v0);
    deltas.set(id, d * COORD_SHRINK);
    Ok(())
}

fn step_multiplier(
    table: &FrequencyTable,
    params: &mut Params,
    deltas: &mut StepDeltas,
    cache: &mut EvalCache,
    id: ParamId,
    minimum_error: &mut f64,
) -> Result<()> {
    let v0 = params.get(id);
    let d = deltas.get(id);

    let trial = trial_eval(table, params, cache, id, v0 * d, v0)?;
    if trial < *minimum_error {
        *minimum_error = trial;
        deltas.set(id, d * MULT_GROW);
        return Ok(());
    }

    let trial = trial_eval(table, params, cache, id, v0 / d, v0)?;
    if trial < *minimum_error {
        *minimum_error = trial;
        deltas.set(id, d / MULT_GROW);
        return Ok(());
    }

    revert(params, cache, id, v0);
    deltas.set(id, d.sqrt());
    Ok(())
}

fn step_attenuation(
    table: &FrequencyTable,
    params: &mut Params,
    deltas: &mut StepDeltas,
    cache: &mut EvalCache,
    id: ParamId,
    minimum_error: &mut f64,
) -> Result<()> {
    let v0 = params.get(id);
    let d = deltas.get(id);

    let trial = trial_eval(table, params, cache, id, v0 + d, v0)?;
    if trial < *minimum_error {
        *minimum_error = trial;
        deltas.set(id, d + ATTEN_GROW);
        return Ok(());
    }

    let trial = trial_eval(table, params, cache, id, v0 - d, v0)?;
    if trial < *minimum_error {
        *minimum_error = trial;
        deltas.set(id, -(d + ATTEN_GROW));
        return Ok(());
    }

    revert(params, cache, id, v0);
    deltas.set(id, d + ATTEN_GROW);
    Ok(())
}

/// Installs `value`, evaluates, and rolls back to `v0` if the evaluation
/// blew up numerically.
fn trial_eval(
    table: &FrequencyTable,
    params: &mut Params,
    cache: &mut EvalCache,
    id: ParamId,
    value: f64,
    v0: f64,
) -> Result<f64> {
    params.set(id, value);
    cache.invalidate(id.kind);
    match cache.evaluate(table, params) {
        Ok(error) => Ok(error),
        Err(e) => {
            revert(params, cache, id, v0);
            Err(e)
        }
    }
}

fn revert(params: &mut Params, cache: &mut EvalCache, id: ParamId, v0: f64) {
    params.set(id, v0);
    cache.invalidate(id.kind);
}
