//! Aggregate functions: COUNT, SUM, AVG, MIN, MAX, FIRST_ROW.
//!
//! An [`AggFunc`] describes the function; its running value lives in an
//! [`AggState`] that the owning operator resets at every group boundary.

use std::cmp::Ordering;

use rust_decimal::Decimal;
use vexec_core::chunk::Chunk;
use vexec_core::prelude::{DataType, Field, Schema};
use vexec_core::types::{Column, Datum};

use crate::expr::Expr;
use crate::traits::{OpError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggKind {
    Count,
    Sum,
    Avg,
    Min,
    Max,
    /// Value of the group's first row; used to carry group-by keys through.
    FirstRow,
}

impl AggKind {
    fn name(&self) -> &'static str {
        match self {
            AggKind::Count => "count",
            AggKind::Sum => "sum",
            AggKind::Avg => "avg",
            AggKind::Min => "min",
            AggKind::Max => "max",
            AggKind::FirstRow => "firstrow",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggFunc {
    pub kind: AggKind,
    /// `None` only for `COUNT(*)`.
    pub arg: Option<Expr>,
}

/// Running value of one aggregate over the current group.
#[derive(Debug, Clone, Default)]
pub struct AggState {
    acc: Option<Datum>,
    count: i64,
    seen: bool,
}

impl AggState {
    pub fn reset(&mut self) {
        self.acc = None;
        self.count = 0;
        self.seen = false;
    }
}

impl AggFunc {
    pub fn new(kind: AggKind, arg: Expr) -> Self {
        Self {
            kind,
            arg: Some(arg),
        }
    }

    pub fn count_star() -> Self {
        Self {
            kind: AggKind::Count,
            arg: None,
        }
    }

    pub fn count(arg: Expr) -> Self {
        Self::new(AggKind::Count, arg)
    }

    pub fn sum(arg: Expr) -> Self {
        Self::new(AggKind::Sum, arg)
    }

    pub fn avg(arg: Expr) -> Self {
        Self::new(AggKind::Avg, arg)
    }

    pub fn min(arg: Expr) -> Self {
        Self::new(AggKind::Min, arg)
    }

    pub fn max(arg: Expr) -> Self {
        Self::new(AggKind::Max, arg)
    }

    pub fn first_row(arg: Expr) -> Self {
        Self::new(AggKind::FirstRow, arg)
    }

    pub fn return_type(&self, input: &[DataType]) -> Result<DataType> {
        let arg_type = match &self.arg {
            Some(arg) => Some(arg.return_type(input)?),
            None => None,
        };
        match (self.kind, arg_type) {
            (AggKind::Count, _) => Ok(DataType::Int64),
            (_, None) => Err(OpError::Plan(format!("{} needs an argument", self.kind.name()))),
            (AggKind::Sum | AggKind::Avg, Some(t)) => match t {
                DataType::Float64 => Ok(DataType::Float64),
                DataType::Int64 | DataType::Decimal => Ok(DataType::Decimal),
                other => Err(OpError::Plan(format!(
                    "{} over non-numeric type {}",
                    self.kind.name(),
                    other
                ))),
            },
            (_, Some(t)) => Ok(t),
        }
    }

    /// Output field for this aggregate, named after the function and argument.
    pub fn field(&self, input: &Schema) -> Result<Field> {
        let data_type = self.return_type(&input.data_types())?;
        let name = match &self.arg {
            Some(arg) => format!("{}({})", self.kind.name(), arg),
            None => format!("{}(*)", self.kind.name()),
        };
        Ok(Field::new(name, data_type, self.kind != AggKind::Count))
    }

    /// Evaluate the argument over a whole chunk. `COUNT(*)` has nothing to
    /// evaluate and yields `None`.
    pub fn eval_arg(&self, chunk: &Chunk) -> Result<Option<Column>> {
        match &self.arg {
            Some(arg) => Ok(Some(arg.eval_chunk(chunk)?)),
            None => Ok(None),
        }
    }

    /// Fold one input value into `state`. `COUNT(*)` passes `None`.
    pub fn update(&self, state: &mut AggState, value: Option<&Datum>) -> Result<()> {
        let value = match value {
            Some(v) => v,
            None => {
                state.count += 1;
                return Ok(());
            }
        };
        match self.kind {
            AggKind::FirstRow => {
                if !state.seen {
                    state.acc = Some(value.clone());
                    state.seen = true;
                }
            }
            _ if value.is_null() => {}
            AggKind::Count => state.count += 1,
            AggKind::Sum | AggKind::Avg => {
                let next = match state.acc.take() {
                    None => widen(value)?,
                    Some(acc) => add(&acc, value)?,
                };
                state.acc = Some(next);
                state.count += 1;
            }
            AggKind::Min | AggKind::Max => {
                let wanted = if self.kind == AggKind::Min {
                    Ordering::Less
                } else {
                    Ordering::Greater
                };
                let replace = match &state.acc {
                    None => true,
                    Some(cur) => value.total_cmp(cur) == wanted,
                };
                if replace {
                    state.acc = Some(value.clone());
                }
            }
        }
        Ok(())
    }

    /// Fold rows `[begin, end)` of a pre-evaluated argument column.
    pub fn update_range(
        &self,
        state: &mut AggState,
        arg: Option<&Column>,
        begin: usize,
        end: usize,
    ) -> Result<()> {
        match arg {
            Some(col) => {
                for row in begin..end {
                    self.update(state, Some(col.get(row)))?;
                    if self.kind == AggKind::FirstRow {
                        break;
                    }
                }
            }
            None => state.count += (end - begin) as i64,
        }
        Ok(())
    }

    pub fn finalize(&self, state: &AggState) -> Result<Datum> {
        match self.kind {
            AggKind::Count => Ok(Datum::I64(state.count)),
            AggKind::Avg => match &state.acc {
                None => Ok(Datum::Null),
                Some(Datum::F64(sum)) => Ok(Datum::F64(sum / state.count as f64)),
                Some(Datum::Decimal(sum)) => sum
                    .checked_div(Decimal::from(state.count))
                    .map(Datum::Decimal)
                    .ok_or_else(|| OpError::Eval("avg out of range".into())),
                Some(other) => Err(OpError::Eval(format!("avg over {:?}", other))),
            },
            _ => Ok(state.acc.clone().unwrap_or(Datum::Null)),
        }
    }
}

/// First summand: integers and decimals accumulate as decimals.
fn widen(value: &Datum) -> Result<Datum> {
    match value {
        Datum::I64(i) => Ok(Datum::Decimal(Decimal::from(*i))),
        Datum::Decimal(_) | Datum::F64(_) => Ok(value.clone()),
        other => Err(OpError::Eval(format!("cannot sum {:?}", other))),
    }
}

fn add(acc: &Datum, value: &Datum) -> Result<Datum> {
    match (acc, value) {
        (Datum::F64(a), v) => v
            .as_f64()
            .map(|b| Datum::F64(a + b))
            .ok_or_else(|| OpError::Eval(format!("cannot sum {:?}", v))),
        (Datum::Decimal(a), Datum::I64(b)) => a
            .checked_add(Decimal::from(*b))
            .map(Datum::Decimal)
            .ok_or_else(|| OpError::Eval("sum out of range".into())),
        (Datum::Decimal(a), Datum::Decimal(b)) => a
            .checked_add(*b)
            .map(Datum::Decimal)
            .ok_or_else(|| OpError::Eval("sum out of range".into())),
        (_, v) => Err(OpError::Eval(format!("cannot sum {:?}", v))),
    }
}
