//! Scalar expressions evaluated by Selection, Projection, Sort keys, group-by
//! keys and join keys.
//!
//! Supports column references, literals, comparisons, `AND`/`OR`/`NOT`,
//! `IS NULL` and checked arithmetic. Evaluation comes in two forms: per row
//! (`eval_row`) and per chunk (`eval_chunk`, one output column per call).

use std::cmp::Ordering;
use std::fmt;

use rust_decimal::Decimal;
use vexec_core::chunk::Chunk;
use vexec_core::prelude::{DataType, Schema};
use vexec_core::types::{Column, Datum};

use crate::traits::{OpError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
    Plus,
    Minus,
    Multiply,
    Divide,
}

impl BinaryOp {
    fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::NotEq | BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq
        )
    }

    fn is_logical(&self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinaryOp::Eq => "=",
            BinaryOp::NotEq => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::LtEq => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::GtEq => ">=",
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
            BinaryOp::Plus => "+",
            BinaryOp::Minus => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Reference to an input column by position.
    Column(usize),
    Literal(Datum),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Not(Box<Expr>),
    IsNull(Box<Expr>),
}

/// Something that can hand out cell values by column index.
trait RowSource {
    fn value(&self, col: usize) -> Result<&Datum>;
}

struct ChunkRow<'a> {
    chunk: &'a Chunk,
    row: usize,
}

impl RowSource for ChunkRow<'_> {
    fn value(&self, col: usize) -> Result<&Datum> {
        if col >= self.chunk.num_cols() {
            return Err(OpError::Eval(format!("column #{} out of range", col)));
        }
        Ok(self.chunk.value(self.row, col))
    }
}

impl RowSource for [Datum] {
    fn value(&self, col: usize) -> Result<&Datum> {
        self.get(col)
            .ok_or_else(|| OpError::Eval(format!("column #{} out of range", col)))
    }
}

impl Expr {
    pub fn col(idx: usize) -> Self {
        Expr::Column(idx)
    }

    pub fn lit(value: Datum) -> Self {
        Expr::Literal(value)
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn eq(self, other: Expr) -> Self {
        Self::binary(BinaryOp::Eq, self, other)
    }

    pub fn not_eq(self, other: Expr) -> Self {
        Self::binary(BinaryOp::NotEq, self, other)
    }

    pub fn lt(self, other: Expr) -> Self {
        Self::binary(BinaryOp::Lt, self, other)
    }

    pub fn gt(self, other: Expr) -> Self {
        Self::binary(BinaryOp::Gt, self, other)
    }

    pub fn and(self, other: Expr) -> Self {
        Self::binary(BinaryOp::And, self, other)
    }

    pub fn or(self, other: Expr) -> Self {
        Self::binary(BinaryOp::Or, self, other)
    }

    pub fn plus(self, other: Expr) -> Self {
        Self::binary(BinaryOp::Plus, self, other)
    }

    pub fn is_null(self) -> Self {
        Expr::IsNull(Box::new(self))
    }

    pub fn negate(self) -> Self {
        Expr::Not(Box::new(self))
    }

    /// The referenced column if this is a bare column reference.
    pub fn as_column(&self) -> Option<usize> {
        match self {
            Expr::Column(idx) => Some(*idx),
            _ => None,
        }
    }

    /// Result type against an input schema.
    pub fn data_type(&self, input: &Schema) -> Result<DataType> {
        self.return_type(&input.data_types())
    }

    pub fn return_type(&self, input: &[DataType]) -> Result<DataType> {
        match self {
            Expr::Column(idx) => input
                .get(*idx)
                .copied()
                .ok_or_else(|| OpError::Schema(format!("column #{} out of range", idx))),
            Expr::Literal(d) => Ok(d.data_type().unwrap_or(DataType::Boolean)),
            Expr::Not(_) | Expr::IsNull(_) => Ok(DataType::Boolean),
            Expr::Binary { op, left, right } => {
                if op.is_comparison() || op.is_logical() {
                    return Ok(DataType::Boolean);
                }
                let l = left.return_type(input)?;
                let r = right.return_type(input)?;
                if !l.is_numeric() || !r.is_numeric() {
                    return Err(OpError::Schema(format!(
                        "operator {} needs numeric operands, got {} and {}",
                        op, l, r
                    )));
                }
                Ok(match (l, r, op) {
                    (DataType::Float64, _, _) | (_, DataType::Float64, _) => DataType::Float64,
                    (DataType::Decimal, _, _) | (_, DataType::Decimal, _) => DataType::Decimal,
                    (_, _, BinaryOp::Divide) => DataType::Float64,
                    _ => DataType::Int64,
                })
            }
        }
    }

    /// Evaluate against row `row` of `chunk`.
    pub fn eval_row(&self, chunk: &Chunk, row: usize) -> Result<Datum> {
        self.eval_on(&ChunkRow { chunk, row })
    }

    /// Evaluate against an owned row.
    pub fn eval_values(&self, row: &[Datum]) -> Result<Datum> {
        self.eval_on(row)
    }

    fn eval_on<R: RowSource + ?Sized>(&self, row: &R) -> Result<Datum> {
        match self {
            Expr::Column(idx) => Ok(row.value(*idx)?.clone()),
            Expr::Literal(d) => Ok(d.clone()),
            Expr::Not(inner) => Ok(eval_not(&inner.eval_on(row)?)),
            Expr::IsNull(inner) => Ok(Datum::Bool(inner.eval_on(row)?.is_null())),
            Expr::Binary { op, left, right } => {
                let l = left.eval_on(row)?;
                // Short-circuit the boolean connectives.
                match op {
                    BinaryOp::And if !l.is_null() && !l.is_true() => return Ok(Datum::Bool(false)),
                    BinaryOp::Or if l.is_true() => return Ok(Datum::Bool(true)),
                    _ => {}
                }
                let r = right.eval_on(row)?;
                eval_binary(*op, &l, &r)
            }
        }
    }

    /// Vectorized evaluation: one output value per input row.
    pub fn eval_chunk(&self, chunk: &Chunk) -> Result<Column> {
        let n = chunk.num_rows();
        match self {
            Expr::Column(idx) => {
                if *idx >= chunk.num_cols() {
                    return Err(OpError::Eval(format!("column #{} out of range", idx)));
                }
                Ok(chunk.column(*idx).clone())
            }
            Expr::Literal(d) => Ok(Column::from_values(
                d.data_type().unwrap_or(DataType::Boolean),
                vec![d.clone(); n],
            )),
            Expr::Not(inner) => {
                let col = inner.eval_chunk(chunk)?;
                Ok(Column::from_values(
                    DataType::Boolean,
                    col.values.iter().map(eval_not).collect(),
                ))
            }
            Expr::IsNull(inner) => {
                let col = inner.eval_chunk(chunk)?;
                Ok(Column::from_values(
                    DataType::Boolean,
                    col.values.iter().map(|d| Datum::Bool(d.is_null())).collect(),
                ))
            }
            Expr::Binary { op, left, right } => {
                let out_type = self.return_type(&chunk.data_types())?;
                let l = left.eval_chunk(chunk)?;
                let r = right.eval_chunk(chunk)?;
                let values = l
                    .values
                    .iter()
                    .zip(r.values.iter())
                    .map(|(a, b)| eval_binary(*op, a, b))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Column::from_values(out_type, values))
            }
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Column(idx) => write!(f, "#{}", idx),
            Expr::Literal(d) => write!(f, "{}", d),
            Expr::Binary { op, left, right } => write!(f, "({} {} {})", left, op, right),
            Expr::Not(inner) => write!(f, "NOT {}", inner),
            Expr::IsNull(inner) => write!(f, "{} IS NULL", inner),
        }
    }
}

fn eval_not(d: &Datum) -> Datum {
    if d.is_null() {
        Datum::Null
    } else {
        Datum::Bool(!d.is_true())
    }
}

fn eval_binary(op: BinaryOp, l: &Datum, r: &Datum) -> Result<Datum> {
    match op {
        BinaryOp::And => Ok(match (l.is_null(), r.is_null()) {
            _ if (!l.is_null() && !l.is_true()) || (!r.is_null() && !r.is_true()) => {
                Datum::Bool(false)
            }
            (false, false) => Datum::Bool(true),
            _ => Datum::Null,
        }),
        BinaryOp::Or => Ok(if l.is_true() || r.is_true() {
            Datum::Bool(true)
        } else if l.is_null() || r.is_null() {
            Datum::Null
        } else {
            Datum::Bool(false)
        }),
        _ if l.is_null() || r.is_null() => Ok(Datum::Null),
        _ if op.is_comparison() => {
            let ord = compare_for_predicate(l, r)?;
            Ok(Datum::Bool(match op {
                BinaryOp::Eq => ord == Ordering::Equal,
                BinaryOp::NotEq => ord != Ordering::Equal,
                BinaryOp::Lt => ord == Ordering::Less,
                BinaryOp::LtEq => ord != Ordering::Greater,
                BinaryOp::Gt => ord == Ordering::Greater,
                _ => ord != Ordering::Less,
            }))
        }
        _ => eval_arithmetic(op, l, r),
    }
}

/// Comparison for predicates: numeric values compare across representations,
/// everything else only against its own type.
fn compare_for_predicate(l: &Datum, r: &Datum) -> Result<Ordering> {
    let both_numeric = l.as_f64().is_some() && r.as_f64().is_some();
    if both_numeric || l.data_type() == r.data_type() {
        return Ok(l.total_cmp(r));
    }
    Err(OpError::Eval(format!("cannot compare {:?} with {:?}", l, r)))
}

fn eval_arithmetic(op: BinaryOp, l: &Datum, r: &Datum) -> Result<Datum> {
    let overflow = || OpError::Eval(format!("value is out of range in '{} {} {}'", l, op, r));
    match (l, r) {
        (Datum::I64(a), Datum::I64(b)) => match op {
            BinaryOp::Plus => a.checked_add(*b).map(Datum::I64).ok_or_else(overflow),
            BinaryOp::Minus => a.checked_sub(*b).map(Datum::I64).ok_or_else(overflow),
            BinaryOp::Multiply => a.checked_mul(*b).map(Datum::I64).ok_or_else(overflow),
            _ if *b == 0 => Ok(Datum::Null),
            _ => Ok(Datum::F64(*a as f64 / *b as f64)),
        },
        (Datum::F64(_), _) | (_, Datum::F64(_)) => {
            let (a, b) = match (l.as_f64(), r.as_f64()) {
                (Some(a), Some(b)) => (a, b),
                _ => return Err(non_numeric(op, l, r)),
            };
            let v = match op {
                BinaryOp::Plus => a + b,
                BinaryOp::Minus => a - b,
                BinaryOp::Multiply => a * b,
                _ if b == 0.0 => return Ok(Datum::Null),
                _ => a / b,
            };
            if v.is_finite() {
                Ok(Datum::F64(v))
            } else {
                Err(overflow())
            }
        }
        (Datum::Decimal(_) | Datum::I64(_), Datum::Decimal(_) | Datum::I64(_)) => {
            let a = to_decimal(l).ok_or_else(|| non_numeric(op, l, r))?;
            let b = to_decimal(r).ok_or_else(|| non_numeric(op, l, r))?;
            match op {
                BinaryOp::Plus => a.checked_add(b).map(Datum::Decimal).ok_or_else(overflow),
                BinaryOp::Minus => a.checked_sub(b).map(Datum::Decimal).ok_or_else(overflow),
                BinaryOp::Multiply => a.checked_mul(b).map(Datum::Decimal).ok_or_else(overflow),
                _ if b.is_zero() => Ok(Datum::Null),
                _ => a.checked_div(b).map(Datum::Decimal).ok_or_else(overflow),
            }
        }
        _ => Err(non_numeric(op, l, r)),
    }
}

fn to_decimal(d: &Datum) -> Option<Decimal> {
    match d {
        Datum::I64(i) => Some(Decimal::from(*i)),
        Datum::Decimal(d) => Some(*d),
        _ => None,
    }
}

fn non_numeric(op: BinaryOp, l: &Datum, r: &Datum) -> OpError {
    OpError::Eval(format!("operator {} needs numeric operands, got {:?} and {:?}", op, l, r))
}

/// Evaluate every filter over `chunk`, AND-ing into `selected` (resized to the
/// chunk's row count). Later filters only run on rows still selected.
pub fn vectorized_filter(filters: &[Expr], chunk: &Chunk, selected: &mut Vec<bool>) -> Result<()> {
    selected.clear();
    selected.resize(chunk.num_rows(), true);
    for (i, filter) in filters.iter().enumerate() {
        if i == 0 {
            let col = filter.eval_chunk(chunk)?;
            for (sel, value) in selected.iter_mut().zip(col.values.iter()) {
                *sel = value.is_true();
            }
            continue;
        }
        for (row, sel) in selected.iter_mut().enumerate() {
            if *sel {
                *sel = filter.eval_row(chunk, row)?.is_true();
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk() -> Chunk {
        let mut chunk = Chunk::new(&[DataType::Int64, DataType::Utf8], 8);
        chunk.append_row(vec![Datum::I64(1), Datum::Str("a".into())]);
        chunk.append_row(vec![Datum::I64(2), Datum::Null]);
        chunk.append_row(vec![Datum::Null, Datum::Str("c".into())]);
        chunk
    }

    #[test]
    fn comparison_with_null_is_null() {
        let c = chunk();
        let e = Expr::col(0).eq(Expr::lit(Datum::I64(1)));
        assert_eq!(e.eval_row(&c, 0).unwrap(), Datum::Bool(true));
        assert_eq!(e.eval_row(&c, 1).unwrap(), Datum::Bool(false));
        assert_eq!(e.eval_row(&c, 2).unwrap(), Datum::Null);
    }

    #[test]
    fn vectorized_matches_row_wise() {
        let c = chunk();
        let e = Expr::col(0).plus(Expr::lit(Datum::I64(10)));
        let col = e.eval_chunk(&c).unwrap();
        assert_eq!(col.data_type, DataType::Int64);
        for row in 0..c.num_rows() {
            assert_eq!(col.get(row), &e.eval_row(&c, row).unwrap());
        }
    }

    #[test]
    fn overflow_is_an_error() {
        let e = Expr::lit(Datum::I64(i64::MAX)).plus(Expr::lit(Datum::I64(1)));
        assert!(matches!(e.eval_values(&[]), Err(OpError::Eval(_))));
    }

    #[test]
    fn three_valued_logic() {
        let null = Expr::lit(Datum::Null);
        let f = Expr::lit(Datum::Bool(false));
        let t = Expr::lit(Datum::Bool(true));
        assert_eq!(null.clone().and(f.clone()).eval_values(&[]).unwrap(), Datum::Bool(false));
        assert_eq!(null.clone().and(t.clone()).eval_values(&[]).unwrap(), Datum::Null);
        assert_eq!(null.clone().or(t).eval_values(&[]).unwrap(), Datum::Bool(true));
        assert_eq!(null.or(f).eval_values(&[]).unwrap(), Datum::Null);
    }

    #[test]
    fn filter_conjunction() {
        let c = chunk();
        let filters = vec![
            Expr::col(0).is_null().negate(),
            Expr::col(1).is_null().negate(),
        ];
        let mut selected = Vec::new();
        vectorized_filter(&filters, &c, &mut selected).unwrap();
        assert_eq!(selected, vec![true, false, false]);
    }

    #[test]
    fn mismatched_types_are_rejected() {
        let c = chunk();
        let e = Expr::col(1).lt(Expr::lit(Datum::I64(3)));
        assert!(e.eval_row(&c, 0).is_err());
        assert!(Expr::col(1).plus(Expr::col(0)).return_type(&c.data_types()).is_err());
    }
}
