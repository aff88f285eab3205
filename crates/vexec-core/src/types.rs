//! Value containers: `Datum` (one cell) and `Column` (one typed vector).
//!
//! A `Column` owns its values. Anything that needs a value past the lifetime
//! of the chunk it came from must clone it out; chunks are reset and refilled
//! by their owner on every `next` call.

use std::cmp::Ordering;
use std::fmt;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::schema::DataType;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Datum {
    Null,
    Bool(bool),
    I64(i64),
    F64(f64),
    Str(String),
    Bin(Vec<u8>),
    Decimal(Decimal),
    Json(serde_json::Value),
}

impl Datum {
    /// Type of a non-null datum. `Null` carries no type of its own.
    pub fn data_type(&self) -> Option<DataType> {
        match self {
            Datum::Null => None,
            Datum::Bool(_) => Some(DataType::Boolean),
            Datum::I64(_) => Some(DataType::Int64),
            Datum::F64(_) => Some(DataType::Float64),
            Datum::Str(_) => Some(DataType::Utf8),
            Datum::Bin(_) => Some(DataType::Binary),
            Datum::Decimal(_) => Some(DataType::Decimal),
            Datum::Json(_) => Some(DataType::Json),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Datum::Null)
    }

    /// SQL truthiness used by filters: NULL and zero values are false.
    pub fn is_true(&self) -> bool {
        match self {
            Datum::Null => false,
            Datum::Bool(b) => *b,
            Datum::I64(i) => *i != 0,
            Datum::F64(f) => *f != 0.0,
            Datum::Decimal(d) => !d.is_zero(),
            Datum::Str(s) => s.parse::<f64>().map(|f| f != 0.0).unwrap_or(false),
            Datum::Bin(_) | Datum::Json(_) => true,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Datum::I64(i) => Some(*i as f64),
            Datum::F64(f) => Some(*f),
            Datum::Decimal(d) => d.to_f64(),
            _ => None,
        }
    }

    /// Rough in-memory footprint, used for budget accounting.
    pub fn estimated_bytes(&self) -> usize {
        let heap = match self {
            Datum::Str(s) => s.len(),
            Datum::Bin(b) => b.len(),
            Datum::Json(v) => v.to_string().len(),
            _ => 0,
        };
        std::mem::size_of::<Datum>() + heap
    }

    /// Total order used by sorting, grouping and merge comparisons.
    ///
    /// NULL sorts before everything; numbers of different representations are
    /// compared numerically; otherwise values of different types are ordered
    /// by type rank.
    pub fn total_cmp(&self, other: &Datum) -> Ordering {
        match (self, other) {
            (Datum::Null, Datum::Null) => Ordering::Equal,
            (Datum::Null, _) => Ordering::Less,
            (_, Datum::Null) => Ordering::Greater,
            (Datum::Bool(x), Datum::Bool(y)) => x.cmp(y),
            (Datum::I64(x), Datum::I64(y)) => x.cmp(y),
            (Datum::F64(x), Datum::F64(y)) => cmp_f64(*x, *y),
            (Datum::Decimal(x), Datum::Decimal(y)) => x.cmp(y),
            (Datum::I64(x), Datum::Decimal(y)) => Decimal::from(*x).cmp(y),
            (Datum::Decimal(x), Datum::I64(y)) => x.cmp(&Decimal::from(*y)),
            (Datum::I64(_) | Datum::Decimal(_), Datum::F64(y)) => {
                cmp_f64(self.as_f64().unwrap_or(f64::NAN), *y)
            }
            (Datum::F64(x), Datum::I64(_) | Datum::Decimal(_)) => {
                cmp_f64(*x, other.as_f64().unwrap_or(f64::NAN))
            }
            (Datum::Str(x), Datum::Str(y)) => x.cmp(y),
            (Datum::Bin(x), Datum::Bin(y)) => x.cmp(y),
            (Datum::Json(x), Datum::Json(y)) => x.to_string().cmp(&y.to_string()),
            _ => type_rank(self).cmp(&type_rank(other)),
        }
    }
}

fn cmp_f64(x: f64, y: f64) -> Ordering {
    if x.is_nan() && y.is_nan() {
        Ordering::Equal
    } else if x.is_nan() {
        Ordering::Greater
    } else if y.is_nan() {
        Ordering::Less
    } else {
        x.partial_cmp(&y).unwrap_or(Ordering::Equal)
    }
}

/// Assign a numeric order to datum types for mixed-type comparisons.
fn type_rank(d: &Datum) -> u8 {
    match d {
        Datum::Null => 0,
        Datum::Bool(_) => 1,
        Datum::I64(_) | Datum::F64(_) | Datum::Decimal(_) => 2,
        Datum::Str(_) => 3,
        Datum::Bin(_) => 4,
        Datum::Json(_) => 5,
    }
}

impl fmt::Display for Datum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Datum::Null => f.write_str("NULL"),
            Datum::Bool(b) => write!(f, "{}", b),
            Datum::I64(i) => write!(f, "{}", i),
            Datum::F64(v) => write!(f, "{}", v),
            Datum::Str(s) => f.write_str(s),
            Datum::Bin(b) => {
                f.write_str("0x")?;
                for byte in b {
                    write!(f, "{:02x}", byte)?;
                }
                Ok(())
            }
            Datum::Decimal(d) => write!(f, "{}", d),
            Datum::Json(v) => write!(f, "{}", v),
        }
    }
}

/// Compare two datum tuples lexicographically.
pub fn cmp_datums(a: &[Datum], b: &[Datum]) -> Ordering {
    for (x, y) in a.iter().zip(b.iter()) {
        match x.total_cmp(y) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    a.len().cmp(&b.len())
}

/// One typed column of a chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub data_type: DataType,
    pub values: Vec<Datum>,
}

impl Column {
    pub fn new(data_type: DataType) -> Self {
        Self {
            data_type,
            values: Vec::new(),
        }
    }

    pub fn with_capacity(data_type: DataType, cap: usize) -> Self {
        Self {
            data_type,
            values: Vec::with_capacity(cap),
        }
    }

    pub fn from_values(data_type: DataType, values: Vec<Datum>) -> Self {
        Self { data_type, values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, row: usize) -> &Datum {
        &self.values[row]
    }

    pub fn push(&mut self, value: Datum) {
        self.values.push(value);
    }

    /// Overwrite one cell in place. The chunk owner uses this to recycle storage.
    pub fn set(&mut self, row: usize, value: Datum) {
        self.values[row] = value;
    }

    pub fn is_null(&self, row: usize) -> bool {
        self.values[row].is_null()
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    pub fn truncate(&mut self, len: usize) {
        self.values.truncate(len);
    }
}
