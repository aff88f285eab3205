//! Join variants and output layouts.

pub mod merge;

use vexec_core::prelude::{DataType, Field, Schema};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    LeftOuter,
    RightOuter,
    /// Left rows with at least one match.
    Semi,
    /// Left rows without any match.
    AntiSemi,
    /// Every left row plus a boolean "has a match" column.
    LeftOuterSemi,
    /// Every left row plus a boolean "has no match" column.
    AntiLeftOuterSemi,
}

impl JoinType {
    /// The right side drives the join (is the outer side).
    pub fn right_is_outer(&self) -> bool {
        matches!(self, JoinType::RightOuter)
    }

    /// Emits exactly one row per outer row when the inner side has at most
    /// one match, so the caller's demand can be pushed to the outer child.
    pub fn is_outer(&self) -> bool {
        matches!(
            self,
            JoinType::LeftOuter
                | JoinType::RightOuter
                | JoinType::LeftOuterSemi
                | JoinType::AntiLeftOuterSemi
        )
    }

    pub fn output_schema(&self, left: &Schema, right: &Schema) -> Schema {
        match self {
            JoinType::Inner => Schema::join(left, right),
            JoinType::LeftOuter => Schema::join(left, &nullable(right)),
            JoinType::RightOuter => Schema::join(&nullable(left), right),
            JoinType::Semi | JoinType::AntiSemi => left.clone(),
            JoinType::LeftOuterSemi | JoinType::AntiLeftOuterSemi => {
                let mut fields = left.fields.clone();
                fields.push(Field::new("match", DataType::Boolean, true));
                Schema::new(fields)
            }
        }
    }
}

fn nullable(schema: &Schema) -> Schema {
    Schema::new(
        schema
            .fields
            .iter()
            .map(|f| Field::new(f.name.clone(), f.data_type, true))
            .collect(),
    )
}
