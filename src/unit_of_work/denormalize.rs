//! Aggregate values copied from an association onto its owner.
//!
//! A rule reads one subfield across the rows of an association, folds it
//! with an [`Aggregate`], and writes the result into a field of the owning
//! record. Rules can be declared with the builder or parsed from the nested
//! JSON form `{"total": {"line_items": {"sum": "amount"}}}`.

use super::errors::{PersistResult, PersistenceError};
use crate::storage::Record;
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::fmt;

/// Fold applied to an association's subfield
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregate {
    Sum,
    Count,
    Minimum,
    Maximum,
    Average,
}

impl fmt::Display for Aggregate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sum => write!(f, "sum"),
            Self::Count => write!(f, "count"),
            Self::Minimum => write!(f, "minimum"),
            Self::Maximum => write!(f, "maximum"),
            Self::Average => write!(f, "average"),
        }
    }
}

impl std::str::FromStr for Aggregate {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sum" => Ok(Self::Sum),
            "count" => Ok(Self::Count),
            "minimum" | "min" => Ok(Self::Minimum),
            "maximum" | "max" => Ok(Self::Maximum),
            "average" | "avg" => Ok(Self::Average),
            _ => Err(format!("Invalid aggregate: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Numeric {
    Int(i64),
    Float(f64),
}

impl Numeric {
    fn parse(value: &Value) -> Result<Self, String> {
        match value {
            Value::Number(n) => match n.as_i64() {
                Some(i) => Ok(Self::Int(i)),
                None => n.as_f64().map(Self::Float).ok_or_else(|| format!("{n} is out of range")),
            },
            Value::String(s) => {
                let trimmed = s.trim();
                trimmed
                    .parse::<i64>()
                    .map(Self::Int)
                    .or_else(|_| trimmed.parse::<f64>().map(Self::Float))
                    .map_err(|_| format!("{s:?} is not numeric"))
            }
            other => Err(format!("{other} is not numeric")),
        }
    }

    fn as_f64(self) -> f64 {
        match self {
            Self::Int(i) => i as f64,
            Self::Float(f) => f,
        }
    }

    fn into_value(self) -> Value {
        match self {
            Self::Int(i) => Value::from(i),
            Self::Float(f) => Number::from_f64(f).map_or(Value::Null, Value::Number),
        }
    }
}

impl Aggregate {
    /// Fold `subfield` across `rows`. Rows where the subfield is null or
    /// missing are ignored.
    pub fn compute(&self, rows: &[Value], subfield: &str) -> Result<Value, String> {
        let present: Vec<&Value> = rows
            .iter()
            .filter_map(|row| row.get(subfield))
            .filter(|v| !v.is_null())
            .collect();

        if *self == Self::Count {
            return Ok(Value::from(present.len() as u64));
        }

        let numbers = present
            .into_iter()
            .map(Numeric::parse)
            .collect::<Result<Vec<_>, _>>()?;

        let result = match self {
            Self::Sum => Some(sum(&numbers)),
            Self::Minimum => extremum(&numbers, |a, b| a < b),
            Self::Maximum => extremum(&numbers, |a, b| a > b),
            Self::Average => (!numbers.is_empty()).then(|| {
                let total: f64 = numbers.iter().map(|n| n.as_f64()).sum();
                Numeric::Float(total / numbers.len() as f64)
            }),
            Self::Count => None,
        };
        Ok(result.map_or(Value::Null, Numeric::into_value))
    }
}

fn sum(numbers: &[Numeric]) -> Numeric {
    let mut int_total: i64 = 0;
    for n in numbers {
        match n {
            Numeric::Int(i) => match int_total.checked_add(*i) {
                Some(total) => int_total = total,
                None => return Numeric::Float(numbers.iter().map(|n| n.as_f64()).sum()),
            },
            Numeric::Float(_) => return Numeric::Float(numbers.iter().map(|n| n.as_f64()).sum()),
        }
    }
    Numeric::Int(int_total)
}

fn extremum(numbers: &[Numeric], better: impl Fn(f64, f64) -> bool) -> Option<Numeric> {
    numbers.iter().copied().fold(None, |best, n| match best {
        Some(b) if !better(n.as_f64(), Numeric::as_f64(b)) => Some(b),
        _ => Some(n),
    })
}

/// One denormalized field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DenormalizeRule {
    pub field: String,
    pub association: String,
    pub aggregate: Aggregate,
    pub subfield: String,
}

/// Ordered set of denormalization rules for one record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Denormalization {
    rules: Vec<DenormalizeRule>,
}

impl Denormalization {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rule(
        mut self,
        field: impl Into<String>,
        association: impl Into<String>,
        aggregate: Aggregate,
        subfield: impl Into<String>,
    ) -> Self {
        self.rules.push(DenormalizeRule {
            field: field.into(),
            association: association.into(),
            aggregate,
            subfield: subfield.into(),
        });
        self
    }

    pub fn rules(&self) -> &[DenormalizeRule] {
        &self.rules
    }

    /// Parse `{field: {association: {aggregate: subfield}}}`
    pub fn from_value(value: &Value) -> Result<Self, String> {
        let fields = value
            .as_object()
            .ok_or_else(|| "denormalization schema must be an object".to_string())?;
        let mut schema = Self::new();
        for (field, subschema) in fields {
            let (association, fold) = single_entry(subschema)
                .ok_or_else(|| format!("{field}: expected exactly one association"))?;
            let (aggregate, subfield) = single_entry(fold)
                .ok_or_else(|| format!("{field}.{association}: expected exactly one aggregate"))?;
            let subfield = subfield
                .as_str()
                .ok_or_else(|| format!("{field}.{association}.{aggregate}: subfield must be a string"))?;
            schema = schema.rule(field.as_str(), association.as_str(), aggregate.parse()?, subfield);
        }
        Ok(schema)
    }

    /// Compute every rule and write the results onto `record`
    pub fn apply(&self, record: &mut dyn Record) -> PersistResult<()> {
        for rule in &self.rules {
            let rows = record.association_rows(&rule.association).ok_or_else(|| {
                PersistenceError::UnknownAssociation {
                    table: record.table().to_string(),
                    association: rule.association.clone(),
                }
            })?;
            let value = rule.aggregate.compute(&rows, &rule.subfield).map_err(|reason| {
                PersistenceError::AggregateFailed {
                    field: rule.field.clone(),
                    reason,
                }
            })?;
            tracing::trace!(field = %rule.field, aggregate = %rule.aggregate, %value, "denormalized");
            record.write_attribute(&rule.field, value)?;
        }
        Ok(())
    }
}

fn single_entry(value: &Value) -> Option<(&String, &Value)> {
    let map = value.as_object()?;
    if map.len() != 1 {
        return None;
    }
    map.iter().next()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::AttributeRecord;
    use serde_json::json;

    fn rows() -> Vec<Value> {
        vec![
            json!({"amount": 10, "weight": 1.5}),
            json!({"amount": "30", "weight": 2.5}),
            json!({"amount": 2, "weight": null}),
        ]
    }

    #[test]
    fn test_sum_stays_integer_for_integer_inputs() {
        assert_eq!(Aggregate::Sum.compute(&rows(), "amount").unwrap(), json!(42));
        assert_eq!(Aggregate::Sum.compute(&rows(), "weight").unwrap(), json!(4.0));
        assert_eq!(Aggregate::Sum.compute(&[], "amount").unwrap(), json!(0));
    }

    #[test]
    fn test_count_min_max_average() {
        assert_eq!(Aggregate::Count.compute(&rows(), "weight").unwrap(), json!(2));
        assert_eq!(Aggregate::Minimum.compute(&rows(), "amount").unwrap(), json!(2));
        assert_eq!(Aggregate::Maximum.compute(&rows(), "amount").unwrap(), json!(30));
        assert_eq!(Aggregate::Average.compute(&rows(), "amount").unwrap(), json!(14.0));
        assert_eq!(Aggregate::Maximum.compute(&[], "amount").unwrap(), Value::Null);
    }

    #[test]
    fn test_non_numeric_subfield_rejected() {
        let rows = vec![json!({"amount": "lots"})];
        assert!(Aggregate::Sum.compute(&rows, "amount").is_err());
    }

    #[test]
    fn test_parse_nested_schema() {
        let schema = Denormalization::from_value(&json!({
            "total": {"line_items": {"sum": "amount"}},
            "item_count": {"line_items": {"count": "id"}}
        }))
        .unwrap();
        assert_eq!(schema.rules().len(), 2);
        assert!(schema.rules().iter().any(|r| r.aggregate == Aggregate::Count));

        assert!(Denormalization::from_value(&json!({"total": {"a": {"sum": "x"}, "b": {}}})).is_err());
        assert!(Denormalization::from_value(&json!({"total": {"a": {"median": "x"}}})).is_err());
    }

    #[test]
    fn test_apply_writes_fields() {
        let mut order = AttributeRecord::new("orders").with_association("line_items", rows());
        Denormalization::new()
            .rule("total", "line_items", Aggregate::Sum, "amount")
            .apply(&mut order)
            .unwrap();
        assert_eq!(order.get("total"), Some(&json!(42)));
    }

    #[test]
    fn test_apply_unknown_association() {
        let mut order = AttributeRecord::new("orders");
        let err = Denormalization::new()
            .rule("total", "payments", Aggregate::Sum, "amount")
            .apply(&mut order)
            .unwrap_err();
        assert!(matches!(err, PersistenceError::UnknownAssociation { .. }));
    }
}
