//! Payload filter language
//!
//! A filter maps payload field names to operator sets:
//!
//! ```json
//! { "listId": { "eq": "L1" }, "priority": { "gt": 7, "lte": 10 } }
//! ```
//!
//! Fields are ANDed together, and so are the operators on one field. Operands
//! are strings, numbers or booleans; `in`/`nin` take an array of one scalar
//! type. Storage backends compile a [`Filter`] into their own predicate form;
//! this module only models and validates it, so every error here is raised
//! before any I/O.

use crate::error::{KeelError, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Number, Value};

/// Scalar operand of a filter condition.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Text(String),
    Number(Number),
    Bool(bool),
    /// A float with no JSON form (NaN or infinite); fails validation.
    NonFinite(f64),
}

/// Operand type, which decides how the payload field is cast before comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    Text,
    Number,
    Bool,
}

impl Scalar {
    pub fn kind(&self) -> ScalarKind {
        match self {
            Scalar::Text(_) => ScalarKind::Text,
            Scalar::Number(_) | Scalar::NonFinite(_) => ScalarKind::Number,
            Scalar::Bool(_) => ScalarKind::Bool,
        }
    }

    fn from_json(op: &str, value: &Value) -> Result<Self> {
        match value {
            Value::String(s) => Ok(Scalar::Text(s.clone())),
            Value::Number(n) => Ok(Scalar::Number(n.clone())),
            Value::Bool(b) => Ok(Scalar::Bool(*b)),
            other => Err(KeelError::InvalidFilter(format!(
                "operator '{}' expects a string, number or boolean, got {}",
                op, other
            ))),
        }
    }

    fn to_json(&self) -> Value {
        match self {
            Scalar::Text(s) => Value::String(s.clone()),
            Scalar::Number(n) => Value::Number(n.clone()),
            Scalar::Bool(b) => Value::Bool(*b),
            Scalar::NonFinite(_) => Value::Null,
        }
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::Text(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Scalar::Text(value)
    }
}

impl From<&String> for Scalar {
    fn from(value: &String) -> Self {
        Scalar::Text(value.clone())
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Scalar::Bool(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Scalar::Number(value.into())
    }
}

impl From<i32> for Scalar {
    fn from(value: i32) -> Self {
        Scalar::Number(value.into())
    }
}

impl From<u32> for Scalar {
    fn from(value: u32) -> Self {
        Scalar::Number(value.into())
    }
}

impl From<f64> for Scalar {
    /// Non-finite floats are kept as-is so that validation can reject them.
    fn from(value: f64) -> Self {
        match Number::from_f64(value) {
            Some(n) => Scalar::Number(n),
            None => Scalar::NonFinite(value),
        }
    }
}

/// Ordered comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl Comparison {
    /// SQL spelling of the operator.
    pub fn sql_op(self) -> &'static str {
        match self {
            Comparison::Eq => "=",
            Comparison::Neq => "!=",
            Comparison::Gt => ">",
            Comparison::Gte => ">=",
            Comparison::Lt => "<",
            Comparison::Lte => "<=",
        }
    }

    fn key(self) -> &'static str {
        match self {
            Comparison::Eq => "eq",
            Comparison::Neq => "neq",
            Comparison::Gt => "gt",
            Comparison::Gte => "gte",
            Comparison::Lt => "lt",
            Comparison::Lte => "lte",
        }
    }
}

/// A single operator applied to one field.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Compare(Comparison, Scalar),
    In(Vec<Scalar>),
    NotIn(Vec<Scalar>),
}

impl Condition {
    fn key(&self) -> &'static str {
        match self {
            Condition::Compare(cmp, _) => cmp.key(),
            Condition::In(_) => "in",
            Condition::NotIn(_) => "nin",
        }
    }

    fn parse(op: &str, value: &Value) -> Result<Self> {
        let cmp = match op {
            "eq" => Comparison::Eq,
            "neq" => Comparison::Neq,
            "gt" => Comparison::Gt,
            "gte" => Comparison::Gte,
            "lt" => Comparison::Lt,
            "lte" => Comparison::Lte,
            "in" => return parse_list(op, value).map(Condition::In),
            "nin" => return parse_list(op, value).map(Condition::NotIn),
            other => return Err(KeelError::UnknownOperator(other.to_string())),
        };
        Ok(Condition::Compare(cmp, Scalar::from_json(op, value)?))
    }

    /// The operand kind that drives the field cast. `None` for an empty list.
    pub fn kind(&self) -> Option<ScalarKind> {
        match self {
            Condition::Compare(_, scalar) => Some(scalar.kind()),
            Condition::In(values) | Condition::NotIn(values) => values.first().map(Scalar::kind),
        }
    }

    fn operands(&self) -> &[Scalar] {
        match self {
            Condition::Compare(_, scalar) => std::slice::from_ref(scalar),
            Condition::In(values) | Condition::NotIn(values) => values,
        }
    }

    fn validate(&self) -> Result<()> {
        if let Some(Scalar::NonFinite(value)) = self
            .operands()
            .iter()
            .find(|s| matches!(s, Scalar::NonFinite(_)))
        {
            return Err(KeelError::InvalidFilter(format!(
                "operator '{}' got non-finite number {}",
                self.key(),
                value
            )));
        }
        if let Condition::In(values) | Condition::NotIn(values) = self {
            if let Some(first) = values.first() {
                if values.iter().any(|v| v.kind() != first.kind()) {
                    return Err(KeelError::InvalidFilter(format!(
                        "operator '{}' requires values of a single type",
                        self.key()
                    )));
                }
            }
        }
        Ok(())
    }

    fn operand_json(&self) -> Value {
        match self {
            Condition::Compare(_, scalar) => scalar.to_json(),
            Condition::In(values) | Condition::NotIn(values) => {
                Value::Array(values.iter().map(Scalar::to_json).collect())
            }
        }
    }
}

fn parse_list(op: &str, value: &Value) -> Result<Vec<Scalar>> {
    let items = value.as_array().ok_or_else(|| {
        KeelError::InvalidFilter(format!("operator '{}' expects an array", op))
    })?;
    items.iter().map(|item| Scalar::from_json(op, item)).collect()
}

/// Conditions on one payload field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldFilter {
    pub field: String,
    pub conditions: Vec<Condition>,
}

/// A conjunction of field conditions over an event or projection payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    fields: Vec<FieldFilter>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the wire shape `{ field: { op: value, .. }, .. }`.
    ///
    /// Fails with `UnknownOperator` naming the first unrecognized operator key.
    pub fn from_json(value: &Value) -> Result<Self> {
        let object = value.as_object().ok_or_else(|| {
            KeelError::InvalidFilter(format!("filter must be an object, got {}", value))
        })?;

        let mut filter = Filter::new();
        for (field, ops) in object {
            let ops = ops.as_object().ok_or_else(|| {
                KeelError::InvalidFilter(format!(
                    "operators for field '{}' must be an object",
                    field
                ))
            })?;
            for (op, operand) in ops {
                let condition = Condition::parse(op, operand)?;
                filter.push(field, condition);
            }
        }
        filter.validate()?;
        Ok(filter)
    }

    pub fn to_json(&self) -> Value {
        let mut object = Map::new();
        for field in &self.fields {
            let mut ops = Map::new();
            for condition in &field.conditions {
                ops.insert(condition.key().to_string(), condition.operand_json());
            }
            object.insert(field.field.clone(), Value::Object(ops));
        }
        Value::Object(object)
    }

    pub fn fields(&self) -> &[FieldFilter] {
        &self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.iter().all(|f| f.conditions.is_empty())
    }

    /// Check field names and list operands.
    ///
    /// Field names end up inside a JSON path literal, so a `"` is rejected.
    pub fn validate(&self) -> Result<()> {
        for field in &self.fields {
            validate_field_name(&field.field)?;
            for condition in &field.conditions {
                condition.validate()?;
            }
        }
        Ok(())
    }

    /// Add a condition on `field`, keeping the first-seen field order.
    pub fn push(&mut self, field: &str, condition: Condition) {
        match self.fields.iter_mut().find(|f| f.field == field) {
            Some(existing) => existing.conditions.push(condition),
            None => self.fields.push(FieldFilter {
                field: field.to_string(),
                conditions: vec![condition],
            }),
        }
    }

    pub fn with(mut self, field: &str, condition: Condition) -> Self {
        self.push(field, condition);
        self
    }

    pub fn eq(self, field: &str, value: impl Into<Scalar>) -> Self {
        self.with(field, Condition::Compare(Comparison::Eq, value.into()))
    }

    pub fn neq(self, field: &str, value: impl Into<Scalar>) -> Self {
        self.with(field, Condition::Compare(Comparison::Neq, value.into()))
    }

    pub fn gt(self, field: &str, value: impl Into<Scalar>) -> Self {
        self.with(field, Condition::Compare(Comparison::Gt, value.into()))
    }

    pub fn gte(self, field: &str, value: impl Into<Scalar>) -> Self {
        self.with(field, Condition::Compare(Comparison::Gte, value.into()))
    }

    pub fn lt(self, field: &str, value: impl Into<Scalar>) -> Self {
        self.with(field, Condition::Compare(Comparison::Lt, value.into()))
    }

    pub fn lte(self, field: &str, value: impl Into<Scalar>) -> Self {
        self.with(field, Condition::Compare(Comparison::Lte, value.into()))
    }

    pub fn is_in<V: Into<Scalar>>(self, field: &str, values: impl IntoIterator<Item = V>) -> Self {
        let values = values.into_iter().map(Into::into).collect();
        self.with(field, Condition::In(values))
    }

    pub fn not_in<V: Into<Scalar>>(
        self,
        field: &str,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        let values = values.into_iter().map(Into::into).collect();
        self.with(field, Condition::NotIn(values))
    }
}

/// Reject payload keys that cannot be embedded in a JSON path literal.
pub fn validate_field_name(field: &str) -> Result<()> {
    if field.is_empty() {
        return Err(KeelError::InvalidFilter("field name is empty".into()));
    }
    if field.contains('"') {
        return Err(KeelError::InvalidFilter(format!(
            "field name '{}' contains a double quote",
            field
        )));
    }
    Ok(())
}

impl TryFrom<Value> for Filter {
    type Error = KeelError;

    fn try_from(value: Value) -> Result<Self> {
        Filter::from_json(&value)
    }
}

impl Serialize for Filter {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Filter {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Filter::from_json(&value).map_err(serde::de::Error::custom)
    }
}
