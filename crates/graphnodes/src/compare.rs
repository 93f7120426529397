use graphcore::Value;
use std::cmp::Ordering;

/// Comparison shared by filter and conditional nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Equals,
    NotEquals,
    GreaterThan,
    GreaterOrEqual,
    LessThan,
    LessOrEqual,
    Contains,
    Exists,
    Truthy,
}

impl Operator {
    pub const NAMES: &'static [&'static str] =
        &["==", "!=", ">", ">=", "<", "<=", "contains", "exists", "truthy"];

    pub fn parse(name: &str) -> Option<Self> {
        let op = match name {
            "==" | "eq" | "equals" => Operator::Equals,
            "!=" | "ne" | "notEquals" => Operator::NotEquals,
            ">" | "gt" => Operator::GreaterThan,
            ">=" | "gte" => Operator::GreaterOrEqual,
            "<" | "lt" => Operator::LessThan,
            "<=" | "lte" => Operator::LessOrEqual,
            "contains" => Operator::Contains,
            "exists" => Operator::Exists,
            "truthy" => Operator::Truthy,
            _ => return None,
        };
        Some(op)
    }

    /// `left` is `None` when the compared field is absent.
    pub fn apply(&self, left: Option<&Value>, right: &Value) -> bool {
        let Some(left) = left else {
            return matches!(self, Operator::NotEquals);
        };
        match self {
            Operator::Equals => left.loosely_equals(right),
            Operator::NotEquals => !left.loosely_equals(right),
            Operator::GreaterThan => order(left, right) == Some(Ordering::Greater),
            Operator::GreaterOrEqual => {
                matches!(order(left, right), Some(Ordering::Greater | Ordering::Equal))
            }
            Operator::LessThan => order(left, right) == Some(Ordering::Less),
            Operator::LessOrEqual => {
                matches!(order(left, right), Some(Ordering::Less | Ordering::Equal))
            }
            Operator::Contains => match (left, right) {
                (Value::String(haystack), Value::String(needle)) => haystack.contains(needle.as_str()),
                (Value::Array(items), needle) => items.iter().any(|item| item.loosely_equals(needle)),
                (Value::Object(map), Value::String(key)) => map.contains_key(key),
                _ => false,
            },
            Operator::Exists => !left.is_null(),
            Operator::Truthy => left.is_truthy(),
        }
    }
}

fn order(left: &Value, right: &Value) -> Option<Ordering> {
    match (numeric(left), numeric(right)) {
        (Some(a), Some(b)) => a.partial_cmp(&b),
        _ => match (left, right) {
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            _ => None,
        },
    }
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => Some(*n),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Field lookup with dotted paths (`"user.name"`).
pub fn field<'a>(record: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(record, |current, segment| current.get(segment))
}
