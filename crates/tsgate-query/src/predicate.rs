//! Row predicates for Flux `filter()` calls.
//!
//! A predicate renders two ways. In a query, every value becomes a named
//! parameter and the text depends only on the predicate's shape. In a task
//! script, which has no runtime parameters, values are written as escaped
//! literals.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tsgate_core::{Error, Result};
use tsgate_engine::flux;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    pub fn as_flux(&self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// `r.<tag> == <value>`; `tag` must be an identifier.
    TagEquals { tag: String, value: String },
    /// `r._value <op> <value>`.
    FieldCompare { op: CompareOp, value: f64 },
    And(Box<Predicate>, Box<Predicate>),
}

impl Predicate {
    pub fn tag_equals(tag: impl Into<String>, value: impl Into<String>) -> Self {
        Predicate::TagEquals {
            tag: tag.into(),
            value: value.into(),
        }
    }

    pub fn field_compare(op: CompareOp, value: f64) -> Self {
        Predicate::FieldCompare { op, value }
    }

    pub fn and(self, other: Predicate) -> Self {
        Predicate::And(Box::new(self), Box::new(other))
    }

    /// The predicate registered with downsampling tasks by default.
    pub fn zero_value() -> Self {
        Predicate::field_compare(CompareOp::Eq, 0.0)
    }

    /// Render for a query body, appending each value to `params` under a
    /// generated name (`<prefix><n>`).
    pub fn render_bound(&self, prefix: &str, params: &mut Vec<(String, Value)>) -> Result<String> {
        match self {
            Predicate::TagEquals { tag, value } => {
                check_tag(tag)?;
                let name = format!("{}{}", prefix, params.len());
                let text = format!("r.{} == params.{}", tag, name);
                params.push((name, Value::from(value.as_str())));
                Ok(text)
            }
            Predicate::FieldCompare { op, value } => {
                check_finite(*value)?;
                let name = format!("{}{}", prefix, params.len());
                let text = format!("r._value {} params.{}", op.as_flux(), name);
                params.push((name, Value::from(*value)));
                Ok(text)
            }
            Predicate::And(a, b) => {
                let a = a.render_bound(prefix, params)?;
                let b = b.render_bound(prefix, params)?;
                Ok(format!("({}) and ({})", a, b))
            }
        }
    }

    /// Render with values inlined as escaped Flux literals.
    pub fn render_literal(&self) -> Result<String> {
        match self {
            Predicate::TagEquals { tag, value } => {
                check_tag(tag)?;
                Ok(format!("r.{} == {}", tag, flux::string_literal(value)))
            }
            Predicate::FieldCompare { op, value } => {
                check_finite(*value)?;
                Ok(format!("r._value {} {}", op.as_flux(), flux::float_literal(*value)))
            }
            Predicate::And(a, b) => Ok(format!(
                "({}) and ({})",
                a.render_literal()?,
                b.render_literal()?
            )),
        }
    }
}

fn check_tag(tag: &str) -> Result<()> {
    if !flux::is_identifier(tag) {
        return Err(Error::validation(format!("tag key {:?} is not an identifier", tag)));
    }
    Ok(())
}

fn check_finite(value: f64) -> Result<()> {
    if !value.is_finite() {
        return Err(Error::validation("comparison value must be a finite number"));
    }
    Ok(())
}
