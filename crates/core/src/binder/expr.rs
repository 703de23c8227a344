//! Typed expression trees produced by the binder.
//!
//! COPY only needs a small expression vocabulary: literals for ALTER
//! defaults, variables standing for reader columns, and the cast wrapper the
//! implicit-coercion rules insert. Every node carries its resolved type.

use quiver_primitives::{PropertyId, TableId};

use crate::ast::ParsedExpr;
use crate::error::BinderError;
use crate::types::{LogicalType, Value};

#[derive(Clone, Debug, PartialEq)]
pub enum Expression {
    Literal {
        value: Value,
        dtype: LogicalType,
    },
    /// A column produced by a reader or sub-query, identified by name.
    Variable {
        name: String,
        dtype: LogicalType,
    },
    Property {
        table: TableId,
        property: PropertyId,
        name: String,
        dtype: LogicalType,
    },
    FunctionCall {
        name: String,
        args: Vec<Expression>,
        dtype: LogicalType,
    },
    Case {
        whens: Vec<(Expression, Expression)>,
        otherwise: Option<Box<Expression>>,
        dtype: LogicalType,
    },
}

impl Expression {
    pub fn dtype(&self) -> &LogicalType {
        match self {
            Expression::Literal { dtype, .. }
            | Expression::Variable { dtype, .. }
            | Expression::Property { dtype, .. }
            | Expression::FunctionCall { dtype, .. }
            | Expression::Case { dtype, .. } => dtype,
        }
    }

    pub fn variable(name: impl Into<String>, dtype: LogicalType) -> Expression {
        Expression::Variable {
            name: name.into(),
            dtype,
        }
    }

    /// Folds the expression to a constant when it is one. Cast wrappers over
    /// literals fold through.
    pub fn try_into_constant(&self) -> Option<Value> {
        match self {
            Expression::Literal { value, .. } => Some(value.clone()),
            Expression::FunctionCall { name, args, dtype } if name == "CAST" && args.len() == 1 => {
                args[0]
                    .try_into_constant()
                    .map(|value| value.widen_to(dtype))
            }
            _ => None,
        }
    }
}

/// Types a parsed literal.
pub fn bind_parsed_expr(parsed: &ParsedExpr) -> Expression {
    match parsed {
        ParsedExpr::Null => Expression::Literal {
            value: Value::Null,
            // A bare NULL has no inherent type; the cast to the declared
            // column type supplies one.
            dtype: LogicalType::String,
        },
        ParsedExpr::Boolean(v) => Expression::Literal {
            value: Value::Bool(*v),
            dtype: LogicalType::Bool,
        },
        ParsedExpr::Integer(v) => Expression::Literal {
            value: Value::Int64(*v),
            dtype: LogicalType::Int64,
        },
        ParsedExpr::FloatingPoint(v) => Expression::Literal {
            value: Value::Double(*v),
            dtype: LogicalType::Double,
        },
        ParsedExpr::StringLiteral(v) => Expression::Literal {
            value: Value::String(v.clone()),
            dtype: LogicalType::String,
        },
    }
}

/// Coerces `expr` to `target`, inserting a cast where the implicit rules
/// allow one and rejecting everything else.
pub fn implicit_cast_if_necessary(
    expr: Expression,
    target: &LogicalType,
) -> Result<Expression, BinderError> {
    if expr.dtype() == target {
        return Ok(expr);
    }
    // NULL literals take any declared type.
    if let Expression::Literal { value: Value::Null, .. } = &expr {
        return Ok(Expression::Literal {
            value: Value::Null,
            dtype: target.clone(),
        });
    }
    // Literal numerics re-type in place when the text would have parsed as
    // the target; everything else gets a cast wrapper or is refused.
    if let Expression::Literal { value, dtype } = &expr {
        if let Some(retyped) = retype_literal(value, target) {
            return Ok(Expression::Literal {
                value: retyped,
                dtype: target.clone(),
            });
        }
        if !dtype.can_widen_to(target) {
            return Err(BinderError::CannotImplicitCast {
                actual: dtype.to_string(),
                expected: target.to_string(),
            });
        }
    } else if !expr.dtype().can_widen_to(target) {
        return Err(BinderError::CannotImplicitCast {
            actual: expr.dtype().to_string(),
            expected: target.to_string(),
        });
    }
    Ok(Expression::FunctionCall {
        name: "CAST".to_string(),
        args: vec![expr],
        dtype: target.clone(),
    })
}

fn retype_literal(value: &Value, target: &LogicalType) -> Option<Value> {
    match (value, target) {
        (Value::Int64(v), LogicalType::Int32) => i32::try_from(*v).ok().map(Value::Int32),
        (Value::Int64(v), LogicalType::Int16) => i16::try_from(*v).ok().map(Value::Int16),
        (Value::Int64(v), LogicalType::Double) => Some(Value::Double(*v as f64)),
        (Value::Int64(v), LogicalType::Float) => Some(Value::Float(*v as f32)),
        (Value::Double(v), LogicalType::Float) => Some(Value::Float(*v as f32)),
        (Value::String(v), LogicalType::Date) => Value::parse(v, &LogicalType::Date),
        (Value::String(v), LogicalType::Timestamp) => Value::parse(v, &LogicalType::Timestamp),
        (Value::String(v), LogicalType::Blob) => Some(Value::Blob(v.as_bytes().to_vec())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn literal_binding_types_values() {
        let expr = bind_parsed_expr(&ParsedExpr::Integer(42));
        assert_eq!(expr.dtype(), &LogicalType::Int64);
        assert_eq!(expr.try_into_constant(), Some(Value::Int64(42)));
    }

    #[test]
    fn implicit_cast_retypes_in_range_literals() {
        let expr = bind_parsed_expr(&ParsedExpr::Integer(7));
        let cast = implicit_cast_if_necessary(expr, &LogicalType::Int32).unwrap();
        assert_eq!(cast.dtype(), &LogicalType::Int32);
        assert_eq!(cast.try_into_constant(), Some(Value::Int32(7)));
    }

    #[test]
    fn implicit_cast_rejects_narrowing_out_of_range() {
        let expr = bind_parsed_expr(&ParsedExpr::Integer(1 << 40));
        let err = implicit_cast_if_necessary(expr, &LogicalType::Int16).unwrap_err();
        assert!(matches!(err, BinderError::CannotImplicitCast { .. }));
    }

    #[test]
    fn null_takes_any_declared_type() {
        let expr = bind_parsed_expr(&ParsedExpr::Null);
        let cast = implicit_cast_if_necessary(expr, &LogicalType::Date).unwrap();
        assert_eq!(cast.dtype(), &LogicalType::Date);
        assert_eq!(cast.try_into_constant(), Some(Value::Null));
    }

    #[test]
    fn string_literals_cast_to_dates() {
        let expr = bind_parsed_expr(&ParsedExpr::StringLiteral("1970-01-02".into()));
        let cast = implicit_cast_if_necessary(expr, &LogicalType::Date).unwrap();
        assert_eq!(cast.try_into_constant(), Some(Value::Date(1)));
    }

    #[test]
    fn string_to_int_is_refused() {
        let expr = bind_parsed_expr(&ParsedExpr::StringLiteral("12".into()));
        assert!(implicit_cast_if_necessary(expr, &LogicalType::Int64).is_err());
    }
}
