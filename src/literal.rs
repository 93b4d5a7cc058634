//! Literal-only evaluation of parameter text.
//!
//! The text is parsed as an expression and only literal nodes are converted:
//! objects, arrays, strings, substitution-free templates, numbers (optionally
//! negated), booleans, `null` and `undefined`. Anything else, identifiers and
//! calls included, is rejected. Nothing is ever executed.

use serde_json::{Map, Number, Value};
use swc_core::ecma::ast::*;

use crate::source::parse_value_expr;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LiteralError {
    #[error("value text does not parse: {0}")]
    Parse(String),
    #[error("non-literal {0} in value")]
    NotLiteral(&'static str),
}

pub fn evaluate_literal(text: &str) -> Result<Value, LiteralError> {
    let expr = parse_value_expr(text).map_err(|e| LiteralError::Parse(e.to_string()))?;
    to_value(&expr)
}

fn to_value(e: &Expr) -> Result<Value, LiteralError> {
    match e {
        Expr::Paren(p) => to_value(&p.expr),
        Expr::TsAs(a) => to_value(&a.expr),
        Expr::TsConstAssertion(c) => to_value(&c.expr),
        Expr::TsSatisfies(s) => to_value(&s.expr),
        Expr::Lit(Lit::Str(s)) => Ok(Value::String(s.value.to_string())),
        Expr::Lit(Lit::Bool(b)) => Ok(Value::Bool(b.value)),
        Expr::Lit(Lit::Null(_)) => Ok(Value::Null),
        Expr::Lit(Lit::Num(n)) => Ok(number(n.value)),
        Expr::Unary(u) if u.op == UnaryOp::Minus => match &*u.arg {
            Expr::Lit(Lit::Num(n)) => Ok(number(-n.value)),
            _ => Err(LiteralError::NotLiteral("unary expression")),
        },
        Expr::Ident(i) if i.sym.as_ref() == "undefined" => Ok(Value::Null),
        Expr::Tpl(t) if t.exprs.is_empty() => t
            .quasis
            .iter()
            .map(|q| {
                q.cooked
                    .as_ref()
                    .map(|c| c.to_string())
                    .ok_or(LiteralError::NotLiteral("template escape"))
            })
            .collect::<Result<String, _>>()
            .map(Value::String),
        Expr::Array(a) => a
            .elems
            .iter()
            .map(|el| match el {
                None => Ok(Value::Null),
                Some(ExprOrSpread { spread: Some(_), .. }) => Err(LiteralError::NotLiteral("spread")),
                Some(ExprOrSpread { expr, .. }) => to_value(expr),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Expr::Object(o) => {
            let mut map = Map::new();
            for prop in &o.props {
                let PropOrSpread::Prop(p) = prop else {
                    return Err(LiteralError::NotLiteral("spread"));
                };
                let Prop::KeyValue(kv) = &**p else {
                    return Err(LiteralError::NotLiteral("property form"));
                };
                let key = match &kv.key {
                    PropName::Ident(i) => i.sym.to_string(),
                    PropName::Str(s) => s.value.to_string(),
                    PropName::Num(n) => n.value.to_string(),
                    _ => return Err(LiteralError::NotLiteral("computed key")),
                };
                map.insert(key, to_value(&kv.value)?);
            }
            Ok(Value::Object(map))
        }
        Expr::Ident(_) => Err(LiteralError::NotLiteral("identifier")),
        Expr::Call(_) | Expr::New(_) => Err(LiteralError::NotLiteral("call")),
        Expr::Fn(_) | Expr::Arrow(_) => Err(LiteralError::NotLiteral("function")),
        _ => Err(LiteralError::NotLiteral("expression")),
    }
}

fn number(v: f64) -> Value {
    if v.fract() == 0.0 && v.abs() < i64::MAX as f64 {
        Value::Number((v as i64).into())
    } else {
        Number::from_f64(v).map(Value::Number).unwrap_or(Value::Null)
    }
}
