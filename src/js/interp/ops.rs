//! js::interp::ops
//!
//! Operators and the coercions that may call back into script code.

use smol_str::SmolStr;

use super::Interpreter;
use crate::js::ast::BinaryOp;
use crate::js::error::JsResult;
use crate::js::value::{number_to_string, ObjectKind, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Hint {
    /// `+` and `==`: strings for dates, numbers otherwise
    Default,
    Number,
    String,
}

impl Interpreter {
    /// ToPrimitive: `valueOf` then `toString` (reversed for string hints).
    pub(crate) async fn to_primitive(&self, value: &Value, hint: Hint) -> JsResult<Value> {
        let Value::Object(obj) = value else {
            return Ok(value.clone());
        };
        let hint = match hint {
            Hint::Default if matches!(obj.borrow().kind, ObjectKind::Date(_)) => Hint::String,
            Hint::Default => Hint::Number,
            other => other,
        };
        let order = match hint {
            Hint::String => ["toString", "valueOf"],
            _ => ["valueOf", "toString"],
        };
        for name in order {
            let method = self.get(value, name).await?;
            if method.is_callable() {
                let result = self.call(&method, value.clone(), Vec::new()).await?;
                if !matches!(result, Value::Object(_)) {
                    return Ok(result);
                }
            }
        }
        Err(self.type_error("Cannot convert object to primitive value"))
    }

    /// String conversion, calling user `toString` methods.
    pub async fn to_string(&self, value: &Value) -> JsResult<String> {
        match value {
            Value::Object(_) => Ok(self
                .to_primitive(value, Hint::String)
                .await?
                .to_display_string()),
            other => Ok(other.to_display_string()),
        }
    }

    pub async fn to_number(&self, value: &Value) -> JsResult<f64> {
        match value {
            Value::Object(_) => Ok(self.to_primitive(value, Hint::Number).await?.to_number()),
            other => Ok(other.to_number()),
        }
    }

    pub(crate) async fn to_property_key(&self, value: &Value) -> JsResult<SmolStr> {
        match value {
            Value::String(s) => Ok(s.clone()),
            Value::Object(_) => Ok(SmolStr::new(self.to_string(value).await?)),
            other => Ok(other.to_property_key()),
        }
    }

    pub(crate) async fn binary(&self, op: BinaryOp, left: &Value, right: &Value) -> JsResult<Value> {
        let result = match op {
            BinaryOp::Add => {
                let left = self.to_primitive(left, Hint::Default).await?;
                let right = self.to_primitive(right, Hint::Default).await?;
                if matches!(left, Value::String(_)) || matches!(right, Value::String(_)) {
                    let mut out = left.to_display_string();
                    out.push_str(&right.to_display_string());
                    Value::from(out)
                } else {
                    Value::Number(left.to_number() + right.to_number())
                }
            }
            BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem | BinaryOp::Exp => {
                let a = self.to_number(left).await?;
                let b = self.to_number(right).await?;
                Value::Number(match op {
                    BinaryOp::Sub => a - b,
                    BinaryOp::Mul => a * b,
                    BinaryOp::Div => a / b,
                    BinaryOp::Rem => a % b,
                    _ => a.powf(b),
                })
            }
            BinaryOp::Eq => Value::Bool(left.loose_equals(right)),
            BinaryOp::NotEq => Value::Bool(!left.loose_equals(right)),
            BinaryOp::StrictEq => Value::Bool(left.strict_equals(right)),
            BinaryOp::StrictNotEq => Value::Bool(!left.strict_equals(right)),
            BinaryOp::Lt => Value::Bool(self.less_than(left, right).await? == Some(true)),
            BinaryOp::Gt => Value::Bool(self.less_than(right, left).await? == Some(true)),
            BinaryOp::LtEq => Value::Bool(self.less_than(right, left).await? == Some(false)),
            BinaryOp::GtEq => Value::Bool(self.less_than(left, right).await? == Some(false)),
            BinaryOp::Shl | BinaryOp::Shr | BinaryOp::UShr => {
                let a = Value::Number(self.to_number(left).await?);
                let shift = Value::Number(self.to_number(right).await?).to_uint32() & 31;
                Value::Number(match op {
                    BinaryOp::Shl => f64::from(a.to_int32().wrapping_shl(shift)),
                    BinaryOp::Shr => f64::from(a.to_int32() >> shift),
                    _ => f64::from(a.to_uint32() >> shift),
                })
            }
            BinaryOp::BitAnd | BinaryOp::BitOr | BinaryOp::BitXor => {
                let a = Value::Number(self.to_number(left).await?).to_int32();
                let b = Value::Number(self.to_number(right).await?).to_int32();
                Value::Number(f64::from(match op {
                    BinaryOp::BitAnd => a & b,
                    BinaryOp::BitOr => a | b,
                    _ => a ^ b,
                }))
            }
            BinaryOp::In => {
                let Value::Object(obj) = right else {
                    return Err(self.type_error(format!(
                        "Cannot use 'in' operator to search for '{}' in {}",
                        left.to_display_string(),
                        right.to_display_string()
                    )));
                };
                let key = self.to_property_key(left).await?;
                Value::Bool(obj.has_property(&key))
            }
            BinaryOp::Instanceof => Value::Bool(self.instance_of(left, right).await?),
        };
        Ok(result)
    }

    /// Abstract relational comparison; `None` when either side is NaN.
    async fn less_than(&self, left: &Value, right: &Value) -> JsResult<Option<bool>> {
        let left = self.to_primitive(left, Hint::Number).await?;
        let right = self.to_primitive(right, Hint::Number).await?;
        if let (Value::String(a), Value::String(b)) = (&left, &right) {
            return Ok(Some(a.encode_utf16().lt(b.encode_utf16())));
        }
        let (a, b) = (left.to_number(), right.to_number());
        if a.is_nan() || b.is_nan() {
            return Ok(None);
        }
        Ok(Some(a < b))
    }

    /// `String(value)` for numbers in a given radix.
    pub(crate) fn number_to_radix(n: f64, radix: u32) -> String {
        if radix == 10 || !n.is_finite() || n.fract() != 0.0 {
            return number_to_string(n);
        }
        let negative = n < 0.0;
        let mut int = n.abs() as u64;
        if int == 0 {
            return "0".to_string();
        }
        let mut digits = Vec::new();
        while int > 0 {
            let digit = (int % u64::from(radix)) as u32;
            digits.push(char::from_digit(digit, radix).unwrap_or('0'));
            int /= u64::from(radix);
        }
        if negative {
            digits.push('-');
        }
        digits.iter().rev().collect()
    }
}
