use bytes::{Buf, BufMut, BytesMut};
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

/// Wire type of a single message argument.
///
/// Integers and floats are little-endian. Strings are UTF-8 terminated by a
/// NUL byte. Enums travel as `i32` and are presented by name when the value
/// is one of the declared variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgType {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    U64,
    I64,
    Float,
    Double,
    String,
    Enum,
}

impl ArgType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::U8 => "u8",
            Self::I8 => "i8",
            Self::U16 => "u16",
            Self::I16 => "i16",
            Self::U32 => "u32",
            Self::I32 => "i32",
            Self::U64 => "u64",
            Self::I64 => "i64",
            Self::Float => "float",
            Self::Double => "double",
            Self::String => "string",
            Self::Enum => "enum",
        }
    }
}

/// One declared argument of a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: ArgType,
    /// Enum variant names, indexed by wire value.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
}

impl ArgSpec {
    pub fn new(name: impl Into<String>, ty: ArgType) -> Self {
        Self {
            name: name.into(),
            ty,
            values: Vec::new(),
        }
    }

    pub fn with_values(mut self, values: &[&str]) -> Self {
        self.values = values.iter().map(|v| v.to_string()).collect();
        self
    }
}

/// Why a single value could not be coded. Mapped to a `CatalogError` by the
/// descriptor, which knows the message path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ArgFault {
    Invalid(String),
    Truncated,
}

pub(crate) fn encode_arg(spec: &ArgSpec, value: &Value, dst: &mut BytesMut) -> Result<(), ArgFault> {
    match spec.ty {
        ArgType::U8 => dst.put_u8(unsigned(value, u8::MAX as u64)? as u8),
        ArgType::U16 => dst.put_u16_le(unsigned(value, u16::MAX as u64)? as u16),
        ArgType::U32 => dst.put_u32_le(unsigned(value, u32::MAX as u64)? as u32),
        ArgType::U64 => dst.put_u64_le(unsigned(value, u64::MAX)?),
        ArgType::I8 => dst.put_i8(signed(value, i8::MIN as i64, i8::MAX as i64)? as i8),
        ArgType::I16 => dst.put_i16_le(signed(value, i16::MIN as i64, i16::MAX as i64)? as i16),
        ArgType::I32 => dst.put_i32_le(signed(value, i32::MIN as i64, i32::MAX as i64)? as i32),
        ArgType::I64 => dst.put_i64_le(signed(value, i64::MIN, i64::MAX)?),
        ArgType::Float => dst.put_f32_le(float(value)? as f32),
        ArgType::Double => dst.put_f64_le(float(value)?),
        ArgType::String => {
            let s = value
                .as_str()
                .ok_or_else(|| ArgFault::Invalid("expected a string".into()))?;
            if s.as_bytes().contains(&0) {
                return Err(ArgFault::Invalid("string contains a NUL byte".into()));
            }
            dst.put_slice(s.as_bytes());
            dst.put_u8(0);
        }
        ArgType::Enum => {
            let raw = match value {
                Value::String(name) => spec
                    .values
                    .iter()
                    .position(|v| v == name)
                    .ok_or_else(|| ArgFault::Invalid(format!("unknown enum value '{name}'")))?
                    as i64,
                other => signed(other, i32::MIN as i64, i32::MAX as i64)?,
            };
            dst.put_i32_le(raw as i32);
        }
    }
    Ok(())
}

pub(crate) fn decode_arg(spec: &ArgSpec, src: &mut &[u8]) -> Result<Value, ArgFault> {
    let need = match spec.ty {
        ArgType::U8 | ArgType::I8 => 1,
        ArgType::U16 | ArgType::I16 => 2,
        ArgType::U32 | ArgType::I32 | ArgType::Float | ArgType::Enum => 4,
        ArgType::U64 | ArgType::I64 | ArgType::Double => 8,
        ArgType::String => 0,
    };
    if src.remaining() < need {
        return Err(ArgFault::Truncated);
    }

    let value = match spec.ty {
        ArgType::U8 => Value::from(src.get_u8()),
        ArgType::I8 => Value::from(src.get_i8()),
        ArgType::U16 => Value::from(src.get_u16_le()),
        ArgType::I16 => Value::from(src.get_i16_le()),
        ArgType::U32 => Value::from(src.get_u32_le()),
        ArgType::I32 => Value::from(src.get_i32_le()),
        ArgType::U64 => Value::from(src.get_u64_le()),
        ArgType::I64 => Value::from(src.get_i64_le()),
        ArgType::Float => number(src.get_f32_le() as f64),
        ArgType::Double => number(src.get_f64_le()),
        ArgType::String => {
            let end = src
                .iter()
                .position(|b| *b == 0)
                .ok_or(ArgFault::Truncated)?;
            let s = String::from_utf8_lossy(&src[..end]).into_owned();
            src.advance(end + 1);
            Value::String(s)
        }
        ArgType::Enum => {
            let raw = src.get_i32_le();
            usize::try_from(raw)
                .ok()
                .and_then(|idx| spec.values.get(idx))
                .map(|name| Value::String(name.clone()))
                .unwrap_or_else(|| Value::from(raw))
        }
    };
    Ok(value)
}

fn unsigned(value: &Value, max: u64) -> Result<u64, ArgFault> {
    let n = match value {
        Value::Bool(b) => u64::from(*b),
        Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| ArgFault::Invalid(format!("expected an unsigned integer, got {n}")))?,
        other => {
            return Err(ArgFault::Invalid(format!(
                "expected an unsigned integer, got {other}"
            )))
        }
    };
    if n > max {
        return Err(ArgFault::Invalid(format!("{n} exceeds {max}")));
    }
    Ok(n)
}

fn signed(value: &Value, min: i64, max: i64) -> Result<i64, ArgFault> {
    let n = match value {
        Value::Bool(b) => i64::from(*b),
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| ArgFault::Invalid(format!("expected an integer, got {n}")))?,
        other => return Err(ArgFault::Invalid(format!("expected an integer, got {other}"))),
    };
    if n < min || n > max {
        return Err(ArgFault::Invalid(format!("{n} outside {min}..={max}")));
    }
    Ok(n)
}

fn float(value: &Value) -> Result<f64, ArgFault> {
    value
        .as_f64()
        .ok_or_else(|| ArgFault::Invalid(format!("expected a number, got {value}")))
}

// NaN and infinities have no JSON representation.
fn number(v: f64) -> Value {
    Number::from_f64(v).map(Value::Number).unwrap_or(Value::Null)
}
