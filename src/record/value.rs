use std::fmt;

use serde::Deserialize;
use serde::Serialize;

/// Scalar shape of a record's value and default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Int,
    Float,
    String,
    Counter,
}

impl DataType {
    pub fn label(self) -> &'static str {
        match self {
            DataType::Int => "INT",
            DataType::Float => "FLOAT",
            DataType::String => "STRING",
            DataType::Counter => "COUNTER",
        }
    }

    pub(crate) fn to_wire(self) -> u8 {
        match self {
            DataType::Int => 1,
            DataType::Float => 2,
            DataType::String => 3,
            DataType::Counter => 4,
        }
    }

    pub(crate) fn from_wire(v: u8) -> Option<Self> {
        match v {
            1 => Some(DataType::Int),
            2 => Some(DataType::Float),
            3 => Some(DataType::String),
            4 => Some(DataType::Counter),
            _ => None,
        }
    }
}

/// Type-erased record value. A `String` value may be null.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordValue {
    Int(i64),
    Float(f64),
    String(Option<String>),
    Counter(i64),
}

impl RecordValue {
    pub fn data_type(&self) -> DataType {
        match self {
            RecordValue::Int(_) => DataType::Int,
            RecordValue::Float(_) => DataType::Float,
            RecordValue::String(_) => DataType::String,
            RecordValue::Counter(_) => DataType::Counter,
        }
    }

    /// Zero value of the given type; strings are null.
    pub fn zero(data_type: DataType) -> Self {
        match data_type {
            DataType::Int => RecordValue::Int(0),
            DataType::Float => RecordValue::Float(0.0),
            DataType::String => RecordValue::String(None),
            DataType::Counter => RecordValue::Counter(0),
        }
    }

    pub fn string(s: impl Into<String>) -> Self {
        RecordValue::String(Some(s.into()))
    }

    /// Parses the textual form used by config sources.
    ///
    /// Integers accept an optional `K`/`M`/`G`/`T` binary suffix. The literal
    /// `NULL` is the null string.
    pub fn parse(
        data_type: DataType,
        text: &str,
    ) -> Option<Self> {
        match data_type {
            DataType::Int => parse_i64(text).map(RecordValue::Int),
            DataType::Counter => parse_i64(text).map(RecordValue::Counter),
            DataType::Float => text.trim().parse::<f64>().ok().map(RecordValue::Float),
            DataType::String => {
                if text == "NULL" {
                    Some(RecordValue::String(None))
                } else {
                    Some(RecordValue::String(Some(text.to_string())))
                }
            }
        }
    }

    /// Stores an integer reading into a value of `data_type`.
    pub fn from_i64(
        data_type: DataType,
        v: i64,
    ) -> Self {
        match data_type {
            DataType::Int => RecordValue::Int(v),
            DataType::Counter => RecordValue::Counter(v),
            DataType::Float => RecordValue::Float(v as f64),
            DataType::String => RecordValue::String(Some(v.to_string())),
        }
    }

    /// Stores a floating point reading into a value of `data_type`.
    pub fn from_f64(
        data_type: DataType,
        v: f64,
    ) -> Self {
        match data_type {
            DataType::Int => RecordValue::Int(v as i64),
            DataType::Counter => RecordValue::Counter(v as i64),
            DataType::Float => RecordValue::Float(v),
            DataType::String => RecordValue::String(Some(v.to_string())),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            RecordValue::Int(v) | RecordValue::Counter(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            RecordValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            RecordValue::String(v) => v.as_deref(),
            _ => None,
        }
    }
}

impl fmt::Display for RecordValue {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            RecordValue::Int(v) | RecordValue::Counter(v) => write!(f, "{v}"),
            RecordValue::Float(v) => write!(f, "{v:.6}"),
            RecordValue::String(Some(s)) => f.write_str(s),
            RecordValue::String(None) => f.write_str("NULL"),
        }
    }
}

fn parse_i64(text: &str) -> Option<i64> {
    let text = text.trim();
    let (digits, multiplier) = match text.char_indices().last() {
        Some((idx, c)) => match c.to_ascii_uppercase() {
            'K' => (&text[..idx], 1i64 << 10),
            'M' => (&text[..idx], 1i64 << 20),
            'G' => (&text[..idx], 1i64 << 30),
            'T' => (&text[..idx], 1i64 << 40),
            _ => (text, 1),
        },
        None => return None,
    };
    digits.trim().parse::<i64>().ok()?.checked_mul(multiplier)
}
