//! # Decoded Values
//!
//! Typed values recovered from the engine's `Name = Value` result text.
//!
//! The engine prints bindings as terms; only the shapes that map cleanly onto
//! host scalars are typed. Everything else (compound terms, lists, unquoted
//! atoms) is kept verbatim as [`Value::Raw`].
//!
//! ## Usage
//!
//! ```rust,ignore
//! use trealla_driver::value::{Solution, Value};
//!
//! let mut solution = Solution::new();
//! solution.insert("X".to_string(), Value::Int(1));
//! assert_eq!(solution["X"].as_i64(), Some(1));
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// One set of variable bindings, variable name to decoded value
pub type Solution = HashMap<String, Value>;

/// A decoded binding value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Value {
    /// Double-quoted string (escapes resolved) or single-quoted atom text
    Str(String),
    Int(i64),
    /// Integer literal too large for `i64`
    UInt(u64),
    Float(f64),
    Bool(bool),
    /// Any other term text, unparsed
    Raw(String),
}

impl Value {
    /// Create a string value from a &str
    pub fn string(s: &str) -> Self {
        Value::Str(s.to_string())
    }

    /// Try to get as i64
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::UInt(v) => (*v).try_into().ok(),
            _ => None,
        }
    }

    /// Try to get as u64
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::UInt(v) => Some(*v),
            Value::Int(v) => (*v).try_into().ok(),
            _ => None,
        }
    }

    /// Try to get as f64
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            Value::Int(v) => Some(*v as f64),
            Value::UInt(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Try to get as string reference
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get as bool
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Unparsed term text, if decoding fell back to it
    pub fn as_raw(&self) -> Option<&str> {
        match self {
            Value::Raw(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "{s:?}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::UInt(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Raw(s) => write!(f, "{s}"),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

/// Render a solution with its variables in name order.
pub fn format_solution(solution: &Solution) -> String {
    let mut names: Vec<&String> = solution.keys().collect();
    names.sort();

    let mut out = String::from("{");
    for (i, name) in names.into_iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        out.push_str(name);
        out.push_str(": ");
        out.push_str(&solution[name].to_string());
    }
    out.push('}');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_accessors() {
        assert_eq!(Value::Int(42).as_i64(), Some(42));
        assert_eq!(Value::UInt(u64::MAX).as_i64(), None);
        assert_eq!(Value::UInt(7).as_i64(), Some(7));
        assert_eq!(Value::Int(-1).as_u64(), None);
        assert_eq!(Value::string("hello").as_str(), Some("hello"));
        assert_eq!(Value::Raw("f(a)".into()).as_raw(), Some("f(a)"));
        assert_eq!(Value::Bool(true).as_bool(), Some(true));
        assert!((Value::Float(2.5).as_f64().unwrap() - 2.5).abs() < f64::EPSILON);
        assert_eq!(Value::Int(3).as_f64(), Some(3.0));
    }

    #[test]
    fn test_value_equality() {
        assert_eq!(Value::Int(42), Value::Int(42));
        assert_ne!(Value::Int(42), Value::UInt(42));
        assert_ne!(Value::string("a"), Value::Raw("a".into()));
    }

    #[test]
    fn test_value_display() {
        assert_eq!(Value::string("a\"b").to_string(), r#""a\"b""#);
        assert_eq!(Value::Int(-3).to_string(), "-3");
        assert_eq!(Value::Raw("[1,2]".into()).to_string(), "[1,2]");
    }

    #[test]
    fn test_format_solution_is_sorted() {
        let mut solution = Solution::new();
        solution.insert("Y".into(), Value::string("a"));
        solution.insert("X".into(), Value::Int(1));
        assert_eq!(format_solution(&solution), r#"{X: 1, Y: "a"}"#);
        assert_eq!(format_solution(&Solution::new()), "{}");
    }

    #[test]
    fn test_value_json() {
        let json = serde_json::to_string(&Value::Int(5)).unwrap();
        assert_eq!(json, r#"{"type":"int","value":5}"#);
        let back: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Value::Int(5));
    }
}
