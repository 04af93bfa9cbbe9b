//! Response Decoder
//!
//! Turns a result chunk such as `   X = 1, Y = "a".\r\n` into a [`Solution`].
//!
//! Pairs are separated by `", "` and split on `" = "`. A value that itself
//! contains `", "` (a list or compound term printed with spaces) is split
//! apart; the fragments that no longer look like `Name = Value` are dropped.

use crate::value::{Solution, Value};

/// Decode the bindings of one result chunk.
///
/// Anything after the last newline (typically the `;` cue or a prompt that
/// arrived in the same read) is ignored.
pub fn decode_bindings(text: &str) -> Solution {
    let text = match text.rfind('\n') {
        Some(pos) => &text[..pos],
        None => text,
    };
    let text = text.trim();
    let text = text.strip_suffix('.').unwrap_or(text);

    let mut solution = Solution::new();
    for pair in text.split(", ") {
        let parts: Vec<&str> = pair.split(" = ").collect();
        if let [name, value] = parts.as_slice() {
            solution.insert((*name).to_string(), parse_value(value));
        }
    }
    solution
}

/// Decode a single printed value.
pub fn parse_value(text: &str) -> Value {
    let Some(first) = text.chars().next() else {
        return Value::Str(String::new());
    };

    match first {
        '"' => serde_json::from_str::<String>(text)
            .map_or_else(|_| Value::Raw(text.to_string()), Value::Str),
        '\'' if text.len() > 1 && text.ends_with('\'') => {
            Value::Str(text[1..text.len() - 1].to_string())
        }
        '-' => parse_int(text)
            .or_else(|| parse_float(text))
            .unwrap_or_else(|| Value::Raw(text.to_string())),
        '0'..='9' => parse_int(text)
            .or_else(|| text.parse::<u64>().ok().map(Value::UInt))
            .or_else(|| parse_float(text))
            .unwrap_or_else(|| Value::Raw(text.to_string())),
        _ => match text {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => Value::Raw(text.to_string()),
        },
    }
}

fn parse_int(text: &str) -> Option<Value> {
    text.parse::<i64>().ok().map(Value::Int)
}

fn parse_float(text: &str) -> Option<Value> {
    text.parse::<f64>()
        .ok()
        .filter(|f| f.is_finite())
        .map(Value::Float)
}
