//! # Term Encoder
//!
//! Renders host values as engine term syntax.
//!
//! ## Rendering
//!
//! | Arg | Term |
//! |-----|------|
//! | `Nil` | `[]` |
//! | `Bool(true)` | `true` |
//! | `Int(-5)` | `-5` |
//! | `UInt(7)` | `7.000000` |
//! | `Float(3.5)` | `3.500000` |
//! | `Str("hi")` | `"hi"` |
//! | `Atom("foo")` / `Atom("Foo")` | `foo` / `'Foo'` |
//! | `Var("X")` | `X` |
//! | `Raw("f(a)")` | `f(a)` |
//! | `List([1, 2])` | `[1,2]` |
//! | `Record` | `functor(f1,...,fn)` |
//!
//! `u64` and `usize` values render as floats because they may not fit in a
//! signed 64-bit integer on the engine side. Narrower unsigned widths render
//! as plain integers.
//!
//! Encoding never touches the engine; the only failures are values with no
//! term rendering (non-finite floats, records without a functor).

use std::fmt;
use std::sync::Arc;

use crate::error::{DriverError, DriverResult};

/// Text in the engine's term syntax
pub type Term = String;

/// Anything that can be rendered as a term
pub trait ToTerm {
    fn to_term(&self) -> DriverResult<Term>;
}

/// A host value that maps onto a compound term `functor(f1,...,fn)`.
///
/// ```rust,ignore
/// #[derive(Debug)]
/// struct Edge { from: i64, to: i64 }
///
/// impl Record for Edge {
///     fn functor(&self) -> &str { "edge" }
///     fn fields(&self) -> Vec<Arg> { vec![self.from.into(), self.to.into()] }
/// }
/// ```
pub trait Record: fmt::Debug + Send + Sync {
    /// Functor (table) name of the compound term
    fn functor(&self) -> &str;

    /// Field values in argument order
    fn fields(&self) -> Vec<Arg>;
}

/// A goal argument.
#[derive(Debug, Clone)]
pub enum Arg {
    /// Absent value, rendered as the empty list
    Nil,
    Bool(bool),
    Int(i64),
    /// Rendered as a float
    UInt(u64),
    Float(f64),
    /// Double-quoted string with JSON-style escapes
    Str(String),
    /// Byte sequence, rendered like `Str` (invalid UTF-8 is replaced)
    Bytes(Vec<u8>),
    /// Bare atom when lexically possible, otherwise single-quoted
    Atom(String),
    /// Logic variable; an empty name is auto-generated in goal position
    Var(String),
    /// Pre-formatted term text, passed through unchanged
    Raw(String),
    List(Vec<Arg>),
    Record(Arc<dyn Record>),
}

impl Arg {
    pub fn atom(name: impl Into<String>) -> Self {
        Arg::Atom(name.into())
    }

    pub fn var(name: impl Into<String>) -> Self {
        Arg::Var(name.into())
    }

    /// A variable whose name is generated from its argument position
    pub fn anon() -> Self {
        Arg::Var(String::new())
    }

    pub fn raw(term: impl Into<String>) -> Self {
        Arg::Raw(term.into())
    }

    pub fn record(record: impl Record + 'static) -> Self {
        Arg::Record(Arc::new(record))
    }

    pub fn list<I, T>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Arg>,
    {
        Arg::List(items.into_iter().map(Into::into).collect())
    }

    /// Short name of the variant, used in encoding errors
    pub fn kind(&self) -> &'static str {
        match self {
            Arg::Nil => "nil",
            Arg::Bool(_) => "bool",
            Arg::Int(_) => "int",
            Arg::UInt(_) => "uint",
            Arg::Float(_) => "float",
            Arg::Str(_) => "string",
            Arg::Bytes(_) => "bytes",
            Arg::Atom(_) => "atom",
            Arg::Var(_) => "var",
            Arg::Raw(_) => "raw",
            Arg::List(_) => "list",
            Arg::Record(_) => "record",
        }
    }
}

impl ToTerm for Arg {
    fn to_term(&self) -> DriverResult<Term> {
        match self {
            Arg::Nil => Ok("[]".to_string()),
            Arg::Bool(b) => Ok(if *b { "true" } else { "false" }.to_string()),
            Arg::Int(i) => Ok(i.to_string()),
            Arg::UInt(u) => encode_float(self, *u as f64),
            Arg::Float(f) => encode_float(self, *f),
            Arg::Str(s) => Ok(quote_string(s)),
            Arg::Bytes(bytes) => Ok(quote_string(&String::from_utf8_lossy(bytes))),
            Arg::Atom(name) => Ok(encode_atom(name)),
            Arg::Var(name) => Ok(name.clone()),
            Arg::Raw(term) if term.is_empty() => Ok("\"\"".to_string()),
            Arg::Raw(term) => Ok(term.clone()),
            Arg::List(items) => Ok(format!("[{}]", encode_all(items)?)),
            Arg::Record(record) => encode_record(record.as_ref()),
        }
    }
}

/// Encode a single argument.
pub fn encode(arg: &Arg) -> DriverResult<Term> {
    arg.to_term()
}

/// Encode a record as `functor(f1,...,fn)`.
///
/// Fails with the first field that cannot be encoded.
pub fn encode_record(record: &dyn Record) -> DriverResult<Term> {
    let functor = record.functor();
    if functor.is_empty() {
        return Err(DriverError::Unsupported(
            "record without functor".to_string(),
        ));
    }
    Ok(format!("{functor}({})", encode_all(&record.fields())?))
}

/// Render an atom, quoting it unless it is a plain lowercase identifier.
pub fn encode_atom(name: &str) -> Term {
    let Some(first) = name.chars().next() else {
        return "[]".to_string();
    };

    let bare = (first.is_ascii_lowercase() || first == '_')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if bare {
        name.to_string()
    } else {
        format!("'{name}'")
    }
}

/// Double-quote a string using JSON escaping rules.
pub fn quote_string(s: &str) -> Term {
    serde_json::to_string(s).unwrap_or_else(|_| format!("\"{}\"", s.escape_default()))
}

/// Build the goal text `predicate(arg1,...,argn)`.
///
/// A zero-argument goal renders as `predicate()`. Variables with an empty
/// name are named `_Var<i>` after their argument position.
pub fn build_goal(predicate: &str, args: &[Arg]) -> DriverResult<Term> {
    if predicate.is_empty() {
        return Err(DriverError::InvalidPredicate);
    }

    let mut terms = Vec::with_capacity(args.len());
    for (i, arg) in args.iter().enumerate() {
        let term = match arg {
            Arg::Var(name) if name.is_empty() => format!("_Var{i}"),
            other => other.to_term()?,
        };
        terms.push(term);
    }
    Ok(format!("{predicate}({})", terms.join(",")))
}

fn encode_float(arg: &Arg, f: f64) -> DriverResult<Term> {
    if !f.is_finite() {
        return Err(DriverError::Unsupported(format!("{} (non-finite {f})", arg.kind())));
    }
    Ok(format!("{f:.6}"))
}

fn encode_all(items: &[Arg]) -> DriverResult<String> {
    let terms = items
        .iter()
        .map(ToTerm::to_term)
        .collect::<DriverResult<Vec<_>>>()?;
    Ok(terms.join(","))
}

// Conversions from host values

macro_rules! impl_from_signed {
    ($($t:ty),*) => {
        $(impl From<$t> for Arg {
            fn from(v: $t) -> Self {
                Arg::Int(i64::from(v))
            }
        })*
    };
}

impl_from_signed!(i8, i16, i32, i64, u8, u16, u32);

impl From<isize> for Arg {
    fn from(v: isize) -> Self {
        Arg::Int(v as i64)
    }
}

impl From<u64> for Arg {
    fn from(v: u64) -> Self {
        Arg::UInt(v)
    }
}

impl From<usize> for Arg {
    fn from(v: usize) -> Self {
        Arg::UInt(v as u64)
    }
}

impl From<bool> for Arg {
    fn from(v: bool) -> Self {
        Arg::Bool(v)
    }
}

impl From<f32> for Arg {
    fn from(v: f32) -> Self {
        Arg::Float(f64::from(v))
    }
}

impl From<f64> for Arg {
    fn from(v: f64) -> Self {
        Arg::Float(v)
    }
}

impl From<&str> for Arg {
    fn from(v: &str) -> Self {
        Arg::Str(v.to_string())
    }
}

impl From<String> for Arg {
    fn from(v: String) -> Self {
        Arg::Str(v)
    }
}

impl From<&[u8]> for Arg {
    fn from(v: &[u8]) -> Self {
        Arg::Bytes(v.to_vec())
    }
}

impl<T: Into<Arg>> From<Vec<T>> for Arg {
    fn from(v: Vec<T>) -> Self {
        Arg::list(v)
    }
}

impl<T: Into<Arg>, const N: usize> From<[T; N]> for Arg {
    fn from(v: [T; N]) -> Self {
        Arg::list(v)
    }
}

impl<T: Into<Arg>> From<Option<T>> for Arg {
    fn from(v: Option<T>) -> Self {
        v.map_or(Arg::Nil, Into::into)
    }
}

impl<T: Into<Arg>> From<Box<T>> for Arg {
    fn from(v: Box<T>) -> Self {
        (*v).into()
    }
}

/// Build a `Vec<Arg>` from heterogeneous values.
///
/// ```rust,ignore
/// let goal_args = args![1, "two", Arg::var("X")];
/// ```
#[macro_export]
macro_rules! args {
    () => {
        ::std::vec::Vec::<$crate::term::Arg>::new()
    };
    ($($value:expr),+ $(,)?) => {
        vec![$($crate::term::Arg::from($value)),+]
    };
}
