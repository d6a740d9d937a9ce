//! Typed values and the coercion of argument tokens into them.
//!
//! Coercion is a pure function of the token text: it never looks at an
//! [`Environment`](crate::env::Environment), which is why unresolved names are
//! kept as [`Value::Variable`] and resolved later by the command handlers.

use std::fmt;
use thiserror::Error;

/// Errors that can occur while turning a token into a [`Value`].
#[derive(Debug, Error)]
pub enum CoercionError {
    /// The token looked like a JSON object or array but failed to parse.
    #[error("malformed composite literal `{token}`: {source}")]
    MalformedComposite {
        token: String,
        #[source]
        source: serde_json::Error,
    },
}

/// An unsigned integer written in hexadecimal.
///
/// Displays as its decimal magnitude; use [`HexValue::as_hex`] for the
/// `0x`-prefixed form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HexValue(pub u64);

impl HexValue {
    pub fn value(self) -> u64 {
        self.0
    }

    /// `0x`-prefixed lowercase rendering, e.g. `0xff`.
    pub fn as_hex(self) -> String {
        format!("{:#x}", self.0)
    }
}

impl fmt::Display for HexValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A parenthesized group kept verbatim, outer parentheses included.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Block {
    source: String,
}

impl Block {
    /// Wrap `source`, which must start with `(` and end with `)`.
    pub(crate) fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }

    /// The full original text, e.g. `(echo 1)`.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The text between the outer parentheses, e.g. `echo 1`.
    pub fn converted(&self) -> &str {
        // Both delimiters are single-byte, so slicing stays on char boundaries.
        &self.source[1..self.source.len() - 1]
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// A typed argument or stored value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Absence of a value: an empty heap slot or a failed allocation.
    Null,
    String(String),
    Integer(i64),
    Float(f64),
    /// A parsed JSON object or array.
    Composite(serde_json::Value),
    Hex(HexValue),
    Block(Block),
    /// An unresolved name, to be looked up in the environment.
    Variable(String),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::String(_) => "string",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::Composite(_) => "composite",
            Value::Hex(_) => "hex",
            Value::Block(_) => "block",
            Value::Variable(_) => "variable",
        }
    }

    /// Render the value in the source form that coerces back into it.
    ///
    /// Unlike [`Display`](fmt::Display), strings keep their quotes, hex values
    /// their `0x` prefix and blocks their parentheses.
    pub fn literal(&self) -> String {
        match self {
            Value::String(s) => format!("\"{s}\""),
            Value::Hex(h) => h.as_hex(),
            other => other.to_string(),
        }
    }

    /// Text usable as a variable name.
    ///
    /// Bare names made of hex digits (`a`, `cafe`) coerce to [`Value::Hex`],
    /// so those come back as their lowercase hex digits.
    pub fn as_identifier(&self) -> Option<String> {
        match self {
            Value::Variable(name) | Value::String(name) => Some(name.clone()),
            Value::Hex(h) => Some(format!("{:x}", h.0)),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::String(s) => f.write_str(s),
            Value::Integer(i) => write!(f, "{i}"),
            // Debug keeps the fractional part (`1.0`), so the text reads back as a float.
            Value::Float(x) => write!(f, "{x:?}"),
            Value::Composite(json) => write!(f, "{json}"),
            Value::Hex(h) => write!(f, "{h}"),
            Value::Block(b) => write!(f, "{b}"),
            Value::Variable(name) => f.write_str(name),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<HexValue> for Value {
    fn from(h: HexValue) -> Self {
        Value::Hex(h)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        Value::Composite(json)
    }
}

/// Conversion of raw or already typed input into a [`Value`].
///
/// Text goes through [`to_typed`]; a [`Value`] is returned unchanged.
pub trait IntoTyped {
    fn into_typed(self) -> Result<Value, CoercionError>;
}

impl IntoTyped for Value {
    fn into_typed(self) -> Result<Value, CoercionError> {
        Ok(self)
    }
}

impl IntoTyped for &str {
    fn into_typed(self) -> Result<Value, CoercionError> {
        to_typed(self)
    }
}

impl IntoTyped for String {
    fn into_typed(self) -> Result<Value, CoercionError> {
        to_typed(&self)
    }
}

fn is_wrapped(token: &str, open: char, close: char) -> bool {
    token.len() >= 2 && token.starts_with(open) && token.ends_with(close)
}

/// Coerce a token into a typed value.
///
/// The first matching shape wins: quoted string, decimal integer, float,
/// JSON object or array, `0x` hex, bare hex, block, and finally a variable
/// reference. Only a malformed JSON literal is an error.
pub fn to_typed(token: &str) -> Result<Value, CoercionError> {
    if is_wrapped(token, '"', '"') {
        return Ok(Value::String(token[1..token.len() - 1].to_string()));
    }
    if !token.is_empty() && token.bytes().all(|b| b.is_ascii_digit()) {
        // Too large for i64: left to the float rule below.
        if let Ok(i) = token.parse::<i64>() {
            return Ok(Value::Integer(i));
        }
    }
    if let Ok(x) = token.parse::<f64>() {
        return Ok(Value::Float(x));
    }
    if is_wrapped(token, '{', '}') || is_wrapped(token, '[', ']') {
        return serde_json::from_str(token)
            .map(Value::Composite)
            .map_err(|source| CoercionError::MalformedComposite {
                token: token.to_string(),
                source,
            });
    }
    if let Some(digits) = token.strip_prefix("0x") {
        if let Ok(h) = u64::from_str_radix(digits, 16) {
            return Ok(Value::Hex(HexValue(h)));
        }
    }
    if let Ok(h) = u64::from_str_radix(token, 16) {
        return Ok(Value::Hex(HexValue(h)));
    }
    if is_wrapped(token, '(', ')') {
        return Ok(Value::Block(Block::new(token)));
    }
    Ok(Value::Variable(token.to_string()))
}

/// Render a value to its display string.
pub fn from_typed(value: &Value) -> String {
    value.to_string()
}
