//! JSON payload codec for job arguments.
//!
//! Payloads are string-keyed mappings of arbitrary JSON values. Encoding is
//! deterministic: keys keep their insertion order, `null` values survive and
//! integers round-trip exactly. Both directions refuse structures nested more
//! than [`MAX_DEPTH`] containers deep.

mod errors;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use self::errors::{CodecFailure, SerializationCode, SerializationError};

/// String-keyed job payload that preserves insertion order.
pub type Payload = Map<String, Value>;

/// Maximum number of nested arrays and objects accepted by the codec.
pub const MAX_DEPTH: usize = 512;

/// How [`PayloadCodec::unserialize`] treats a top-level value that is not an
/// object.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DecodeMode {
    /// Reject anything but an object with [`SerializationCode::NotAMapping`].
    #[default]
    Strict,
    /// Coerce the value into a mapping the way legacy producers expect:
    /// `null` becomes an empty mapping, arrays are keyed by their indices
    /// (`"0"`, `"1"`, ...) and any other scalar becomes `{"0": value}`.
    Legacy,
}

/// Converts job payloads to and from their transport encoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PayloadCodec {
    mode: DecodeMode,
}

impl PayloadCodec {
    /// Creates a strict codec.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            mode: DecodeMode::Strict,
        }
    }

    /// Creates a codec with the given decode mode.
    #[must_use]
    pub const fn with_mode(mode: DecodeMode) -> Self {
        Self { mode }
    }

    /// Decode mode in effect.
    #[must_use]
    pub const fn mode(&self) -> DecodeMode {
        self.mode
    }

    /// Encodes a payload as compact JSON text.
    ///
    /// # Errors
    ///
    /// Returns a [`SerializationError`] when the value cannot be represented
    /// as JSON, does not serialize to an object, or nests deeper than
    /// [`MAX_DEPTH`].
    pub fn serialize<T>(&self, payload: &T) -> Result<Vec<u8>, SerializationError>
    where
        T: Serialize + ?Sized,
    {
        let value = serde_json::to_value(payload).map_err(SerializationError::encode)?;
        if value_depth(&value) > MAX_DEPTH {
            return Err(SerializationError::depth(MAX_DEPTH));
        }
        if !value.is_object() {
            return Err(SerializationError::not_a_mapping(json_type(&value)));
        }
        serde_json::to_vec(&value).map_err(SerializationError::encode)
    }

    /// Decodes JSON text into a payload mapping.
    ///
    /// # Errors
    ///
    /// Returns a [`SerializationError`] for invalid UTF-8, malformed JSON,
    /// input nested deeper than [`MAX_DEPTH`], or, in
    /// [`DecodeMode::Strict`], a top-level value that is not an object.
    pub fn unserialize(&self, payload: &[u8]) -> Result<Payload, SerializationError> {
        let text = std::str::from_utf8(payload).map_err(SerializationError::utf8)?;
        if text_depth(text) > MAX_DEPTH {
            return Err(SerializationError::depth(MAX_DEPTH));
        }

        // The depth scan above bounds recursion, so serde_json's own limit of
        // 128 is lifted to honour the larger one.
        let mut deserializer = serde_json::Deserializer::from_str(text);
        deserializer.disable_recursion_limit();
        let value = Value::deserialize(&mut deserializer).map_err(SerializationError::decode)?;
        deserializer.end().map_err(SerializationError::decode)?;

        match (value, self.mode) {
            (Value::Object(map), _) => Ok(map),
            (other, DecodeMode::Strict) => {
                Err(SerializationError::not_a_mapping(json_type(&other)))
            }
            (other, DecodeMode::Legacy) => Ok(coerce_to_mapping(other)),
        }
    }
}

fn coerce_to_mapping(value: Value) -> Payload {
    match value {
        Value::Null => Payload::new(),
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(index, item)| (index.to_string(), item))
            .collect(),
        Value::Object(map) => map,
        scalar => {
            let mut map = Payload::new();
            map.insert("0".to_owned(), scalar);
            map
        }
    }
}

const fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Nesting depth of a decoded value; scalars have depth zero.
fn value_depth(value: &Value) -> usize {
    let mut deepest = 0;
    let mut stack: Vec<(&Value, usize)> = vec![(value, 0)];
    while let Some((current, depth)) = stack.pop() {
        let children: Box<dyn Iterator<Item = &Value>> = match current {
            Value::Array(items) => Box::new(items.iter()),
            Value::Object(map) => Box::new(map.values()),
            _ => continue,
        };
        let level = depth + 1;
        deepest = deepest.max(level);
        if deepest > MAX_DEPTH {
            break;
        }
        stack.extend(children.map(|child| (child, level)));
    }
    deepest
}

/// Nesting depth of raw JSON text, ignoring brackets inside strings.
///
/// The scan stops as soon as the limit is passed; malformed input is left for
/// the parser to report.
fn text_depth(text: &str) -> usize {
    let mut depth = 0usize;
    let mut deepest = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for byte in text.bytes() {
        if in_string {
            match byte {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match byte {
            b'"' => in_string = true,
            b'[' | b'{' => {
                depth += 1;
                deepest = deepest.max(depth);
                if deepest > MAX_DEPTH {
                    break;
                }
            }
            b']' | b'}' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    deepest
}
