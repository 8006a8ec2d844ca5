//! Stream schemas
//!
//! A [`StreamSchema`] is the ordered list of typed attributes every tuple on
//! a stream carries. Schemas are written in the tuple notation used by the
//! streaming runtime, e.g. `tuple<rstring A, int32 B>`, and that is also
//! their serialized form.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::security::validate_identifier;
use crate::types::{Row, Tuple, Value};

/// Attribute name of the common string schema
pub const STRING_ATTRIBUTE: &str = "string";

/// Type of a single schema attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeType {
    /// `boolean`
    Boolean,
    /// `int8`
    Int8,
    /// `int16`
    Int16,
    /// `int32`
    Int32,
    /// `int64`
    Int64,
    /// `float32`
    Float32,
    /// `float64`
    Float64,
    /// `rstring` (byte string)
    RString,
    /// `ustring` (unicode string)
    UString,
    /// `blob`
    Blob,
    /// `timestamp`
    Timestamp,
}

impl AttributeType {
    /// Type name in tuple notation
    pub fn name(&self) -> &'static str {
        match self {
            Self::Boolean => "boolean",
            Self::Int8 => "int8",
            Self::Int16 => "int16",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::Float32 => "float32",
            Self::Float64 => "float64",
            Self::RString => "rstring",
            Self::UString => "ustring",
            Self::Blob => "blob",
            Self::Timestamp => "timestamp",
        }
    }

    /// Whether values of this type can carry SQL text
    #[inline]
    pub fn is_string(&self) -> bool {
        matches!(self, Self::RString | Self::UString)
    }

    /// Value used when a result tuple has nothing to fill this attribute with
    pub fn default_value(&self) -> Value {
        match self {
            Self::Boolean => Value::Bool(false),
            Self::Int8 => Value::Int8(0),
            Self::Int16 => Value::Int16(0),
            Self::Int32 => Value::Int32(0),
            Self::Int64 => Value::Int64(0),
            Self::Float32 => Value::Float32(0.0),
            Self::Float64 => Value::Float64(0.0),
            Self::RString | Self::UString => Value::String(String::new()),
            Self::Blob => Value::Bytes(Vec::new()),
            Self::Timestamp => Value::Timestamp(chrono::NaiveDateTime::default()),
        }
    }

    /// Convert a value into this type. NULL stays NULL.
    pub fn coerce(&self, value: &Value) -> Result<Value> {
        if value.is_null() {
            return Ok(Value::Null);
        }

        let mismatch = || {
            Error::type_conversion(format!(
                "cannot convert {} value to {}",
                value.sql_type(),
                self.name()
            ))
        };

        let converted = match self {
            Self::Boolean => Value::Bool(value.as_bool().ok_or_else(mismatch)?),
            Self::Int8 => Value::Int8(narrow(value.as_i64().ok_or_else(mismatch)?, self)?),
            Self::Int16 => Value::Int16(narrow(value.as_i64().ok_or_else(mismatch)?, self)?),
            Self::Int32 => Value::Int32(narrow(value.as_i64().ok_or_else(mismatch)?, self)?),
            Self::Int64 => Value::Int64(value.as_i64().ok_or_else(mismatch)?),
            Self::Float32 => Value::Float32(value.as_f64().ok_or_else(mismatch)? as f32),
            Self::Float64 => Value::Float64(value.as_f64().ok_or_else(mismatch)?),
            Self::RString | Self::UString => Value::String(value.as_string().ok_or_else(mismatch)?),
            Self::Blob => match value {
                Value::Bytes(b) => Value::Bytes(b.clone()),
                Value::String(s) => Value::Bytes(s.as_bytes().to_vec()),
                _ => return Err(mismatch()),
            },
            Self::Timestamp => match value {
                Value::Timestamp(t) => Value::Timestamp(*t),
                Value::String(s) => Value::Timestamp(
                    chrono::NaiveDateTime::parse_from_str(s.trim(), "%Y-%m-%d %H:%M:%S%.f")
                        .map_err(|_| mismatch())?,
                ),
                _ => return Err(mismatch()),
            },
        };
        Ok(converted)
    }
}

fn narrow<T: TryFrom<i64>>(n: i64, ty: &AttributeType) -> Result<T> {
    T::try_from(n).map_err(|_| Error::type_conversion(format!("{} out of range for {}", n, ty.name())))
}

impl FromStr for AttributeType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "boolean" => Self::Boolean,
            "int8" => Self::Int8,
            "int16" => Self::Int16,
            "int32" => Self::Int32,
            "int64" => Self::Int64,
            "float32" => Self::Float32,
            "float64" => Self::Float64,
            "rstring" => Self::RString,
            "ustring" => Self::UString,
            "blob" => Self::Blob,
            "timestamp" => Self::Timestamp,
            other => return Err(Error::schema(format!("unsupported attribute type '{}'", other))),
        })
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A named, typed attribute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Attribute name
    pub name: String,
    /// Attribute type
    pub ty: AttributeType,
}

/// Ordered record shape of a stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StreamSchema {
    attributes: Vec<Attribute>,
}

impl StreamSchema {
    /// Build a schema from `(name, type)` pairs
    pub fn new<I, S>(attributes: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, AttributeType)>,
        S: Into<String>,
    {
        let mut schema = Self {
            attributes: Vec::new(),
        };
        for (name, ty) in attributes {
            schema.push(name.into(), ty)?;
        }
        if schema.attributes.is_empty() {
            return Err(Error::schema("schema must declare at least one attribute"));
        }
        Ok(schema)
    }

    /// The common string schema, `tuple<rstring string>`
    pub fn string() -> Self {
        Self {
            attributes: vec![Attribute {
                name: STRING_ATTRIBUTE.to_string(),
                ty: AttributeType::RString,
            }],
        }
    }

    /// Parse tuple notation, e.g. `tuple<rstring A, int32 B>`
    pub fn parse(text: &str) -> Result<Self> {
        let body = text
            .trim()
            .strip_prefix("tuple<")
            .and_then(|rest| rest.strip_suffix('>'))
            .ok_or_else(|| Error::schema(format!("expected 'tuple<...>', got '{}'", text)))?;

        let mut pairs = Vec::new();
        for decl in body.split(',') {
            let mut tokens = decl.split_whitespace();
            match (tokens.next(), tokens.next(), tokens.next()) {
                (Some(ty), Some(name), None) => pairs.push((name.to_string(), ty.parse()?)),
                _ => {
                    return Err(Error::schema(format!(
                        "malformed attribute declaration '{}' in '{}'",
                        decl.trim(),
                        text
                    )))
                }
            }
        }
        Self::new(pairs)
    }

    fn push(&mut self, name: String, ty: AttributeType) -> Result<()> {
        validate_identifier(&name).map_err(|e| Error::schema(e.to_string()))?;
        if self.attribute(&name).is_some() {
            return Err(Error::schema(format!("duplicate attribute '{}'", name)));
        }
        self.attributes.push(Attribute { name, ty });
        Ok(())
    }

    /// Attributes in declaration order
    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    /// Look up an attribute by name
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// Whether this is the common string schema
    pub fn is_string(&self) -> bool {
        *self == Self::string()
    }

    /// Shape a result tuple for this schema.
    ///
    /// Each attribute is filled from the result row column of the same name
    /// (case-insensitive), else from the input tuple attribute of the same
    /// name, else with the type's default value.
    pub fn shape(&self, input: &Tuple, row: Option<&Row>) -> Result<Tuple> {
        let mut out = Tuple::new();
        for attr in &self.attributes {
            let source = row
                .and_then(|r| r.get_by_name(&attr.name))
                .or_else(|| input.get(&attr.name));
            let value = match source {
                Some(v) => attr.ty.coerce(v).map_err(|e| {
                    Error::type_conversion(format!("attribute '{}': {}", attr.name, e))
                })?,
                None => attr.ty.default_value(),
            };
            out.set(attr.name.clone(), value);
        }
        Ok(out)
    }

    /// Check that a tuple conforms to this schema (same names, coercible values)
    pub fn check(&self, tuple: &Tuple) -> Result<()> {
        for attr in &self.attributes {
            let value = tuple
                .get(&attr.name)
                .ok_or_else(|| Error::schema(format!("tuple is missing attribute '{}'", attr.name)))?;
            attr.ty.coerce(value)?;
        }
        if let Some(extra) = tuple.names().find(|n| self.attribute(n).is_none()) {
            return Err(Error::schema(format!("tuple has undeclared attribute '{}'", extra)));
        }
        Ok(())
    }
}

impl FromStr for StreamSchema {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for StreamSchema {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<StreamSchema> for String {
    fn from(schema: StreamSchema) -> Self {
        schema.to_string()
    }
}

impl fmt::Display for StreamSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("tuple<")?;
        for (i, attr) in self.attributes.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{} {}", attr.ty, attr.name)?;
        }
        f.write_str(">")
    }
}

impl JsonSchema for StreamSchema {
    fn schema_name() -> String {
        "StreamSchema".to_string()
    }

    fn json_schema(gen: &mut schemars::gen::SchemaGenerator) -> schemars::schema::Schema {
        let mut schema = gen.subschema_for::<String>();
        if let schemars::schema::Schema::Object(obj) = &mut schema {
            obj.metadata().description =
                Some("Tuple notation, e.g. 'tuple<rstring A, int32 B>'".to_string());
        }
        schema
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let schema = StreamSchema::parse("tuple<rstring A, rstring B>").unwrap();
        assert_eq!(schema.attributes().len(), 2);
        assert_eq!(schema.attribute("B").unwrap().ty, AttributeType::RString);
        assert_eq!(schema.to_string(), "tuple<rstring A, rstring B>");
    }

    #[test]
    fn test_parse_tolerates_whitespace() {
        let schema = StreamSchema::parse("  tuple<int32   id ,rstring sql>  ").unwrap();
        assert_eq!(schema.to_string(), "tuple<int32 id, rstring sql>");
    }

    #[test]
    fn test_parse_errors() {
        assert!(StreamSchema::parse("rstring A").is_err());
        assert!(StreamSchema::parse("tuple<>").is_err());
        assert!(StreamSchema::parse("tuple<decimal128 A>").is_err());
        assert!(StreamSchema::parse("tuple<rstring A, rstring A>").is_err());
        assert!(StreamSchema::parse("tuple<rstring>").is_err());
        assert!(StreamSchema::parse("tuple<rstring A B>").is_err());
    }

    #[test]
    fn test_string_schema() {
        let schema = StreamSchema::string();
        assert!(schema.is_string());
        assert_eq!(schema.to_string(), "tuple<rstring string>");
        assert!(StreamSchema::parse("tuple<rstring string>").unwrap().is_string());
        assert!(!StreamSchema::parse("tuple<rstring sql>").unwrap().is_string());
    }

    #[test]
    fn test_serde_uses_tuple_notation() {
        let schema = StreamSchema::parse("tuple<rstring A, int64 n>").unwrap();
        let json = serde_json::to_string(&schema).unwrap();
        assert_eq!(json, "\"tuple<rstring A, int64 n>\"");

        let back: StreamSchema = serde_json::from_str(&json).unwrap();
        assert_eq!(back, schema);
    }

    #[test]
    fn test_shape_prefers_row_then_input_then_default() {
        let schema = StreamSchema::parse("tuple<rstring A, rstring B, int32 C>").unwrap();
        let input = Tuple::new().with("A", "in-a").with("B", "in-b");
        let row = Row::new(vec!["B".into()], vec![Value::from("row-b")]);

        let out = schema.shape(&input, Some(&row)).unwrap();
        assert_eq!(out.get("A"), Some(&Value::from("in-a")));
        assert_eq!(out.get("B"), Some(&Value::from("row-b")));
        assert_eq!(out.get("C"), Some(&Value::Int32(0)));
    }

    #[test]
    fn test_coerce_narrowing() {
        assert_eq!(
            AttributeType::Int8.coerce(&Value::Int64(12)).unwrap(),
            Value::Int8(12)
        );
        assert!(AttributeType::Int8.coerce(&Value::Int64(1000)).is_err());
        assert!(AttributeType::Boolean.coerce(&Value::from("maybe")).is_err());
    }

    #[test]
    fn test_check_tuple() {
        let schema = StreamSchema::parse("tuple<rstring A>").unwrap();
        assert!(schema.check(&Tuple::new().with("A", "x")).is_ok());
        assert!(schema.check(&Tuple::new()).is_err());
        assert!(schema.check(&Tuple::new().with("A", "x").with("Z", 1_i32)).is_err());
    }
}
