//! Statement sources and bound parameters
//!
//! Every input tuple runs exactly one statement. Its text is either the same
//! literal for every tuple ([`StatementSource::Literal`]) or read from a
//! string attribute of the tuple ([`StatementSource::Attribute`]).
//! Positional `?` parameters are bound from the attributes named in
//! [`SqlParams`], in order.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};
use crate::schema::{StreamSchema, STRING_ATTRIBUTE};
use crate::security::validate_identifier;
use crate::types::{Tuple, Value};

/// Where the SQL text of a statement comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum StatementSource {
    /// The same statement for every input tuple
    Literal(String),
    /// Per-tuple statement read from the named string attribute
    Attribute(String),
}

impl StatementSource {
    /// Resolve the statement source from the optional `sql` /
    /// `sql_attribute` pair.
    ///
    /// Exactly one may be given. With neither, a stream of the common string
    /// schema is read as one statement per tuple.
    pub fn resolve(
        sql: Option<&str>,
        sql_attribute: Option<&str>,
        input: &StreamSchema,
    ) -> Result<Self> {
        match (sql, sql_attribute) {
            (Some(_), Some(_)) => Err(Error::config(
                "'sql' and 'sql_attribute' are mutually exclusive",
            )),
            (Some(sql), None) => {
                if sql.trim().is_empty() {
                    return Err(Error::config("'sql' must not be empty"));
                }
                Ok(Self::Literal(sql.to_string()))
            }
            (None, Some(name)) => {
                validate_identifier(name)?;
                match input.attribute(name) {
                    Some(attr) if attr.ty.is_string() => Ok(Self::Attribute(name.to_string())),
                    Some(attr) => Err(Error::config(format!(
                        "sql_attribute '{}' has type {}, expected rstring or ustring",
                        name, attr.ty
                    ))),
                    None => Err(Error::config(format!(
                        "sql_attribute '{}' is not an attribute of input schema {}",
                        name, input
                    ))),
                }
            }
            (None, None) if input.is_string() => Ok(Self::Attribute(STRING_ATTRIBUTE.to_string())),
            (None, None) => Err(Error::config(format!(
                "either 'sql' or 'sql_attribute' is required for input schema {}",
                input
            ))),
        }
    }

    /// SQL text to run for `tuple`
    pub fn sql_for<'a>(&'a self, tuple: &'a Tuple) -> Result<&'a str> {
        match self {
            Self::Literal(sql) => Ok(sql.as_str()),
            Self::Attribute(name) => match tuple.get(name) {
                Some(Value::String(sql)) => Ok(sql.as_str()),
                Some(other) => Err(Error::type_conversion(format!(
                    "sql attribute '{}' holds {}, expected a string",
                    name,
                    other.sql_type()
                ))),
                None => Err(Error::schema(format!(
                    "input tuple has no sql attribute '{}'",
                    name
                ))),
            },
        }
    }

    /// Literal SQL text, if this is a literal source
    pub fn literal(&self) -> Option<&str> {
        match self {
            Self::Literal(sql) => Some(sql),
            Self::Attribute(_) => None,
        }
    }

    /// Attribute name, if this is a per-tuple source
    pub fn attribute(&self) -> Option<&str> {
        match self {
            Self::Attribute(name) => Some(name),
            Self::Literal(_) => None,
        }
    }
}

/// Ordered attribute names supplying positional bind values
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct SqlParams(Vec<String>);

#[derive(Deserialize, JsonSchema)]
#[serde(untagged)]
enum SqlParamsRepr {
    /// `["A", "B"]`
    List(Vec<String>),
    /// `"A, B"`
    Delimited(String),
}

impl SqlParams {
    /// Build from a list of attribute names
    pub fn new<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names
            .into_iter()
            .map(|n| Into::<String>::into(n).trim().to_string())
            .collect();
        for name in &names {
            validate_identifier(name)
                .map_err(|e| Error::config(format!("invalid sql_params entry: {}", e)))?;
        }
        Ok(Self(names))
    }

    /// Parse a comma-delimited list such as `"A, B"`
    pub fn parse(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Self::new(text.split(','))
    }

    /// Attribute names in binding order
    pub fn names(&self) -> &[String] {
        &self.0
    }

    /// Number of bound parameters
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no parameters are bound
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Every parameter must name an attribute of the input schema
    pub fn check_against(&self, input: &StreamSchema) -> Result<()> {
        match self.0.iter().find(|n| input.attribute(n).is_none()) {
            Some(missing) => Err(Error::config(format!(
                "sql_params entry '{}' is not an attribute of input schema {}",
                missing, input
            ))),
            None => Ok(()),
        }
    }

    /// Bind values for `tuple`, in parameter order
    pub fn bind(&self, tuple: &Tuple) -> Result<Vec<Value>> {
        self.0
            .iter()
            .map(|name| {
                tuple.get(name).cloned().ok_or_else(|| {
                    Error::schema(format!("input tuple has no parameter attribute '{}'", name))
                })
            })
            .collect()
    }
}

impl<'de> Deserialize<'de> for SqlParams {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let parsed = match SqlParamsRepr::deserialize(deserializer)? {
            SqlParamsRepr::List(names) => Self::new(names),
            SqlParamsRepr::Delimited(text) => Self::parse(&text),
        };
        parsed.map_err(serde::de::Error::custom)
    }
}

impl JsonSchema for SqlParams {
    fn schema_name() -> String {
        "SqlParams".to_string()
    }

    fn json_schema(gen: &mut schemars::gen::SchemaGenerator) -> schemars::schema::Schema {
        gen.subschema_for::<SqlParamsRepr>()
    }
}

impl fmt::Display for SqlParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(","))
    }
}

/// Whether a statement produces a result set rather than an update count
pub fn returns_rows(sql: &str) -> bool {
    let keyword: String = sql
        .trim_start()
        .trim_start_matches('(')
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect();
    matches!(
        keyword.to_ascii_uppercase().as_str(),
        "SELECT" | "WITH" | "VALUES"
    )
}

/// Number of positional `?` markers outside quoted literals and identifiers
pub fn count_placeholders(sql: &str) -> usize {
    let mut count = 0;
    let mut quote: Option<char> = None;
    for c in sql.chars() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'') | (None, '"') => quote = Some(c),
            (None, '?') => count += 1,
            (None, _) => {}
        }
    }
    count
}
