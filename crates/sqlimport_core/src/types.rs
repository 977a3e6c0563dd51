//! Strongly typed schema metadata for a load target.

use crate::error::{LoadError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// SQL scalar type classification used by the descriptor and value conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SqlType {
    Int,
    BigInt,
    SmallInt,
    TinyInt,
    Bit,
    Decimal,
    Numeric,
    Money,
    SmallMoney,
    Float,
    Real,
    DateTime,
    DateTime2,
    SmallDateTime,
    Date,
    Time,
    DateTimeOffset,
    /// CHAR, VARCHAR, NCHAR, NVARCHAR, TEXT, NTEXT
    Character,
    /// Anything else (uniqueidentifier, xml, binary, ...). Loaded as text.
    Other,
}

impl SqlType {
    /// Classify a catalog type name. Case-insensitive; never fails.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_uppercase().as_str() {
            "INT" => SqlType::Int,
            "BIGINT" => SqlType::BigInt,
            "SMALLINT" => SqlType::SmallInt,
            "TINYINT" => SqlType::TinyInt,
            "BIT" => SqlType::Bit,
            "DECIMAL" => SqlType::Decimal,
            "NUMERIC" => SqlType::Numeric,
            "MONEY" => SqlType::Money,
            "SMALLMONEY" => SqlType::SmallMoney,
            "FLOAT" => SqlType::Float,
            "REAL" => SqlType::Real,
            "DATETIME" => SqlType::DateTime,
            "DATETIME2" => SqlType::DateTime2,
            "SMALLDATETIME" => SqlType::SmallDateTime,
            "DATE" => SqlType::Date,
            "TIME" => SqlType::Time,
            "DATETIMEOFFSET" => SqlType::DateTimeOffset,
            "CHAR" | "VARCHAR" | "NCHAR" | "NVARCHAR" | "TEXT" | "NTEXT" => SqlType::Character,
            _ => SqlType::Other,
        }
    }

    pub fn is_character(&self) -> bool {
        matches!(self, SqlType::Character)
    }

    /// Whether an empty field is always NULL for this type.
    pub fn is_textual(&self) -> bool {
        matches!(self, SqlType::Character | SqlType::Other)
    }
}

/// Declared width of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MaxLength {
    Bounded(u32),
    Unbounded,
}

impl MaxLength {
    /// Map a catalog `CHARACTER_MAXIMUM_LENGTH` (NULL and -1 mean MAX).
    pub fn from_catalog(value: Option<i64>) -> Self {
        match value {
            Some(n) if n > 0 => MaxLength::Bounded(u32::try_from(n).unwrap_or(u32::MAX)),
            _ => MaxLength::Unbounded,
        }
    }

    pub fn bound(&self) -> Option<u32> {
        match self {
            MaxLength::Bounded(n) => Some(*n),
            MaxLength::Unbounded => None,
        }
    }
}

/// One column of the target table, in physical (ordinal) order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    /// 1-based ordinal position
    pub ordinal: u32,
    pub name: String,
    /// Catalog type name as reported (e.g. `nvarchar`)
    pub type_name: String,
    pub sql_type: SqlType,
    pub max_length: MaxLength,
}

impl ColumnSpec {
    pub fn new(ordinal: u32, name: impl Into<String>, type_name: impl Into<String>, max_length: MaxLength) -> Self {
        let type_name = type_name.into();
        Self {
            ordinal,
            name: name.into(),
            sql_type: SqlType::from_name(&type_name),
            type_name,
            max_length,
        }
    }
}

/// How the first line of the source relates to the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HeaderMode {
    /// First row holds column names; match them to table columns.
    ByName,
    /// First row is a header to discard; map fields by position.
    ByPosition,
    /// Every row is data; map fields by position.
    #[default]
    NoHeader,
}

impl HeaderMode {
    pub fn has_header_row(&self) -> bool {
        !matches!(self, HeaderMode::NoHeader)
    }
}

/// A possibly qualified table identifier (`[db].[schema].[table]`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableName {
    pub database: Option<String>,
    pub schema: Option<String>,
    pub name: String,
}

impl TableName {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            database: None,
            schema: None,
            name: name.into(),
        }
    }

    pub fn with_schema(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            database: None,
            schema: Some(schema.into()),
            name: name.into(),
        }
    }

    /// Parse `table`, `schema.table` or `db.schema.table`, bracketed or not.
    pub fn parse(input: &str) -> Result<Self> {
        let parts = split_identifier(input.trim())?;
        let mut parts = parts.into_iter().rev();
        let name = parts
            .next()
            .filter(|n| !n.is_empty())
            .ok_or_else(|| LoadError::invalid_config(format!("Empty table name: '{}'", input)))?;
        let schema = parts.next().filter(|s| !s.is_empty());
        let database = parts.next().filter(|d| !d.is_empty());
        if parts.next().is_some() {
            return Err(LoadError::invalid_config(format!(
                "Table name has too many parts: '{}'",
                input
            )));
        }
        Ok(Self {
            database,
            schema,
            name,
        })
    }

    /// Bracket-quoted form for statements, e.g. `[dbo].[Orders]`.
    pub fn quoted(&self) -> String {
        let mut parts = Vec::with_capacity(3);
        if let Some(db) = &self.database {
            parts.push(quote_identifier(db));
        }
        if let Some(schema) = &self.schema {
            parts.push(quote_identifier(schema));
        } else if self.database.is_some() {
            // db..table keeps the default schema
            parts.push(String::new());
        }
        parts.push(quote_identifier(&self.name));
        parts.join(".")
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{}.{}", schema, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Bracket-quote one identifier part, doubling any closing bracket.
pub fn quote_identifier(ident: &str) -> String {
    format!("[{}]", ident.replace(']', "]]"))
}

fn split_identifier(input: &str) -> Result<Vec<String>> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut chars = input.chars().peekable();
    let mut in_brackets = false;

    while let Some(ch) = chars.next() {
        match ch {
            '[' if !in_brackets && current.is_empty() => in_brackets = true,
            ']' if in_brackets => {
                if chars.peek() == Some(&']') {
                    chars.next();
                    current.push(']');
                } else {
                    in_brackets = false;
                }
            }
            '.' if !in_brackets => parts.push(std::mem::take(&mut current)),
            _ => current.push(ch),
        }
    }

    if in_brackets {
        return Err(LoadError::invalid_config(format!(
            "Unterminated bracket in table name: '{}'",
            input
        )));
    }
    parts.push(current);
    Ok(parts)
}
