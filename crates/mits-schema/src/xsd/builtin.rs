//! Built-in simple types

use std::borrow::Cow;

use chrono::{NaiveDate, NaiveDateTime};

/// Built-in datatypes understood by the schema stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinType {
    String,
    NormalizedString,
    Token,
    Boolean,
    Decimal,
    Integer,
    Int,
    Long,
    PositiveInteger,
    NonNegativeInteger,
    Date,
    DateTime,
    AnyUri,
    AnySimpleType,
    AnyType,
}

impl BuiltinType {
    /// Map an XML Schema type name (local part) to a built-in type.
    ///
    /// A few closely related types are folded onto the nearest supported one.
    #[must_use]
    pub fn from_local_name(name: &str) -> Option<Self> {
        let ty = match name {
            "string" => Self::String,
            "normalizedString" => Self::NormalizedString,
            "token" | "NMTOKEN" | "Name" | "NCName" | "ID" | "IDREF" | "language" => Self::Token,
            "boolean" => Self::Boolean,
            "decimal" | "float" | "double" => Self::Decimal,
            "integer" | "short" | "byte" | "nonPositiveInteger" | "negativeInteger" => Self::Integer,
            "int" => Self::Int,
            "long" => Self::Long,
            "positiveInteger" => Self::PositiveInteger,
            "nonNegativeInteger" | "unsignedInt" | "unsignedLong" | "unsignedShort" | "unsignedByte" => {
                Self::NonNegativeInteger
            }
            "date" => Self::Date,
            "dateTime" => Self::DateTime,
            "anyURI" => Self::AnyUri,
            "anySimpleType" => Self::AnySimpleType,
            "anyType" => Self::AnyType,
            _ => return None,
        };
        Some(ty)
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::NormalizedString => "normalizedString",
            Self::Token => "token",
            Self::Boolean => "boolean",
            Self::Decimal => "decimal",
            Self::Integer => "integer",
            Self::Int => "int",
            Self::Long => "long",
            Self::PositiveInteger => "positiveInteger",
            Self::NonNegativeInteger => "nonNegativeInteger",
            Self::Date => "date",
            Self::DateTime => "dateTime",
            Self::AnyUri => "anyURI",
            Self::AnySimpleType => "anySimpleType",
            Self::AnyType => "anyType",
        }
    }

    /// Whether values of this type are compared numerically by range facets.
    #[must_use]
    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            Self::Decimal
                | Self::Integer
                | Self::Int
                | Self::Long
                | Self::PositiveInteger
                | Self::NonNegativeInteger
        )
    }

    /// Apply the type's whitespace handling.
    #[must_use]
    pub fn normalize(self, value: &str) -> Cow<'_, str> {
        match self {
            Self::String | Self::AnySimpleType | Self::AnyType => Cow::Borrowed(value),
            Self::NormalizedString => {
                if value.contains(['\t', '\n', '\r']) {
                    Cow::Owned(value.replace(['\t', '\n', '\r'], " "))
                } else {
                    Cow::Borrowed(value)
                }
            }
            _ => {
                let collapsed = value.split_whitespace().collect::<Vec<_>>().join(" ");
                if collapsed == value {
                    Cow::Borrowed(value)
                } else {
                    Cow::Owned(collapsed)
                }
            }
        }
    }

    /// Check the lexical form of an already-normalized value.
    ///
    /// # Errors
    ///
    /// Returns a description of the problem when the value is not a valid
    /// literal of this type.
    pub fn check(self, value: &str) -> Result<(), String> {
        let ok = match self {
            Self::String
            | Self::NormalizedString
            | Self::Token
            | Self::AnySimpleType
            | Self::AnyType => true,
            Self::AnyUri => !value.contains(char::is_whitespace),
            Self::Boolean => matches!(value, "true" | "false" | "1" | "0"),
            Self::Decimal => is_decimal(value),
            Self::Integer => is_integer(value),
            Self::Int => is_integer(value) && value.parse::<i32>().is_ok(),
            Self::Long => is_integer(value) && value.parse::<i64>().is_ok(),
            Self::PositiveInteger => {
                is_integer(value) && !value.starts_with('-') && !value.trim_start_matches(['+', '0']).is_empty()
            }
            Self::NonNegativeInteger => {
                is_integer(value) && (!value.starts_with('-') || value[1..].bytes().all(|b| b == b'0'))
            }
            Self::Date => NaiveDate::parse_from_str(strip_timezone(value), "%Y-%m-%d").is_ok(),
            Self::DateTime => {
                NaiveDateTime::parse_from_str(strip_timezone(value), "%Y-%m-%dT%H:%M:%S%.f").is_ok()
            }
        };
        if ok {
            Ok(())
        } else {
            Err(format!("'{value}' is not a valid value of type {}", self.name()))
        }
    }
}

fn is_integer(value: &str) -> bool {
    let digits = value.strip_prefix(['+', '-']).unwrap_or(value);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

fn is_decimal(value: &str) -> bool {
    let unsigned = value.strip_prefix(['+', '-']).unwrap_or(value);
    let (int, frac) = unsigned.split_once('.').unwrap_or((unsigned, ""));
    (!int.is_empty() || !frac.is_empty())
        && int.bytes().all(|b| b.is_ascii_digit())
        && frac.bytes().all(|b| b.is_ascii_digit())
}

/// Drop a trailing `Z` or `+hh:mm` / `-hh:mm` zone designator.
fn strip_timezone(value: &str) -> &str {
    if let Some(rest) = value.strip_suffix('Z') {
        return rest;
    }
    let bytes = value.as_bytes();
    let n = bytes.len();
    if n > 10 && matches!(bytes[n - 6], b'+' | b'-') && bytes[n - 3] == b':' {
        return &value[..n - 6];
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup() {
        assert_eq!(BuiltinType::from_local_name("decimal"), Some(BuiltinType::Decimal));
        assert_eq!(BuiltinType::from_local_name("unsignedInt"), Some(BuiltinType::NonNegativeInteger));
        assert_eq!(BuiltinType::from_local_name("gYearMonth"), None);
    }

    #[test]
    fn test_numbers() {
        assert!(BuiltinType::Decimal.check("1450.00").is_ok());
        assert!(BuiltinType::Decimal.check("-.5").is_ok());
        assert!(BuiltinType::Decimal.check("12a").is_err());
        assert!(BuiltinType::Decimal.check(".").is_err());
        assert!(BuiltinType::Integer.check("+42").is_ok());
        assert!(BuiltinType::Integer.check("4.2").is_err());
        assert!(BuiltinType::Int.check("3000000000").is_err());
        assert!(BuiltinType::Long.check("3000000000").is_ok());
        assert!(BuiltinType::PositiveInteger.check("0").is_err());
        assert!(BuiltinType::PositiveInteger.check("7").is_ok());
        assert!(BuiltinType::NonNegativeInteger.check("0").is_ok());
        assert!(BuiltinType::NonNegativeInteger.check("-1").is_err());
    }

    #[test]
    fn test_dates() {
        assert!(BuiltinType::Date.check("2024-02-29").is_ok());
        assert!(BuiltinType::Date.check("2024-02-30").is_err());
        assert!(BuiltinType::Date.check("2024-01-15Z").is_ok());
        assert!(BuiltinType::Date.check("2024-01-15-05:00").is_ok());
        assert!(BuiltinType::DateTime.check("2024-01-15T10:30:00").is_ok());
        assert!(BuiltinType::DateTime.check("2024-01-15T10:30:00.250+02:00").is_ok());
        assert!(BuiltinType::DateTime.check("2024-01-15").is_err());
    }

    #[test]
    fn test_boolean_and_uri() {
        assert!(BuiltinType::Boolean.check("true").is_ok());
        assert!(BuiltinType::Boolean.check("yes").is_err());
        assert!(BuiltinType::AnyUri.check("https://example.com/a").is_ok());
        assert!(BuiltinType::AnyUri.check("not a uri").is_err());
    }

    #[test]
    fn test_normalize() {
        assert_eq!(BuiltinType::Token.normalize("  a \n b "), "a b");
        assert_eq!(BuiltinType::NormalizedString.normalize("a\tb"), "a b");
        assert_eq!(BuiltinType::String.normalize(" a "), " a ");
    }
}
