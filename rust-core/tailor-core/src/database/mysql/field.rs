//! Result column metadata and the buffer layout for each MySQL type.

use sqlx::mysql::MySqlColumn;
use sqlx::{Column, TypeInfo};

/// Size of the native time struct: year (u16), month, day, hour, minute,
/// second (u8 each) and microseconds (u32), little endian
pub const NATIVE_TIME_SIZE: usize = 11;

/// Longest textual decimal MySQL produces (65 digits, sign, point, exponent)
pub const DECIMAL_TEXT_SIZE: usize = 68;

/// Ceiling for char and varchar columns
pub const VARCHAR_SIZE: usize = 65_535;

/// Buffer size for types without a dedicated entry
pub const DEFAULT_SIZE: usize = 1024;

/// MySQL column types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    /// TINYINT and BOOLEAN
    Tiny,
    /// SMALLINT
    Short,
    /// MEDIUMINT
    Int24,
    /// INT
    Long,
    /// BIGINT
    LongLong,
    /// YEAR
    Year,
    /// BIT
    Bit,
    /// FLOAT
    Float,
    /// DOUBLE
    Double,
    /// DECIMAL and NEWDECIMAL
    Decimal,
    /// DATE
    Date,
    /// TIME
    Time,
    /// DATETIME
    DateTime,
    /// TIMESTAMP
    Timestamp,
    /// TINYBLOB and TINYTEXT
    TinyBlob,
    /// BLOB and TEXT
    Blob,
    /// MEDIUMBLOB and MEDIUMTEXT
    MediumBlob,
    /// LONGBLOB and LONGTEXT
    LongBlob,
    /// CHAR and BINARY
    String,
    /// VARCHAR and VARBINARY
    VarString,
    /// JSON
    Json,
    /// ENUM
    Enum,
    /// SET
    Set,
    /// GEOMETRY
    Geometry,
    /// NULL
    Null,
}

impl FieldType {
    /// Map an sqlx MySQL type name (`BIGINT UNSIGNED`, `MEDIUMTEXT`, ...)
    #[must_use]
    pub fn from_type_name(type_name: &str) -> Self {
        let base = type_name
            .trim()
            .trim_end_matches(" UNSIGNED")
            .to_ascii_uppercase();
        match base.as_str() {
            "TINYINT" | "BOOLEAN" => Self::Tiny,
            "SMALLINT" => Self::Short,
            "MEDIUMINT" => Self::Int24,
            "INT" => Self::Long,
            "BIGINT" => Self::LongLong,
            "YEAR" => Self::Year,
            "BIT" => Self::Bit,
            "FLOAT" => Self::Float,
            "DOUBLE" => Self::Double,
            "DECIMAL" | "NEWDECIMAL" => Self::Decimal,
            "DATE" => Self::Date,
            "TIME" => Self::Time,
            "DATETIME" => Self::DateTime,
            "TIMESTAMP" => Self::Timestamp,
            "TINYBLOB" | "TINYTEXT" => Self::TinyBlob,
            "BLOB" | "TEXT" => Self::Blob,
            "MEDIUMBLOB" | "MEDIUMTEXT" => Self::MediumBlob,
            "LONGBLOB" | "LONGTEXT" => Self::LongBlob,
            "CHAR" | "BINARY" => Self::String,
            "VARCHAR" | "VARBINARY" => Self::VarString,
            "JSON" => Self::Json,
            "ENUM" => Self::Enum,
            "SET" => Self::Set,
            "GEOMETRY" => Self::Geometry,
            "NULL" => Self::Null,
            _ => Self::VarString,
        }
    }

    /// Bytes a receiving buffer needs for this type
    ///
    /// For variable-size types this is the ceiling, not an allocation.
    #[must_use]
    pub const fn buffer_size(self) -> usize {
        match self {
            Self::Tiny | Self::Bit => 1,
            Self::Short | Self::Year => 2,
            Self::Long | Self::Int24 | Self::Float => 4,
            Self::LongLong | Self::Double => 8,
            Self::Date | Self::Time | Self::DateTime | Self::Timestamp => NATIVE_TIME_SIZE,
            Self::Decimal => DECIMAL_TEXT_SIZE,
            Self::TinyBlob => 1 << 8,
            Self::Blob => 1 << 16,
            Self::MediumBlob => 1 << 24,
            Self::LongBlob => 1 << 31,
            Self::String | Self::VarString => VARCHAR_SIZE,
            Self::Json | Self::Enum | Self::Set | Self::Geometry | Self::Null => DEFAULT_SIZE,
        }
    }

    /// Whether the full buffer is allocated before execution
    #[must_use]
    pub const fn is_fixed_size(self) -> bool {
        self.is_integer() || self.is_temporal() || matches!(self, Self::Float | Self::Double)
    }

    /// Integer types, stored little endian in `buffer_size` bytes
    #[must_use]
    pub const fn is_integer(self) -> bool {
        matches!(
            self,
            Self::Tiny | Self::Short | Self::Int24 | Self::Long | Self::LongLong | Self::Year
        )
    }

    /// Date and time types, stored as the native time struct
    #[must_use]
    pub const fn is_temporal(self) -> bool {
        matches!(self, Self::Date | Self::Time | Self::DateTime | Self::Timestamp)
    }

    /// The four blob size classes
    #[must_use]
    pub const fn is_blob(self) -> bool {
        matches!(
            self,
            Self::TinyBlob | Self::Blob | Self::MediumBlob | Self::LongBlob
        )
    }
}

/// One result column of a prepared statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MysqlField {
    /// Column name
    pub name: String,
    /// Column type
    pub field_type: FieldType,
    /// Blob column with the binary character set
    pub is_binary: bool,
    /// Unsigned integer column
    pub is_unsigned: bool,
}

impl MysqlField {
    /// Build field metadata from a column name and its sqlx type name
    #[must_use]
    pub fn new(name: impl Into<String>, type_name: &str) -> Self {
        let field_type = FieldType::from_type_name(type_name);
        let upper = type_name.to_ascii_uppercase();
        Self {
            name: name.into(),
            field_type,
            is_binary: field_type.is_blob() && upper.contains("BLOB"),
            is_unsigned: upper.ends_with("UNSIGNED"),
        }
    }

    /// Field metadata for an sqlx column
    #[must_use]
    pub fn from_column(column: &MySqlColumn) -> Self {
        Self::new(column.name(), column.type_info().name())
    }

    /// Receiving buffer size for this column
    #[must_use]
    pub const fn buffer_size(&self) -> usize {
        self.field_type.buffer_size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_size_table() {
        assert_eq!(FieldType::Tiny.buffer_size(), 1);
        assert_eq!(FieldType::Bit.buffer_size(), 1);
        assert_eq!(FieldType::Short.buffer_size(), 2);
        assert_eq!(FieldType::Long.buffer_size(), 4);
        assert_eq!(FieldType::Int24.buffer_size(), 4);
        assert_eq!(FieldType::LongLong.buffer_size(), 8);
        assert_eq!(FieldType::Float.buffer_size(), 4);
        assert_eq!(FieldType::Double.buffer_size(), 8);
        assert_eq!(FieldType::Timestamp.buffer_size(), NATIVE_TIME_SIZE);
        assert_eq!(FieldType::TinyBlob.buffer_size(), 256);
        assert_eq!(FieldType::Blob.buffer_size(), 65_536);
        assert_eq!(FieldType::MediumBlob.buffer_size(), 16_777_216);
        assert_eq!(FieldType::LongBlob.buffer_size(), 2_147_483_648);
        assert_eq!(FieldType::Geometry.buffer_size(), DEFAULT_SIZE);
    }

    #[test]
    fn test_type_names() {
        assert_eq!(FieldType::from_type_name("BIGINT UNSIGNED"), FieldType::LongLong);
        assert_eq!(FieldType::from_type_name("BOOLEAN"), FieldType::Tiny);
        assert_eq!(FieldType::from_type_name("MEDIUMTEXT"), FieldType::MediumBlob);
        assert_eq!(FieldType::from_type_name("VARBINARY"), FieldType::VarString);
        assert_eq!(FieldType::from_type_name("SOMETHING NEW"), FieldType::VarString);
    }

    #[test]
    fn test_binary_flag_needs_blob_type() {
        assert!(MysqlField::new("photo", "BLOB").is_binary);
        assert!(MysqlField::new("photo", "LONGBLOB").is_binary);
        assert!(!MysqlField::new("notes", "TEXT").is_binary);
        assert!(!MysqlField::new("code", "VARBINARY").is_binary);
    }

    #[test]
    fn test_unsigned_flag() {
        let field = MysqlField::new("count", "INT UNSIGNED");
        assert!(field.is_unsigned);
        assert_eq!(field.field_type, FieldType::Long);
        assert_eq!(field.buffer_size(), 4);
    }

    #[test]
    fn test_fixed_size_types() {
        assert!(FieldType::LongLong.is_fixed_size());
        assert!(FieldType::Date.is_fixed_size());
        assert!(!FieldType::Decimal.is_fixed_size());
        assert!(!FieldType::Blob.is_fixed_size());
    }
}
