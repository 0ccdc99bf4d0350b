//! Owned bind buffers for MySQL statement inputs and outputs.
//!
//! Each parameter owns one byte buffer laid out the way the MySQL client
//! protocol lays out the type: little-endian integers and floats, an 11-byte
//! time struct for temporal types, raw bytes for everything else. Buffers
//! are released when the owning set is dropped.

use super::field::{FieldType, MysqlField, NATIVE_TIME_SIZE};
use crate::time::{self, TimeZone};
use crate::value::Value;
use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use sqlx::mysql::{MySql, MySqlArguments, MySqlRow};
use sqlx::query::Query;
use sqlx::{Row as _, ValueRef};

pub(crate) type MysqlQuery<'q> = Query<'q, MySql, MySqlArguments>;

/// Broken-down date and time in the client protocol layout
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NativeTime {
    /// Year, 0 for times of day
    pub year: u16,
    /// Month, 0 for times of day
    pub month: u8,
    /// Day of month, 0 for times of day
    pub day: u8,
    /// Hour
    pub hour: u8,
    /// Minute
    pub minute: u8,
    /// Second
    pub second: u8,
    /// Fraction of a second in microseconds
    pub microsecond: u32,
}

impl NativeTime {
    /// A calendar date at midnight
    #[must_use]
    pub fn from_date(date: &NaiveDate) -> Self {
        Self {
            year: u16::try_from(date.year()).unwrap_or_default(),
            month: u8::try_from(date.month()).unwrap_or_default(),
            day: u8::try_from(date.day()).unwrap_or_default(),
            ..Self::default()
        }
    }

    /// A time of day with a zero date
    #[must_use]
    pub fn from_time(time_of_day: &NaiveTime) -> Self {
        Self {
            hour: u8::try_from(time_of_day.hour()).unwrap_or_default(),
            minute: u8::try_from(time_of_day.minute()).unwrap_or_default(),
            second: u8::try_from(time_of_day.second()).unwrap_or_default(),
            microsecond: time_of_day.nanosecond() / 1_000,
            ..Self::default()
        }
    }

    /// A full date and time
    #[must_use]
    pub fn from_datetime(datetime: &NaiveDateTime) -> Self {
        let date = Self::from_date(&datetime.date());
        Self {
            year: date.year,
            month: date.month,
            day: date.day,
            ..Self::from_time(&datetime.time())
        }
    }

    /// Serialize into the 11-byte layout
    #[must_use]
    pub fn to_bytes(self) -> [u8; NATIVE_TIME_SIZE] {
        let mut bytes = [0_u8; NATIVE_TIME_SIZE];
        bytes[..2].copy_from_slice(&self.year.to_le_bytes());
        bytes[2] = self.month;
        bytes[3] = self.day;
        bytes[4] = self.hour;
        bytes[5] = self.minute;
        bytes[6] = self.second;
        bytes[7..].copy_from_slice(&self.microsecond.to_le_bytes());
        bytes
    }

    /// Read the 11-byte layout
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < NATIVE_TIME_SIZE {
            return None;
        }
        Some(Self {
            year: u16::from_le_bytes([bytes[0], bytes[1]]),
            month: bytes[2],
            day: bytes[3],
            hour: bytes[4],
            minute: bytes[5],
            second: bytes[6],
            microsecond: u32::from_le_bytes([bytes[7], bytes[8], bytes[9], bytes[10]]),
        })
    }

    /// The date part, if it is a valid calendar date
    #[must_use]
    pub fn date(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(
            i32::from(self.year),
            u32::from(self.month),
            u32::from(self.day),
        )
    }

    /// The time-of-day part
    #[must_use]
    pub fn time(&self) -> Option<NaiveTime> {
        NaiveTime::from_hms_micro_opt(
            u32::from(self.hour),
            u32::from(self.minute),
            u32::from(self.second),
            self.microsecond,
        )
    }

    /// Date and time together
    #[must_use]
    pub fn datetime(&self) -> Option<NaiveDateTime> {
        Some(self.date()?.and_time(self.time()?))
    }
}

/// A column value as the driver decoded it, before it lands in a buffer
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum FetchedCell {
    Unsigned(u64),
    Signed(i64),
    Float(f32),
    Double(f64),
    Text(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
}

/// One input value or one output column with its owned buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MysqlBindParameter {
    field_type: FieldType,
    is_binary: bool,
    is_unsigned: bool,
    buffer: Vec<u8>,
    capacity: usize,
    is_null: bool,
    truncated: bool,
}

impl MysqlBindParameter {
    /// Serialize an input value
    ///
    /// The buffer is sized exactly to the content. Timestamps are converted
    /// to `time_zone` first.
    #[must_use]
    pub fn input(value: &Value, time_zone: TimeZone) -> Self {
        let (field_type, buffer, is_binary) = match value {
            Value::Null => (FieldType::Null, Vec::new(), false),
            Value::Integer(integer) => (FieldType::LongLong, integer.to_le_bytes().to_vec(), false),
            Value::Double(double) => (FieldType::Double, double.to_le_bytes().to_vec(), false),
            Value::Boolean(flag) => (FieldType::Tiny, vec![u8::from(*flag)], false),
            Value::String(text) => (FieldType::VarString, text.as_bytes().to_vec(), false),
            Value::Binary(bytes) => (FieldType::Blob, bytes.clone(), true),
            Value::Timestamp(timestamp) => {
                let local = timestamp.with_timezone(&time_zone).naive_local();
                let native = NativeTime::from_datetime(&local);
                (FieldType::Timestamp, native.to_bytes().to_vec(), false)
            }
            Value::Date(date) => (
                FieldType::Date,
                NativeTime::from_date(date).to_bytes().to_vec(),
                false,
            ),
            Value::Time(time_of_day) => (
                FieldType::Time,
                NativeTime::from_time(time_of_day).to_bytes().to_vec(),
                false,
            ),
        };

        Self {
            field_type,
            is_binary,
            is_unsigned: false,
            capacity: buffer.len(),
            buffer,
            is_null: value.is_null(),
            truncated: false,
        }
    }

    /// A receiving slot for a result column
    ///
    /// Fixed-size types get their full buffer now. Variable-size types only
    /// record their ceiling and grow while rows are fetched.
    #[must_use]
    pub fn output(field: &MysqlField) -> Self {
        let capacity = field.buffer_size();
        let buffer = if field.field_type.is_fixed_size() {
            vec![0; capacity]
        } else {
            Vec::new()
        };

        Self {
            field_type: field.field_type,
            is_binary: field.is_binary,
            is_unsigned: field.is_unsigned,
            buffer,
            capacity,
            is_null: false,
            truncated: false,
        }
    }

    /// Column type of the buffer
    #[must_use]
    pub const fn field_type(&self) -> FieldType {
        self.field_type
    }

    /// Raw buffer contents
    #[must_use]
    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    /// Bytes currently held
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Whether the buffer holds no bytes
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Most bytes the buffer may hold
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether this slot holds NULL
    #[must_use]
    pub const fn is_null(&self) -> bool {
        self.is_null
    }

    /// Whether the last write was cut off at the ceiling
    #[must_use]
    pub const fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// Whether the column holds binary data
    #[must_use]
    pub const fn is_binary(&self) -> bool {
        self.is_binary
    }

    /// Forget the previous row
    pub fn reset(&mut self) {
        self.is_null = false;
        self.truncated = false;
        if self.field_type.is_fixed_size() {
            self.buffer.fill(0);
        } else {
            self.buffer.clear();
        }
    }

    /// Mark the slot NULL
    pub fn set_null(&mut self) {
        self.reset();
        self.is_null = true;
    }

    /// Copy bytes in, never past the ceiling
    pub fn write(&mut self, bytes: &[u8]) {
        self.reset();
        let kept = bytes.len().min(self.capacity);
        self.truncated = bytes.len() > self.capacity;
        if self.field_type.is_fixed_size() {
            self.buffer[..kept].copy_from_slice(&bytes[..kept]);
        } else {
            self.buffer.extend_from_slice(&bytes[..kept]);
        }
    }

    fn write_integer(&mut self, integer: i64) {
        let bytes = integer.to_le_bytes();
        let width = self.capacity.min(bytes.len());
        self.write(&bytes[..width]);
    }

    /// Fill this slot from column `index` of a fetched row
    ///
    /// Values the driver cannot read in the column's type become NULL.
    pub fn fill(&mut self, row: &MySqlRow, index: usize) {
        let cell = self.read_cell(row, index);
        self.store(cell);
    }

    fn read_cell(&self, row: &MySqlRow, index: usize) -> Option<FetchedCell> {
        match row.try_get_raw(index) {
            Ok(raw) if !raw.is_null() => {}
            _ => return None,
        }

        let field_type = self.field_type;
        let cell = match field_type {
            _ if field_type.is_integer() && self.is_unsigned => {
                row.try_get_unchecked::<u64, _>(index).map(FetchedCell::Unsigned)
            }
            _ if field_type.is_integer() => {
                row.try_get_unchecked::<i64, _>(index).map(FetchedCell::Signed)
            }
            FieldType::Float => row.try_get_unchecked::<f32, _>(index).map(FetchedCell::Float),
            FieldType::Double => row.try_get_unchecked::<f64, _>(index).map(FetchedCell::Double),
            FieldType::Decimal => row.try_get_unchecked::<String, _>(index).map(FetchedCell::Text),
            FieldType::Date => row.try_get_unchecked::<NaiveDate, _>(index).map(FetchedCell::Date),
            FieldType::Time => row.try_get_unchecked::<NaiveTime, _>(index).map(FetchedCell::Time),
            FieldType::DateTime | FieldType::Timestamp => row
                .try_get_unchecked::<NaiveDateTime, _>(index)
                .map(FetchedCell::DateTime),
            _ => row.try_get_unchecked::<Vec<u8>, _>(index).map(FetchedCell::Bytes),
        };
        cell.ok()
    }

    /// Write one fetched column value into the buffer, NULL when absent
    #[allow(clippy::cast_possible_wrap)]
    pub(crate) fn store(&mut self, cell: Option<FetchedCell>) {
        match cell {
            None => self.set_null(),
            Some(FetchedCell::Unsigned(integer)) => self.write_integer(integer as i64),
            Some(FetchedCell::Signed(integer)) => self.write_integer(integer),
            Some(FetchedCell::Float(float)) => self.write(&float.to_le_bytes()),
            Some(FetchedCell::Double(double)) => self.write(&double.to_le_bytes()),
            Some(FetchedCell::Text(text)) => self.write(text.as_bytes()),
            Some(FetchedCell::Bytes(bytes)) => self.write(&bytes),
            Some(FetchedCell::Date(date)) => self.write(&NativeTime::from_date(&date).to_bytes()),
            Some(FetchedCell::Time(time_of_day)) => {
                self.write(&NativeTime::from_time(&time_of_day).to_bytes());
            }
            Some(FetchedCell::DateTime(datetime)) => {
                self.write(&NativeTime::from_datetime(&datetime).to_bytes());
            }
        }
    }

    /// Little-endian integer, sign extended unless the column is unsigned
    fn read_integer(&self) -> i64 {
        let mut bytes = [0_u8; 8];
        let width = self.buffer.len().min(8);
        bytes[..width].copy_from_slice(&self.buffer[..width]);
        let negative = width > 0 && self.buffer[width - 1] & 0x80 != 0;
        if negative && !self.is_unsigned {
            bytes[width..].fill(0xFF);
        }
        i64::from_le_bytes(bytes)
    }

    fn read_f64(&self) -> Option<f64> {
        match self.field_type {
            FieldType::Float => {
                let bytes: [u8; 4] = self.buffer.get(..4)?.try_into().ok()?;
                Some(f64::from(f32::from_le_bytes(bytes)))
            }
            _ => {
                let bytes: [u8; 8] = self.buffer.get(..8)?.try_into().ok()?;
                Some(f64::from_le_bytes(bytes))
            }
        }
    }

    fn native_time(&self) -> Option<NativeTime> {
        NativeTime::from_bytes(&self.buffer)
    }

    /// Decode the buffer
    ///
    /// Text that is not valid UTF-8 and temporal values that do not form a
    /// valid date or time become `Value::Null`.
    #[must_use]
    pub fn value(&self, time_zone: TimeZone) -> Value {
        if self.is_null {
            return Value::Null;
        }

        let decoded = match self.field_type {
            FieldType::Null => None,
            field_type if field_type.is_integer() => Some(Value::Integer(self.read_integer())),
            FieldType::Float | FieldType::Double => self.read_f64().map(Value::Double),
            FieldType::Decimal => std::str::from_utf8(&self.buffer)
                .ok()
                .and_then(|text| text.trim().parse::<f64>().ok())
                .map(Value::Double),
            FieldType::Date => self.native_time().and_then(|native| native.date()).map(Value::Date),
            FieldType::Time => self.native_time().and_then(|native| native.time()).map(Value::Time),
            FieldType::DateTime | FieldType::Timestamp => self
                .native_time()
                .and_then(|native| native.datetime())
                .and_then(|naive| time::localize(&naive, time_zone))
                .map(Value::Timestamp),
            FieldType::Bit => Some(Value::Integer(
                self.buffer
                    .iter()
                    .fold(0_i64, |acc, byte| (acc << 8) | i64::from(*byte)),
            )),
            _ if self.is_binary => Some(Value::Binary(self.buffer.clone())),
            _ => String::from_utf8(self.buffer.clone()).ok().map(Value::String),
        };

        decoded.unwrap_or(Value::Null)
    }

    /// Attach this input to a query as the next positional argument
    pub(crate) fn bind<'q>(&self, query: MysqlQuery<'q>) -> MysqlQuery<'q> {
        if self.is_null {
            return query.bind(None::<String>);
        }

        match self.field_type {
            field_type if field_type.is_integer() => query.bind(self.read_integer()),
            FieldType::Float | FieldType::Double => query.bind(self.read_f64()),
            FieldType::Date => query.bind(self.native_time().and_then(|native| native.date())),
            FieldType::Time => query.bind(self.native_time().and_then(|native| native.time())),
            FieldType::DateTime | FieldType::Timestamp => {
                query.bind(self.native_time().and_then(|native| native.datetime()))
            }
            _ if self.is_binary => query.bind(self.buffer.clone()),
            _ => query.bind(String::from_utf8_lossy(&self.buffer).into_owned()),
        }
    }
}

/// The inputs or the outputs of one statement
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MysqlBindParameterSet {
    parameters: Vec<MysqlBindParameter>,
}

impl MysqlBindParameterSet {
    /// Input buffers for positional parameters
    #[must_use]
    pub fn inputs(values: &[Value], time_zone: TimeZone) -> Self {
        Self {
            parameters: values
                .iter()
                .map(|value| MysqlBindParameter::input(value, time_zone))
                .collect(),
        }
    }

    /// Output buffers for a statement's result columns
    #[must_use]
    pub fn outputs(fields: &[MysqlField]) -> Self {
        Self {
            parameters: fields.iter().map(MysqlBindParameter::output).collect(),
        }
    }

    /// Number of parameters
    #[must_use]
    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    /// Whether the set is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    /// Parameter at a position
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&MysqlBindParameter> {
        self.parameters.get(index)
    }

    /// Iterate over the parameters in order
    pub fn iter(&self) -> impl Iterator<Item = &MysqlBindParameter> {
        self.parameters.iter()
    }

    pub(crate) fn bind<'q>(&self, query: MysqlQuery<'q>) -> MysqlQuery<'q> {
        self.parameters
            .iter()
            .fold(query, |query, parameter| parameter.bind(query))
    }

    /// Load every output slot from a fetched row
    pub fn fill(&mut self, row: &MySqlRow) {
        let cells: Vec<_> = self
            .parameters
            .iter()
            .enumerate()
            .map(|(index, parameter)| parameter.read_cell(row, index))
            .collect();
        self.store(cells);
    }

    /// Load the output slots in column order, missing cells become NULL
    pub(crate) fn store(&mut self, cells: impl IntoIterator<Item = Option<FetchedCell>>) {
        let mut cells = cells.into_iter();
        for parameter in &mut self.parameters {
            parameter.store(cells.next().flatten());
        }
    }

    /// Decode every slot
    #[must_use]
    pub fn values(&self, time_zone: TimeZone) -> Vec<Value> {
        self.parameters
            .iter()
            .map(|parameter| parameter.value(time_zone))
            .collect()
    }
}
