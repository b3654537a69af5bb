//! Measurement Record Model

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Placeholder name of the primary key
pub const FIELD_ID: &str = "Id";
/// Placeholder name of the serial / business identifier
pub const FIELD_SERIAL: &str = "SerialNumber";
/// Placeholder name of the measurement timestamp
pub const FIELD_TIMESTAMP: &str = "TestTime";
/// Placeholder name of the print counter
pub const FIELD_PRINT_COUNT: &str = "PrintCount";

/// Timestamp layout used when a record field is rendered as text
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One named decimal measurement column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub name: String,
    /// `None` when the store holds NULL
    pub value: Option<f64>,
}

impl Measurement {
    pub fn new(name: impl Into<String>, value: Option<f64>) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// A row appended to the store by the measurement equipment.
///
/// The monitor never mutates a record except through the store's print
/// counter. `==` compares every field; [`Record::same_reading`] leaves the
/// counter out and is what the change detector compares with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub key: i64,
    pub serial: Option<String>,
    pub timestamp: Option<NaiveDateTime>,
    /// Measurement columns in configured order
    pub measurements: Vec<Measurement>,
    /// NULL in the store reads as 0
    pub print_count: i64,
}

/// A record field resolved by placeholder name
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue<'a> {
    Integer(i64),
    Decimal(Option<f64>),
    Text(Option<&'a str>),
    Timestamp(Option<NaiveDateTime>),
}

impl Record {
    pub fn new(key: i64) -> Self {
        Self {
            key,
            serial: None,
            timestamp: None,
            measurements: Vec::new(),
            print_count: 0,
        }
    }

    pub fn with_serial(mut self, serial: impl Into<String>) -> Self {
        self.serial = Some(serial.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: NaiveDateTime) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn with_measurement(mut self, name: impl Into<String>, value: Option<f64>) -> Self {
        self.measurements.push(Measurement::new(name, value));
        self
    }

    pub fn with_print_count(mut self, print_count: i64) -> Self {
        self.print_count = print_count;
        self
    }

    /// Find a measurement by column name
    pub fn measurement(&self, name: &str) -> Option<&Measurement> {
        self.measurements.iter().find(|m| m.name == name)
    }

    /// Resolve a placeholder name to a field value.
    ///
    /// Returns `None` when the name is not a field of this record, so
    /// callers can tell an unknown token apart from a NULL value.
    pub fn field(&self, name: &str) -> Option<FieldValue<'_>> {
        match name {
            FIELD_ID => Some(FieldValue::Integer(self.key)),
            FIELD_SERIAL => Some(FieldValue::Text(self.serial.as_deref())),
            FIELD_TIMESTAMP => Some(FieldValue::Timestamp(self.timestamp)),
            FIELD_PRINT_COUNT => Some(FieldValue::Integer(self.print_count)),
            other => self
                .measurement(other)
                .map(|m| FieldValue::Decimal(m.value)),
        }
    }

    /// Every placeholder name this record can resolve
    pub fn placeholder_names(&self) -> Vec<&str> {
        let mut names = vec![FIELD_ID, FIELD_SERIAL, FIELD_TIMESTAMP, FIELD_PRINT_COUNT];
        names.extend(self.measurements.iter().map(|m| m.name.as_str()));
        names
    }

    /// Same measured data, ignoring the print counter
    ///
    /// The counter is written by this service after each label, so it must
    /// not make a record look rewritten.
    pub fn same_reading(&self, other: &Record) -> bool {
        self.key == other.key
            && self.serial == other.serial
            && self.timestamp == other.timestamp
            && self.measurements == other.measurements
    }

    /// Whether this record has been printed before
    pub fn is_printed(&self) -> bool {
        self.print_count > 0
    }
}
