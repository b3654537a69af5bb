//! Table and column mapping of the measurement store
//!
//! The store is owned by the measurement software, so every identifier is
//! configurable. All SQL text is generated here with quoted identifiers;
//! values are always bound.

/// Column mapping of the monitored table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreSchema {
    pub table: String,
    pub key_column: String,
    pub serial_column: String,
    pub timestamp_column: String,
    /// Decimal measurement columns, in label order
    pub measurement_columns: Vec<String>,
    pub print_count_column: String,
    /// Whether the print counter is read and written
    pub track_print_count: bool,
}

impl Default for StoreSchema {
    fn default() -> Self {
        Self {
            table: "TestResults".to_string(),
            key_column: "ID".to_string(),
            serial_column: "SerialNumber".to_string(),
            timestamp_column: "TestTime".to_string(),
            measurement_columns: vec![
                "Resistance".to_string(),
                "Voltage".to_string(),
                "Current".to_string(),
                "Leakage".to_string(),
            ],
            print_count_column: "PrintCount".to_string(),
            track_print_count: false,
        }
    }
}

/// Quote an SQL identifier, doubling embedded quotes
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

impl StoreSchema {
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    pub fn with_print_count(mut self, enabled: bool) -> Self {
        self.track_print_count = enabled;
        self
    }

    fn table_ident(&self) -> String {
        quote_ident(&self.table)
    }

    fn select_columns(&self) -> String {
        let mut cols = vec![
            quote_ident(&self.key_column),
            quote_ident(&self.serial_column),
            quote_ident(&self.timestamp_column),
        ];
        cols.extend(self.measurement_columns.iter().map(|c| quote_ident(c)));
        if self.track_print_count {
            cols.push(quote_ident(&self.print_count_column));
        }
        cols.join(", ")
    }

    fn newest_first(&self) -> String {
        format!(
            "ORDER BY {} DESC, {} DESC",
            quote_ident(&self.timestamp_column),
            quote_ident(&self.key_column)
        )
    }

    /// Liveness probe run by every connection strategy
    pub fn probe_sql(&self) -> String {
        format!("SELECT 1 FROM {} LIMIT 1", self.table_ident())
    }

    pub fn last_record_sql(&self) -> String {
        format!(
            "SELECT {} FROM {} {} LIMIT 1",
            self.select_columns(),
            self.table_ident(),
            self.newest_first()
        )
    }

    /// Bind: limit
    pub fn recent_records_sql(&self) -> String {
        format!(
            "SELECT {} FROM {} {} LIMIT ?",
            self.select_columns(),
            self.table_ident(),
            self.newest_first()
        )
    }

    /// Bind: key
    pub fn record_by_key_sql(&self) -> String {
        format!(
            "SELECT {} FROM {} WHERE {} = ?",
            self.select_columns(),
            self.table_ident(),
            quote_ident(&self.key_column)
        )
    }

    /// Bind: key. NULL counts as zero.
    pub fn increment_print_count_sql(&self) -> String {
        let pc = quote_ident(&self.print_count_column);
        format!(
            "UPDATE {} SET {pc} = COALESCE({pc}, 0) + 1 WHERE {} = ?",
            self.table_ident(),
            quote_ident(&self.key_column)
        )
    }

    pub fn table_info_sql(&self) -> String {
        format!("PRAGMA table_info({})", self.table_ident())
    }

    pub fn add_print_count_column_sql(&self) -> String {
        format!(
            "ALTER TABLE {} ADD COLUMN {} INTEGER DEFAULT 0",
            self.table_ident(),
            quote_ident(&self.print_count_column)
        )
    }

    pub fn zero_null_print_counts_sql(&self) -> String {
        let pc = quote_ident(&self.print_count_column);
        format!("UPDATE {} SET {pc} = 0 WHERE {pc} IS NULL", self.table_ident())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("TestResults"), "\"TestResults\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_last_record_sql() {
        let schema = StoreSchema {
            measurement_columns: vec!["R".into()],
            ..StoreSchema::default()
        };
        assert_eq!(
            schema.last_record_sql(),
            "SELECT \"ID\", \"SerialNumber\", \"TestTime\", \"R\" FROM \"TestResults\" \
             ORDER BY \"TestTime\" DESC, \"ID\" DESC LIMIT 1"
        );
    }

    #[test]
    fn test_print_count_column_only_when_tracked() {
        let schema = StoreSchema::default();
        assert!(!schema.recent_records_sql().contains("PrintCount"));

        let schema = schema.with_print_count(true);
        assert!(schema.recent_records_sql().contains("\"PrintCount\""));
        assert_eq!(
            schema.increment_print_count_sql(),
            "UPDATE \"TestResults\" SET \"PrintCount\" = COALESCE(\"PrintCount\", 0) + 1 WHERE \"ID\" = ?"
        );
    }
}
