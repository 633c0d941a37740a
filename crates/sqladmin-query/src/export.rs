//! Export collaborator: serialises a realised table to an output format

use std::io::Write;

use crate::{ExportError, TableResult};

/// Serialises a table; the core does not care about the format
pub trait ResultExporter {
    /// File extension for the produced format, without the dot
    fn extension(&self) -> &'static str;

    fn export(&self, result: &TableResult, out: &mut dyn Write) -> Result<(), ExportError>;
}

/// Comma-separated values with a header row
///
/// Cells use each value's display form; NULL is written as an empty field.
#[derive(Debug, Clone, Copy, Default)]
pub struct CsvExporter {
    /// Field delimiter, `,` unless set
    pub delimiter: Option<u8>,
}

impl CsvExporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = Some(delimiter);
        self
    }
}

impl ResultExporter for CsvExporter {
    fn extension(&self) -> &'static str {
        "csv"
    }

    fn export(&self, result: &TableResult, out: &mut dyn Write) -> Result<(), ExportError> {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(self.delimiter.unwrap_or(b','))
            .from_writer(out);

        writer.write_record(result.column_names())?;

        for row in &result.rows {
            let record: Vec<String> = row
                .values
                .iter()
                .map(|value| {
                    if value.is_null() {
                        String::new()
                    } else {
                        value.to_string()
                    }
                })
                .collect();
            writer.write_record(&record)?;
        }

        writer.flush()?;
        tracing::debug!(rows = result.rows.len(), "exported result as CSV");
        Ok(())
    }
}
