//! Export a ledger snapshot to various formats

use crate::{Error, Result};
use contend_core::{EntryKind, LedgerSnapshot, LedgerStats};
use serde::Serialize;
use std::fmt;
use std::io::Write;
use std::str::FromStr;

/// Export format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    /// One `[<timestamp>] <originator> set <resource> = <value>` line per entry
    #[default]
    Text,
    /// RON format (Rust Object Notation)
    Ron,
    /// JSON format (requires serde_json feature)
    Json,
    /// CSV format, one row per log entry
    Csv,
}

impl ExportFormat {
    pub const ALL: [ExportFormat; 4] = [
        ExportFormat::Text,
        ExportFormat::Ron,
        ExportFormat::Json,
        ExportFormat::Csv,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ExportFormat::Text => "text",
            ExportFormat::Ron => "ron",
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ExportFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        ExportFormat::ALL
            .into_iter()
            .find(|format| format.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::Export(format!("unknown export format '{}'", s)))
    }
}

/// Exporter for a ledger snapshot
pub struct Exporter<'a> {
    snapshot: &'a LedgerSnapshot,
}

impl<'a> Exporter<'a> {
    /// Create a new exporter
    pub fn new(snapshot: &'a LedgerSnapshot) -> Self {
        Self { snapshot }
    }

    /// Export to a string in the specified format
    pub fn export(&self, format: ExportFormat) -> Result<String> {
        match format {
            ExportFormat::Text => Ok(self.to_text()),
            ExportFormat::Ron => self.to_ron(),
            ExportFormat::Json => self.to_json(),
            ExportFormat::Csv => Ok(self.to_csv()),
        }
    }

    /// Export to a writer
    pub fn export_to<W: Write>(&self, writer: &mut W, format: ExportFormat) -> Result<()> {
        let content = self.export(format)?;
        writer.write_all(content.as_bytes())?;
        writer.flush()?;
        Ok(())
    }

    /// The operation log, one line per entry, in append order
    ///
    /// Entries are not re-sorted by timestamp: a delayed resolution appears
    /// where it was committed.
    pub fn to_text(&self) -> String {
        let mut output = String::new();
        for entry in self.snapshot.entries() {
            output.push_str(&entry.to_string());
            output.push('\n');
        }
        output
    }

    /// Export to RON format
    pub fn to_ron(&self) -> Result<String> {
        let export = ExportData::from_snapshot(self.snapshot);
        ron::ser::to_string_pretty(&export, ron::ser::PrettyConfig::default())
            .map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Export to JSON format
    #[cfg(feature = "serde_json")]
    pub fn to_json(&self) -> Result<String> {
        let export = ExportData::from_snapshot(self.snapshot);
        serde_json::to_string_pretty(&export).map_err(|e| Error::Serialization(e.to_string()))
    }

    #[cfg(not(feature = "serde_json"))]
    pub fn to_json(&self) -> Result<String> {
        Err(Error::Export(
            "JSON export requires the 'serde_json' feature".to_string(),
        ))
    }

    /// Export to CSV format
    pub fn to_csv(&self) -> String {
        let mut output = String::new();
        output.push_str("index,timestamp,seq,originator,resource,value,kind\n");

        for entry in self.snapshot.entries() {
            let op = &entry.operation;
            let kind = match entry.kind {
                EntryKind::Direct => "direct",
                EntryKind::Resolved => "resolved",
            };
            output.push_str(&format!(
                "{},{},{},{},{},{},{}\n",
                entry.index,
                op.stamp(),
                op.stamp().seq,
                op.originator(),
                csv_field(op.resource().as_str()),
                csv_field(op.value()),
                kind
            ));
        }

        output
    }

    /// Short human-readable summary of the run
    pub fn summary(&self) -> String {
        let stats = self.snapshot.stats();
        let mut output = String::new();

        output.push_str("=== Run Summary ===\n");
        output.push_str(&format!("Log entries: {}\n", self.snapshot.len()));
        output.push_str(&format!("Direct commits: {}\n", stats.committed));
        output.push_str(&format!("Conflicts detected: {}\n", stats.conflicts_detected));
        output.push_str(&format!("Resolutions: {}\n", stats.resolved));
        output.push_str(&format!("Resources: {}\n", self.snapshot.registry().len()));

        for (resource, value) in self.snapshot.values() {
            output.push_str(&format!("  {} = {}\n", resource, value));
        }

        output
    }
}

/// Quote a CSV field when it holds a separator, quote, or line break
fn csv_field(raw: &str) -> String {
    if raw.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", raw.replace('"', "\"\""))
    } else {
        raw.to_string()
    }
}

/// Data structure for full snapshot export
#[derive(Debug, Serialize)]
struct ExportData<'a> {
    version: u32,
    stats: LedgerStats,
    snapshot: &'a LedgerSnapshot,
}

impl<'a> ExportData<'a> {
    fn from_snapshot(snapshot: &'a LedgerSnapshot) -> Self {
        Self {
            version: 1,
            stats: snapshot.stats(),
            snapshot,
        }
    }
}
