//! Static domain context: schema text and the abbreviation glossary.
//!
//! Loaded once during process initialization into an immutable structure
//! and shared behind an `Arc`.  Never reloaded, safe for unsynchronized
//! concurrent reads.

use std::fmt::Write as _;
use std::path::Path;

/// Schema description shipped with the crate, used when no external schema
/// file is configured.
const BUILTIN_SCHEMA: &str = include_str!("../resources/schema.txt");

/// Abbreviations that appear in user questions, expanded in full in every
/// synthesis prompt.
const ABBREVIATIONS: &[(&str, &str)] = &[
    ("WO", "Work Order"),
    ("ISO", "Isometric Drawing"),
    ("MTR", "Material Test Report"),
    ("HT", "Heat Number"),
    ("SN", "Serial Number"),
    ("MAOP", "Maximum Allowable Operating Pressure"),
    ("SMYS", "Specified Minimum Yield Strength"),
    ("WPS", "Welding Procedure Specification"),
    ("PQR", "Procedure Qualification Record"),
    ("NDE", "Non-Destructive Examination"),
    ("HAZ", "Heat-Affected Zone"),
    ("API", "American Petroleum Institute"),
    ("ASME", "American Society of Mechanical Engineers"),
];

/// Immutable schema and glossary data for prompt assembly.
#[derive(Debug)]
pub struct DomainContext {
    schema: String,
}

impl DomainContext {
    /// Build the context from a schema file on disk.
    pub fn load(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let schema = std::fs::read_to_string(path)?;
        Ok(Self { schema })
    }

    /// Build the context from the schema shipped with the crate.
    pub fn builtin() -> Self {
        Self {
            schema: BUILTIN_SCHEMA.to_owned(),
        }
    }

    /// Build the context from an already-loaded schema string.
    pub fn from_schema(schema: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
        }
    }

    /// The raw schema text.
    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// The abbreviation glossary rendered one `- ABBR: expansion` line per
    /// entry, in declaration order.
    pub fn abbreviations(&self) -> String {
        let mut out = String::new();
        for (abbr, expansion) in ABBREVIATIONS {
            let _ = writeln!(out, "- {abbr}: {expansion}");
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_schema_names_core_tables() {
        let ctx = DomainContext::builtin();
        assert!(ctx.schema().contains("TransmissionWorkOrder"));
        assert!(ctx.schema().contains("TransmissionISOMainJoint"));
        assert!(ctx.schema().contains("CompanyMTRFile"));
        assert!(ctx.schema().contains("BinaryString"));
    }

    #[test]
    fn glossary_enumerates_every_abbreviation() {
        let ctx = DomainContext::builtin();
        let glossary = ctx.abbreviations();
        assert_eq!(glossary.lines().count(), ABBREVIATIONS.len());
        assert!(glossary.contains("- MTR: Material Test Report"));
        assert!(glossary.contains("- MAOP: Maximum Allowable Operating Pressure"));
    }

    #[test]
    fn load_reads_schema_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schema.txt");
        std::fs::write(&path, "Table: Widget\n").unwrap();

        let ctx = DomainContext::load(&path).unwrap();
        assert_eq!(ctx.schema(), "Table: Widget\n");
    }
}
