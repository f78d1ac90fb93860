use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoEnumIterator};

/// Physical production line. Each line owns its own production, buffer and reject tables.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
    EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ProductionLine {
    Liquid,
    Device,
    Cartridge,
}

/// Kind of out-of-range serial recorded against an MO
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, AsRefStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ExceptionKind {
    Buffer,
    Reject,
}

impl ProductionLine {
    pub fn all() -> Vec<ProductionLine> {
        ProductionLine::iter().collect()
    }

    pub fn production_table(self) -> &'static str {
        match self {
            ProductionLine::Liquid => "production_liquid",
            ProductionLine::Device => "production_device",
            ProductionLine::Cartridge => "production_cartridge",
        }
    }

    pub fn exception_table(self, kind: ExceptionKind) -> &'static str {
        match (kind, self) {
            (ExceptionKind::Buffer, ProductionLine::Liquid) => "buffer_liquid",
            (ExceptionKind::Buffer, ProductionLine::Device) => "buffer_device",
            (ExceptionKind::Buffer, ProductionLine::Cartridge) => "buffer_cartridge",
            (ExceptionKind::Reject, ProductionLine::Liquid) => "reject_liquid",
            (ExceptionKind::Reject, ProductionLine::Device) => "reject_device",
            (ExceptionKind::Reject, ProductionLine::Cartridge) => "reject_cartridge",
        }
    }

    /// Lowercase keywords matched against the free-text MO note. Cartridge
    /// tolerates the two misspellings operators commonly type.
    pub fn note_keywords(self) -> &'static [&'static str] {
        match self {
            ProductionLine::Liquid => &["liquid"],
            ProductionLine::Device => &["device"],
            ProductionLine::Cartridge => &["cartridge", "cartirdge", "cartrige"],
        }
    }

    /// Assigns an MO note to a line, first match wins.
    pub fn classify_note(note: &str) -> Option<ProductionLine> {
        let lower = note.to_lowercase();
        ProductionLine::iter().find(|line| line.note_keywords().iter().any(|k| lower.contains(k)))
    }
}
