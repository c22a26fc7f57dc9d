// 🔌 EAN Entity - One metering point of the sharing group
//
// The grid identifies every metering point by its EAN. In the export each EAN
// owns two adjacent columns ("before" and "after" sharing); we remember where
// the first of the two lives so every data row can be sliced without lookups.

use serde::{Deserialize, Serialize};

// ============================================================================
// EAN SIDE
// ============================================================================

/// Which side of the sharing group a metering point belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EanSide {
    /// Production source ("distribution", column marker `-D`)
    Producer,

    /// Consumption point (column marker `-O`)
    Consumer,
}

impl EanSide {
    /// Column suffix used by the export
    pub fn marker(&self) -> &'static str {
        match self {
            EanSide::Producer => "-D",
            EanSide::Consumer => "-O",
        }
    }

    pub fn from_marker(marker: &str) -> Option<Self> {
        match marker {
            "-D" => Some(EanSide::Producer),
            "-O" => Some(EanSide::Consumer),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EanSide::Producer => "producer",
            EanSide::Consumer => "consumer",
        }
    }
}

// ============================================================================
// EAN
// ============================================================================

/// Metering point identity: grid name + column of its "before" value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ean {
    name: String,
    csv_index: usize,
}

impl Ean {
    pub fn new(name: impl Into<String>, csv_index: usize) -> Self {
        Ean {
            name: name.into(),
            csv_index,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Zero-based column of the "before" field; "after" is the next column
    pub fn csv_index(&self) -> usize {
        self.csv_index
    }
}
