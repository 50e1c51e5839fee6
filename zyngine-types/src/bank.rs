use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// One entry of a bank/preset listing built from files, directories or
/// command output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListEntry {
    pub path: PathBuf,
    pub index: usize,
    pub title: String,
    /// Label of the root the entry came from; `None` for an unlabeled root.
    pub label: Option<String>,
}

/// A bank, selected on the engine with a bank-select MSB equal to its index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bank {
    pub entry: ListEntry,
}

impl Bank {
    pub fn msb(&self) -> u8 {
        self.entry.index.min(127) as u8
    }
}

impl From<ListEntry> for Bank {
    fn from(entry: ListEntry) -> Self {
        Self { entry }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preset {
    pub name: String,
    pub bank_msb: u8,
    pub bank_lsb: u8,
    pub program: u8,
}
