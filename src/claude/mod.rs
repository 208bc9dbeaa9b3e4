pub mod dictionary;
pub mod history;
pub mod paths;
pub mod sessions;

use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the three places Claude Code keys project data by path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    Sessions,
    History,
    Dictionary,
}

impl StoreKind {
    pub const ALL: [StoreKind; 3] = [Self::Sessions, Self::History, Self::Dictionary];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sessions => "sessions",
            Self::History => "history",
            Self::Dictionary => "dictionary",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == raw)
    }
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
