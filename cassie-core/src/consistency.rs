//! Consistency levels
//!
//! The discriminants match the store's own protocol enumeration so a level can
//! be forwarded to the transport without interpretation.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CassieError;

/// Number of replica acknowledgements an operation waits for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(i32)]
pub enum ConsistencyLevel {
    #[default]
    One = 1,
    Quorum = 2,
    LocalQuorum = 3,
    EachQuorum = 4,
    All = 5,
    Any = 6,
    Two = 7,
    Three = 8,
}

impl ConsistencyLevel {
    /// Every defined level, in protocol order
    pub const ALL: [ConsistencyLevel; 8] = [
        ConsistencyLevel::One,
        ConsistencyLevel::Quorum,
        ConsistencyLevel::LocalQuorum,
        ConsistencyLevel::EachQuorum,
        ConsistencyLevel::All,
        ConsistencyLevel::Any,
        ConsistencyLevel::Two,
        ConsistencyLevel::Three,
    ];

    /// The protocol value
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ConsistencyLevel::One => "ONE",
            ConsistencyLevel::Quorum => "QUORUM",
            ConsistencyLevel::LocalQuorum => "LOCAL_QUORUM",
            ConsistencyLevel::EachQuorum => "EACH_QUORUM",
            ConsistencyLevel::All => "ALL",
            ConsistencyLevel::Any => "ANY",
            ConsistencyLevel::Two => "TWO",
            ConsistencyLevel::Three => "THREE",
        }
    }
}

impl fmt::Display for ConsistencyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<i32> for ConsistencyLevel {
    type Error = CassieError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        ConsistencyLevel::ALL
            .into_iter()
            .find(|level| level.as_i32() == value)
            .ok_or_else(|| {
                CassieError::invalid_request(format!("Unknown consistency level: {}", value))
            })
    }
}

impl FromStr for ConsistencyLevel {
    type Err = CassieError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().replace('-', "_");
        ConsistencyLevel::ALL
            .into_iter()
            .find(|level| level.as_str().eq_ignore_ascii_case(&wanted))
            .ok_or_else(|| {
                CassieError::invalid_request(format!(
                    "Unknown consistency level: {}. Valid options: one, quorum, local_quorum, each_quorum, all, any, two, three",
                    s
                ))
            })
    }
}
