/*
 * types.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Core types for source locations

use serde::{Deserialize, Serialize};

/// A location in source text (0-indexed)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Location {
    /// Byte offset from start of source
    pub offset: usize,
    /// Row number (0-indexed)
    pub row: usize,
    /// Column number (0-indexed, in characters not bytes)
    pub column: usize,
}

/// A range in source text from start to end
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    /// Start location (inclusive)
    pub start: Location,
    /// End location (exclusive)
    pub end: Location,
}

impl Range {
    /// Create a range spanning two locations.
    pub fn new(start: Location, end: Location) -> Self {
        Range { start, end }
    }

    /// A range covering both `self` and `other`.
    pub fn merge(&self, other: &Range) -> Range {
        Range {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_ordering() {
        let loc1 = Location {
            offset: 0,
            row: 0,
            column: 0,
        };
        let loc2 = Location {
            offset: 5,
            row: 0,
            column: 5,
        };
        let loc3 = Location {
            offset: 10,
            row: 1,
            column: 0,
        };

        assert!(loc1 < loc2);
        assert!(loc2 < loc3);
        assert!(loc1 < loc3);
    }

    #[test]
    fn test_range_merge() {
        let a = Range {
            start: Location {
                offset: 2,
                row: 0,
                column: 2,
            },
            end: Location {
                offset: 5,
                row: 0,
                column: 5,
            },
        };
        let b = Range {
            start: Location {
                offset: 4,
                row: 0,
                column: 4,
            },
            end: Location {
                offset: 9,
                row: 0,
                column: 9,
            },
        };

        let merged = a.merge(&b);
        assert_eq!(merged.start.offset, 2);
        assert_eq!(merged.end.offset, 9);
    }

    #[test]
    fn test_serialization_location() {
        let loc = Location {
            offset: 100,
            row: 5,
            column: 10,
        };
        let json = serde_json::to_string(&loc).unwrap();
        let deserialized: Location = serde_json::from_str(&json).unwrap();
        assert_eq!(loc, deserialized);
    }

    #[test]
    fn test_serialization_range() {
        let range = Range {
            start: Location {
                offset: 0,
                row: 0,
                column: 0,
            },
            end: Location {
                offset: 50,
                row: 2,
                column: 10,
            },
        };
        let json = serde_json::to_string(&range).unwrap();
        let deserialized: Range = serde_json::from_str(&json).unwrap();
        assert_eq!(range, deserialized);
    }
}
