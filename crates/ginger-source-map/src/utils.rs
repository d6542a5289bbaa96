/*
 * utils.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Conversion helpers between byte offsets and row/column locations.

use crate::types::{Location, Range};

/// Convert a byte offset into a [`Location`] by scanning the source.
///
/// Columns count characters, not bytes. Offsets past the end of the
/// source are clamped to the final location.
pub fn offset_to_location(source: &str, offset: usize) -> Location {
    let mut row = 0;
    let mut column = 0;
    let mut current = 0;

    for ch in source.chars() {
        if current >= offset {
            break;
        }
        current += ch.len_utf8();
        if ch == '\n' {
            row += 1;
            column = 0;
        } else {
            column += 1;
        }
    }

    Location {
        offset: current.min(offset.min(source.len())),
        row,
        column,
    }
}

/// Convert a 0-indexed (row, column) pair into a byte offset.
///
/// Returns `None` if the row does not exist or the column lies beyond the
/// end of its line.
pub fn line_col_to_offset(source: &str, row: usize, column: usize) -> Option<usize> {
    let mut offset = 0;
    for (i, line) in source.split('\n').enumerate() {
        if i == row {
            let mut col_offset = 0;
            for (n, ch) in line.chars().enumerate() {
                if n == column {
                    return Some(offset + col_offset);
                }
                col_offset += ch.len_utf8();
            }
            if column == line.chars().count() {
                return Some(offset + col_offset);
            }
            return None;
        }
        offset += line.len() + 1;
    }
    None
}

/// Build a [`Range`] covering `source[start..end]`.
pub fn range_at(source: &str, start: usize, end: usize) -> Range {
    Range {
        start: offset_to_location(source, start),
        end: offset_to_location(source, end),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offset_to_location_first_line() {
        let loc = offset_to_location("hello\nworld", 3);
        assert_eq!(loc.row, 0);
        assert_eq!(loc.column, 3);
        assert_eq!(loc.offset, 3);
    }

    #[test]
    fn test_offset_to_location_second_line() {
        let loc = offset_to_location("hello\nworld", 8);
        assert_eq!(loc.row, 1);
        assert_eq!(loc.column, 2);
    }

    #[test]
    fn test_offset_to_location_clamps() {
        let loc = offset_to_location("abc", 100);
        assert_eq!(loc.offset, 3);
        assert_eq!(loc.row, 0);
        assert_eq!(loc.column, 3);
    }

    #[test]
    fn test_offset_to_location_multibyte() {
        // 'é' is two bytes but one column
        let loc = offset_to_location("é x", 3);
        assert_eq!(loc.column, 2);
    }

    #[test]
    fn test_line_col_to_offset_round_trip() {
        let source = "first\nsecond line\nthird";
        let offset = line_col_to_offset(source, 1, 3).unwrap();
        let loc = offset_to_location(source, offset);
        assert_eq!(loc.row, 1);
        assert_eq!(loc.column, 3);
    }

    #[test]
    fn test_line_col_to_offset_missing_row() {
        assert_eq!(line_col_to_offset("one line", 3, 0), None);
    }

    #[test]
    fn test_range_at() {
        let range = range_at("ab\ncd", 1, 4);
        assert_eq!(range.start.row, 0);
        assert_eq!(range.start.column, 1);
        assert_eq!(range.end.row, 1);
        assert_eq!(range.end.column, 1);
    }
}
