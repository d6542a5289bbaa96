/*
 * lib.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Source location primitives for the ginger template engine.
//!
//! This crate provides the location types shared by the lexer, the parser,
//! the template AST, and error payloads:
//!
//! - [`Location`]: an offset/row/column triple into template source
//! - [`Range`]: a start/end pair of locations
//! - offset↔location conversion helpers
//!
//! # Example
//!
//! ```rust
//! use ginger_source_map::*;
//!
//! let source = "Hello\nWorld";
//! let loc = offset_to_location(source, 7);
//! assert_eq!(loc, Location { offset: 7, row: 1, column: 1 });
//! ```

pub mod types;
pub mod utils;

pub use types::{Location, Range};
pub use utils::{line_col_to_offset, offset_to_location, range_at};
