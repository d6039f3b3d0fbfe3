//! Purpose: Define the stable public Rust API boundary for xylem.
//! Exports: The converter entry point and its error types.
//! Role: Public, additive-only surface; hides internal module layout.
//! Invariants: This module is the only public path hosts should embed.
//! Invariants: `convert` never panics on any input; it always returns a result.

#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::core::convert::{convert, parse_element};
pub use crate::core::error::{Error, ErrorKind, TextPos};
