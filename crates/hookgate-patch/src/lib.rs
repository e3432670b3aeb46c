//! # hookgate-patch
//!
//! Unified diff analysis for review prompts.
//!
//! - [`parse`]: number every line on its old and new side
//! - [`prioritize`]: fit an oversized patch into a character budget, keeping
//!   the riskiest hunks
//! - [`snippet`]: pull a numbered line range (plus context) out of a parsed patch
//! - [`split_files`]: break a multi-file `diff --git` stream into per-file patches

#![deny(unsafe_code)]

pub mod analyzer;
pub mod files;
pub mod hunk;
pub mod parse;
pub mod prioritize;
pub mod snippet;

pub use analyzer::PatchAnalyzer;
pub use files::{FilePatch, split_files};
pub use hunk::{Hunk, LineKind};
pub use parse::{AnnotatedLine, ParsedPatch, parse};
pub use prioritize::prioritize;
pub use snippet::{NO_LINES_SENTINEL, Side, snippet, snippet_with_context};
