//! # tb-types
//!
//! Core types shared by the Tunebox crates: discretised parameter spaces,
//! the index-based points that search state is built from, target
//! definitions, and the error taxonomy.

pub mod errors;
pub mod space;
pub mod target;

pub use errors::*;
pub use space::*;
pub use target::*;
