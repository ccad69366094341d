//! Core types for Trellis.

pub mod content;
pub mod response;
pub mod usage;

pub use content::*;
pub use response::*;
pub use usage::*;
