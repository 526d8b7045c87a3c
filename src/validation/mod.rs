//! Validation functionality
//!
//! Provides validation logic for table specifications loaded into the
//! schema registry.

pub mod tables;

pub use tables::{SpecViolation, TableValidationResult, TableValidator, ViolationKind};
