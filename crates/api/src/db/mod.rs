//! Database schema, migrations, and query builders.
//!
//! Every builder for tenant data takes the owning `dentist_id` and filters on
//! it. Rows that only reference a dentist indirectly (chart slots, tooth
//! treatments) are filtered through their owning patient or appointment.

pub mod appointments;
pub mod contact;
pub mod dentists;
pub mod medicines;
pub mod migrations;
pub mod patients;
pub mod payments;
pub mod tables;
pub mod teeth;
pub mod tokens;
pub mod tooth_treatments;
pub mod treatments;

// Re-export tables for convenience
pub use tables::*;

/// A built statement: SQL text plus bound values.
pub type Built = (String, sea_query::Values);
