//! Member progression and rewards engine for an agricultural loyalty program.
//!
//! Registrants are auto-approved from their occupation, then earn coins through
//! daily check-ins and points through missions, climb tiers as points accrue and
//! convert coins into points. Every balance change is an immutable ledger row
//! committed together with the member's running totals.

pub mod config;
pub mod error;
pub mod membership;
pub mod telemetry;
