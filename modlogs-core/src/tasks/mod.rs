// File: modlogs-core/src/tasks/mod.rs

pub mod reconcile;

pub use reconcile::{ReconcileReport, run_reconciliation};
