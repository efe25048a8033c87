//! Dispatch: render, send and record the outcome of each selected record.
//!
//! Per record, in selection order:
//! 1. Render subject and body
//! 2. Dry run → `success-dry`, nothing sent, nothing written back
//! 3. Send through the `MessageSender`
//! 4. Write the outcome back through the `RecordStore` (warn-only on failure)
//!
//! A failing record never stops the loop; its error lands in the report.

pub mod controller;
pub mod outcome;
pub mod report;

pub use controller::{DispatchController, DispatchSettings};
pub use outcome::{DispatchOutcome, OutcomeStatus};
pub use report::{BatchResult, FailureDetail, ResultAggregator, RunReport};
