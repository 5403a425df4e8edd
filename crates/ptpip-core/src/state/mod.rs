//! Session state module.

pub mod data_phase;
pub mod machine;
pub mod transaction;

pub use data_phase::DataPhaseAssembler;
pub use machine::SessionState;
pub use transaction::TransactionIds;
