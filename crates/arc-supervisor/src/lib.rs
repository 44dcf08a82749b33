//! Job lifecycle, execution-mode dispatch, and Output Assembler (spec §4.I,
//! §4.J). This is the crate a caller actually drives: everything below it is
//! a building block, and `arc-cli`'s `run-sync` demonstrator is the only
//! consumer so far.

#![warn(missing_docs)]

mod assembler;
mod plan;
mod supervisor;

pub use assembler::{
    CompRentalOutput, CompSaleOutput, DossierOutput, EvidenceOutput, ResearchOutput, RiskScoreOutput, UnderwriteOutput,
    WorkerRunOutput,
};
pub use plan::build_specs;
pub use supervisor::Supervisor;
