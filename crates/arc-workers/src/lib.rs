//! The worker implementations that populate a Job's property profile, comps,
//! underwriting, risk score, and dossier (spec §4.E). Each worker is a plain
//! value implementing [`arc_protocol::Worker`], capturing whatever adapters
//! or fixtures it needs as struct fields (spec §9: "model each worker as a
//! capability value in a registry map, not a class hierarchy").

#![warn(missing_docs)]

pub mod comps;
pub mod crm;
pub mod dossier;
pub mod environmental;
pub mod geocode;
pub mod neighborhood;
pub mod profile;
pub mod rapidapi;
pub mod registry;
pub mod search_workers;
pub mod underwriting;

use arc_config::Assumptions;
use arc_core::Job;

/// Parse a Job's free-form `assumptions` into the closed [`Assumptions`]
/// record, ignoring advisory warnings (the supervisor already surfaced them
/// at `create_job` time; a worker only needs the resolved values).
#[must_use]
pub(crate) fn resolved_assumptions(job: &Job) -> Assumptions {
    arc_config::validate(&job.assumptions).map(|(assumptions, _)| assumptions).unwrap_or_default()
}
