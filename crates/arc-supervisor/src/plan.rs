//! Execution-mode dispatch (spec §4.H "execution mode selection", §4.I):
//! turns a Job's `execution_mode` and `extra_agents` into the ordered
//! [`AgentSpec`] list the scheduler runs.

use arc_config::ExtraAgentGroup;
use arc_core::ExecutionMode;
use arc_runtime::AgentSpec;
use std::collections::HashSet;

/// The fixed nine core workers, in the order spec §4.H's code block lists
/// them (pipeline mode runs exactly this chain; orchestrated mode runs the
/// same nine as a dependency graph instead of a chain).
const CORE_WORKER_ORDER: &[&str] = &[
    "normalize_geocode",
    "public_records",
    "permits_violations",
    "comps_sales",
    "comps_rentals",
    "neighborhood_intel",
    "flood_zone",
    "underwriting",
    "dossier_writer",
];

/// The eleven additional workers `extra_agents: ["extensive"]` unlocks
/// (spec §4.H: "all environmental + RapidAPI-backed"), beyond the
/// `flood_zone` lookup already in the core nine.
const EXTENSIVE_WORKER_ORDER: &[&str] = &[
    "epa_environmental",
    "wildfire_hazard",
    "hud_opportunity",
    "wetlands",
    "historic_places",
    "seismic_hazard",
    "school_district",
    "us_real_estate",
    "walk_score",
    "redfin",
    "rentcast",
];

fn pipeline_specs() -> Vec<AgentSpec> {
    let mut specs = Vec::with_capacity(CORE_WORKER_ORDER.len());
    for (i, name) in CORE_WORKER_ORDER.iter().enumerate() {
        specs.push(match i {
            0 => AgentSpec::new(*name),
            _ => AgentSpec::with_deps(*name, [CORE_WORKER_ORDER[i - 1]]),
        });
    }
    specs
}

fn orchestrated_core_specs() -> Vec<AgentSpec> {
    let mut specs = vec![
        AgentSpec::new("normalize_geocode"),
        AgentSpec::with_deps("public_records", ["normalize_geocode"]),
        AgentSpec::with_deps("permits_violations", ["normalize_geocode"]),
        AgentSpec::with_deps("comps_sales", ["normalize_geocode"]),
        AgentSpec::with_deps("comps_rentals", ["normalize_geocode"]),
        AgentSpec::with_deps("neighborhood_intel", ["normalize_geocode"]),
        AgentSpec::with_deps("flood_zone", ["normalize_geocode"]),
        AgentSpec::with_deps("underwriting", ["normalize_geocode", "comps_sales", "comps_rentals"]),
    ];
    let dossier_deps: HashSet<String> = specs.iter().map(|s| s.name.clone()).collect();
    specs.push(AgentSpec::with_deps("dossier_writer", dossier_deps));
    specs
}

/// Build the ordered spec list for one Job (spec §4.H): pipeline mode
/// chains the nine core workers serially; orchestrated mode runs them as a
/// dependency graph and may widen with `extra_agents`. When `max_steps` is
/// too small to fit the core set, extra agents are suppressed entirely and
/// the spec list is truncated to the first `max_steps` core entries, with
/// dangling dependencies pruned afterward.
#[must_use]
pub fn build_specs(execution_mode: ExecutionMode, extra_agents: &[ExtraAgentGroup], max_steps: u32) -> Vec<AgentSpec> {
    let max_steps = max_steps as usize;

    let mut specs = match execution_mode {
        ExecutionMode::Pipeline => pipeline_specs(),
        ExecutionMode::Orchestrated => orchestrated_core_specs(),
    };

    if execution_mode == ExecutionMode::Orchestrated && max_steps > specs.len() {
        let dossier_index = specs.iter().position(|s| s.name == "dossier_writer").expect("dossier_writer always present");

        let mut extra_names = Vec::new();
        if extra_agents.contains(&ExtraAgentGroup::SubdivisionResearch) {
            extra_names.push("subdivision_research".to_string());
        }
        if extra_agents.contains(&ExtraAgentGroup::Extensive) {
            extra_names.extend(EXTENSIVE_WORKER_ORDER.iter().map(|s| s.to_string()));
        }

        for name in &extra_names {
            specs.insert(dossier_index, AgentSpec::with_deps(name.clone(), ["normalize_geocode"]));
        }
        for name in &extra_names {
            specs.iter_mut().find(|s| s.name == "dossier_writer").expect("just inserted above").dependencies.insert(name.clone());
        }
    }

    if specs.len() > max_steps {
        specs.truncate(max_steps);
    }

    let scheduled_names: HashSet<String> = specs.iter().map(|s| s.name.clone()).collect();
    for spec in &mut specs {
        spec.prune_dangling(&scheduled_names);
    }
    specs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_mode_chains_nine_core_workers_serially() {
        let specs = build_specs(ExecutionMode::Pipeline, &[], 9);
        assert_eq!(specs.len(), 9);
        assert_eq!(specs[0].name, "normalize_geocode");
        assert!(specs[0].dependencies.is_empty());
        for i in 1..specs.len() {
            assert_eq!(specs[i].dependencies, [specs[i - 1].name.clone()].into_iter().collect());
        }
    }

    #[test]
    fn orchestrated_mode_fans_out_from_geocode() {
        let specs = build_specs(ExecutionMode::Orchestrated, &[], 9);
        assert_eq!(specs.len(), 9);
        let comps_sales = specs.iter().find(|s| s.name == "comps_sales").unwrap();
        assert_eq!(comps_sales.dependencies, ["normalize_geocode".to_string()].into_iter().collect());
        let dossier = specs.iter().find(|s| s.name == "dossier_writer").unwrap();
        assert_eq!(dossier.dependencies.len(), 8);
    }

    #[test]
    fn extensive_group_adds_eleven_workers_and_feeds_dossier() {
        let specs = build_specs(ExecutionMode::Orchestrated, &[ExtraAgentGroup::Extensive], 25);
        assert_eq!(specs.len(), 9 + 11);
        let dossier = specs.iter().find(|s| s.name == "dossier_writer").unwrap();
        assert!(dossier.dependencies.contains("walk_score"));
        assert!(dossier.dependencies.contains("epa_environmental"));
    }

    #[test]
    fn subdivision_research_depends_only_on_geocode() {
        let specs = build_specs(ExecutionMode::Orchestrated, &[ExtraAgentGroup::SubdivisionResearch], 20);
        let subdivision = specs.iter().find(|s| s.name == "subdivision_research").unwrap();
        assert_eq!(subdivision.dependencies, ["normalize_geocode".to_string()].into_iter().collect());
    }

    #[test]
    fn small_max_steps_suppresses_extra_agents_and_truncates_core() {
        let specs = build_specs(ExecutionMode::Orchestrated, &[ExtraAgentGroup::Extensive], 3);
        assert_eq!(specs.len(), 3);
        assert_eq!(specs.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(), vec!["normalize_geocode", "public_records", "permits_violations"]);
        let public_records = specs.iter().find(|s| s.name == "public_records").unwrap();
        assert_eq!(public_records.dependencies, ["normalize_geocode".to_string()].into_iter().collect());
    }
}
