//! Validated job input for the Agentic Research Core.
//!
//! [`ResearchInput`] is the closed, enumerated shape `Supervisor::create_job`
//! accepts (spec §6.1, §9). `assumptions` arrives as a free-form JSON map;
//! [`validate`] turns it into a typed [`Assumptions`] record plus a list of
//! advisory [`ConfigWarning`]s for anything it didn't recognize, rather than
//! silently dropping unknown keys.

#![warn(missing_docs)]

use arc_core::{ExecutionMode, Limits, RehabTier, Strategy};
use arc_error::{ErrorCode, ResearchError};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Extra worker groups an orchestrated-mode Job can opt into (spec §4.H).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ExtraAgentGroup {
    /// Adds the `subdivision_research` worker.
    SubdivisionResearch,
    /// Adds the full environmental/RapidAPI-backed worker set (up to 11).
    Extensive,
}

impl ExtraAgentGroup {
    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "subdivision_research" => Some(Self::SubdivisionResearch),
            "extensive" => Some(Self::Extensive),
            _ => None,
        }
    }
}

/// The closed set of `assumptions` keys the core recognizes (spec §6.1).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Assumptions {
    /// Whether a fresh CRM/skip-trace/Zillow enrichment is required to start.
    pub require_enriched_data: Option<bool>,
    /// Freshness TTL in hours for the enrichment gate.
    pub enriched_max_age_hours: Option<u32>,
    /// Rehab scope tier used by underwriting; unrecognized values coerce to
    /// [`RehabTier::Medium`] rather than erroring.
    pub rehab_tier: Option<RehabTier>,
    /// Flat closing-cost fee. Defaults to 5000.0 when absent.
    pub closing_cost: Option<f64>,
    /// Flat holding-cost fee. Defaults to 3000.0 when absent.
    pub holding_cost: Option<f64>,
    /// Wholesale assignment fee. Defaults to 10000.0 when absent (wholesale only).
    pub assignment_fee: Option<f64>,
    /// Flat miscellaneous fee. Defaults to 1500.0 when absent.
    pub misc_fee: Option<f64>,
    /// Target margin used by the flip offer formula. Defaults to 0.20.
    pub target_margin: Option<f64>,
    /// Relative-delta threshold for valuation-conflict flags. Defaults to 0.30.
    pub valuation_conflict_threshold: Option<f64>,
    /// Comp-search radius for sales, in miles. Defaults to `default_radius(city)`.
    pub sales_radius_mi: Option<f64>,
    /// Comp-search radius for rentals, in miles.
    pub rental_radius_mi: Option<f64>,
    /// Relaxed sales radius used when the primary search is short of the minimum.
    pub sales_fallback_radius_mi: Option<f64>,
    /// Relaxed rentals radius used when the primary search is short of the minimum.
    pub rental_fallback_radius_mi: Option<f64>,
    /// Minimum sales comps to try to return. Defaults to 5.
    pub min_sales_comps: Option<u32>,
    /// Minimum rental comps to try to return. Defaults to 5.
    pub min_rental_comps: Option<u32>,
    /// Extra worker groups to schedule (orchestrated mode only).
    pub extra_agents: Vec<ExtraAgentGroup>,
    /// Free-text query augmentation for `subdivision_research`.
    pub subdivision_goal: Option<String>,
}

impl Assumptions {
    /// `closing_cost` or its default.
    #[must_use]
    pub fn closing_cost(&self) -> f64 {
        self.closing_cost.unwrap_or(5000.0)
    }
    /// `holding_cost` or its default.
    #[must_use]
    pub fn holding_cost(&self) -> f64 {
        self.holding_cost.unwrap_or(3000.0)
    }
    /// `assignment_fee` or its default (only meaningful for wholesale).
    #[must_use]
    pub fn assignment_fee(&self) -> f64 {
        self.assignment_fee.unwrap_or(10000.0)
    }
    /// `misc_fee` or its default.
    #[must_use]
    pub fn misc_fee(&self) -> f64 {
        self.misc_fee.unwrap_or(1500.0)
    }
    /// `target_margin` or its default.
    #[must_use]
    pub fn target_margin(&self) -> f64 {
        self.target_margin.unwrap_or(0.20)
    }
    /// `valuation_conflict_threshold` or its default.
    #[must_use]
    pub fn valuation_conflict_threshold(&self) -> f64 {
        self.valuation_conflict_threshold.unwrap_or(0.30)
    }
    /// `min_sales_comps` or its default.
    #[must_use]
    pub fn min_sales_comps(&self) -> u32 {
        self.min_sales_comps.unwrap_or(5)
    }
    /// `min_rental_comps` or its default.
    #[must_use]
    pub fn min_rental_comps(&self) -> u32 {
        self.min_rental_comps.unwrap_or(5)
    }
    /// The rehab tier, defaulting to [`RehabTier::Medium`].
    #[must_use]
    pub fn rehab_tier(&self) -> RehabTier {
        self.rehab_tier.unwrap_or_default()
    }
}

/// Advisory issue surfaced from [`validate`] without failing the Job.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigWarning {
    /// An `assumptions` key outside the recognized set was supplied.
    UnknownAssumptionKey {
        /// The unrecognized key.
        key: String,
    },
    /// `extra_agents` contained a token that isn't a known group.
    UnrecognizedExtraAgent {
        /// The unrecognized token.
        token: String,
    },
    /// `rehab_tier` was present but not one of `light`/`medium`/`heavy`;
    /// coerced to `medium` per spec §4.E.4.
    RehabTierCoerced {
        /// The value supplied.
        raw: String,
    },
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownAssumptionKey { key } => write!(f, "unrecognized assumptions key '{key}'"),
            Self::UnrecognizedExtraAgent { token } => write!(f, "unrecognized extra_agents token '{token}'"),
            Self::RehabTierCoerced { raw } => write!(f, "assumptions.rehab_tier '{raw}' is not recognized; coerced to 'medium'"),
        }
    }
}

const RECOGNIZED_KEYS: &[&str] = &[
    "require_enriched_data",
    "enriched_max_age_hours",
    "rehab_tier",
    "closing_cost",
    "holding_cost",
    "assignment_fee",
    "misc_fee",
    "target_margin",
    "valuation_conflict_threshold",
    "sales_radius_mi",
    "rental_radius_mi",
    "sales_fallback_radius_mi",
    "rental_fallback_radius_mi",
    "min_sales_comps",
    "min_rental_comps",
    "extra_agents",
    "subdivision_goal",
];

/// Parse a free-form `assumptions` JSON map into [`Assumptions`], returning
/// advisory warnings for anything unrecognized.
///
/// # Errors
/// Returns [`ErrorCode::InputInvalid`] when a recognized key holds a value
/// of the wrong shape (e.g. `enriched_max_age_hours` not a positive integer).
pub fn validate(raw: &BTreeMap<String, Value>) -> Result<(Assumptions, Vec<ConfigWarning>), ResearchError> {
    let mut warnings = Vec::new();
    let mut out = Assumptions::default();

    for key in raw.keys() {
        if !RECOGNIZED_KEYS.contains(&key.as_str()) {
            warnings.push(ConfigWarning::UnknownAssumptionKey { key: key.clone() });
        }
    }

    if let Some(v) = raw.get("require_enriched_data") {
        out.require_enriched_data = Some(v.as_bool().ok_or_else(|| {
            ResearchError::new(ErrorCode::InputInvalid, "assumptions.require_enriched_data must be a boolean")
        })?);
    }

    if let Some(v) = raw.get("enriched_max_age_hours") {
        let value = v
            .as_i64()
            .ok_or_else(|| ResearchError::new(ErrorCode::InputInvalid, "assumptions.enriched_max_age_hours must be a positive integer"))?;
        if value <= 0 {
            return Err(ResearchError::new(
                ErrorCode::InputInvalid,
                "assumptions.enriched_max_age_hours must be a positive integer",
            ));
        }
        out.enriched_max_age_hours = Some(value as u32);
    }

    if let Some(v) = raw.get("rehab_tier") {
        let raw_str = v
            .as_str()
            .ok_or_else(|| ResearchError::new(ErrorCode::InputInvalid, "assumptions.rehab_tier must be a string"))?;
        let tier = RehabTier::coerce(raw_str);
        if !matches!(raw_str, "light" | "medium" | "heavy") {
            warnings.push(ConfigWarning::RehabTierCoerced { raw: raw_str.to_string() });
        }
        out.rehab_tier = Some(tier);
    }

    for (key, field) in [
        ("closing_cost", &mut out.closing_cost),
        ("holding_cost", &mut out.holding_cost),
        ("assignment_fee", &mut out.assignment_fee),
        ("misc_fee", &mut out.misc_fee),
        ("target_margin", &mut out.target_margin),
        ("valuation_conflict_threshold", &mut out.valuation_conflict_threshold),
        ("sales_radius_mi", &mut out.sales_radius_mi),
        ("rental_radius_mi", &mut out.rental_radius_mi),
        ("sales_fallback_radius_mi", &mut out.sales_fallback_radius_mi),
        ("rental_fallback_radius_mi", &mut out.rental_fallback_radius_mi),
    ] {
        if let Some(v) = raw.get(key) {
            *field = Some(
                v.as_f64()
                    .ok_or_else(|| ResearchError::new(ErrorCode::InputInvalid, format!("assumptions.{key} must be a number")))?,
            );
        }
    }

    for (key, field) in [("min_sales_comps", &mut out.min_sales_comps), ("min_rental_comps", &mut out.min_rental_comps)] {
        if let Some(v) = raw.get(key) {
            let value = v
                .as_u64()
                .ok_or_else(|| ResearchError::new(ErrorCode::InputInvalid, format!("assumptions.{key} must be a non-negative integer")))?;
            *field = Some(value as u32);
        }
    }

    if let Some(v) = raw.get("extra_agents") {
        let tokens = v
            .as_array()
            .ok_or_else(|| ResearchError::new(ErrorCode::InputInvalid, "assumptions.extra_agents must be an array of strings"))?;
        for token_value in tokens {
            let token = token_value
                .as_str()
                .ok_or_else(|| ResearchError::new(ErrorCode::InputInvalid, "assumptions.extra_agents entries must be strings"))?;
            match ExtraAgentGroup::parse(token) {
                Some(group) => out.extra_agents.push(group),
                None => warnings.push(ConfigWarning::UnrecognizedExtraAgent { token: token.to_string() }),
            }
        }
    }

    if let Some(v) = raw.get("subdivision_goal") {
        out.subdivision_goal = Some(
            v.as_str()
                .ok_or_else(|| ResearchError::new(ErrorCode::InputInvalid, "assumptions.subdivision_goal must be a string"))?
                .to_string(),
        );
    }

    Ok((out, warnings))
}

/// The validated, closed shape of a `create_job` request (spec §6.1).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ResearchInput {
    /// Street address as supplied by the caller. Required.
    pub address: String,
    /// City, if known.
    #[serde(default)]
    pub city: Option<String>,
    /// State (full name or 2-letter code), if known.
    #[serde(default)]
    pub state: Option<String>,
    /// ZIP code, if known.
    #[serde(default)]
    pub zip: Option<String>,
    /// Assessor's Parcel Number, if known.
    #[serde(default)]
    pub apn: Option<String>,
    /// Investment framing. Defaults to wholesale.
    #[serde(default)]
    pub strategy: Strategy,
    /// Scheduling mode. Defaults to pipeline.
    #[serde(default)]
    pub mode: ExecutionMode,
    /// Free-form assumption overrides; validated by [`validate`].
    #[serde(default)]
    pub assumptions: BTreeMap<String, Value>,
    /// Resource limit overrides; defaults come from [`Limits::default`].
    #[serde(default)]
    pub limits: Option<PartialLimits>,
}

/// A partial [`Limits`] override; unset fields fall back to the default.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct PartialLimits {
    /// See [`Limits::max_steps`].
    pub max_steps: Option<u32>,
    /// See [`Limits::max_web_calls`].
    pub max_web_calls: Option<u32>,
    /// See [`Limits::timeout_seconds_per_step`].
    pub timeout_seconds_per_step: Option<u32>,
    /// See [`Limits::max_parallel_agents`].
    pub max_parallel_agents: Option<u32>,
}

impl PartialLimits {
    /// Merge onto the default [`Limits`], with `execution_mode` taken from
    /// the enclosing [`ResearchInput::mode`] (spec §4.I: `create_job`
    /// merges `{execution_mode: input.mode}` into the limits record).
    #[must_use]
    pub fn merge(&self, execution_mode: ExecutionMode) -> Limits {
        let defaults = Limits::default();
        Limits {
            max_steps: self.max_steps.unwrap_or(defaults.max_steps),
            max_web_calls: self.max_web_calls.unwrap_or(defaults.max_web_calls),
            timeout_seconds_per_step: self.timeout_seconds_per_step.unwrap_or(defaults.timeout_seconds_per_step),
            max_parallel_agents: self.max_parallel_agents.unwrap_or(defaults.max_parallel_agents),
            execution_mode,
        }
    }
}

impl ResearchInput {
    /// Validate `assumptions` and resolve final [`Limits`], returning any
    /// advisory warnings alongside.
    ///
    /// # Errors
    /// Propagates [`validate`]'s `InputInvalid` errors; also rejects a blank
    /// `address`.
    pub fn resolve(&self) -> Result<(Assumptions, Limits, Vec<ConfigWarning>), ResearchError> {
        if self.address.trim().is_empty() {
            return Err(ResearchError::new(ErrorCode::InputInvalid, "address must not be blank"));
        }
        let (assumptions, warnings) = validate(&self.assumptions)?;
        let limits = self
            .limits
            .as_ref()
            .map_or_else(|| Limits { execution_mode: self.mode, ..Limits::default() }, |p| p.merge(self.mode));
        Ok((assumptions, limits, warnings))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(pairs: &[(&str, Value)]) -> BTreeMap<String, Value> {
        pairs.iter().map(|(k, v)| ((*k).to_string(), v.clone())).collect()
    }

    #[test]
    fn unknown_keys_produce_warnings_not_errors() {
        let raw = map(&[("made_up_knob", json!(true))]);
        let (_, warnings) = validate(&raw).unwrap();
        assert_eq!(warnings, vec![ConfigWarning::UnknownAssumptionKey { key: "made_up_knob".into() }]);
    }

    #[test]
    fn invalid_enriched_max_age_hours_is_input_invalid() {
        let raw = map(&[("enriched_max_age_hours", json!(-5))]);
        let err = validate(&raw).unwrap_err();
        assert_eq!(err.code, ErrorCode::InputInvalid);
    }

    #[test]
    fn unrecognized_rehab_tier_coerces_to_medium_with_warning() {
        let raw = map(&[("rehab_tier", json!("gut-it"))]);
        let (assumptions, warnings) = validate(&raw).unwrap();
        assert_eq!(assumptions.rehab_tier(), RehabTier::Medium);
        assert!(warnings.iter().any(|w| matches!(w, ConfigWarning::RehabTierCoerced { .. })));
    }

    #[test]
    fn extra_agents_parses_known_tokens() {
        let raw = map(&[("extra_agents", json!(["extensive", "subdivision_research"]))]);
        let (assumptions, warnings) = validate(&raw).unwrap();
        assert_eq!(assumptions.extra_agents.len(), 2);
        assert!(warnings.is_empty());
    }

    #[test]
    fn blank_address_is_rejected() {
        let input = ResearchInput {
            address: "   ".into(),
            city: None,
            state: None,
            zip: None,
            apn: None,
            strategy: Strategy::Wholesale,
            mode: ExecutionMode::Pipeline,
            assumptions: BTreeMap::new(),
            limits: None,
        };
        assert!(input.resolve().is_err());
    }

    #[test]
    fn resolve_merges_execution_mode_into_limits() {
        let input = ResearchInput {
            address: "123 Main St".into(),
            city: None,
            state: None,
            zip: None,
            apn: None,
            strategy: Strategy::Flip,
            mode: ExecutionMode::Orchestrated,
            assumptions: BTreeMap::new(),
            limits: None,
        };
        let (_, limits, _) = input.resolve().unwrap();
        assert_eq!(limits.execution_mode, ExecutionMode::Orchestrated);
        assert_eq!(limits.max_steps, 9);
    }
}
