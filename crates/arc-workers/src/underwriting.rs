//! `underwriting`: synthesizes ARV/rent/rehab/offer ranges from the comp sets
//! plus a risk score from enrichment coverage and cross-source contradictions
//! (spec §4.G, grounded on `underwriting.py`).

use crate::profile::upstream_profile;
use arc_core::{Range3, RiskScore, SensitivityRow, Strategy, Underwriting};
use arc_protocol::{Worker, WorkerContext, WorkerOutput};
use async_trait::async_trait;
use std::collections::BTreeMap;

/// `underwriting`.
pub struct UnderwritingWorker;

impl UnderwritingWorker {
    /// No external dependencies; reads purely from the store and upstream data.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Default for UnderwritingWorker {
    fn default() -> Self {
        Self::new()
    }
}

fn mean(prices: &[f64]) -> Option<f64> {
    if prices.is_empty() {
        return None;
    }
    Some(prices.iter().sum::<f64>() / prices.len() as f64)
}

fn range_around(base: Option<f64>, low_multiplier: f64, high_multiplier: f64) -> Range3 {
    Range3 {
        low: base.map(|b| b * low_multiplier),
        base,
        high: base.map(|b| b * high_multiplier),
    }
}

fn sensitivity_table() -> Vec<SensitivityRow> {
    vec![
        SensitivityRow { scenario: "conservative".into(), arv_multiplier: 0.95, rent_multiplier: 0.95, offer_adjustment: -0.08 },
        SensitivityRow { scenario: "base".into(), arv_multiplier: 1.00, rent_multiplier: 1.00, offer_adjustment: 0.0 },
        SensitivityRow { scenario: "optimistic".into(), arv_multiplier: 1.05, rent_multiplier: 1.05, offer_adjustment: 0.08 },
    ]
}

#[async_trait]
impl Worker for UnderwritingWorker {
    fn name(&self) -> &str {
        "underwriting"
    }

    async fn run(&self, ctx: &WorkerContext) -> Result<WorkerOutput, String> {
        let assumptions = crate::resolved_assumptions(&ctx.job);
        let profile = upstream_profile(ctx).await;
        let strategy = ctx.job.strategy;

        let sales = ctx.store.list_comp_sales(ctx.job.id);
        let rentals = ctx.store.list_comp_rentals(ctx.job.id);

        let sale_prices: Vec<f64> = sales.iter().filter_map(|c| c.sale_price).collect();
        let rents: Vec<f64> = rentals.iter().filter_map(|c| c.rent).collect();

        let arv_base = mean(&sale_prices);
        let rent_base = mean(&rents);

        let mut unknowns = Vec::new();
        if arv_base.is_none() {
            unknowns.push(arc_core::Unknown { field: "arv_estimate".into(), reason: "No sales comps available to derive an ARV.".into() });
        }
        if rent_base.is_none() {
            unknowns.push(arc_core::Unknown { field: "rent_estimate".into(), reason: "No rental comps available to derive a rent estimate.".into() });
        }

        let arv_estimate = range_around(arv_base, 0.9, 1.1);
        let rent_estimate = range_around(rent_base, 0.9, 1.1);

        let rehab_tier = assumptions.rehab_tier();
        let sqft = profile.as_ref().and_then(|p| p.parcel_facts.sqft).unwrap_or(1500);
        let rehab_base = sqft as f64 * rehab_tier.per_sqft_rate();
        let rehab_estimated_range = range_around(Some(rehab_base), 0.8, 1.2);
        let rehab_high = rehab_estimated_range.high.expect("rehab_base is always Some");

        let closing_cost = assumptions.closing_cost();
        let holding_cost = assumptions.holding_cost();
        let misc_fee = assumptions.misc_fee();
        let assignment_fee = assumptions.assignment_fee();

        let mut fees = BTreeMap::new();
        fees.insert("closing_cost".to_string(), closing_cost);
        fees.insert("holding_cost".to_string(), holding_cost);
        fees.insert("misc_fee".to_string(), misc_fee);
        if matches!(strategy, Strategy::Wholesale) {
            fees.insert("assignment_fee".to_string(), assignment_fee);
        }
        let fees_total: f64 = fees.values().sum();

        let offer_base = arv_base.map(|arv| match strategy {
            Strategy::Wholesale => arv * 0.70 - rehab_high - fees_total,
            Strategy::Flip => arv * (1.0 - assumptions.target_margin()) - rehab_base - fees_total,
            Strategy::Rental => {
                let rent_cap = rent_base.map_or(arv * 0.75, |rent| rent * 100.0);
                (arv * 0.80).min(rent_cap) - rehab_base - fees_total
            }
        });
        fees.insert("total".to_string(), fees_total);

        let offer_price_recommendation = range_around(offer_base, 0.9, 1.1);

        let mut compliance_flags = Vec::new();
        let mut notes_parts = Vec::new();
        let mut contradiction_penalty = 0.0;

        let owner_names_present = profile.as_ref().is_some_and(|p| !p.owner_names.is_empty());
        if !owner_names_present {
            compliance_flags.push("owner_not_verified".to_string());
        }
        if sales.is_empty() {
            compliance_flags.push("insufficient_sales_comps".to_string());
        }
        if rentals.is_empty() {
            compliance_flags.push("insufficient_rental_comps".to_string());
        }

        if let (Some(arv), Some(zestimate)) = (arv_base, profile.as_ref().and_then(|p| p.assessed_values.zestimate)) {
            let delta = (arv - zestimate).abs() / zestimate.abs().max(1.0);
            if delta > assumptions.valuation_conflict_threshold() {
                compliance_flags.push("valuation_conflict_zestimate_vs_comps".to_string());
                contradiction_penalty += 0.12;
                notes_parts.push(format!("ARV estimate (${arv:.0}) diverges {:.0}% from Zillow zestimate (${zestimate:.0}).", delta * 100.0));
            }
        }
        if let (Some(rent), Some(rent_zestimate)) = (rent_base, profile.as_ref().and_then(|p| p.assessed_values.rent_zestimate)) {
            let delta = (rent - rent_zestimate).abs() / rent_zestimate.abs().max(1.0);
            if delta > assumptions.valuation_conflict_threshold() {
                compliance_flags.push("rent_conflict_zestimate_vs_comps".to_string());
                contradiction_penalty += 0.10;
                notes_parts.push(format!(
                    "Rent estimate (${rent:.0}/mo) diverges {:.0}% from Zillow rent zestimate (${rent_zestimate:.0}/mo).",
                    delta * 100.0
                ));
            }
        }

        let title_risk = if owner_names_present { 0.35 } else { 0.75 };

        let job_evidence: Vec<_> =
            ctx.store.list_evidence_for_property(ctx.job.research_property_id).into_iter().filter(|e| e.job_id == ctx.job.id).collect();
        let coverage = (job_evidence.len() as f64 / 12.0).min(1.0);
        let confidences: Vec<f64> = job_evidence.iter().filter_map(|e| e.confidence).collect();
        let mean_conf = mean(&confidences).unwrap_or(0.5);
        let quality_adjustment = (mean_conf - 0.5) * 0.4;
        let unknown_penalty = (unknowns.len() as f64 * 0.1).min(0.6);
        let data_confidence = (coverage - unknown_penalty + 0.25 + quality_adjustment - contradiction_penalty).clamp(0.0, 1.0);

        if notes_parts.is_empty() {
            notes_parts.push("No valuation contradictions detected against internal enrichment data.".to_string());
        }

        let underwriting = Underwriting {
            research_property_id: ctx.job.research_property_id,
            job_id: ctx.job.id,
            strategy,
            arv_estimate,
            rent_estimate,
            rehab_tier,
            rehab_estimated_range,
            offer_price_recommendation,
            fees,
            sensitivity_table: sensitivity_table(),
        };
        let risk_score = RiskScore {
            research_property_id: ctx.job.research_property_id,
            job_id: ctx.job.id,
            title_risk,
            data_confidence,
            compliance_flags,
            notes: notes_parts.join(" "),
        };

        ctx.store.upsert_underwriting(ctx.job.id, underwriting.clone());
        ctx.store.upsert_risk_score(ctx.job.id, risk_score.clone());

        let evidence = vec![arc_core::EvidenceDraft::new(
            "underwriting",
            format!("Underwriting computed for {} strategy from {} sales and {} rental comps.", strategy_label(strategy), sale_prices.len(), rents.len()),
            format!("internal://jobs/{}/underwriting", ctx.job.id),
            None,
            1.0,
        )];

        Ok(WorkerOutput {
            data: serde_json::json!({ "underwriting": underwriting, "risk_score": risk_score }),
            unknowns,
            errors: Vec::new(),
            evidence,
            web_calls: 0,
            cost_usd: 0.0,
        })
    }
}

fn strategy_label(strategy: Strategy) -> &'static str {
    match strategy {
        Strategy::Wholesale => "wholesale",
        Strategy::Flip => "flip",
        Strategy::Rental => "rental",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crm::EnrichmentStatus;
    use crate::profile::{AssessedValues, Geo, ParcelFacts, PropertyProfile};
    use arc_core::{CompDetails, CompOrigin, ExecutionMode, Job, JobStatus, Limits};
    use arc_protocol::new_shared_context;
    use arc_store::Store;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn job(strategy: Strategy) -> Job {
        let now = chrono::Utc::now();
        Job {
            id: 1,
            trace_id: "abcdef0123456789".into(),
            research_property_id: 1,
            status: JobStatus::InProgress,
            progress: 0,
            current_step: None,
            strategy,
            assumptions: BTreeMap::new(),
            limits: Limits { execution_mode: ExecutionMode::Pipeline, ..Limits::default() },
            results: None,
            error_message: None,
            started_at: Some(now),
            completed_at: None,
            created_at: now,
        }
    }

    fn no_enrichment() -> EnrichmentStatus {
        EnrichmentStatus {
            has_crm_property_match: false,
            has_skip_trace_owner: false,
            has_zillow_enrichment: false,
            is_enriched: false,
            is_fresh: None,
            age_hours: None,
            max_age_hours: None,
            matched_property_id: None,
            skip_trace_id: None,
            zillow_enrichment_id: None,
            missing: Vec::new(),
            last_enriched_at: None,
        }
    }

    fn profile_with(owner_names: Vec<String>, sqft: Option<i64>, zestimate: Option<f64>, rent_zestimate: Option<f64>) -> PropertyProfile {
        PropertyProfile {
            normalized_address: "123 main st, newark, NJ, 07102".into(),
            geo: Geo { lat: Some(40.7), lng: Some(-74.2) },
            apn: None,
            parcel_facts: ParcelFacts { sqft, lot: None, beds: None, baths: None, year: None },
            zoning: None,
            owner_names,
            mailing_address: None,
            assessed_values: AssessedValues { annual_tax_amount: None, zestimate, rent_zestimate },
            tax_status: None,
            transaction_history: Vec::new(),
            enrichment_status: no_enrichment(),
        }
    }

    fn comp_sale(price: f64) -> arc_core::CompSale {
        arc_core::CompSale {
            id: 0,
            research_property_id: 1,
            job_id: 1,
            address: "1 Elm St".into(),
            distance_mi: Some(0.5),
            sale_date: None,
            sale_price: Some(price),
            sqft: Some(2000),
            beds: Some(3),
            baths: Some(2.0),
            year_built: None,
            similarity_score: 0.9,
            source_url: "internal://properties/1".into(),
            details: CompDetails { origin: CompOrigin::Internal, source_quality: 1.0, effective_score: 0.9 },
        }
    }

    fn comp_rental(rent: f64) -> arc_core::CompRental {
        arc_core::CompRental {
            id: 0,
            research_property_id: 1,
            job_id: 1,
            address: "1 Elm St".into(),
            distance_mi: Some(0.5),
            date_listed: None,
            rent: Some(rent),
            sqft: Some(2000),
            beds: Some(3),
            baths: Some(2.0),
            similarity_score: 0.9,
            source_url: "internal://properties/1".into(),
            details: CompDetails { origin: CompOrigin::Internal, source_quality: 1.0, effective_score: 0.9 },
        }
    }

    async fn context(strategy: Strategy, profile: Option<PropertyProfile>, sales: Vec<f64>, rents: Vec<f64>) -> (WorkerContext, Arc<Store>) {
        let store = Arc::new(Store::new());
        let j = job(strategy);
        store.replace_comp_sales(j.id, sales.into_iter().map(comp_sale).collect());
        store.replace_comp_rentals(j.id, rents.into_iter().map(comp_rental).collect());

        let shared = new_shared_context();
        if let Some(profile) = profile {
            shared.write().await.insert("normalize_geocode".to_string(), serde_json::json!({ "property_profile": profile }));
        }

        (WorkerContext { job: j, shared, store: store.clone() }, store)
    }

    #[tokio::test]
    async fn wholesale_offer_matches_spec_formula() {
        let profile = profile_with(Vec::new(), Some(2000), None, None);
        let (ctx, _store) = context(Strategy::Wholesale, Some(profile), vec![400_000.0, 420_000.0, 440_000.0], Vec::new()).await;

        let output = UnderwritingWorker::new().run(&ctx).await.expect("worker succeeds");
        let underwriting: Underwriting = serde_json::from_value(output.data["underwriting"].clone()).unwrap();

        assert_eq!(underwriting.arv_estimate.base, Some(420_000.0));
        assert_eq!(underwriting.arv_estimate.low, Some(378_000.0));
        assert_eq!(underwriting.arv_estimate.high, Some(462_000.0));

        // rehab_base = 2000 * 35 (medium tier) = 70_000; rehab_high = 84_000.
        assert_eq!(underwriting.rehab_estimated_range.base, Some(70_000.0));
        assert_eq!(underwriting.rehab_estimated_range.high, Some(84_000.0));

        // fees: closing 5000 + holding 3000 + misc 1500 + assignment 10000 = 19_500.
        assert_eq!(underwriting.fees["total"], 19_500.0);

        // offer_base = 420_000*0.70 - 84_000 - 19_500 = 190_500.
        let offer_base = underwriting.offer_price_recommendation.base.unwrap();
        assert!((offer_base - 190_500.0).abs() < 1e-6, "offer_base was {offer_base}");
        assert!((underwriting.offer_price_recommendation.low.unwrap() - 171_450.0).abs() < 1e-6);
        assert!((underwriting.offer_price_recommendation.high.unwrap() - 209_550.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn rental_offer_caps_at_rent_multiple() {
        // arv_base*0.80 = 500_000*0.80 = 400_000; rent_base*100 = 1_500*100 = 150_000 — the
        // rent cap wins.
        let profile = profile_with(Vec::new(), Some(1500), None, None);
        let (ctx, _store) = context(Strategy::Rental, Some(profile), vec![500_000.0], vec![1_500.0]).await;

        let output = UnderwritingWorker::new().run(&ctx).await.expect("worker succeeds");
        let underwriting: Underwriting = serde_json::from_value(output.data["underwriting"].clone()).unwrap();

        // rehab_base = 1500 * 35 = 52_500; fees (rental, no assignment) = 5000+3000+1500 = 9_500.
        let offer_base = underwriting.offer_price_recommendation.base.unwrap();
        let expected = 150_000.0 - 52_500.0 - 9_500.0;
        assert!((offer_base - expected).abs() < 1e-6, "offer_base was {offer_base}, expected {expected}");
    }

    #[tokio::test]
    async fn missing_owner_and_comps_raise_all_three_flags() {
        let (ctx, _store) = context(Strategy::Wholesale, None, Vec::new(), Vec::new()).await;

        let output = UnderwritingWorker::new().run(&ctx).await.expect("worker succeeds");
        let risk_score: RiskScore = serde_json::from_value(output.data["risk_score"].clone()).unwrap();

        assert!(risk_score.compliance_flags.contains(&"owner_not_verified".to_string()));
        assert!(risk_score.compliance_flags.contains(&"insufficient_sales_comps".to_string()));
        assert!(risk_score.compliance_flags.contains(&"insufficient_rental_comps".to_string()));
        assert_eq!(risk_score.title_risk, 0.75);
    }

    #[tokio::test]
    async fn owner_present_lowers_title_risk() {
        let profile = profile_with(vec!["Jane Doe".to_string()], Some(1500), None, None);
        let (ctx, _store) = context(Strategy::Wholesale, Some(profile), vec![400_000.0], Vec::new()).await;

        let output = UnderwritingWorker::new().run(&ctx).await.expect("worker succeeds");
        let risk_score: RiskScore = serde_json::from_value(output.data["risk_score"].clone()).unwrap();

        assert_eq!(risk_score.title_risk, 0.35);
        assert!(!risk_score.compliance_flags.contains(&"owner_not_verified".to_string()));
    }

    #[tokio::test]
    async fn valuation_conflict_flag_and_penalty_applied() {
        // arv_base = 400_000, zestimate = 250_000 -> delta 0.60 > threshold 0.30.
        let profile = profile_with(vec!["Jane Doe".to_string()], Some(1500), Some(250_000.0), None);
        let (ctx, store) = context(Strategy::Wholesale, Some(profile), vec![400_000.0], Vec::new()).await;
        store.persist_drafts(
            ctx.job.id,
            ctx.job.research_property_id,
            &[arc_core::EvidenceDraft::new("owner", "seed", "internal://seed", None, 0.8)],
            chrono::Utc::now(),
        );

        let output = UnderwritingWorker::new().run(&ctx).await.expect("worker succeeds");
        let risk_score: RiskScore = serde_json::from_value(output.data["risk_score"].clone()).unwrap();

        assert!(risk_score.compliance_flags.contains(&"valuation_conflict_zestimate_vs_comps".to_string()));

        // coverage = 1/12; unknown_penalty = 0 (no unknowns, arv/rent both resolved... rent_base
        // is None here so one unknown -> penalty 0.1); quality_adjustment = (0.8-0.5)*0.4=0.12;
        // contradiction_penalty = 0.12.
        let coverage = 1.0_f64 / 12.0;
        let expected = (coverage - 0.1 + 0.25 + 0.12 - 0.12_f64).clamp(0.0, 1.0);
        assert!((risk_score.data_confidence - expected).abs() < 1e-6, "data_confidence was {}, expected {expected}", risk_score.data_confidence);
    }
}
