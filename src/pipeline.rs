//! MatchPipeline: the per-line-item state machine. Runs the
//! stages in order; each stage failure pins a terminal status from the
//! closed vocabulary in `entities::bom_item_match::status`. Exactly one
//! BomItemMatch row is written per invocation.

use crate::clients::distributor::{DistributorClient, PartRecord};
use crate::clients::llm::{BomContextRow, CandidatePart, LlmClient, PartInfo};
use crate::entities::bom_item_match::status;
use crate::entities::potential_bom_match::selection_state;
use crate::errors::DistributorError;
use crate::repositories::store::Store;
use std::collections::HashSet;
use tracing::{instrument, warn};

/// Candidate list passed to the evaluation prompt is bounded; the design
/// suggests a cap of at least 10.
const CANDIDATE_CAP: usize = 10;

pub struct MatchPipeline<'a> {
    store: &'a Store,
    distributor: &'a DistributorClient,
    llm: &'a LlmClient,
}

/// Final state of one pipeline run, ready to be written as a BomItemMatch.
pub struct MatchOutcome {
    pub status: &'static str,
    pub component_id: Option<i32>,
}

impl<'a> MatchPipeline<'a> {
    pub fn new(store: &'a Store, distributor: &'a DistributorClient, llm: &'a LlmClient) -> Self {
        Self { store, distributor, llm }
    }

    /// Runs every stage for one BomItem and persists the terminal
    /// BomItemMatch. Re-run safe: existing matches for this item are cleared
    /// before the new terminal status is written. Never propagates a database
    /// failure past this point — a write failure here is itself a terminal
    /// status (`db_save_error`), so the caller always gets exactly one
    /// outcome to report.
    #[instrument(skip(self, bom), fields(bom_item_id = item.id))]
    pub async fn run(
        &self,
        item: &crate::entities::bom_item::Model,
        project_description: &str,
        bom: &[BomContextRow],
    ) -> MatchOutcome {
        if let Err(e) = self.store.clear_potential_matches_for_item(item.id).await {
            warn!(bom_item_id = item.id, error = %e, "could not clear prior potential matches, ranking may be stale");
        }

        let outcome = self.evaluate(item, project_description, bom).await;

        if let Err(e) = self.store.clear_matches_for_item(item.id).await {
            warn!(bom_item_id = item.id, error = %e, "could not clear prior matches, saving as db_save_error");
            let _ = self.store.create_bom_item_match(self.store.db(), item.id, None, status::DB_SAVE_ERROR).await;
            return terminal(status::DB_SAVE_ERROR);
        }

        match self
            .store
            .create_bom_item_match(self.store.db(), item.id, outcome.component_id, outcome.status)
            .await
        {
            Ok(_) => outcome,
            Err(e) => {
                warn!(bom_item_id = item.id, error = %e, "failed to save match result");
                terminal(status::DB_SAVE_ERROR)
            }
        }
    }

    async fn evaluate(
        &self,
        item: &crate::entities::bom_item::Model,
        project_description: &str,
        bom: &[BomContextRow],
    ) -> MatchOutcome {
        let part = PartInfo {
            quantity: item.quantity,
            description: item.description.clone(),
            possible_mpn: item.notes.clone(),
            package: item.package.clone(),
            notes: None,
        };

        let search_terms = match self.llm.generate_search_terms(&part).await {
            Ok(terms) if !terms.is_empty() => terms,
            Ok(_) => return terminal(status::SEARCH_TERM_FAILED),
            Err(_) => return terminal(status::LLM_ERROR),
        };

        let candidates = match self.collect_candidates(&search_terms).await {
            Ok(candidates) => candidates,
            Err(_) => return terminal(status::MOUSER_ERROR),
        };

        if candidates.is_empty() {
            return terminal(status::NO_KEYWORD_RESULTS);
        }

        let candidate_parts: Vec<CandidatePart> = candidates
            .iter()
            .take(CANDIDATE_CAP)
            .map(|p| CandidatePart {
                manufacturer: p.manufacturer_name.clone(),
                manufacturer_part_number: p.manufacturer_part_number.clone(),
                distributor_part_number: p.distributor_part_number.clone(),
                description: p.description.clone(),
                price: p.price.map(|d| d.to_string()),
                availability: p.availability.clone(),
                datasheet_url: p.datasheet_url.clone(),
            })
            .collect();

        self.record_potential_matches(item.id, &candidates).await;

        let chosen = match self
            .llm
            .choose_best_part(&part, project_description, bom, &candidate_parts)
            .await
        {
            Ok(mpn) => mpn,
            Err(_) => return terminal(status::LLM_ERROR),
        };

        let Some(mpn) = chosen else {
            return terminal(status::EVALUATION_FAILED);
        };

        let outcome = self.resolve_chosen_mpn(&mpn, &candidates).await;
        self.finalize_potential_match_ranking(item.id, &mpn, outcome.component_id).await;
        outcome
    }

    /// Persists the ranked candidate list as `proposed` potential matches,
    /// ranked in the order the LLM will see them. Best-effort: a failure here
    /// only loses the enrichment, never the match itself.
    async fn record_potential_matches(&self, bom_item_id: i32, candidates: &[PartRecord]) {
        for (i, candidate) in candidates.iter().take(CANDIDATE_CAP).enumerate() {
            let rank = (i + 1) as i32;
            if let Err(e) = self
                .store
                .create_potential_match(bom_item_id, rank, &candidate.manufacturer_part_number, None, None)
                .await
            {
                warn!(bom_item_id, rank, error = %e, "failed to record potential match");
            }
        }
    }

    /// Once a final mpn is chosen, the matching row in the ranked list
    /// becomes `selected` and every other row `rejected`.
    async fn finalize_potential_match_ranking(
        &self,
        bom_item_id: i32,
        chosen_mpn: &str,
        component_id: Option<i32>,
    ) {
        let Ok(potentials) = self.store.get_potential_matches_for_bom_item(bom_item_id).await else {
            return;
        };

        for potential in potentials {
            let is_chosen = potential.manufacturer_part_number == chosen_mpn;
            let state = if is_chosen { selection_state::SELECTED } else { selection_state::REJECTED };
            let linked_component = if is_chosen { component_id } else { None };
            if let Err(e) = self
                .store
                .set_potential_match_state(potential.id, state, linked_component)
                .await
            {
                warn!(bom_item_id, potential_match_id = potential.id, error = %e, "failed to finalize potential match state");
            }
        }
    }

    /// Aggregates keyword results across every search term, preserving
    /// first-seen order and dropping duplicates by distributor part number.
    async fn collect_candidates(&self, terms: &[String]) -> Result<Vec<PartRecord>, DistributorError> {
        let mut seen = HashSet::new();
        let mut aggregated = Vec::new();

        for term in terms {
            let parts = self.distributor.search_by_keyword(term, CANDIDATE_CAP as u32).await?;
            for part in parts {
                if seen.insert(part.distributor_part_number.clone()) {
                    aggregated.push(part);
                }
            }
        }

        Ok(aggregated)
    }

    async fn resolve_chosen_mpn(&self, mpn: &str, candidates: &[PartRecord]) -> MatchOutcome {
        if let Ok(Some(existing)) = self.store.get_component_by_mpn(mpn).await {
            return MatchOutcome { status: status::MATCHED, component_id: Some(existing.id) };
        }

        let chosen = candidates.iter().find(|c| c.manufacturer_part_number == mpn);

        let candidate = match chosen {
            Some(c) => Some(c.clone()),
            None => match self.distributor.search_by_mpn(mpn).await {
                Ok(hit) => hit,
                Err(_) => return terminal(status::MOUSER_ERROR),
            },
        };

        let Some(candidate) = candidate else {
            return terminal(status::MPN_LOOKUP_FAILED);
        };

        match self
            .store
            .get_or_create_component(
                &candidate.distributor_part_number,
                &candidate.manufacturer_part_number,
                candidate.manufacturer_name,
                candidate.description,
                candidate.datasheet_url,
                None,
                candidate.price,
                candidate.availability,
            )
            .await
        {
            Ok(component) => MatchOutcome { status: status::MATCHED, component_id: Some(component.id) },
            Err(e) => {
                warn!(error = %e, "component persistence failed");
                terminal(status::COMPONENT_DB_ERROR)
            }
        }
    }
}

fn terminal(status: &'static str) -> MatchOutcome {
    MatchOutcome { status, component_id: None }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_outcomes_carry_no_component() {
        let outcome = terminal(status::NO_KEYWORD_RESULTS);
        assert_eq!(outcome.status, status::NO_KEYWORD_RESULTS);
        assert!(outcome.component_id.is_none());
    }
}
