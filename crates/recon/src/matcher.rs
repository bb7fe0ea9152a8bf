use serde::Serialize;

use cuadra_core::{BankMovement, Document};

/// One matchable document, tagged with whether its amount equals the
/// movement's absolute amount.
#[derive(Debug, Clone, Serialize)]
pub struct Candidate {
    pub document: Document,
    pub is_exact: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CandidateSet {
    /// Documents whose amount equals `|movement.amount|`.
    pub exact: Vec<Document>,
    /// The full eligible population, exact matches first, otherwise in
    /// store arrival order.
    pub all: Vec<Candidate>,
}

/// Ranks the eligible population for one movement. Matching stays a
/// human decision; this only orders the search space so the exact-amount
/// fast path surfaces first.
///
/// Eligibility: pending documents whose direction agrees with the
/// movement sign (debits ⇒ purchase invoices and reimbursements,
/// credits ⇒ sale invoices). A zero-amount movement has no candidates.
pub fn rank_candidates(movement: &BankMovement, documents: &[Document]) -> CandidateSet {
    let Some(flow) = movement.flow() else {
        return CandidateSet::default();
    };
    let target = movement.amount.abs();

    let mut all: Vec<Candidate> = documents
        .iter()
        .filter(|d| d.is_pending() && d.eligible_for(flow))
        .map(|d| Candidate {
            document: d.clone(),
            is_exact: d.amount() == target,
        })
        .collect();

    let exact: Vec<Document> = all
        .iter()
        .filter(|c| c.is_exact)
        .map(|c| c.document.clone())
        .collect();

    // Stable: ties keep arrival order, no secondary key.
    all.sort_by_key(|c| !c.is_exact);

    CandidateSet { exact, all }
}

/// Manual free-text lookup over the same eligible population:
/// case-insensitive substring on the document label/number or the
/// counterparty name. Run on demand, not automatically.
pub fn search(movement: &BankMovement, documents: &[Document], query: &str) -> Vec<Document> {
    let Some(flow) = movement.flow() else {
        return Vec::new();
    };
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return Vec::new();
    }

    documents
        .iter()
        .filter(|d| d.is_pending() && d.eligible_for(flow))
        .filter(|d| {
            d.label().to_lowercase().contains(&query)
                || d.counterparty().to_lowercase().contains(&query)
        })
        .cloned()
        .collect()
}
