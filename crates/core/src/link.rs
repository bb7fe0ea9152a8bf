use serde::{Deserialize, Serialize};

use super::document::DocumentRef;
use super::money::Money;

/// Links a bank movement to the document that explains it. One movement
/// carries at most one active link at a time; the link is deleted when
/// the match is undone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentLink {
    pub id: i64,
    pub document: DocumentRef,
    pub movement_id: i64,
    /// Amount applied, always the full document amount in this design.
    pub amount: Money,
    pub created_at: String,
}
