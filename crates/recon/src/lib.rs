pub mod engine;
pub mod matcher;

pub use engine::{
    audit_links, candidates_for, confirm_match, delete_movement, import_rows, resolve_direct,
    resolve_other, search_candidates, undo, ImportSummary, ReconError,
};
pub use matcher::{rank_candidates, search, Candidate, CandidateSet};
