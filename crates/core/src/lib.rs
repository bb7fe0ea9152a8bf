pub mod document;
pub mod link;
pub mod money;
pub mod movement;

pub use document::{Document, DocumentRef, DocumentState, Invoice, InvoiceDirection, Reimbursement};
pub use link::PaymentLink;
pub use money::Money;
pub use movement::{BankMovement, Flow, NewMovement, ReconcileState};
