pub mod db;

pub use db::{
    append_movement_description, audit_inconsistent_links, count_movements, create_db,
    delete_links_for_movement, delete_movement, existing_references, get_invoice, get_movement,
    get_movements, get_reimbursement, insert_invoice, insert_movements, insert_payment_link,
    insert_reimbursement, links_for_movement, pending_invoices, pending_reimbursements,
    set_invoice_state, set_movement_state, set_reimbursement_state, DbPool, LinkAudit,
};
