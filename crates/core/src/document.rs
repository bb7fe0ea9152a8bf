use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::money::Money;
use super::movement::Flow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvoiceDirection {
    Sale,
    Purchase,
}

impl InvoiceDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            InvoiceDirection::Sale => "sale",
            InvoiceDirection::Purchase => "purchase",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "sale" => InvoiceDirection::Sale,
            _ => InvoiceDirection::Purchase,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocumentState {
    Pending,
    Paid,
}

impl DocumentState {
    pub fn as_str(self) -> &'static str {
        match self {
            DocumentState::Pending => "pending",
            DocumentState::Paid => "paid",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "paid" => DocumentState::Paid,
            _ => DocumentState::Pending,
        }
    }
}

impl fmt::Display for DocumentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: i64,
    pub direction: InvoiceDirection,
    pub number: String,
    pub amount: Money,
    pub issue_date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    pub counterparty: String,
    pub state: DocumentState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reimbursement {
    pub id: i64,
    pub total: Money,
    pub counterparty: String,
    pub state: DocumentState,
}

/// Anything a bank movement can be matched against. Variants keep their
/// own fields; the matcher only needs the common projection below.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Document {
    Invoice(Invoice),
    Reimbursement(Reimbursement),
}

impl Document {
    pub fn id(&self) -> i64 {
        match self {
            Document::Invoice(inv) => inv.id,
            Document::Reimbursement(r) => r.id,
        }
    }

    pub fn amount(&self) -> Money {
        match self {
            Document::Invoice(inv) => inv.amount,
            Document::Reimbursement(r) => r.total,
        }
    }

    pub fn counterparty(&self) -> &str {
        match self {
            Document::Invoice(inv) => &inv.counterparty,
            Document::Reimbursement(r) => &r.counterparty,
        }
    }

    pub fn state(&self) -> DocumentState {
        match self {
            Document::Invoice(inv) => inv.state,
            Document::Reimbursement(r) => r.state,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.state() == DocumentState::Pending
    }

    /// Human-facing identifier: the invoice number, or a synthetic label
    /// for reimbursements (they carry no document number).
    pub fn label(&self) -> String {
        match self {
            Document::Invoice(inv) => inv.number.clone(),
            Document::Reimbursement(r) => format!("Rendición {}", r.id),
        }
    }

    pub fn reference(&self) -> DocumentRef {
        match self {
            Document::Invoice(inv) => DocumentRef::Invoice(inv.id),
            Document::Reimbursement(r) => DocumentRef::Reimbursement(r.id),
        }
    }

    /// Direction gating: purchases and reimbursements explain outflows,
    /// sales explain inflows.
    pub fn eligible_for(&self, flow: Flow) -> bool {
        match (self, flow) {
            (Document::Invoice(inv), Flow::Debit) => inv.direction == InvoiceDirection::Purchase,
            (Document::Invoice(inv), Flow::Credit) => inv.direction == InvoiceDirection::Sale,
            (Document::Reimbursement(_), Flow::Debit) => true,
            (Document::Reimbursement(_), Flow::Credit) => false,
        }
    }
}

/// Typed foreign key held by a payment link: exactly one document kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocumentRef {
    Invoice(i64),
    Reimbursement(i64),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invoice(direction: InvoiceDirection, cents: i64) -> Document {
        Document::Invoice(Invoice {
            id: 1,
            direction,
            number: "F-001".to_string(),
            amount: Money::from_cents(cents),
            issue_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            due_date: None,
            counterparty: "Proveedor X".to_string(),
            state: DocumentState::Pending,
        })
    }

    fn reimbursement(cents: i64) -> Document {
        Document::Reimbursement(Reimbursement {
            id: 7,
            total: Money::from_cents(cents),
            counterparty: "Empleado Y".to_string(),
            state: DocumentState::Pending,
        })
    }

    #[test]
    fn purchase_invoices_only_match_debits() {
        let doc = invoice(InvoiceDirection::Purchase, 5000);
        assert!(doc.eligible_for(Flow::Debit));
        assert!(!doc.eligible_for(Flow::Credit));
    }

    #[test]
    fn sale_invoices_only_match_credits() {
        let doc = invoice(InvoiceDirection::Sale, 5000);
        assert!(doc.eligible_for(Flow::Credit));
        assert!(!doc.eligible_for(Flow::Debit));
    }

    #[test]
    fn reimbursements_only_match_debits() {
        let doc = reimbursement(3000);
        assert!(doc.eligible_for(Flow::Debit));
        assert!(!doc.eligible_for(Flow::Credit));
    }

    #[test]
    fn serializes_with_variant_tag() {
        let json = serde_json::to_string(&reimbursement(3000)).unwrap();
        assert!(json.contains("Reimbursement"));
        let back: Document = serde_json::from_str(&json).unwrap();
        assert_eq!(back, reimbursement(3000));
    }

    #[test]
    fn common_projection() {
        let doc = reimbursement(3000);
        assert_eq!(doc.id(), 7);
        assert_eq!(doc.amount(), Money::from_cents(3000));
        assert_eq!(doc.counterparty(), "Empleado Y");
        assert!(doc.is_pending());
        assert_eq!(doc.reference(), DocumentRef::Reimbursement(7));
        assert_eq!(doc.label(), "Rendición 7");
    }
}
