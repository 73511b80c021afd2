//! Invoices issued for finalized tickets, and their payments

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::ticket::{Ticket, TicketStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Issued,
    Paid,
    Void,
}

/// Invoice record. Amounts are in cents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: u64,
    pub ticket_id: u64,
    pub issued_on: NaiveDate,
    pub amount_cents: u64,
    pub paid_cents: u64,
    pub status: InvoiceStatus,
}

/// Payment recorded against an invoice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: u64,
    pub invoice_id: u64,
    pub paid_on: NaiveDate,
    pub method: String,
    pub amount_cents: u64,
}

impl Invoice {
    pub fn issue(id: u64, ticket: &Ticket, amount_cents: u64, today: NaiveDate) -> Result<Self> {
        if ticket.status != TicketStatus::Finalized {
            return Err(Error::Conflict(format!(
                "ticket {} is {}, only finalized tickets are invoiced",
                ticket.id, ticket.status
            )));
        }
        if amount_cents == 0 {
            return Err(Error::validation("invoice amount must be positive"));
        }

        Ok(Self {
            id,
            ticket_id: ticket.id,
            issued_on: today,
            amount_cents,
            paid_cents: 0,
            status: InvoiceStatus::Issued,
        })
    }

    pub fn outstanding_cents(&self) -> u64 {
        self.amount_cents.saturating_sub(self.paid_cents)
    }

    /// Apply a payment, marking the invoice paid once covered
    pub fn record_payment(&self, payment: &Payment) -> Result<Invoice> {
        if self.status != InvoiceStatus::Issued {
            return Err(Error::Conflict(format!(
                "invoice {} does not accept payments",
                self.id
            )));
        }
        if payment.amount_cents == 0 || payment.amount_cents > self.outstanding_cents() {
            return Err(Error::validation(format!(
                "payment must be between 1 and {} cents",
                self.outstanding_cents()
            )));
        }

        let mut updated = self.clone();
        updated.paid_cents += payment.amount_cents;
        if updated.outstanding_cents() == 0 {
            updated.status = InvoiceStatus::Paid;
        }
        Ok(updated)
    }

    pub fn void(&self) -> Result<Invoice> {
        if self.status != InvoiceStatus::Issued || self.paid_cents > 0 {
            return Err(Error::Conflict(format!(
                "invoice {} cannot be voided",
                self.id
            )));
        }
        Ok(Invoice {
            status: InvoiceStatus::Void,
            ..self.clone()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn finalized_ticket() -> Ticket {
        let now = Utc::now();
        Ticket::allocated(1, 1, 1, 1, now)
            .apply_transition(TicketStatus::Active, now)
            .unwrap()
            .ticket
            .apply_transition(TicketStatus::Finalized, now)
            .unwrap()
            .ticket
    }

    fn payment(amount_cents: u64) -> Payment {
        Payment {
            id: 1,
            invoice_id: 1,
            paid_on: NaiveDate::from_ymd_opt(2024, 2, 11).unwrap(),
            method: "transfer".to_string(),
            amount_cents,
        }
    }

    #[test]
    fn test_only_finalized_tickets_are_invoiced() {
        let today = NaiveDate::from_ymd_opt(2024, 2, 10).unwrap();
        let open = Ticket::allocated(1, 1, 1, 1, Utc::now());
        assert!(Invoice::issue(1, &open, 10_000, today).is_err());
        assert!(Invoice::issue(1, &finalized_ticket(), 0, today).is_err());
        assert!(Invoice::issue(1, &finalized_ticket(), 10_000, today).is_ok());
    }

    #[test]
    fn test_partial_then_full_payment() {
        let today = NaiveDate::from_ymd_opt(2024, 2, 10).unwrap();
        let invoice = Invoice::issue(1, &finalized_ticket(), 10_000, today).unwrap();

        let partial = invoice.record_payment(&payment(4_000)).unwrap();
        assert_eq!(partial.status, InvoiceStatus::Issued);
        assert_eq!(partial.outstanding_cents(), 6_000);

        assert!(partial.record_payment(&payment(7_000)).is_err());

        let paid = partial.record_payment(&payment(6_000)).unwrap();
        assert_eq!(paid.status, InvoiceStatus::Paid);
        assert!(paid.record_payment(&payment(1)).is_err());
        assert!(paid.void().is_err());
    }

    #[test]
    fn test_void_unpaid_invoice() {
        let today = NaiveDate::from_ymd_opt(2024, 2, 10).unwrap();
        let invoice = Invoice::issue(1, &finalized_ticket(), 10_000, today).unwrap();
        assert_eq!(invoice.void().unwrap().status, InvoiceStatus::Void);
    }
}
