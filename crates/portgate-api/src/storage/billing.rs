//! Invoices and payments

use chrono::Utc;
use portgate_common::{Error, Invoice, InvoiceStatus, Payment, Result, Ticket};
use tracing::info;

use super::{contention, keys, Storage, Versioned, MAX_ATTEMPTS};
use crate::backend::WriteBatch;
use crate::models::{PaymentReceipt, PaymentRequest};

impl Storage {
    /// Invoice a finalized ticket. A ticket has at most one live invoice.
    pub async fn issue_invoice(&self, ticket_id: u64, amount_cents: u64) -> Result<Invoice> {
        let ticket: Ticket = self.get_ticket(ticket_id).await?;
        let id = self.next_id(keys::INVOICE_SEQ).await?;
        let invoice = Invoice::issue(id, &ticket, amount_cents, Utc::now().date_naive())?;

        let link = keys::ticket_invoice(ticket_id);
        for _ in 0..MAX_ATTEMPTS {
            let existing = self.read_id(&link).await?;
            if let Some(existing) = existing {
                let live = self
                    .read::<Invoice>(&keys::invoice(existing))
                    .await?
                    .map_or(false, |current| current.value.status != InvoiceStatus::Void);
                if live {
                    return Err(Error::Conflict(format!(
                        "ticket #{} already has invoice #{}",
                        ticket_id, existing
                    )));
                }
            }

            let expected = existing.map(|id| id.to_string());
            let mut batch = WriteBatch::new();
            batch
                .guard(link.as_str(), expected.as_deref())
                .put_json(keys::invoice(id), &invoice)?
                .put(link.as_str(), id.to_string())
                .index(keys::INVOICES, id, id as f64);

            if self.commit(&batch).await? {
                info!(
                    "Issued invoice #{} for ticket #{} ({} cents)",
                    id, ticket_id, amount_cents
                );
                return Ok(invoice);
            }
        }
        Err(contention("invoice"))
    }

    pub async fn get_invoice(&self, id: u64) -> Result<Invoice> {
        Ok(self.require("invoice", &keys::invoice(id), id).await?.value)
    }

    pub async fn list_invoices(&self) -> Result<Vec<Invoice>> {
        self.list(keys::INVOICES, keys::invoice).await
    }

    pub async fn list_payments(&self, invoice_id: u64) -> Result<Vec<Payment>> {
        self.get_invoice(invoice_id).await?;
        self.list(&keys::invoice_payments(invoice_id), keys::payment)
            .await
    }

    /// Record a payment; the invoice is paid once payments cover it
    pub async fn record_payment(
        &self,
        invoice_id: u64,
        request: PaymentRequest,
    ) -> Result<PaymentReceipt> {
        let method = request.method.trim();
        if method.is_empty() {
            return Err(Error::validation("payment method is required"));
        }

        let mut payment_id: Option<u64> = None;
        for _ in 0..MAX_ATTEMPTS {
            let current: Versioned<Invoice> = self
                .require("invoice", &keys::invoice(invoice_id), invoice_id)
                .await?;

            let id = match payment_id {
                Some(id) => id,
                None => {
                    let id = self.next_id(keys::PAYMENT_SEQ).await?;
                    payment_id = Some(id);
                    id
                }
            };
            let payment = Payment {
                id,
                invoice_id,
                paid_on: Utc::now().date_naive(),
                method: method.to_string(),
                amount_cents: request.amount_cents,
            };
            let invoice = current.value.record_payment(&payment)?;

            let mut batch = WriteBatch::new();
            batch
                .guard(keys::invoice(invoice_id), Some(&current.raw))
                .put_json(keys::invoice(invoice_id), &invoice)?
                .put_json(keys::payment(id), &payment)?
                .index(keys::invoice_payments(invoice_id), id, id as f64);

            if self.commit(&batch).await? {
                info!(
                    "Payment #{} of {} cents on invoice #{} ({} outstanding)",
                    id,
                    payment.amount_cents,
                    invoice_id,
                    invoice.outstanding_cents()
                );
                return Ok(PaymentReceipt { invoice, payment });
            }
        }
        Err(contention("invoice"))
    }

    /// Void an unpaid invoice, freeing the ticket for a new one
    pub async fn void_invoice(&self, id: u64) -> Result<Invoice> {
        for _ in 0..MAX_ATTEMPTS {
            let current: Versioned<Invoice> =
                self.require("invoice", &keys::invoice(id), id).await?;
            let voided = current.value.void()?;

            let link = keys::ticket_invoice(voided.ticket_id);
            let mut batch = WriteBatch::new();
            batch
                .guard(keys::invoice(id), Some(&current.raw))
                .put_json(keys::invoice(id), &voided)?
                .guard(link.as_str(), Some(&id.to_string()))
                .remove(link);

            if self.commit(&batch).await? {
                info!("Voided invoice #{}", id);
                return Ok(voided);
            }
        }
        Err(contention("invoice"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::fixtures::Yard;
    use portgate_common::TicketStatus;

    async fn finalized_ticket(yard: &Yard) -> Ticket {
        let ticket = yard
            .storage
            .allocate(yard.container.id, yard.slots[0].id, yard.operator.id)
            .await
            .unwrap()
            .ticket;
        yard.storage
            .transition(ticket.id, TicketStatus::Active)
            .await
            .unwrap();
        yard.storage
            .transition(ticket.id, TicketStatus::Finalized)
            .await
            .unwrap()
    }

    fn cash(amount_cents: u64) -> PaymentRequest {
        PaymentRequest {
            method: "cash".to_string(),
            amount_cents,
        }
    }

    #[tokio::test]
    async fn test_only_finalized_tickets_are_invoiced() {
        let yard = Yard::new().await;
        let ticket = yard
            .storage
            .allocate(yard.container.id, yard.slots[0].id, yard.operator.id)
            .await
            .unwrap()
            .ticket;

        let err = yard.storage.issue_invoice(ticket.id, 10_000).await.unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
        assert!(yard.storage.list_invoices().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_payments_settle_invoice() {
        let yard = Yard::new().await;
        let ticket = finalized_ticket(&yard).await;
        let invoice = yard.storage.issue_invoice(ticket.id, 10_000).await.unwrap();

        let err = yard.storage.issue_invoice(ticket.id, 500).await.unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));

        let partial = yard
            .storage
            .record_payment(invoice.id, cash(4_000))
            .await
            .unwrap();
        assert_eq!(partial.invoice.status, InvoiceStatus::Issued);
        assert_eq!(partial.invoice.outstanding_cents(), 6_000);

        let err = yard
            .storage
            .record_payment(invoice.id, cash(6_001))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let settled = yard
            .storage
            .record_payment(invoice.id, cash(6_000))
            .await
            .unwrap();
        assert_eq!(settled.invoice.status, InvoiceStatus::Paid);
        assert_eq!(yard.storage.list_payments(invoice.id).await.unwrap().len(), 2);

        let err = yard.storage.void_invoice(invoice.id).await.unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[tokio::test]
    async fn test_void_allows_reissue() {
        let yard = Yard::new().await;
        let ticket = finalized_ticket(&yard).await;
        let invoice = yard.storage.issue_invoice(ticket.id, 10_000).await.unwrap();

        let voided = yard.storage.void_invoice(invoice.id).await.unwrap();
        assert_eq!(voided.status, InvoiceStatus::Void);

        let reissued = yard.storage.issue_invoice(ticket.id, 8_000).await.unwrap();
        assert_ne!(reissued.id, invoice.id);
        assert_eq!(yard.storage.list_invoices().await.unwrap().len(), 2);
    }
}
