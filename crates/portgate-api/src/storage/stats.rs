//! Dashboard counters

use chrono::NaiveDate;
use portgate_common::{Result, SlotState, TicketStatus};

use super::Storage;
use crate::models::{AdminStats, OperatorStats, TicketFilter};

impl Storage {
    pub async fn admin_stats(&self) -> Result<AdminStats> {
        let tickets = self.list_tickets(&TicketFilter::default()).await?;
        let slots = self.list_slots().await?;
        let users = self.list_users(None).await?;

        let count_slots = |state: SlotState| slots.iter().filter(|slot| slot.state == state).count();

        Ok(AdminStats {
            total_tickets: tickets.len(),
            active_tickets: tickets
                .iter()
                .filter(|ticket| ticket.status == TicketStatus::Active)
                .count(),
            open_tickets: tickets
                .iter()
                .filter(|ticket| !ticket.status.is_terminal())
                .count(),
            total_users: users.len(),
            available_slots: count_slots(SlotState::Empty),
            occupied_slots: count_slots(SlotState::Occupied),
        })
    }

    /// Counters over the tickets assigned to `user_id`
    pub async fn operator_stats(&self, user_id: u64, today: NaiveDate) -> Result<OperatorStats> {
        let tickets = self
            .list_tickets(&TicketFilter {
                status: None,
                assigned_user_id: Some(user_id),
            })
            .await?;

        let with_status =
            |status: TicketStatus| tickets.iter().filter(|ticket| ticket.status == status).count();

        Ok(OperatorStats {
            total: tickets.len(),
            active: with_status(TicketStatus::Active),
            finalized: with_status(TicketStatus::Finalized),
            finalized_today: tickets
                .iter()
                .filter(|ticket| ticket.status == TicketStatus::Finalized)
                .filter(|ticket| ticket.exited_at.map(|at| at.date_naive()) == Some(today))
                .count(),
        })
    }
}
