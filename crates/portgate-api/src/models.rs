//! Request and response models for the API

use chrono::{DateTime, NaiveDate, Utc};
use portgate_common::{
    Appointment, Container, Invoice, Payment, Role, Slot, SlotState, Ticket, TicketStatus,
    UserProfile,
};
use serde::{Deserialize, Serialize};

/// Authenticated caller, resolved once per request by the routing layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub user_id: u64,
    pub name: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Login credentials
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Successful login
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserProfile,
}

/// Outcome of scanning a container code
#[derive(Debug, Clone, Serialize)]
pub struct ScanResult {
    pub container: Container,

    /// Unslotted ticket the allocation will pick up
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_ticket: Option<Ticket>,
}

/// Request to bind a slot to a container
#[derive(Debug, Deserialize)]
pub struct AllocateRequest {
    pub container_id: u64,
    pub slot_id: u64,
}

/// Result of a slot allocation
#[derive(Debug, Clone, Serialize)]
pub struct Allocation {
    pub ticket: Ticket,
    pub slot: Slot,
}

/// Client request for a ticket on one of its containers
#[derive(Debug, Deserialize)]
pub struct TicketRequest {
    pub container_id: u64,
}

/// Request to move a ticket to a new status
#[derive(Debug, Deserialize)]
pub struct TransitionRequest {
    pub status: TicketStatus,
}

/// Ticket listing filters
#[derive(Debug, Default, Deserialize)]
pub struct TicketFilter {
    pub status: Option<TicketStatus>,
    pub assigned_user_id: Option<u64>,
}

impl TicketFilter {
    pub fn matches(&self, ticket: &Ticket) -> bool {
        self.status.map_or(true, |status| ticket.status == status)
            && self
                .assigned_user_id
                .map_or(true, |user_id| ticket.assigned_user_id == Some(user_id))
    }
}

/// Ticket joined with the labels a board displays
#[derive(Debug, Clone, Serialize)]
pub struct TicketDetails {
    #[serde(flatten)]
    pub ticket: Ticket,
    pub container_code: Option<String>,
    pub slot_label: Option<String>,
    pub zone_name: Option<String>,
}

/// Delta query cursor
#[derive(Debug, Default, Deserialize)]
pub struct ChangesQuery {
    #[serde(default)]
    pub since: u64,
}

/// Tickets changed after a cursor, plus the cursor to use next
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketChanges {
    pub tickets: Vec<Ticket>,
    pub cursor: u64,
}

/// Booking of a pickup appointment for a container
#[derive(Debug, Deserialize)]
pub struct BookAppointmentRequest {
    pub container_id: u64,
    pub vessel_id: u64,
    pub send_date: NaiveDate,
    pub pickup_date: NaiveDate,
}

/// Appointment plus the container it was attached to
#[derive(Debug, Clone, Serialize)]
pub struct Booking {
    pub appointment: Appointment,
    pub container: Container,
}

#[derive(Debug, Deserialize)]
pub struct AppointmentStatusRequest {
    pub status: portgate_common::AppointmentStatus,
}

#[derive(Debug, Deserialize)]
pub struct UsersQuery {
    pub role: Option<Role>,
}

#[derive(Debug, Deserialize)]
pub struct NewVessel {
    pub name: String,
    pub shipping_line: String,
}

#[derive(Debug, Deserialize)]
pub struct NewZone {
    pub name: String,
    pub capacity: u32,
}

#[derive(Debug, Deserialize)]
pub struct NewSlot {
    pub label: String,
    pub row: u32,
    pub column: u32,
    pub level: u32,
}

#[derive(Debug, Deserialize)]
pub struct SlotStateRequest {
    pub state: SlotState,
}

#[derive(Debug, Deserialize)]
pub struct IssueInvoiceRequest {
    pub ticket_id: u64,
    pub amount_cents: u64,
}

#[derive(Debug, Deserialize)]
pub struct PaymentRequest {
    pub method: String,
    pub amount_cents: u64,
}

/// Invoice after a payment, with the payment itself
#[derive(Debug, Clone, Serialize)]
pub struct PaymentReceipt {
    pub invoice: Invoice,
    pub payment: Payment,
}

/// Administrator dashboard counters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdminStats {
    pub total_tickets: usize,
    pub active_tickets: usize,
    pub open_tickets: usize,
    pub total_users: usize,
    pub available_slots: usize,
    pub occupied_slots: usize,
}

/// Operator dashboard counters over the operator's own tickets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatorStats {
    pub total: usize,
    pub active: usize,
    pub finalized: usize,
    pub finalized_today: usize,
}

/// Generic list wrapper
#[derive(Debug, Serialize)]
pub struct ListResponse<T> {
    pub items: Vec<T>,
    pub total: usize,
}

impl<T> From<Vec<T>> for ListResponse<T> {
    fn from(items: Vec<T>) -> Self {
        let total = items.len();
        Self { items, total }
    }
}
