pub mod appointment;
pub mod container;
pub mod error;
pub mod invoice;
pub mod slot;
pub mod ticket;
pub mod user;

pub use appointment::{Appointment, AppointmentStatus, AppointmentWindow};
pub use container::{normalize_code, Container, ContainerPatch, NewContainer, Vessel};
pub use error::{Error, Result};
pub use invoice::{Invoice, InvoiceStatus, Payment};
pub use slot::{normalize_label, selectable_slots, Slot, SlotState, Zone};
pub use ticket::{Ticket, TicketStatus, Transition};
pub use user::{hash_password, normalize_email, verify_password, NewUser, Role, User, UserPatch, UserProfile};
