pub mod booking;
pub mod guest;
pub mod registration;
pub mod room;

pub use booking::{Booking, BookingStatus};
pub use guest::{Guest, GuestDraft, IdProofType};
pub use registration::{IdRequirement, RegistrationError, RegistrationEvent, RegistrationForm};
pub use room::{Room, RoomStatus, RoomStatusEvent, RoomType};
