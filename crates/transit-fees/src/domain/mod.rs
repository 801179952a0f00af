//! Fee policy and booking rules, independent of transport and storage.

pub mod booking;
pub mod calendar;
pub mod eligibility;
pub mod fees;
pub mod orders;
pub mod payments;
pub mod transport;
pub mod types;
pub mod verifier;

pub use booking::{BookingDecision, BookingGate, BookingRequest, BookingTarget, SeatReservation};
pub use calendar::{TermCalendar, TermResolution};
pub use eligibility::{EligibilityDecision, EligibilityEvaluator};
pub use fees::{FeeQuote, FeeQuoteBuilder, FeeSchedule};
pub use orders::{OrderService, PlaceOrder, PlacedOrder};
pub use payments::{Payment, PaymentScope, PaymentStatus, ReceiptData};
pub use types::{AcademicYear, PaymentId, ReceiptColor, RouteId, ScheduleId, StudentId, Term};
pub use verifier::{PaymentVerifier, VerificationRequest, VerificationResult};
