pub mod bookings;
pub mod eligibility;
pub mod fees;
pub mod health;
pub mod payments;
