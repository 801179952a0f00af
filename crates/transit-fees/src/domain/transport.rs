use crate::domain::types::{RouteId, ScheduleId, StudentId};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: StudentId,
    pub name: String,
    pub enrolled: bool,
    pub allocated_route_id: Option<RouteId>,
    pub boarding_stop: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    pub id: RouteId,
    pub name: String,
    pub active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleStatus {
    Scheduled,
    InProgress,
    Completed,
    Cancelled,
}

impl ScheduleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleStatus::Scheduled => "scheduled",
            ScheduleStatus::InProgress => "in_progress",
            ScheduleStatus::Completed => "completed",
            ScheduleStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "scheduled" => Some(ScheduleStatus::Scheduled),
            "in_progress" => Some(ScheduleStatus::InProgress),
            "completed" => Some(ScheduleStatus::Completed),
            "cancelled" => Some(ScheduleStatus::Cancelled),
            _ => None,
        }
    }
}

impl fmt::Display for ScheduleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A dated trip on a route with a fixed seat capacity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    pub id: ScheduleId,
    pub route_id: RouteId,
    pub date: NaiveDate,
    pub available_seats: u32,
    pub booked_seats: u32,
    pub booking_enabled: bool,
    pub status: ScheduleStatus,
}

impl Schedule {
    pub fn remaining_seats(&self) -> u32 {
        self.available_seats.saturating_sub(self.booked_seats)
    }

    pub fn is_full(&self) -> bool {
        self.booked_seats >= self.available_seats
    }

    /// Why the schedule cannot take a booking right now, if anything
    pub fn denial_reason(&self) -> Option<String> {
        if !self.booking_enabled {
            Some("booking is disabled for this schedule".to_string())
        } else if self.status != ScheduleStatus::Scheduled {
            Some(format!("schedule is {}", self.status))
        } else if self.is_full() {
            Some("no seats available".to_string())
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schedule() -> Schedule {
        Schedule {
            id: ScheduleId::new("sch-1"),
            route_id: RouteId::new("route-7"),
            date: NaiveDate::from_ymd_opt(2025, 11, 3).unwrap(),
            available_seats: 2,
            booked_seats: 1,
            booking_enabled: true,
            status: ScheduleStatus::Scheduled,
        }
    }

    #[test]
    fn test_schedule_denials() {
        let open = schedule();
        assert_eq!(open.denial_reason(), None);
        assert_eq!(open.remaining_seats(), 1);

        let mut full = schedule();
        full.booked_seats = 2;
        assert_eq!(full.denial_reason().as_deref(), Some("no seats available"));

        let mut disabled = schedule();
        disabled.booking_enabled = false;
        assert!(disabled.denial_reason().unwrap().contains("disabled"));

        let mut cancelled = schedule();
        cancelled.status = ScheduleStatus::Cancelled;
        assert_eq!(
            cancelled.denial_reason().as_deref(),
            Some("schedule is cancelled")
        );
    }
}
