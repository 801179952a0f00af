//! Academic calendar: maps a date onto its academic year, term and grace window.
//!
//! Every function here is a pure function of the date and the grace policy.
//! Grace only ever looks back across a single term boundary: a booking date in
//! term N may be covered by the term N-1 payment when it falls within
//! `grace_days` of term N-1's end (term 1 looks back to term 3 of the previous
//! academic year).

use crate::config::PolicyConfig;
use crate::domain::payments::PaymentScope;
use crate::domain::types::{AcademicYear, DateWindow, ReceiptColor, Term};
use crate::error::Result;
use chrono::{Datelike, NaiveDate};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TermResolution {
    pub academic_year: AcademicYear,
    pub term: Term,
    pub term_window: DateWindow,
    pub receipt_color: ReceiptColor,
    /// Last date this term's payment still covers once the next term starts
    pub grace_end: NaiveDate,
}

/// The previous term whose grace window contains a booking date
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraceCoverage {
    pub academic_year: AcademicYear,
    pub term: Term,
    pub term_end: NaiveDate,
    pub grace_end: NaiveDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TermCalendar {
    grace_days: u32,
}

impl TermCalendar {
    pub fn new(grace_days: u32) -> Self {
        Self { grace_days }
    }

    pub fn from_policy(policy: &PolicyConfig) -> Self {
        Self::new(policy.grace_days)
    }

    pub fn resolve(&self, date: NaiveDate) -> Result<TermResolution> {
        let academic_year = AcademicYear::for_date(date)?;
        let term = Term::for_month(date.month());
        let term_window = academic_year.term_window(term);

        Ok(TermResolution {
            academic_year,
            term,
            term_window,
            receipt_color: term.receipt_color(),
            grace_end: self.grace_end(term_window),
        })
    }

    pub fn grace_end(&self, window: DateWindow) -> NaiveDate {
        window.extended_by(self.grace_days).end
    }

    /// Returns the previous term when `date` still sits inside its grace window
    pub fn previous_term_grace(&self, date: NaiveDate) -> Result<Option<GraceCoverage>> {
        if self.grace_days == 0 {
            return Ok(None);
        }

        let current = self.resolve(date)?;
        let (academic_year, term) = match current.term {
            Term::First => (current.academic_year.previous()?, Term::Third),
            Term::Second => (current.academic_year, Term::First),
            Term::Third => (current.academic_year, Term::Second),
        };

        let window = academic_year.term_window(term);
        let grace_end = self.grace_end(window);
        if date > window.end && date <= grace_end {
            Ok(Some(GraceCoverage {
                academic_year,
                term,
                term_end: window.end,
                grace_end,
            }))
        } else {
            Ok(None)
        }
    }

    /// Dates a confirmed payment of this scope is valid for
    pub fn scope_window(&self, academic_year: AcademicYear, scope: PaymentScope) -> DateWindow {
        match scope {
            PaymentScope::Term { term } => academic_year.term_window(term),
            PaymentScope::FullYear => academic_year.window(),
        }
    }
}

impl Default for TermCalendar {
    fn default() -> Self {
        Self::from_policy(&PolicyConfig::default())
    }
}
