//! Appointment Aggregate: a booked service with an esthetician.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{EcommerceError, Result};

string_enum! {
    pub enum AppointmentStatus {
        Scheduled => "scheduled",
        Confirmed => "confirmed",
        Completed => "completed",
        Cancelled => "cancelled",
        NoShow => "no_show",
    }
}

impl AppointmentStatus {
    pub fn can_transition_to(&self, next: AppointmentStatus) -> bool {
        use AppointmentStatus::*;
        matches!(
            (self, next),
            (Scheduled, Confirmed | Cancelled | NoShow) | (Confirmed, Completed | Cancelled | NoShow)
        )
    }

    /// Holds the esthetician's time slot.
    pub fn blocks_slot(&self) -> bool {
        *self != AppointmentStatus::Cancelled
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub esthetician_id: Uuid,
    pub service_id: Uuid,
    pub scheduled_at: DateTime<Utc>,
    pub duration_minutes: i32,
    pub status: AppointmentStatus,
    pub notes: Option<String>,
    pub is_paid: bool,
    pub order_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    pub fn book(
        user_id: Uuid,
        esthetician_id: Uuid,
        service_id: Uuid,
        scheduled_at: DateTime<Utc>,
        duration_minutes: i32,
        notes: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            user_id,
            esthetician_id,
            service_id,
            scheduled_at,
            duration_minutes,
            status: AppointmentStatus::Scheduled,
            notes,
            is_paid: false,
            order_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn ends_at(&self) -> DateTime<Utc> {
        self.scheduled_at + Duration::minutes(i64::from(self.duration_minutes))
    }

    /// Half-open interval overlap with `[start, start + minutes)`.
    pub fn overlaps(&self, start: DateTime<Utc>, minutes: i32) -> bool {
        let end = start + Duration::minutes(i64::from(minutes));
        self.status.blocks_slot() && self.scheduled_at < end && start < self.ends_at()
    }

    pub fn transition_to(&mut self, next: AppointmentStatus) -> Result<()> {
        if self.status == next {
            return Ok(());
        }
        if !self.status.can_transition_to(next) {
            return Err(EcommerceError::Validation(format!(
                "appointment cannot move from {} to {}",
                self.status, next
            )));
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }
}
