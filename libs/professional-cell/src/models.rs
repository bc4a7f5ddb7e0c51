// libs/professional-cell/src/models.rs
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc, NaiveDate};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ProfessionalType {
    Doctor,
    Physiotherapist,
    Pathology,
}

impl fmt::Display for ProfessionalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProfessionalType::Doctor => write!(f, "doctor"),
            ProfessionalType::Physiotherapist => write!(f, "physiotherapist"),
            ProfessionalType::Pathology => write!(f, "pathology"),
        }
    }
}

impl ProfessionalType {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "doctor" => Some(ProfessionalType::Doctor),
            "physiotherapist" => Some(ProfessionalType::Physiotherapist),
            "pathology" => Some(ProfessionalType::Pathology),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Professional {
    pub id: Uuid,
    pub professional_type: ProfessionalType,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub is_verified: bool,
    pub is_active: bool,
    pub is_approved: bool,
    pub consultation_fee: Option<f64>,
    pub home_visit_fee: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Professional {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    /// Eligible for calendar materialization and bookings.
    pub fn is_eligible(&self) -> bool {
        self.is_verified && self.is_active && self.is_approved
    }

    /// Fee quoted for a slot kind: home visits carry their own rate when
    /// set, everything else bills the consultation fee.
    pub fn fee_for(&self, slot_kind: SlotKind) -> Option<f64> {
        match slot_kind {
            SlotKind::Home => self.home_visit_fee.or(self.consultation_fee),
            SlotKind::Clinic => self.consultation_fee,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SlotKind {
    Clinic,
    Home,
}

impl fmt::Display for SlotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotKind::Clinic => write!(f, "clinic"),
            SlotKind::Home => write!(f, "home"),
        }
    }
}

/// One recurring entry of a professional's weekly offered-slot template.
/// Times are "HH:MM" wall-clock strings, day_of_week is 0 = Sunday .. 6 = Saturday.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateSlot {
    pub id: Uuid,
    pub professional_id: Uuid,
    pub professional_type: ProfessionalType,
    pub day_of_week: i32,
    pub start_time: String,
    pub end_time: String,
    pub slot_kind: SlotKind,
    pub is_available: bool,
    pub created_at: DateTime<Utc>,
}

/// A pathology lab's dated test window. Labs publish concrete dates instead of
/// a recurring weekly template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabTestSlot {
    pub id: Uuid,
    pub lab_id: Uuid,
    pub test_date: NaiveDate,
    pub start_time: String,
    pub end_time: String,
    pub is_available: bool,
    pub created_at: DateTime<Utc>,
}

/// Normalized offered window, independent of where it came from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfferedSlot {
    pub start_time: String,
    pub end_time: String,
    pub slot_kind: SlotKind,
    pub is_available: bool,
}

impl OfferedSlot {
    pub fn from_template(slot: &TemplateSlot) -> Self {
        Self {
            start_time: slot.start_time.clone(),
            end_time: slot.end_time.clone(),
            slot_kind: slot.slot_kind,
            is_available: slot.is_available,
        }
    }

    pub fn from_lab_slot(slot: &LabTestSlot) -> Self {
        Self {
            start_time: slot.start_time.clone(),
            end_time: slot.end_time.clone(),
            slot_kind: SlotKind::Clinic,
            is_available: slot.is_available,
        }
    }
}

#[derive(Error, Debug)]
pub enum ProfessionalError {
    #[error("Professional not found")]
    NotFound,

    #[error("Database error: {0}")]
    DatabaseError(String),
}
