use thiserror::Error;

#[derive(Error, Debug)]
pub enum CalendarError {
    #[error("Month must be between 1 and 12, got {0}")]
    InvalidMonth(u32),

    #[error("Cannot book a slot on a past date")]
    PastDateNotBookable,

    #[error("Cannot edit availability for a past date")]
    PastDateNotEditable,

    #[error("Invalid time range: {0}")]
    InvalidTimeRange(String),

    #[error("Slot conflicts with {conflicts} existing booking(s)")]
    SlotConflict { conflicts: usize },

    #[error("Break overlaps {conflicts} active booking(s)")]
    BreakConflictsWithBooking { conflicts: usize },

    #[error("Break overlaps an existing break")]
    BreakOverlap,

    #[error("Day has {count} active booking(s) and cannot be made unavailable")]
    HasExistingBookings { count: usize },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Professional is not available on this day")]
    ProfessionalUnavailable,

    #[error("Calendar was modified concurrently")]
    AggregateWriteConflict,

    #[error("Database error: {0}")]
    DatabaseError(String),
}
