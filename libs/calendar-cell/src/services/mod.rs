pub mod audit;
pub mod booking;
pub mod calendar;
pub mod ledger;
pub mod materializer;
pub mod past;
pub mod schedule;
pub mod slots;
pub mod store;

pub use audit::ConsistencyAuditor;
pub use booking::SlotBookingService;
pub use calendar::CalendarService;
pub use ledger::AppointmentLedger;
pub use materializer::CalendarMaterializer;
pub use past::PastCalendarGenerator;
pub use schedule::ScheduleService;
pub use slots::SlotAvailabilityEngine;
pub use store::CalendarStore;
