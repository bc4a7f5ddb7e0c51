// libs/calendar-cell/src/services/booking.rs
//
// Commits slot reservations. The ledger conflict check and the cache append
// run inside a per-(professional, date) lock so that at most one booking for
// an overlapping interval can succeed; the ledger stays authoritative for
// the reject decision, the aggregate write is guarded by its version.

use chrono::{Datelike, DateTime, Duration, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use shared_database::supabase::SupabaseClient;

use crate::error::CalendarError;
use crate::models::{
    AppointmentStatus, BookSlotRequest, BookedSlot, CalendarSettings, ReleaseSlotRequest,
};
use crate::services::ledger::AppointmentLedger;
use crate::services::materializer::CalendarMaterializer;
use crate::services::store::CalendarStore;
use crate::time::{is_valid_time, time_to_minutes, Clock};

pub struct SlotBookingService {
    supabase: Arc<SupabaseClient>,
    ledger: Arc<AppointmentLedger>,
    materializer: Arc<CalendarMaterializer>,
    store: Arc<CalendarStore>,
    clock: Arc<dyn Clock>,
    settings: CalendarSettings,
}

impl SlotBookingService {
    pub fn new(
        supabase: Arc<SupabaseClient>,
        ledger: Arc<AppointmentLedger>,
        materializer: Arc<CalendarMaterializer>,
        store: Arc<CalendarStore>,
        clock: Arc<dyn Clock>,
        settings: CalendarSettings,
    ) -> Self {
        Self {
            supabase,
            ledger,
            materializer,
            store,
            clock,
            settings,
        }
    }

    /// Book one slot. Validation happens before any I/O; the conflict gate
    /// and the cache append run under the slot lock.
    #[instrument(skip(self, auth_token))]
    pub async fn book_slot(
        &self,
        request: &BookSlotRequest,
        booked_by: Option<&str>,
        auth_token: &str,
    ) -> Result<BookedSlot, CalendarError> {
        if request.date < self.clock.today() {
            return Err(CalendarError::PastDateNotBookable);
        }
        if !is_valid_time(&request.start_time)
            || !is_valid_time(&request.end_time)
            || time_to_minutes(&request.end_time) <= time_to_minutes(&request.start_time)
        {
            return Err(CalendarError::InvalidTimeRange(format!(
                "{} to {}",
                request.start_time, request.end_time
            )));
        }

        let lock_key = format!(
            "slot_{}_{}_{}",
            request.professional_type, request.professional_id, request.date
        );

        for attempt in 1..=self.settings.lock_retry_attempts {
            if !self.acquire_slot_lock(&lock_key, request.professional_id).await? {
                warn!(
                    "Slot lock busy for {}, attempt {}/{}",
                    lock_key, attempt, self.settings.lock_retry_attempts
                );
                tokio::time::sleep(tokio::time::Duration::from_millis(100 * attempt as u64)).await;
                continue;
            }

            let outcome = self.book_under_lock(request, booked_by, auth_token).await;
            self.release_slot_lock(&lock_key).await?;
            return outcome;
        }

        Err(CalendarError::DatabaseError(
            "Failed to acquire booking lock after multiple attempts".to_string(),
        ))
    }

    async fn book_under_lock(
        &self,
        request: &BookSlotRequest,
        booked_by: Option<&str>,
        auth_token: &str,
    ) -> Result<BookedSlot, CalendarError> {
        // Step 1: authoritative conflict gate against the ledger. The
        // caller's own ledger row is excluded so it cannot block itself.
        let conflicts = self
            .ledger
            .find_overlapping(
                request.professional_id,
                request.professional_type,
                request.date,
                &request.start_time,
                &request.end_time,
                Some(request.appointment_id),
                auth_token,
            )
            .await?;

        if !conflicts.is_empty() {
            info!(
                "Booking rejected for {} {} on {} {}-{}: {} overlapping appointments",
                request.professional_type,
                request.professional_id,
                request.date,
                request.start_time,
                request.end_time,
                conflicts.len()
            );
            return Err(CalendarError::SlotConflict {
                conflicts: conflicts.len(),
            });
        }

        for attempt in 1..=self.settings.write_retry_attempts {
            // Step 2: resolve or materialize the month aggregate.
            let mut calendar = self
                .materializer
                .resolve_or_materialize(request.date.year(), request.date.month(), auth_token)
                .await?
                .ok_or(CalendarError::PastDateNotBookable)?;

            let day = calendar
                .day_for_mut(request.date)
                .ok_or_else(|| CalendarError::NotFound(format!("Calendar day {}", request.date)))?;

            // An explicitly hidden day refuses bookings; a missing schedule
            // does not, since the ledger gate already passed.
            if let Some(existing) = day.schedule_for(request.professional_id, request.professional_type)
            {
                if !existing.is_available {
                    return Err(CalendarError::ProfessionalUnavailable);
                }
            }

            // Step 3: make sure the professional has a schedule on this day.
            let schedule = day.ensure_schedule(request.professional_id, request.professional_type);

            if let Some(cached) = schedule
                .booked_slots
                .iter()
                .find(|slot| slot.appointment_id == request.appointment_id)
            {
                debug!("Appointment {} already cached, returning snapshot", request.appointment_id);
                return Ok(cached.clone());
            }

            // Step 4: append the snapshot to the day's booking cache.
            let slot = BookedSlot {
                appointment_id: request.appointment_id,
                patient_id: request.patient_id,
                patient_name: request.patient_name.clone(),
                start_time: request.start_time.clone(),
                end_time: request.end_time.clone(),
                status: AppointmentStatus::Booked,
                booked_by: booked_by.map(String::from),
                booked_at: Some(Utc::now()),
            };
            schedule.booked_slots.push(slot.clone());

            // Step 5: persist the whole aggregate under its version guard.
            match self.store.update_month(&calendar, auth_token).await {
                Ok(_) => {
                    info!(
                        "Booked {} for {} {} on {} {}-{}",
                        request.appointment_id,
                        request.professional_type,
                        request.professional_id,
                        request.date,
                        request.start_time,
                        request.end_time
                    );
                    return Ok(slot);
                }
                Err(CalendarError::AggregateWriteConflict)
                    if attempt < self.settings.write_retry_attempts =>
                {
                    warn!(
                        "Aggregate version conflict booking {}, retry {}/{}",
                        request.appointment_id, attempt, self.settings.write_retry_attempts
                    );
                    tokio::time::sleep(tokio::time::Duration::from_millis(100 * attempt as u64))
                        .await;
                }
                Err(e) => return Err(e),
            }
        }

        Err(CalendarError::AggregateWriteConflict)
    }

    /// Drop the cached snapshot for an appointment, typically after a
    /// cancellation. The ledger row itself belongs to the appointment
    /// lifecycle and is not touched here. Returns false when nothing was
    /// cached to begin with.
    #[instrument(skip(self, auth_token))]
    pub async fn release_slot(
        &self,
        request: &ReleaseSlotRequest,
        auth_token: &str,
    ) -> Result<bool, CalendarError> {
        for attempt in 1..=self.settings.write_retry_attempts {
            let Some(mut calendar) = self
                .store
                .fetch_month(request.date.year(), request.date.month(), auth_token)
                .await?
            else {
                return Ok(false);
            };

            let Some(day) = calendar.day_for_mut(request.date) else {
                return Ok(false);
            };
            let Some(schedule) =
                day.schedule_for_mut(request.professional_id, request.professional_type)
            else {
                return Ok(false);
            };

            let before = schedule.booked_slots.len();
            schedule
                .booked_slots
                .retain(|slot| slot.appointment_id != request.appointment_id);
            if schedule.booked_slots.len() == before {
                return Ok(false);
            }

            match self.store.update_month(&calendar, auth_token).await {
                Ok(_) => {
                    info!(
                        "Released cached slot for appointment {} on {}",
                        request.appointment_id, request.date
                    );
                    return Ok(true);
                }
                Err(CalendarError::AggregateWriteConflict)
                    if attempt < self.settings.write_retry_attempts =>
                {
                    warn!(
                        "Aggregate version conflict releasing {}, retry {}/{}",
                        request.appointment_id, attempt, self.settings.write_retry_attempts
                    );
                    tokio::time::sleep(tokio::time::Duration::from_millis(100 * attempt as u64))
                        .await;
                }
                Err(e) => return Err(e),
            }
        }

        Err(CalendarError::AggregateWriteConflict)
    }

    /// Insert a lock row for the slot key. Fails closed: an existing row
    /// means someone else holds the section, unless their lease expired.
    async fn acquire_slot_lock(
        &self,
        lock_key: &str,
        professional_id: Uuid,
    ) -> Result<bool, CalendarError> {
        match self
            .supabase
            .request::<Value>(
                Method::POST,
                "/rest/v1/slot_locks",
                None,
                Some(self.lock_row(lock_key, professional_id)),
            )
            .await
        {
            Ok(_) => {
                debug!("Slot lock acquired: {}", lock_key);
                Ok(true)
            }
            Err(_) => {
                if self.cleanup_expired_lock(lock_key).await? {
                    self.try_acquire_lock_once(lock_key, professional_id).await
                } else {
                    Ok(false)
                }
            }
        }
    }

    async fn try_acquire_lock_once(
        &self,
        lock_key: &str,
        professional_id: Uuid,
    ) -> Result<bool, CalendarError> {
        match self
            .supabase
            .request::<Value>(
                Method::POST,
                "/rest/v1/slot_locks",
                None,
                Some(self.lock_row(lock_key, professional_id)),
            )
            .await
        {
            Ok(_) => {
                debug!("Slot lock acquired after cleanup: {}", lock_key);
                Ok(true)
            }
            // Someone else re-acquired during cleanup.
            Err(_) => Ok(false),
        }
    }

    fn lock_row(&self, lock_key: &str, professional_id: Uuid) -> Value {
        let now = Utc::now();
        json!({
            "lock_key": lock_key,
            "professional_id": professional_id,
            "acquired_at": now.to_rfc3339(),
            "expires_at": (now + Duration::seconds(self.settings.lock_expiry_seconds)).to_rfc3339(),
            "process_id": format!("calendar_{}", Uuid::new_v4())
        })
    }

    async fn release_slot_lock(&self, lock_key: &str) -> Result<(), CalendarError> {
        let _response: Value = self
            .supabase
            .request::<Value>(
                Method::DELETE,
                &format!("/rest/v1/slot_locks?lock_key=eq.{}", lock_key),
                None,
                None,
            )
            .await
            .map_err(|e| CalendarError::DatabaseError(format!("Lock release failed: {}", e)))?;

        debug!("Slot lock released: {}", lock_key);
        Ok(())
    }

    /// Check whether the lock holder's lease ran out; if so remove the row
    /// and report that an acquire retry is worthwhile.
    async fn cleanup_expired_lock(&self, lock_key: &str) -> Result<bool, CalendarError> {
        let response: Value = self
            .supabase
            .request::<Value>(
                Method::GET,
                &format!("/rest/v1/slot_locks?lock_key=eq.{}&select=*", lock_key),
                None,
                None,
            )
            .await
            .map_err(|e| CalendarError::DatabaseError(format!("Lock check failed: {}", e)))?;

        if let Some(lock) = response.as_array().and_then(|locks| locks.first()) {
            if let Some(expires_at_str) = lock.get("expires_at").and_then(|v| v.as_str()) {
                if let Ok(expires_at) = DateTime::parse_from_rfc3339(expires_at_str) {
                    if expires_at.with_timezone(&Utc) < Utc::now() {
                        self.release_slot_lock(lock_key).await?;
                        return Ok(true);
                    }
                }
            }
        }

        Ok(false)
    }

    /// Remove every expired lock row. Run from the periodic maintenance
    /// task so crashed holders cannot wedge a slot forever.
    pub async fn cleanup_expired_locks(&self) -> Result<u32, CalendarError> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("Prefer", reqwest::header::HeaderValue::from_static("return=representation"));

        let now = urlencoding::encode(&Utc::now().to_rfc3339()).into_owned();
        let removed: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::DELETE,
                &format!("/rest/v1/slot_locks?expires_at=lt.{}", now),
                None,
                None,
                Some(headers),
            )
            .await
            .map_err(|e| CalendarError::DatabaseError(format!("Lock cleanup failed: {}", e)))?;

        let count = removed.len() as u32;
        if count > 0 {
            info!("Cleaned up {} expired slot locks", count);
        }

        Ok(count)
    }
}
