// libs/calendar-cell/src/router.rs
use std::sync::Arc;

use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn calendar_routes(state: Arc<AppConfig>) -> Router {
    // Every calendar operation requires authentication
    let protected_routes = Router::new()
        // Month and schedule views
        .route("/", get(handlers::get_calendar))
        .route(
            "/schedule/{professional_type}/{professional_id}",
            get(handlers::get_schedule),
        )
        .route(
            "/slots/{professional_type}/{professional_id}",
            get(handlers::get_available_slots),
        )
        // Booking
        .route("/slots/book", post(handlers::book_slot))
        .route("/slots/release", post(handlers::release_slot))
        // Professional self-service
        .route("/schedule/availability", put(handlers::update_availability))
        .route("/schedule/breaks", post(handlers::add_break))
        .route("/schedule/breaks/{break_id}", delete(handlers::remove_break))
        // Administration
        .route("/admin/initialize", post(handlers::initialize_month))
        .route("/admin/clean", post(handlers::clean_old_calendars))
        .route("/admin/audit", get(handlers::audit_health))
        .route("/admin/repair", post(handlers::repair_inconsistencies))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .merge(protected_routes)
        .with_state(state)
}
