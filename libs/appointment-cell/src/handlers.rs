// libs/appointment-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_models::error::AppError;
use shared_models::RecomputeTrigger;

use crate::models::{BookAppointmentRequest, CancelAppointmentRequest, RescheduleAppointmentRequest, RiskWindowQuery};
use crate::services::SchedulingEngine;

// ==============================================================================
// BOOKING HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn book_appointment(
    State(engine): State<Arc<SchedulingEngine>>,
    Json(request): Json<BookAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let outcome = engine.book(request).await?;

    Ok(Json(json!({
        "success": true,
        "appointment": outcome.appointment,
        "risk": outcome.assessment,
        "interventions": outcome.plan,
        "message": "Appointment booked successfully"
    })))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(engine): State<Arc<SchedulingEngine>>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let appointment = engine.get_appointment(appointment_id).await?;
    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn cancel_appointment(
    State(engine): State<Arc<SchedulingEngine>>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<CancelAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let change = engine.cancel(appointment_id, request.reason.as_deref()).await?;

    Ok(Json(json!({
        "success": true,
        "appointment": change.appointment,
        "changed": change.changed,
        "message": if change.changed { "Appointment cancelled" } else { "Appointment was already cancelled" }
    })))
}

#[axum::debug_handler]
pub async fn reschedule_appointment(
    State(engine): State<Arc<SchedulingEngine>>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<RescheduleAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let outcome = engine.reschedule(appointment_id, request).await?;

    Ok(Json(json!({
        "success": true,
        "cancelled": outcome.cancelled,
        "appointment": outcome.booking.appointment,
        "risk": outcome.booking.assessment,
        "interventions": outcome.booking.plan
    })))
}

// ==============================================================================
// LIFECYCLE HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn confirm_appointment(
    State(engine): State<Arc<SchedulingEngine>>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let change = engine.confirm(appointment_id).await?;
    Ok(Json(json!(change)))
}

#[axum::debug_handler]
pub async fn complete_appointment(
    State(engine): State<Arc<SchedulingEngine>>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let change = engine.complete(appointment_id).await?;
    Ok(Json(json!(change)))
}

#[axum::debug_handler]
pub async fn mark_no_show(
    State(engine): State<Arc<SchedulingEngine>>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let change = engine.mark_no_show(appointment_id).await?;
    Ok(Json(json!(change)))
}

// ==============================================================================
// RISK AND INTERVENTION HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn score_appointment(
    State(engine): State<Arc<SchedulingEngine>>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let assessment = engine.score(appointment_id, RecomputeTrigger::Manual).await?;
    let recommendations = engine.risk().scorer().recommendations(&assessment);

    Ok(Json(json!({
        "assessment": assessment,
        "recommendations": recommendations
    })))
}

#[axum::debug_handler]
pub async fn get_risk(
    State(engine): State<Arc<SchedulingEngine>>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let summary = engine.risk_summary(appointment_id).await?;
    Ok(Json(json!(summary)))
}

#[axum::debug_handler]
pub async fn acknowledge_reminder(
    State(engine): State<Arc<SchedulingEngine>>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let acknowledged = engine.acknowledge(appointment_id).await?;
    Ok(Json(json!({
        "appointment_id": appointment_id,
        "acknowledged": acknowledged
    })))
}

#[axum::debug_handler]
pub async fn get_interventions(
    State(engine): State<Arc<SchedulingEngine>>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    engine.get_appointment(appointment_id).await?;
    let tracker = engine.tracker(appointment_id).await;
    Ok(Json(json!({
        "appointment_id": appointment_id,
        "tracker": tracker
    })))
}

#[axum::debug_handler]
pub async fn run_follow_ups(State(engine): State<Arc<SchedulingEngine>>) -> Result<Json<Value>, AppError> {
    engine.drain_delivery_reports().await;
    let escalations = engine.process_follow_ups().await;
    Ok(Json(json!({
        "escalations": escalations,
        "total": escalations.len()
    })))
}

#[axum::debug_handler]
pub async fn run_recompute(State(engine): State<Arc<SchedulingEngine>>) -> Result<Json<Value>, AppError> {
    let recomputed = engine.recompute_due().await?;
    Ok(Json(json!({
        "assessments": recomputed,
        "total": recomputed.len()
    })))
}

#[axum::debug_handler]
pub async fn get_high_risk_appointments(
    State(engine): State<Arc<SchedulingEngine>>,
    Query(query): Query<RiskWindowQuery>,
) -> Result<Json<Value>, AppError> {
    if query.to <= query.from {
        return Err(AppError::ValidationError("`to` must be after `from`".to_string()));
    }

    let flagged = engine.high_risk_appointments(query.from, query.to).await?;
    let appointments: Vec<Value> = flagged
        .into_iter()
        .map(|(appointment, assessment)| {
            json!({
                "appointment": appointment,
                "assessment": assessment
            })
        })
        .collect();

    Ok(Json(json!({
        "total": appointments.len(),
        "appointments": appointments
    })))
}
