use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse, ResponseError};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::analytics::PredictiveAnalytics;
use crate::config::AppConfig;
use crate::database::Database;
use crate::error::CoreError;
use crate::gamification::GamificationEngine;
use crate::model::{BadgeTrigger, NewFeedback};

pub struct AppState {
    pub gamification: GamificationEngine,
    pub analytics: PredictiveAnalytics,
}

impl AppState {
    pub fn new(db: Database, config: &AppConfig) -> Self {
        Self {
            gamification: GamificationEngine::new(db.clone(), config.gamification.clone()),
            analytics: PredictiveAnalytics::new(db, config.analytics.clone()),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl ResponseError for CoreError {
    fn status_code(&self) -> StatusCode {
        match self {
            CoreError::NotFound { .. } => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorBody {
            error: self.to_string(),
        })
    }
}

fn bad_request(message: &str) -> HttpResponse {
    HttpResponse::BadRequest().json(ErrorBody {
        error: message.to_string(),
    })
}

/// Largest single XP grant accepted over HTTP.
const MAX_XP_AWARD: i64 = 100_000;

#[derive(Deserialize)]
struct AddXpRequest {
    amount: i64,
    reason: String,
}

async fn add_xp(
    state: web::Data<AppState>,
    path: web::Path<i64>,
    req: web::Json<AddXpRequest>,
) -> Result<HttpResponse, CoreError> {
    if req.amount <= 0 || req.amount > MAX_XP_AWARD {
        return Ok(bad_request("amount must be between 1 and 100000"));
    }
    let award = state
        .gamification
        .add_xp(path.into_inner(), req.amount, &req.reason)
        .await?;
    Ok(HttpResponse::Ok().json(award))
}

async fn check_badges(
    state: web::Data<AppState>,
    path: web::Path<i64>,
    trigger: web::Json<BadgeTrigger>,
) -> Result<HttpResponse, CoreError> {
    let badge = state
        .gamification
        .check_badges(path.into_inner(), trigger.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(badge))
}

async fn record_login(
    state: web::Data<AppState>,
    path: web::Path<i64>,
) -> Result<HttpResponse, CoreError> {
    let outcome = state
        .gamification
        .record_login(path.into_inner(), Utc::now())
        .await?;
    Ok(HttpResponse::Ok().json(outcome))
}

async fn submit_feedback(
    state: web::Data<AppState>,
    req: web::Json<NewFeedback>,
) -> Result<HttpResponse, CoreError> {
    let feedback = req.into_inner();
    if !(1.0..=10.0).contains(&feedback.difficulty_index) {
        return Ok(bad_request("difficultyIndex must be between 1 and 10"));
    }
    if feedback.time_commitment < 0.0 {
        return Ok(bad_request("timeCommitment cannot be negative"));
    }
    let outcome = state.gamification.submit_feedback(feedback).await?;
    Ok(HttpResponse::Created().json(outcome))
}

async fn upvote_feedback(
    state: web::Data<AppState>,
    path: web::Path<i64>,
) -> Result<HttpResponse, CoreError> {
    let outcome = state.gamification.upvote_feedback(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(outcome))
}

async fn dropout_risk(
    state: web::Data<AppState>,
    path: web::Path<i64>,
) -> Result<HttpResponse, CoreError> {
    let student_id = path.into_inner();
    let assessment = state
        .analytics
        .predict_dropout_probability(student_id)
        .await?
        .ok_or_else(|| CoreError::user_not_found(student_id))?;
    Ok(HttpResponse::Ok().json(assessment))
}

async fn course_risk_analysis(
    state: web::Data<AppState>,
    path: web::Path<i64>,
) -> Result<HttpResponse, CoreError> {
    let analysis = state
        .analytics
        .get_course_risk_analysis(path.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(analysis))
}

async fn workload_forecast(
    state: web::Data<AppState>,
    path: web::Path<i64>,
) -> Result<HttpResponse, CoreError> {
    let forecast = state
        .analytics
        .get_workload_forecast(path.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(forecast))
}

async fn personal_difficulty(
    state: web::Data<AppState>,
    path: web::Path<(i64, i64)>,
) -> Result<HttpResponse, CoreError> {
    let (course_id, student_id) = path.into_inner();
    let prediction = state
        .analytics
        .get_personal_difficulty_score(student_id, course_id)
        .await?;
    Ok(HttpResponse::Ok().json(prediction))
}

async fn health_check() -> HttpResponse {
    HttpResponse::Ok().body("Course Insight API is running!")
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health_check))
        .route("/users/{id}/xp", web::post().to(add_xp))
        .route("/users/{id}/badges/check", web::post().to(check_badges))
        .route("/users/{id}/login", web::post().to(record_login))
        .route("/feedback", web::post().to(submit_feedback))
        .route("/feedback/{id}/upvote", web::post().to(upvote_feedback))
        .route("/students/{id}/dropout-risk", web::get().to(dropout_risk))
        .route("/courses/{id}/risk-analysis", web::get().to(course_risk_analysis))
        .route("/courses/{id}/workload-forecast", web::get().to(workload_forecast))
        .route(
            "/courses/{course_id}/difficulty/{student_id}",
            web::get().to(personal_difficulty),
        );
}
