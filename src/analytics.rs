//! Rule-based predictive heuristics: dropout risk, workload forecast and
//! personalized difficulty. Everything is recomputed per call from the
//! current database snapshot; nothing here is cached or persisted.

use chrono::{DateTime, Utc};
use rand::Rng;
use std::cmp::Ordering;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::config::AnalyticsConfig;
use crate::database::Database;
use crate::error::{CoreError, Result};
use crate::model::{
    AcademicPerformance, CourseRiskAnalysis, DifficultyFactor, DifficultyPrediction, FeedbackStats,
    Intensity, PersonalDifficulty, RiskAssessment, RiskDistribution, RiskLevel,
    UnavailablePrediction, User, WeekForecast,
};

/// Probability ceiling, in percentage points.
const MAX_RISK_POINTS: u32 = 95;
const INACTIVITY_DAYS: f64 = 7.0;
const TOP_RISK_STUDENTS: usize = 5;

/// Weekly hours the historical multiplier treats as neutral.
const NEUTRAL_WEEKLY_HOURS: f64 = 5.0;
const SYNTHETIC_WEEKS: usize = 16;
const MIDTERM_WEEK: u32 = 8;

const DEFAULT_DIFFICULTY: f64 = 5.0;

pub fn risk_level_for(probability: f64) -> RiskLevel {
    if probability > 0.7 {
        RiskLevel::Critical
    } else if probability > 0.4 {
        RiskLevel::High
    } else if probability > 0.2 {
        RiskLevel::Moderate
    } else {
        RiskLevel::Low
    }
}

/// Score a user's engagement signals as of `now`.
///
/// Points accumulate as whole percentages so band edges compare exactly.
/// The 100..500 XP band adds points without a factor string.
pub fn score_dropout(user: &User, now: DateTime<Utc>) -> RiskAssessment {
    let mut points: u32 = 0;
    let mut factors = Vec::new();

    match user.streak.current {
        0 => {
            points += 40;
            factors.push("Zero active streak".to_string());
        }
        1..=2 => {
            points += 10;
            factors.push("Low engagement consistency".to_string());
        }
        _ => {}
    }

    if user.xp < 100 {
        points += 30;
        factors.push("Critically low XP progression".to_string());
    } else if user.xp < 500 {
        points += 10;
    }

    match user.streak.last_login {
        Some(last_login) => {
            let days = (now - last_login).num_milliseconds() as f64 / 86_400_000.0;
            if days > INACTIVITY_DAYS {
                points += 20;
                factors.push(format!("Inactive for {} days", days.floor() as i64));
            }
        }
        None => {
            points += 20;
            factors.push("Unknown last login".to_string());
        }
    }

    let probability = f64::from(points.min(MAX_RISK_POINTS)) / 100.0;
    RiskAssessment {
        student_id: user.id,
        student_name: user.name.clone(),
        probability,
        risk_level: risk_level_for(probability),
        factors,
    }
}

/// Bucket per-student assessments and pick the riskiest five.
///
/// `assessments` must be in enrollment order; ties keep that order.
pub fn summarize_course_risk(course_id: i64, assessments: Vec<RiskAssessment>) -> CourseRiskAnalysis {
    let mut distribution = RiskDistribution::default();
    for assessment in &assessments {
        if assessment.probability > 0.6 {
            distribution.critical += 1;
        } else if assessment.probability > 0.3 {
            distribution.moderate += 1;
        } else {
            distribution.low += 1;
        }
    }

    let total_students = assessments.len();
    let mut ranked = assessments;
    ranked.sort_by(|a, b| {
        b.probability
            .partial_cmp(&a.probability)
            .unwrap_or(Ordering::Equal)
    });
    ranked.truncate(TOP_RISK_STUDENTS);

    CourseRiskAnalysis {
        course_id,
        total_students,
        risk_distribution: distribution,
        high_risk_students: ranked,
    }
}

pub fn historical_multiplier(stats: &FeedbackStats) -> f64 {
    match stats.avg_time_commitment {
        Some(avg) if stats.count > 0 => avg / NEUTRAL_WEEKLY_HOURS,
        _ => 1.0,
    }
}

/// Sixteen weeks of baseline hours drawn from `min_hours..=max_hours`.
pub fn synthetic_baseline(min_hours: u32, max_hours: u32) -> Vec<f64> {
    let mut rng = rand::thread_rng();
    (0..SYNTHETIC_WEEKS)
        .map(|_| f64::from(rng.gen_range(min_hours..=max_hours)))
        .collect()
}

/// One forecast entry per baseline week. Week 8 and the last week are exam
/// spikes; week 1 is a light intro unless it is also the last week.
pub fn forecast_weeks(baseline: &[f64], multiplier: f64) -> Vec<WeekForecast> {
    let total = baseline.len() as u32;

    baseline
        .iter()
        .enumerate()
        .map(|(idx, &hours)| {
            let week = idx as u32 + 1;
            let (spike, intensity, description) = if week == MIDTERM_WEEK || week == total {
                (1.5, Intensity::Heavy, "Exam Period")
            } else if week == 1 {
                (0.5, Intensity::Light, "Intro Week")
            } else {
                (1.0, Intensity::Normal, "Standard Lecture")
            };

            let adjusted = (hours * multiplier * spike).round().max(0.0);
            WeekForecast {
                week,
                hours: adjusted as u32,
                intensity,
                description: description.to_string(),
            }
        })
        .collect()
}

/// Difficulty shift from a student's record. GPA wins over the categorical
/// fallback; GPAs between 2.5 and 3.5 shift nothing.
///
/// 3.5 <= GPA < 3.8 takes the -1.0 band on purpose: the band chain is
/// authoritative, not the older note calling that range a no-adjustment gap.
pub fn performance_adjustment(gpa: Option<f64>, performance: Option<AcademicPerformance>) -> f64 {
    if let Some(gpa) = gpa {
        return if gpa >= 3.8 {
            -2.0
        } else if gpa >= 3.5 {
            -1.0
        } else if gpa < 2.5 {
            1.5
        } else {
            0.0
        };
    }

    match performance {
        Some(AcademicPerformance::Excellent) => -2.0,
        Some(AcademicPerformance::Good) => -1.0,
        Some(AcademicPerformance::Poor) => 2.0,
        Some(AcademicPerformance::Average) | None => 0.0,
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

pub fn predict_difficulty(baseline: f64, adjustment: f64) -> DifficultyPrediction {
    let score = (baseline + adjustment).clamp(1.0, 10.0);

    let (factor, rationale) = if adjustment <= -1.0 {
        (
            DifficultyFactor::Easy,
            "Your academic record suggests this course will feel easier for you than for most peers.",
        )
    } else if adjustment >= 1.0 {
        (
            DifficultyFactor::Challenging,
            "Based on your academic record, expect to invest extra effort in this course.",
        )
    } else {
        (
            DifficultyFactor::Standard,
            "Your expected experience is in line with the course average.",
        )
    };

    DifficultyPrediction {
        score: round1(score),
        baseline: round1(baseline),
        factor,
        rationale: rationale.to_string(),
    }
}

/// Course and student analytics over the persisted records.
#[derive(Clone)]
pub struct PredictiveAnalytics {
    db: Database,
    config: AnalyticsConfig,
}

impl PredictiveAnalytics {
    pub fn new(db: Database, config: AnalyticsConfig) -> Self {
        Self { db, config }
    }

    /// `Ok(None)` when the student id does not resolve.
    pub async fn predict_dropout_probability(&self, student_id: i64) -> Result<Option<RiskAssessment>> {
        let Some(user) = self.db.get_user(student_id).await? else {
            debug!(student_id, "dropout scoring skipped, no such user");
            return Ok(None);
        };
        let assessment = score_dropout(&user, Utc::now());
        debug!(
            student_id,
            probability = assessment.probability,
            factors = assessment.factors.len(),
            "dropout scored"
        );
        Ok(Some(assessment))
    }

    /// Score every enrolled student with at most `risk_fanout_limit`
    /// scorings in flight.
    pub async fn get_course_risk_analysis(&self, course_id: i64) -> Result<CourseRiskAnalysis> {
        if self.db.get_course(course_id).await?.is_none() {
            return Err(CoreError::course_not_found(course_id));
        }
        let student_ids = self.db.enrolled_student_ids(course_id).await?;

        let permits = Arc::new(Semaphore::new(self.config.risk_fanout_limit));
        let mut join_set = JoinSet::new();
        for (idx, student_id) in student_ids.into_iter().enumerate() {
            let analytics = self.clone();
            let permits = Arc::clone(&permits);
            join_set.spawn(async move {
                let _permit = permits
                    .acquire_owned()
                    .await
                    .map_err(|e| CoreError::Task(e.to_string()))?;
                let assessment = analytics.predict_dropout_probability(student_id).await?;
                Ok::<_, CoreError>((idx, assessment))
            });
        }

        let mut scored = Vec::new();
        while let Some(joined) = join_set.join_next().await {
            let (idx, assessment) = joined.map_err(|e| CoreError::Task(e.to_string()))??;
            if let Some(assessment) = assessment {
                scored.push((idx, assessment));
            }
        }
        scored.sort_by_key(|(idx, _)| *idx);

        let analysis = summarize_course_risk(course_id, scored.into_iter().map(|(_, a)| a).collect());
        debug!(
            course_id,
            total = analysis.total_students,
            critical = analysis.risk_distribution.critical,
            "course risk analysed"
        );
        Ok(analysis)
    }

    pub async fn get_workload_forecast(&self, course_id: i64) -> Result<Vec<WeekForecast>> {
        let course = self
            .db
            .get_course(course_id)
            .await?
            .ok_or_else(|| CoreError::course_not_found(course_id))?;

        let baseline = match course.syllabus.and_then(|s| s.weekly_workload) {
            Some(weeks) if !weeks.is_empty() => weeks,
            _ => {
                warn!(course_id, "no syllabus workload, using synthetic baseline");
                synthetic_baseline(
                    self.config.synthetic_min_hours,
                    self.config.synthetic_max_hours,
                )
            }
        };

        let stats = self.db.course_feedback_stats(course_id).await?;
        Ok(forecast_weeks(&baseline, historical_multiplier(&stats)))
    }

    /// The course must exist; a missing or non-student user gets the
    /// `"N/A"` placeholder instead of an error.
    pub async fn get_personal_difficulty_score(
        &self,
        student_id: i64,
        course_id: i64,
    ) -> Result<PersonalDifficulty> {
        if self.db.get_course(course_id).await?.is_none() {
            return Err(CoreError::course_not_found(course_id));
        }

        let student = match self.db.get_user(student_id).await? {
            Some(user) if user.is_student() => user,
            _ => return Ok(PersonalDifficulty::Unavailable(UnavailablePrediction::default())),
        };

        let stats = self.db.course_feedback_stats(course_id).await?;
        let baseline = stats.avg_difficulty.unwrap_or(DEFAULT_DIFFICULTY);
        let adjustment = performance_adjustment(student.gpa, student.academic_performance);

        Ok(PersonalDifficulty::Predicted(predict_difficulty(baseline, adjustment)))
    }
}
