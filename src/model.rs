use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Faculty,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Faculty => "faculty",
            Role::Admin => "admin",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "student" => Some(Role::Student),
            "faculty" => Some(Role::Faculty),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

/// Categorical performance used when no GPA is on file.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum AcademicPerformance {
    Excellent,
    Good,
    Average,
    Poor,
}

impl AcademicPerformance {
    pub fn as_str(&self) -> &'static str {
        match self {
            AcademicPerformance::Excellent => "Excellent",
            AcademicPerformance::Good => "Good",
            AcademicPerformance::Average => "Average",
            AcademicPerformance::Poor => "Poor",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "excellent" => Some(AcademicPerformance::Excellent),
            "good" => Some(AcademicPerformance::Good),
            "average" => Some(AcademicPerformance::Average),
            "poor" => Some(AcademicPerformance::Poor),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Streak {
    pub current: u32,
    pub last_login: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Badge {
    pub id: String,
    pub name: String,
    pub icon: String,
    pub date_earned: DateTime<Utc>,
}

/// A user as the core sees it: identity plus the progress fields the
/// gamification engine owns.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub xp: i64,
    pub level: u32,
    /// Append-only, in the order earned.
    pub badges: Vec<Badge>,
    pub streak: Streak,
    pub gpa: Option<f64>,
    pub academic_performance: Option<AcademicPerformance>,
}

impl User {
    pub fn has_badge(&self, badge_id: &str) -> bool {
        self.badges.iter().any(|b| b.id == badge_id)
    }

    pub fn is_student(&self) -> bool {
        self.role == Role::Student
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub role: Role,
    #[serde(default)]
    pub gpa: Option<f64>,
    #[serde(default)]
    pub academic_performance: Option<AcademicPerformance>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Syllabus {
    pub topic_count: Option<u32>,
    /// Expected study hours, one entry per week.
    pub weekly_workload: Option<Vec<f64>>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub id: i64,
    pub code: String,
    pub title: String,
    pub syllabus: Option<Syllabus>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct NewCourse {
    pub code: String,
    pub title: String,
    #[serde(default)]
    pub syllabus: Option<Syllabus>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Feedback {
    pub id: i64,
    pub course_id: i64,
    pub user_id: i64,
    pub term: String,
    pub difficulty_index: f64,
    pub time_commitment: f64,
    pub sentiment_score: f64,
    pub comment: String,
    pub upvotes: u32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct NewFeedback {
    pub course_id: i64,
    pub user_id: i64,
    pub term: String,
    pub difficulty_index: f64,
    pub time_commitment: f64,
    #[serde(default)]
    pub sentiment_score: f64,
    #[serde(default)]
    pub comment: String,
}

/// Aggregates over one course's feedback. Averages are `None` when the
/// course has no feedback yet.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackStats {
    pub count: i64,
    pub avg_difficulty: Option<f64>,
    pub avg_time_commitment: Option<f64>,
    pub avg_sentiment: Option<f64>,
}

// Gamification results

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct XpAward {
    #[serde(rename = "newXP")]
    pub new_xp: i64,
    pub new_level: u32,
    pub leveled_up: bool,
    /// Minimum XP of the next level; `None` once the top level is reached.
    pub next_threshold: Option<i64>,
    /// The increment actually credited after the tier multiplier.
    pub awarded_xp: i64,
    pub badge_awarded: Option<Badge>,
}

/// What happened to a user, with the payload each rule needs.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "trigger", rename_all = "snake_case")]
pub enum BadgeTrigger {
    Review {
        #[serde(default, rename = "isFirstReviewOfTerm")]
        is_first_review_of_term: bool,
        #[serde(default, rename = "detailedReviewCount")]
        detailed_review_count: u32,
    },
    Upvote {
        #[serde(default, rename = "upvoteCount")]
        upvote_count: u32,
    },
    Login,
    LevelUp,
}

impl BadgeTrigger {
    pub fn label(&self) -> &'static str {
        match self {
            BadgeTrigger::Review { .. } => "REVIEW",
            BadgeTrigger::Upvote { .. } => "UPVOTE",
            BadgeTrigger::Login => "LOGIN",
            BadgeTrigger::LevelUp => "LEVEL_UP",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LoginOutcome {
    pub streak: Streak,
    /// `None` when the user already logged in earlier the same day.
    pub xp: Option<XpAward>,
    pub badges_awarded: Vec<Badge>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackOutcome {
    pub feedback_id: i64,
    pub xp: XpAward,
    pub badges_awarded: Vec<Badge>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct UpvoteOutcome {
    pub feedback_id: i64,
    pub author_id: i64,
    pub upvotes: u32,
    pub xp: XpAward,
    pub badges_awarded: Vec<Badge>,
}

// Analytics results

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum RiskLevel {
    Low,
    Moderate,
    High,
    Critical,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RiskAssessment {
    pub student_id: i64,
    pub student_name: String,
    pub probability: f64,
    pub risk_level: RiskLevel,
    /// Contributing reasons, in the order the rules fired.
    pub factors: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct RiskDistribution {
    pub critical: usize,
    pub moderate: usize,
    pub low: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CourseRiskAnalysis {
    pub course_id: i64,
    pub total_students: usize,
    pub risk_distribution: RiskDistribution,
    pub high_risk_students: Vec<RiskAssessment>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum Intensity {
    Light,
    Normal,
    Heavy,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WeekForecast {
    pub week: u32,
    pub hours: u32,
    pub intensity: Intensity,
    pub description: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum DifficultyFactor {
    #[serde(rename = "Easy for you")]
    Easy,
    Standard,
    Challenging,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DifficultyPrediction {
    pub score: f64,
    pub baseline: f64,
    pub factor: DifficultyFactor,
    pub rationale: String,
}

/// Returned in place of a prediction when the caller is not a student.
/// Serializes to the fixed `"N/A"` payload clients already understand.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct UnavailablePrediction {
    pub score: String,
    pub baseline: String,
    pub factor: String,
    pub rationale: String,
}

impl Default for UnavailablePrediction {
    fn default() -> Self {
        Self {
            score: "N/A".to_string(),
            baseline: "5.0".to_string(),
            factor: "N/A".to_string(),
            rationale: "Personalized prediction is only available for students.".to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum PersonalDifficulty {
    Predicted(DifficultyPrediction),
    Unavailable(UnavailablePrediction),
}
