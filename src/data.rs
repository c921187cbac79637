use chrono::{Duration, Utc};
use tracing::info;

use crate::database::Database;
use crate::error::Result;
use crate::gamification::resolve_level;
use crate::model::{AcademicPerformance, NewCourse, NewFeedback, NewUser, Role, Syllabus};

// Mock data for demonstration
const DEMO_STUDENTS: &[(&str, &str, Option<f64>, Option<AcademicPerformance>, i64, u32, i64)] = &[
    // name, email, gpa, performance, xp, streak, days since login
    ("Denis Lemayian", "denis@tukenya.ac.ke", Some(3.9), None, 1250, 9, 0),
    ("Saitoti Smith", "saitoti@tukenya.ac.ke", Some(3.2), None, 620, 4, 1),
    ("Kukutia Johnson", "kukutia@tukenya.ac.ke", None, Some(AcademicPerformance::Poor), 40, 0, 12),
    ("Kirionki Williams", "kirionki@tukenya.ac.ke", Some(2.3), None, 180, 1, 9),
    ("David Lemoita", "david@tukenya.ac.ke", None, Some(AcademicPerformance::Good), 540, 3, 2),
];

/// Seed a handful of users, two courses and some feedback. Does nothing if
/// the database already has users.
pub async fn seed_demo_data(db: &Database) -> Result<()> {
    if db.user_count().await? > 0 {
        info!("database already populated, skipping demo seed");
        return Ok(());
    }

    let systems = db
        .create_course(&NewCourse {
            code: "SCS 2301".to_string(),
            title: "Operating Systems".to_string(),
            syllabus: Some(Syllabus {
                topic_count: Some(12),
                weekly_workload: Some(vec![
                    4.0, 5.0, 6.0, 6.0, 7.0, 6.0, 7.0, 8.0, 6.0, 6.0, 7.0, 8.0,
                ]),
            }),
        })
        .await?;
    let statistics = db
        .create_course(&NewCourse {
            code: "SMA 2104".to_string(),
            title: "Probability and Statistics".to_string(),
            syllabus: None,
        })
        .await?;

    db.create_user(&NewUser {
        name: "Dr. Naserian Koech".to_string(),
        email: "naserian@tukenya.ac.ke".to_string(),
        role: Role::Faculty,
        gpa: None,
        academic_performance: None,
    })
    .await?;

    let now = Utc::now();
    for &(name, email, gpa, performance, xp, streak, days_since_login) in DEMO_STUDENTS {
        let mut user = db
            .create_user(&NewUser {
                name: name.to_string(),
                email: email.to_string(),
                role: Role::Student,
                gpa,
                academic_performance: performance,
            })
            .await?;

        user.xp = xp;
        user.level = resolve_level(xp);
        user.streak.current = streak;
        user.streak.last_login = Some(now - Duration::days(days_since_login));
        db.save_user_progress(&user).await?;

        db.enroll(systems.id, user.id).await?;
        db.enroll(statistics.id, user.id).await?;

        db.insert_feedback(&NewFeedback {
            course_id: systems.id,
            user_id: user.id,
            term: "2025-S1".to_string(),
            difficulty_index: 7.0,
            time_commitment: 6.5,
            sentiment_score: 0.4,
            comment: "Heavy but rewarding labs.".to_string(),
        })
        .await?;
    }

    info!(students = DEMO_STUDENTS.len(), "demo data seeded");
    Ok(())
}
