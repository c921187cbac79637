use chrono::{Duration, TimeZone, Utc};
use course_insight::config::GamificationConfig;
use course_insight::gamification::resolve_level;
use course_insight::model::{BadgeTrigger, NewCourse, NewFeedback, NewUser, Role, User};
use course_insight::{CoreError, Database, GamificationEngine};

async fn setup() -> (Database, GamificationEngine) {
    let db = Database::in_memory().await.expect("in-memory database");
    let engine = GamificationEngine::new(db.clone(), GamificationConfig::default());
    (db, engine)
}

async fn create_student(db: &Database, email: &str) -> User {
    db.create_user(&NewUser {
        name: "Saitoti Smith".to_string(),
        email: email.to_string(),
        role: Role::Student,
        gpa: None,
        academic_performance: None,
    })
    .await
    .expect("create student")
}

async fn student_with_xp(db: &Database, email: &str, xp: i64) -> User {
    let mut user = create_student(db, email).await;
    user.xp = xp;
    user.level = resolve_level(xp);
    db.save_user_progress(&user).await.expect("save progress");
    user
}

async fn create_course(db: &Database, code: &str) -> i64 {
    db.create_course(&NewCourse {
        code: code.to_string(),
        title: "Data Structures".to_string(),
        syllabus: None,
    })
    .await
    .expect("create course")
    .id
}

fn review(course_id: i64, user_id: i64, term: &str, comment: &str) -> NewFeedback {
    NewFeedback {
        course_id,
        user_id,
        term: term.to_string(),
        difficulty_index: 6.0,
        time_commitment: 5.0,
        sentiment_score: 0.2,
        comment: comment.to_string(),
    }
}

#[tokio::test]
async fn test_add_xp_crosses_level_threshold() {
    let (db, engine) = setup().await;
    let user = create_student(&db, "a@tukenya.ac.ke").await;

    let award = engine.add_xp(user.id, 250, "FIRST_REVIEW").await.unwrap();
    assert_eq!(award.new_xp, 250);
    assert_eq!(award.new_level, 2);
    assert!(award.leveled_up);
    assert_eq!(award.next_threshold, Some(400));

    let stored = db.get_user(user.id).await.unwrap().unwrap();
    assert_eq!(stored.xp, 250);
    assert_eq!(stored.level, 2);
}

#[tokio::test]
async fn test_tier_multiplier_applies_by_current_level() {
    let (db, engine) = setup().await;
    let level_4 = student_with_xp(&db, "l4@tukenya.ac.ke", 700).await;
    let level_5 = student_with_xp(&db, "l5@tukenya.ac.ke", 1000).await;
    let level_20 = student_with_xp(&db, "l20@tukenya.ac.ke", 75000).await;

    let award = engine.add_xp(level_4.id, 100, "TEST").await.unwrap();
    assert_eq!(award.awarded_xp, 100);

    let award = engine.add_xp(level_5.id, 100, "TEST").await.unwrap();
    assert_eq!(award.awarded_xp, 200);
    assert_eq!(award.new_xp, 1200);

    let award = engine.add_xp(level_20.id, 100, "TEST").await.unwrap();
    assert_eq!(award.awarded_xp, 500);
    assert_eq!(award.new_level, 20);
    assert_eq!(award.next_threshold, None);
}

#[tokio::test]
async fn test_mega_boost_reaches_level_5_with_badge() {
    let (db, engine) = setup().await;
    let user = create_student(&db, "boost@tukenya.ac.ke").await;

    engine.add_xp(user.id, 100, "REVIEW").await.unwrap();
    engine.add_xp(user.id, 150, "REVIEW").await.unwrap();
    let award = engine.add_xp(user.id, 800, "MEGA_BOOST").await.unwrap();

    assert_eq!(award.new_xp, 1050);
    assert_eq!(award.new_level, 5);
    assert!(award.leveled_up);
    assert_eq!(award.badge_awarded.map(|b| b.id), Some("level_5".to_string()));

    let stored = db.get_user(user.id).await.unwrap().unwrap();
    assert_eq!(stored.badges.len(), 1);
    assert!(stored.has_badge("level_5"));
}

#[tokio::test]
async fn test_add_xp_unknown_user() {
    let (_db, engine) = setup().await;
    let err = engine.add_xp(404, 10, "TEST").await.unwrap_err();
    assert!(matches!(err, CoreError::NotFound { entity: "User", id: 404 }));
}

#[tokio::test]
async fn test_add_xp_surfaces_persistence_failure() {
    let (db, engine) = setup().await;
    let user = create_student(&db, "closed@tukenya.ac.ke").await;
    db.close().await;

    let err = engine.add_xp(user.id, 10, "TEST").await.unwrap_err();
    assert!(matches!(err, CoreError::Persistence(_)));
}

#[tokio::test]
async fn test_concurrent_awards_are_not_lost() {
    let (db, engine) = setup().await;
    let user = create_student(&db, "race@tukenya.ac.ke").await;

    let mut handles = Vec::new();
    for _ in 0..20 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            engine.add_xp(user.id, 10, "CONCURRENT").await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let stored = db.get_user(user.id).await.unwrap().unwrap();
    assert_eq!(stored.xp, 200);
    assert_eq!(stored.level, 2);
}

#[tokio::test]
async fn test_check_badges_is_idempotent() {
    let (db, engine) = setup().await;
    let user = create_student(&db, "idem@tukenya.ac.ke").await;
    let trigger = BadgeTrigger::Upvote { upvote_count: 12 };

    let first = engine.check_badges(user.id, trigger.clone()).await.unwrap();
    assert_eq!(first.map(|b| b.id), Some("helper".to_string()));

    let second = engine.check_badges(user.id, trigger).await.unwrap();
    assert!(second.is_none());

    let stored = db.get_user(user.id).await.unwrap().unwrap();
    assert_eq!(stored.badges.len(), 1);
}

#[tokio::test]
async fn test_check_badges_one_per_call() {
    let (db, engine) = setup().await;
    let user = create_student(&db, "both@tukenya.ac.ke").await;
    let trigger = BadgeTrigger::Review {
        is_first_review_of_term: true,
        detailed_review_count: 15,
    };

    let badge = engine.check_badges(user.id, trigger).await.unwrap().unwrap();
    assert_eq!(badge.id, "early_bird");

    let stored = db.get_user(user.id).await.unwrap().unwrap();
    assert!(!stored.has_badge("critic"));
}

#[tokio::test]
async fn test_login_streak_and_daily_xp() {
    let (db, engine) = setup().await;
    let user = create_student(&db, "login@tukenya.ac.ke").await;
    let monday = Utc.with_ymd_and_hms(2026, 3, 9, 8, 0, 0).unwrap();

    let first = engine.record_login(user.id, monday).await.unwrap();
    assert_eq!(first.streak.current, 1);
    assert_eq!(first.xp.as_ref().map(|x| x.awarded_xp), Some(10));

    let again = engine
        .record_login(user.id, monday + Duration::hours(6))
        .await
        .unwrap();
    assert_eq!(again.streak.current, 1);
    assert!(again.xp.is_none());

    let tuesday = engine
        .record_login(user.id, monday + Duration::days(1))
        .await
        .unwrap();
    assert_eq!(tuesday.streak.current, 2);

    let after_gap = engine
        .record_login(user.id, monday + Duration::days(4))
        .await
        .unwrap();
    assert_eq!(after_gap.streak.current, 1);

    let stored = db.get_user(user.id).await.unwrap().unwrap();
    assert_eq!(stored.xp, 30);
    assert_eq!(stored.streak.last_login, Some(monday + Duration::days(4)));
}

#[tokio::test]
async fn test_seventh_consecutive_login_awards_streak_badge() {
    let (db, engine) = setup().await;
    let user = create_student(&db, "streak@tukenya.ac.ke").await;
    let start = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();

    for day in 0..6 {
        let outcome = engine
            .record_login(user.id, start + Duration::days(day))
            .await
            .unwrap();
        assert!(outcome.badges_awarded.is_empty());
    }
    let seventh = engine
        .record_login(user.id, start + Duration::days(6))
        .await
        .unwrap();
    assert_eq!(seventh.streak.current, 7);
    let ids: Vec<&str> = seventh.badges_awarded.iter().map(|b| b.id.as_str()).collect();
    assert_eq!(ids, vec!["streak_7"]);
}

#[tokio::test]
async fn test_first_review_of_term_awards_early_bird() {
    let (db, engine) = setup().await;
    let user = create_student(&db, "review@tukenya.ac.ke").await;
    let course_id = create_course(&db, "SCS 2201").await;

    let first = engine
        .submit_feedback(review(course_id, user.id, "2026-S1", "Good pacing."))
        .await
        .unwrap();
    assert_eq!(first.xp.awarded_xp, 50);
    let ids: Vec<&str> = first.badges_awarded.iter().map(|b| b.id.as_str()).collect();
    assert_eq!(ids, vec!["early_bird"]);

    let second = engine
        .submit_feedback(review(course_id, user.id, "2026-S1", "Still good."))
        .await
        .unwrap();
    assert!(second.badges_awarded.is_empty());

    let stored = db.get_user(user.id).await.unwrap().unwrap();
    assert_eq!(stored.xp, 100);
}

#[tokio::test]
async fn test_tenth_detailed_review_awards_critic() {
    let (db, engine) = setup().await;
    let user = create_student(&db, "critic@tukenya.ac.ke").await;
    let course_id = create_course(&db, "SCS 2202").await;
    let long_comment = "The lectures build carefully on each other. ".repeat(4);

    let mut last = None;
    for _ in 0..10 {
        last = Some(
            engine
                .submit_feedback(review(course_id, user.id, "2026-S2", &long_comment))
                .await
                .unwrap(),
        );
    }

    let last = last.unwrap();
    assert!(last.badges_awarded.iter().any(|b| b.id == "critic"));
    let stored = db.get_user(user.id).await.unwrap().unwrap();
    assert!(stored.has_badge("early_bird"));
    assert!(stored.has_badge("critic"));
}

#[tokio::test]
async fn test_review_for_unknown_course() {
    let (db, engine) = setup().await;
    let user = create_student(&db, "lost@tukenya.ac.ke").await;

    let err = engine
        .submit_feedback(review(777, user.id, "2026-S1", ""))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::NotFound { entity: "Course", id: 777 }));
}

#[tokio::test]
async fn test_tenth_upvote_awards_helper() {
    let (db, engine) = setup().await;
    let author = create_student(&db, "author@tukenya.ac.ke").await;
    let course_id = create_course(&db, "SCS 2203").await;
    let feedback = engine
        .submit_feedback(review(course_id, author.id, "2026-S1", "Helpful notes."))
        .await
        .unwrap();

    for n in 1..10 {
        let outcome = engine.upvote_feedback(feedback.feedback_id).await.unwrap();
        assert_eq!(outcome.upvotes, n);
        assert_eq!(outcome.author_id, author.id);
        assert!(outcome.badges_awarded.is_empty());
    }
    let tenth = engine.upvote_feedback(feedback.feedback_id).await.unwrap();
    assert_eq!(tenth.upvotes, 10);
    assert_eq!(tenth.badges_awarded.len(), 1);
    assert_eq!(tenth.badges_awarded[0].id, "helper");

    let err = engine.upvote_feedback(9999).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_add_xp_saturates_at_the_top() {
    let (db, engine) = setup().await;
    let user = student_with_xp(&db, "ceiling@tukenya.ac.ke", i64::MAX - 10).await;

    for _ in 0..2 {
        let award = engine.add_xp(user.id, 100, "TEST").await.unwrap();
        assert_eq!(award.new_xp, i64::MAX);
        assert_eq!(award.new_level, 20);
    }

    let stored = db.get_user(user.id).await.unwrap().unwrap();
    assert_eq!(stored.xp, i64::MAX);
    assert_eq!(stored.level, 20);
}
