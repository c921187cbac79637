use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteConnection, SqlitePool, SqlitePoolOptions, SqliteRow,
};
use sqlx::{Row, Sqlite, Transaction};
use std::str::FromStr;
use tracing::debug;

use crate::error::{CoreError, Result};
use crate::model::{
    AcademicPerformance, Badge, Course, Feedback, FeedbackStats, NewCourse, NewFeedback, NewUser,
    Role, Streak, Syllabus, User,
};

/// SQLite-backed store for users, courses, enrollments and feedback.
///
/// Cheap to clone; clones share one connection pool.
///
/// The associated functions taking a `SqliteConnection` run on a caller's
/// transaction, so several writes can commit or roll back together. Don't
/// call the pooled methods while holding a transaction: an in-memory
/// database has a single connection.
#[derive(Clone)]
pub struct Database {
    pub(crate) pool: SqlitePool,
}

impl Database {
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);

        // Every connection to `sqlite::memory:` opens its own empty database.
        let max_connections = if url.contains(":memory:") {
            1
        } else {
            max_connections.max(1)
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let db = Database { pool };
        db.migrate().await?;
        debug!(url, max_connections, "database ready");
        Ok(db)
    }

    pub async fn in_memory() -> Result<Self> {
        Self::connect("sqlite::memory:", 1).await
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>> {
        Ok(self.pool.begin().await?)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                email TEXT NOT NULL UNIQUE,
                role TEXT NOT NULL,
                xp INTEGER NOT NULL DEFAULT 0,
                level INTEGER NOT NULL DEFAULT 1,
                badges TEXT NOT NULL DEFAULT '[]',
                streak_current INTEGER NOT NULL DEFAULT 0,
                last_login DATETIME,
                gpa REAL,
                academic_performance TEXT,
                created_at DATETIME NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS courses (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                code TEXT NOT NULL UNIQUE,
                title TEXT NOT NULL,
                topic_count INTEGER,
                weekly_workload TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS enrollments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                course_id INTEGER NOT NULL REFERENCES courses(id) ON DELETE CASCADE,
                user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                UNIQUE (course_id, user_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS feedback (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                course_id INTEGER NOT NULL REFERENCES courses(id) ON DELETE CASCADE,
                user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                term TEXT NOT NULL,
                difficulty_index REAL NOT NULL,
                time_commitment REAL NOT NULL,
                sentiment_score REAL NOT NULL DEFAULT 0,
                comment TEXT NOT NULL DEFAULT '',
                upvotes INTEGER NOT NULL DEFAULT 0,
                created_at DATETIME NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_feedback_course ON feedback(course_id)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_feedback_user_term ON feedback(user_id, term)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    // Users

    pub async fn create_user(&self, new_user: &NewUser) -> Result<User> {
        let id = sqlx::query(
            r#"
            INSERT INTO users (name, email, role, gpa, academic_performance, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&new_user.name)
        .bind(&new_user.email)
        .bind(new_user.role.as_str())
        .bind(new_user.gpa)
        .bind(new_user.academic_performance.map(|p| p.as_str()))
        .bind(Utc::now())
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        Ok(User {
            id,
            name: new_user.name.clone(),
            email: new_user.email.clone(),
            role: new_user.role,
            xp: 0,
            level: 1,
            badges: Vec::new(),
            streak: Streak::default(),
            gpa: new_user.gpa,
            academic_performance: new_user.academic_performance,
        })
    }

    pub async fn get_user(&self, id: i64) -> Result<Option<User>> {
        let mut conn = self.pool.acquire().await?;
        Self::fetch_user(&mut conn, id).await
    }

    pub async fn fetch_user(conn: &mut SqliteConnection, id: i64) -> Result<Option<User>> {
        let row = sqlx::query(
            r#"
            SELECT id, name, email, role, xp, level, badges, streak_current, last_login,
                   gpa, academic_performance
            FROM users
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

        row.as_ref().map(user_from_row).transpose()
    }

    pub async fn save_user_progress(&self, user: &User) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        Self::write_user_progress(&mut conn, user).await
    }

    /// Write back every progress field of `user` in one statement.
    pub async fn write_user_progress(conn: &mut SqliteConnection, user: &User) -> Result<()> {
        let badges = serde_json::to_string(&user.badges)?;
        let result = sqlx::query(
            r#"
            UPDATE users
            SET xp = ?, level = ?, badges = ?, streak_current = ?, last_login = ?
            WHERE id = ?
            "#,
        )
        .bind(user.xp)
        .bind(i64::from(user.level))
        .bind(badges)
        .bind(i64::from(user.streak.current))
        .bind(user.streak.last_login)
        .bind(user.id)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::user_not_found(user.id));
        }
        Ok(())
    }

    pub async fn user_count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    // Courses

    pub async fn create_course(&self, new_course: &NewCourse) -> Result<Course> {
        let topic_count = new_course
            .syllabus
            .as_ref()
            .and_then(|s| s.topic_count)
            .map(i64::from);
        let weekly_workload = match new_course.syllabus.as_ref().and_then(|s| s.weekly_workload.as_ref()) {
            Some(weeks) => Some(serde_json::to_string(weeks)?),
            None => None,
        };

        let id = sqlx::query(
            "INSERT INTO courses (code, title, topic_count, weekly_workload) VALUES (?, ?, ?, ?)",
        )
        .bind(&new_course.code)
        .bind(&new_course.title)
        .bind(topic_count)
        .bind(weekly_workload)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        Ok(Course {
            id,
            code: new_course.code.clone(),
            title: new_course.title.clone(),
            syllabus: new_course.syllabus.clone(),
        })
    }

    pub async fn get_course(&self, id: i64) -> Result<Option<Course>> {
        let row = sqlx::query(
            "SELECT id, code, title, topic_count, weekly_workload FROM courses WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let topic_count: Option<i64> = row.try_get("topic_count")?;
        let topic_count = topic_count.map(|n| to_u32(n, "topic_count")).transpose()?;
        let weekly_workload: Option<String> = row.try_get("weekly_workload")?;
        let weekly_workload: Option<Vec<f64>> = match weekly_workload {
            Some(json) => Some(serde_json::from_str(&json)?),
            None => None,
        };

        let syllabus = if topic_count.is_some() || weekly_workload.is_some() {
            Some(Syllabus {
                topic_count,
                weekly_workload,
            })
        } else {
            None
        };

        Ok(Some(Course {
            id: row.try_get("id")?,
            code: row.try_get("code")?,
            title: row.try_get("title")?,
            syllabus,
        }))
    }

    pub async fn enroll(&self, course_id: i64, user_id: i64) -> Result<()> {
        sqlx::query("INSERT OR IGNORE INTO enrollments (course_id, user_id) VALUES (?, ?)")
            .bind(course_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Ids of the students enrolled in a course, in enrollment order.
    pub async fn enrolled_student_ids(&self, course_id: i64) -> Result<Vec<i64>> {
        let ids = sqlx::query_scalar(
            r#"
            SELECT e.user_id
            FROM enrollments e
            JOIN users u ON u.id = e.user_id
            WHERE e.course_id = ? AND u.role = 'student'
            ORDER BY e.id
            "#,
        )
        .bind(course_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    // Feedback

    pub async fn insert_feedback(&self, new_feedback: &NewFeedback) -> Result<Feedback> {
        let mut conn = self.pool.acquire().await?;
        Self::write_feedback(&mut conn, new_feedback).await
    }

    pub async fn write_feedback(
        conn: &mut SqliteConnection,
        new_feedback: &NewFeedback,
    ) -> Result<Feedback> {
        let created_at = Utc::now();
        let id = sqlx::query(
            r#"
            INSERT INTO feedback
                (course_id, user_id, term, difficulty_index, time_commitment, sentiment_score, comment, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(new_feedback.course_id)
        .bind(new_feedback.user_id)
        .bind(&new_feedback.term)
        .bind(new_feedback.difficulty_index)
        .bind(new_feedback.time_commitment)
        .bind(new_feedback.sentiment_score)
        .bind(&new_feedback.comment)
        .bind(created_at)
        .execute(&mut *conn)
        .await?
        .last_insert_rowid();

        Ok(Feedback {
            id,
            course_id: new_feedback.course_id,
            user_id: new_feedback.user_id,
            term: new_feedback.term.clone(),
            difficulty_index: new_feedback.difficulty_index,
            time_commitment: new_feedback.time_commitment,
            sentiment_score: new_feedback.sentiment_score,
            comment: new_feedback.comment.clone(),
            upvotes: 0,
            created_at,
        })
    }

    pub async fn get_feedback(&self, id: i64) -> Result<Option<Feedback>> {
        let mut conn = self.pool.acquire().await?;
        Self::fetch_feedback(&mut conn, id).await
    }

    pub async fn fetch_feedback(conn: &mut SqliteConnection, id: i64) -> Result<Option<Feedback>> {
        let row = sqlx::query(
            r#"
            SELECT id, course_id, user_id, term, difficulty_index, time_commitment,
                   sentiment_score, comment, upvotes, created_at
            FROM feedback
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

        row.as_ref().map(feedback_from_row).transpose()
    }

    pub async fn course_feedback_stats(&self, course_id: i64) -> Result<FeedbackStats> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS count,
                AVG(difficulty_index) AS avg_difficulty,
                AVG(time_commitment) AS avg_time_commitment,
                AVG(sentiment_score) AS avg_sentiment
            FROM feedback
            WHERE course_id = ?
            "#,
        )
        .bind(course_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(FeedbackStats {
            count: row.try_get("count")?,
            avg_difficulty: row.try_get("avg_difficulty")?,
            avg_time_commitment: row.try_get("avg_time_commitment")?,
            avg_sentiment: row.try_get("avg_sentiment")?,
        })
    }

    pub async fn count_reviews_in_term(
        conn: &mut SqliteConnection,
        user_id: i64,
        term: &str,
    ) -> Result<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM feedback WHERE user_id = ? AND term = ?")
                .bind(user_id)
                .bind(term)
                .fetch_one(&mut *conn)
                .await?;
        Ok(count)
    }

    pub async fn count_detailed_reviews(
        conn: &mut SqliteConnection,
        user_id: i64,
        min_chars: usize,
    ) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM feedback WHERE user_id = ? AND length(comment) >= ?",
        )
        .bind(user_id)
        .bind(min_chars as i64)
        .fetch_one(&mut *conn)
        .await?;
        Ok(count)
    }

    /// Add one upvote and return the updated review, or `None` if the id
    /// does not resolve.
    pub async fn increment_upvotes(
        conn: &mut SqliteConnection,
        feedback_id: i64,
    ) -> Result<Option<Feedback>> {
        let updated = sqlx::query("UPDATE feedback SET upvotes = upvotes + 1 WHERE id = ?")
            .bind(feedback_id)
            .execute(&mut *conn)
            .await?;
        if updated.rows_affected() == 0 {
            return Ok(None);
        }
        Self::fetch_feedback(conn, feedback_id).await
    }
}

fn to_u32(value: i64, column: &str) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| CoreError::CorruptRecord(format!("{} out of range: {}", column, value)))
}

fn user_from_row(row: &SqliteRow) -> Result<User> {
    let role: String = row.try_get("role")?;
    let role = Role::parse(&role)
        .ok_or_else(|| CoreError::CorruptRecord(format!("unknown role '{}'", role)))?;

    let badges: String = row.try_get("badges")?;
    let badges: Vec<Badge> = serde_json::from_str(&badges)?;

    let performance: Option<String> = row.try_get("academic_performance")?;
    let academic_performance = match performance {
        Some(p) => Some(AcademicPerformance::parse(&p).ok_or_else(|| {
            CoreError::CorruptRecord(format!("unknown academic performance '{}'", p))
        })?),
        None => None,
    };

    let last_login: Option<DateTime<Utc>> = row.try_get("last_login")?;

    Ok(User {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        role,
        xp: row.try_get("xp")?,
        level: to_u32(row.try_get("level")?, "level")?,
        badges,
        streak: Streak {
            current: to_u32(row.try_get("streak_current")?, "streak_current")?,
            last_login,
        },
        gpa: row.try_get("gpa")?,
        academic_performance,
    })
}

fn feedback_from_row(row: &SqliteRow) -> Result<Feedback> {
    Ok(Feedback {
        id: row.try_get("id")?,
        course_id: row.try_get("course_id")?,
        user_id: row.try_get("user_id")?,
        term: row.try_get("term")?,
        difficulty_index: row.try_get("difficulty_index")?,
        time_commitment: row.try_get("time_commitment")?,
        sentiment_score: row.try_get("sentiment_score")?,
        comment: row.try_get("comment")?,
        upvotes: to_u32(row.try_get("upvotes")?, "upvotes")?,
        created_at: row.try_get("created_at")?,
    })
}
