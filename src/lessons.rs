use axum::extract::Path;
use axum::headers::Cookie;
use axum::{Extension, Json, TypedHeader};
use chrono::Utc;
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{Lesson, LessonInput};
use crate::session::Sessions;
use crate::validate::{lesson_rules, validate};
use crate::{breaks, proceeds, Error, Payload};

/// Adds a lesson under a course. The course must exist at creation time;
/// there is no live foreign key keeping the reference alive afterwards.
pub async fn create_lesson(
    Path(course_id): Path<Uuid>,
    cookies: Option<TypedHeader<Cookie>>,
    Json(input): Json<LessonInput>,
    Extension(pg): Extension<PgPool>,
    Extension(sessions): Extension<Sessions>,
) -> Payload<Lesson> {
    let session = sessions.require_teacher_session(sessions.cookie_value(cookies.as_deref()))?;
    let teacher_id = match session.teacher_id() {
        Some(id) => id,
        None => return breaks(Error::unauthorized()),
    };
    validate(&input, &lesson_rules())?;

    let course_exists = sqlx::query("SELECT 1 FROM courses WHERE id = $1 LIMIT 1")
        .bind(course_id)
        .fetch_optional(&pg)
        .await
        .map_err(Error::from)?
        .is_some();
    if !course_exists {
        return breaks(Error::NotFound {
            message: format!("Course with id `{}` does not exist!", course_id),
        });
    }

    let lesson = Lesson {
        id: Uuid::new_v4(),
        course_id,
        date: input.date,
        time: input.time.trim().to_string(),
        title: input.title.trim().to_string(),
        content: input.content.trim().to_string(),
        responsible_teacher: teacher_id,
        created_at: Utc::now(),
    };

    let res = sqlx::query(
        "INSERT INTO lessons \
         (id, course_id, date, time, title, content, responsible_teacher, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
    )
    .bind(lesson.id)
    .bind(lesson.course_id)
    .bind(lesson.date)
    .bind(&lesson.time)
    .bind(&lesson.title)
    .bind(&lesson.content)
    .bind(lesson.responsible_teacher)
    .bind(lesson.created_at)
    .execute(&pg)
    .await
    .map_err(Error::from)?;

    if res.rows_affected() < 1 {
        return breaks(Error::InternalError {
            kind: "DatabaseError",
            message: "Could not save lesson to database!".to_string(),
        });
    }
    proceeds(lesson)
}

/// Calendar feed: every lesson of a course in date order.
pub async fn list_course_lessons(
    Path(course_id): Path<Uuid>,
    Extension(pg): Extension<PgPool>,
) -> Payload<LessonList> {
    let course_exists = sqlx::query("SELECT 1 FROM courses WHERE id = $1 LIMIT 1")
        .bind(course_id)
        .fetch_optional(&pg)
        .await
        .map_err(Error::from)?
        .is_some();
    if !course_exists {
        return breaks(Error::NotFound {
            message: format!("Course with id `{}` does not exist!", course_id),
        });
    }

    let lessons = sqlx::query_as::<_, Lesson>(
        "SELECT * FROM lessons WHERE course_id = $1 ORDER BY date, time",
    )
    .bind(course_id)
    .fetch_all(&pg)
    .await
    .map_err(Error::from)?;
    proceeds(LessonList { lessons })
}

pub async fn read_lesson(
    Path(lesson_id): Path<Uuid>,
    Extension(pg): Extension<PgPool>,
) -> Payload<Lesson> {
    let lesson = sqlx::query_as::<_, Lesson>("SELECT * FROM lessons WHERE id = $1 LIMIT 1")
        .bind(lesson_id)
        .fetch_optional(&pg)
        .await
        .map_err(Error::from)?;
    match lesson {
        Some(lesson) => proceeds(lesson),
        None => breaks(lesson_not_found(lesson_id)),
    }
}

pub async fn delete_lesson(
    Path(lesson_id): Path<Uuid>,
    cookies: Option<TypedHeader<Cookie>>,
    Extension(pg): Extension<PgPool>,
    Extension(sessions): Extension<Sessions>,
) -> Payload<LessonDeleted> {
    sessions.require_teacher_session(sessions.cookie_value(cookies.as_deref()))?;

    let res = sqlx::query("DELETE FROM lessons WHERE id = $1")
        .bind(lesson_id)
        .execute(&pg)
        .await
        .map_err(Error::from)?;
    if res.rows_affected() < 1 {
        return breaks(lesson_not_found(lesson_id));
    }
    proceeds(LessonDeleted { lesson_id })
}

fn lesson_not_found(lesson_id: Uuid) -> Error {
    Error::NotFound {
        message: format!("Lesson with id `{}` does not exist!", lesson_id),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LessonList {
    pub lessons: Vec<Lesson>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LessonDeleted {
    pub lesson_id: Uuid,
}
