use axum::extract::Path;
use axum::headers::Cookie;
use axum::{Extension, Json, TypedHeader};
use chrono::Utc;
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{Course, CourseInput, Lesson};
use crate::session::Sessions;
use crate::validate::{course_rules, validate};
use crate::{breaks, proceeds, Error, Payload};

pub async fn create_course(
    cookies: Option<TypedHeader<Cookie>>,
    Json(input): Json<CourseInput>,
    Extension(pg): Extension<PgPool>,
    Extension(sessions): Extension<Sessions>,
) -> Payload<Course> {
    let session = sessions.require_teacher_session(sessions.cookie_value(cookies.as_deref()))?;
    let teacher_id = match session.teacher_id() {
        Some(id) => id,
        None => return breaks(Error::unauthorized()),
    };
    validate(&input, &course_rules())?;

    let course = Course {
        id: Uuid::new_v4(),
        title: input.title.trim().to_string(),
        education: input.education.trim().to_string(),
        start_date: input.start_date,
        end_date: input.end_date,
        ects: input.ects,
        semester: input.semester.trim().to_string(),
        description: input.description.trim().to_string(),
        responsible_teacher: teacher_id,
        created_at: Utc::now(),
    };

    let res = sqlx::query(
        "INSERT INTO courses \
         (id, title, education, start_date, end_date, ects, semester, description, responsible_teacher, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
    )
    .bind(course.id)
    .bind(&course.title)
    .bind(&course.education)
    .bind(course.start_date)
    .bind(course.end_date)
    .bind(course.ects)
    .bind(&course.semester)
    .bind(&course.description)
    .bind(course.responsible_teacher)
    .bind(course.created_at)
    .execute(&pg)
    .await
    .map_err(Error::from)?;

    if res.rows_affected() < 1 {
        return breaks(Error::InternalError {
            kind: "DatabaseError",
            message: "Could not save course to database!".to_string(),
        });
    }
    proceeds(course)
}

pub async fn list_courses(Extension(pg): Extension<PgPool>) -> Payload<CourseList> {
    let courses = sqlx::query_as::<_, Course>("SELECT * FROM courses ORDER BY start_date, title")
        .fetch_all(&pg)
        .await
        .map_err(Error::from)?;
    proceeds(CourseList { courses })
}

pub async fn read_course(
    Path(course_id): Path<Uuid>,
    Extension(pg): Extension<PgPool>,
) -> Payload<CourseWithLessons> {
    let course = find_course(&pg, course_id).await?;
    let course = match course {
        Some(course) => course,
        None => return breaks(course_not_found(course_id)),
    };

    let lessons = sqlx::query_as::<_, Lesson>(
        "SELECT * FROM lessons WHERE course_id = $1 ORDER BY date, time",
    )
    .bind(course_id)
    .fetch_all(&pg)
    .await
    .map_err(Error::from)?;

    proceeds(CourseWithLessons { course, lessons })
}

pub async fn courses_by_teacher(
    Path(teacher_id): Path<Uuid>,
    Extension(pg): Extension<PgPool>,
) -> Payload<CourseList> {
    let courses = sqlx::query_as::<_, Course>(
        "SELECT * FROM courses WHERE responsible_teacher = $1 ORDER BY start_date, title",
    )
    .bind(teacher_id)
    .fetch_all(&pg)
    .await
    .map_err(Error::from)?;
    proceeds(CourseList { courses })
}

// Ownership is not re-checked on update or delete: any authenticated
// teacher may mutate any course.
pub async fn update_course(
    Path(course_id): Path<Uuid>,
    cookies: Option<TypedHeader<Cookie>>,
    Json(input): Json<CourseInput>,
    Extension(pg): Extension<PgPool>,
    Extension(sessions): Extension<Sessions>,
) -> Payload<Course> {
    sessions.require_teacher_session(sessions.cookie_value(cookies.as_deref()))?;
    validate(&input, &course_rules())?;

    let existing = find_course(&pg, course_id).await?;
    let existing = match existing {
        Some(course) => course,
        None => return breaks(course_not_found(course_id)),
    };

    let updated = Course {
        id: existing.id,
        title: input.title.trim().to_string(),
        education: input.education.trim().to_string(),
        start_date: input.start_date,
        end_date: input.end_date,
        ects: input.ects,
        semester: input.semester.trim().to_string(),
        description: input.description.trim().to_string(),
        responsible_teacher: existing.responsible_teacher,
        created_at: existing.created_at,
    };

    let res = sqlx::query(
        "UPDATE courses SET title = $1, education = $2, start_date = $3, end_date = $4, \
         ects = $5, semester = $6, description = $7 WHERE id = $8",
    )
    .bind(&updated.title)
    .bind(&updated.education)
    .bind(updated.start_date)
    .bind(updated.end_date)
    .bind(updated.ects)
    .bind(&updated.semester)
    .bind(&updated.description)
    .bind(updated.id)
    .execute(&pg)
    .await
    .map_err(Error::from)?;

    // The course may have been deleted between the lookup and the update.
    if res.rows_affected() < 1 {
        return breaks(course_not_found(course_id));
    }
    proceeds(updated)
}

/// Deletes a course and every lesson referencing it. Both deletes run in
/// one transaction; a failure rolls the whole cascade back, so no
/// orphaned lessons are left behind.
pub async fn delete_course(
    Path(course_id): Path<Uuid>,
    cookies: Option<TypedHeader<Cookie>>,
    Extension(pg): Extension<PgPool>,
    Extension(sessions): Extension<Sessions>,
) -> Payload<CourseDeleted> {
    sessions.require_teacher_session(sessions.cookie_value(cookies.as_deref()))?;

    if find_course(&pg, course_id).await?.is_none() {
        return breaks(course_not_found(course_id));
    }

    let mut tx = pg.begin().await.map_err(Error::from)?;
    sqlx::query("DELETE FROM courses WHERE id = $1")
        .bind(course_id)
        .execute(&mut tx)
        .await
        .map_err(cascade_failure)?;
    let lessons = sqlx::query("DELETE FROM lessons WHERE course_id = $1")
        .bind(course_id)
        .execute(&mut tx)
        .await
        .map_err(cascade_failure)?;
    tx.commit().await.map_err(cascade_failure)?;

    proceeds(CourseDeleted {
        course_id,
        lessons_deleted: lessons.rows_affected(),
    })
}

async fn find_course(pg: &PgPool, course_id: Uuid) -> Result<Option<Course>, Error> {
    sqlx::query_as::<_, Course>("SELECT * FROM courses WHERE id = $1 LIMIT 1")
        .bind(course_id)
        .fetch_optional(pg)
        .await
        .map_err(Error::from)
}

fn course_not_found(course_id: Uuid) -> Error {
    Error::NotFound {
        message: format!("Course with id `{}` does not exist!", course_id),
    }
}

fn cascade_failure(err: sqlx::Error) -> Error {
    log::warn!("cascade delete failed, rolling back: {}", err);
    Error::InternalError {
        kind: "IntegrityError",
        message: err.to_string(),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CourseList {
    pub courses: Vec<Course>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CourseWithLessons {
    #[serde(flatten)]
    pub course: Course,
    pub lessons: Vec<Lesson>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CourseDeleted {
    pub course_id: Uuid,
    pub lessons_deleted: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn a_vanished_course_surfaces_as_not_found() {
        let course_id = Uuid::new_v4();
        let err = course_not_found(course_id);
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        match err {
            Error::NotFound { message } => {
                assert_eq!(
                    message,
                    format!("Course with id `{}` does not exist!", course_id)
                );
            }
            other => panic!("expected a not-found error, got {:?}", other),
        }
    }
}
