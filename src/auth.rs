use std::collections::BTreeMap;

use axum::headers::Cookie;
use axum::http::header::SET_COOKIE;
use axum::http::HeaderValue;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json, TypedHeader};
use chrono::Utc;
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::err::Success;
use crate::models::{LoginInput, SignupInput, Teacher};
use crate::session::{Sessions, TEACHER_ID_KEY};
use crate::validate::{normalize_email, teacher_rules, validate};
use crate::{breaks, pass, proceeds, Error, Payload};

pub async fn signup(
    Json(input): Json<SignupInput>,
    Extension(pg): Extension<PgPool>,
) -> Payload<CreatedTeacher> {
    validate(&input, &teacher_rules())?;
    let email = normalize_email(&input.email);

    // Advisory pre-check; the unique index on teachers.email is the
    // source of truth under concurrent signups.
    let existing = sqlx::query_as::<_, Teacher>("SELECT * FROM teachers WHERE email = $1 LIMIT 1")
        .bind(&email)
        .fetch_optional(&pg)
        .await
        .map_err(Error::from)?;
    if existing.is_some() {
        return breaks(email_taken());
    }

    let teacher = Teacher {
        id: Uuid::new_v4(),
        name: input.name.trim().to_string(),
        email,
        password_hash: pass::hash_password(input.password.trim())?,
        created_at: Utc::now(),
    };

    let res = sqlx::query(
        "INSERT INTO teachers (id, name, email, password_hash, created_at) \
         VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(teacher.id)
    .bind(&teacher.name)
    .bind(&teacher.email)
    .bind(&teacher.password_hash)
    .bind(teacher.created_at)
    .execute(&pg)
    .await
    .map_err(|err| {
        if let sqlx::Error::Database(db) = &err {
            if db.constraint() == Some("teachers_email_key") {
                return email_taken();
            }
        }
        Error::from(err)
    })?;

    if res.rows_affected() < 1 {
        return breaks(Error::InternalError {
            kind: "DatabaseError",
            message: "Could not save teacher to database!".to_string(),
        });
    }
    proceeds(CreatedTeacher {
        teacher_id: teacher.id,
    })
}

pub async fn login(
    cookies: Option<TypedHeader<Cookie>>,
    Json(input): Json<LoginInput>,
    Extension(pg): Extension<PgPool>,
    Extension(sessions): Extension<Sessions>,
) -> Result<Response, Error> {
    if input.password.trim().is_empty() {
        return Err(Error::InvalidPayload {
            message: "`password` parameter was empty".to_string(),
        });
    }

    let email = normalize_email(&input.email);
    let teacher = sqlx::query_as::<_, Teacher>("SELECT * FROM teachers WHERE email = $1 LIMIT 1")
        .bind(&email)
        .fetch_optional(&pg)
        .await
        .map_err(Error::from)?;

    let teacher = match teacher {
        Some(teacher) => teacher,
        None => {
            return Err(Error::NotFound {
                message: "Teacher not found".to_string(),
            })
        }
    };

    if !pass::verify_password(input.password.trim(), &teacher.password_hash) {
        return Err(Error::AuthenticationFailure {
            message: "Invalid password".to_string(),
        });
    }

    let mut session = sessions.get_session(sessions.cookie_value(cookies.as_deref()));
    session.set(TEACHER_ID_KEY, teacher.id.to_string());

    let set_cookie = sessions.commit_session(&session)?;
    let mut res = Json(Success::of(LoggedInTeacher {
        teacher_id: teacher.id,
    }))
    .into_response();
    res.headers_mut().insert(SET_COOKIE, header_value(&set_cookie)?);
    Ok(res)
}

pub async fn logout(
    cookies: Option<TypedHeader<Cookie>>,
    Extension(sessions): Extension<Sessions>,
) -> Result<Response, Error> {
    sessions.require_teacher_session(sessions.cookie_value(cookies.as_deref()))?;

    let mut res = Json(Success::of(LoggedOut { logged_out: true })).into_response();
    res.headers_mut()
        .insert(SET_COOKIE, header_value(&sessions.destroy_session())?);
    Ok(res)
}

/// Current visitor's authentication state, for page chrome.
pub async fn session_info(
    cookies: Option<TypedHeader<Cookie>>,
    Extension(sessions): Extension<Sessions>,
) -> Payload<SessionInfo> {
    let session = sessions.get_session(sessions.cookie_value(cookies.as_deref()));
    proceeds(SessionInfo {
        teacher_id: session.teacher_id(),
        authenticated: session.has(TEACHER_ID_KEY),
    })
}

fn email_taken() -> Error {
    let mut fields = BTreeMap::new();
    fields.insert(
        "email".to_string(),
        "Email address is already in use".to_string(),
    );
    Error::Validation { fields }
}

fn header_value(cookie: &str) -> Result<HeaderValue, Error> {
    HeaderValue::from_str(cookie).map_err(|err| Error::InternalError {
        kind: "HeaderError",
        message: err.to_string(),
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct CreatedTeacher {
    pub teacher_id: Uuid,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoggedInTeacher {
    pub teacher_id: Uuid,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoggedOut {
    pub logged_out: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub teacher_id: Option<Uuid>,
    pub authenticated: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use crate::session::Session;

    #[test]
    fn duplicate_email_maps_to_a_field_violation() {
        match email_taken() {
            Error::Validation { fields } => {
                assert_eq!(
                    fields.get("email").map(String::as_str),
                    Some("Email address is already in use")
                );
                assert_eq!(fields.len(), 1);
            }
            other => panic!("expected a validation error, got {:?}", other),
        }
    }

    #[test]
    fn session_cookie_values_are_valid_header_values() {
        let sessions = Sessions::new(&SessionConfig::for_tests());
        let committed = sessions.commit_session(&Session::empty()).unwrap();
        assert!(header_value(&committed).is_ok());
        assert!(header_value(&sessions.destroy_session()).is_ok());
    }
}
