pub mod auth;
pub mod config;
pub mod courses;
pub mod err;
pub mod lessons;
pub mod models;
pub mod pass;
pub mod session;
pub mod validate;

use std::time::Duration;

use axum::handler::Handler;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use serde::Serialize;
use sqlx::postgres::PgPoolOptions;

use crate::config::Config;
pub use crate::err::Error;
use crate::err::Success;
use crate::session::Sessions;

pub type Payload<T> = Result<Json<Success<T>>, Error>;

pub fn proceeds<V>(value: V) -> Payload<V>
where
    V: Serialize,
{
    Ok(Json(Success::of(value)))
}

pub fn breaks<V>(err: Error) -> Payload<V>
where
    V: Serialize,
{
    Err(err)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let config = Config::from_env()?;

    let pg = PgPoolOptions::new()
        .max_connections(8)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&config.database_url)
        .await?;
    let sessions = Sessions::new(&config.session);

    let app = Router::new()
        .route("/signup", post(auth::signup))
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout))
        .route("/auth/session", get(auth::session_info))
        .route(
            "/courses",
            get(courses::list_courses).post(courses::create_course),
        )
        .route(
            "/courses/:course",
            get(courses::read_course)
                .put(courses::update_course)
                .delete(courses::delete_course),
        )
        .route(
            "/courses/:course/lessons",
            get(lessons::list_course_lessons).post(lessons::create_lesson),
        )
        .route("/teachers/:teacher/courses", get(courses::courses_by_teacher))
        .route(
            "/lessons/:lesson",
            get(lessons::read_lesson).delete(lessons::delete_lesson),
        )
        .fallback(err::handler404.into_service())
        .layer(Extension(pg))
        .layer(Extension(sessions));

    log::info!(
        "Starting CoursePlan HTTP server on http://{}",
        config.bind_addr
    );
    axum::Server::bind(&config.bind_addr)
        .serve(app.into_make_service())
        .await?;
    Ok(())
}
