use crate::{
    error::{BlankFieldSnafu, EnrolResult, MissingFieldSnafu},
    routes::{
        courses::{delete_course, get_course, get_courses, patch_course, post_course, put_course},
        students::{delete_student, get_student, get_students, post_student},
    },
    state::EnrolState,
};
use axum::{Router, routing::get};
use snafu::OptionExt;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};

pub mod courses;
pub mod payload;
pub mod students;

const MAX_BODY_BYTES: usize = 64 * 1024;

pub fn router(state: EnrolState) -> Router {
    Router::new()
        .route("/courses/", get(get_courses).post(post_course))
        .route(
            "/courses/{id}/",
            get(get_course)
                .patch(patch_course)
                .put(put_course)
                .delete(delete_course),
        )
        .route("/students/", get(get_students).post(post_student))
        .route("/students/{id}/", get(get_student).delete(delete_student))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// `name` is required and may not be blank on both entities.
pub fn checked_name(name: Option<String>) -> EnrolResult<String> {
    let name = name.context(MissingFieldSnafu { field: "name" })?;
    snafu::ensure!(!name.trim().is_empty(), BlankFieldSnafu { field: "name" });
    Ok(name)
}
