use crate::{
    data::{
        DataType,
        course::{AddCourse, Course, CourseFilter, CoursePatch},
    },
    error::{BadPathSnafu, BadQuerySnafu, EnrolResult, InvalidNumberSnafu, MissingCourseSnafu},
    routes::{
        checked_name,
        payload::{FromFields, Payload},
    },
    state::EnrolState,
};
use axum::{
    Json,
    extract::{
        Path, Query, State,
        rejection::{PathRejection, QueryRejection},
    },
    http::StatusCode,
};
use serde::Deserialize;
use snafu::{OptionExt, ResultExt};
use std::collections::BTreeSet;

/// Incoming course body. Anything else in it, `id` included, is ignored.
#[derive(Deserialize, Debug)]
pub struct CourseBody {
    name: Option<String>,
    students: Option<Vec<i64>>,
}

impl FromFields for CourseBody {
    fn from_fields(fields: Vec<(String, String)>) -> EnrolResult<Self> {
        let mut body = Self {
            name: None,
            students: None,
        };

        for (key, value) in fields {
            match key.as_str() {
                "name" => body.name = Some(value),
                "students" => {
                    let id = value
                        .trim()
                        .parse::<i64>()
                        .context(InvalidNumberSnafu {
                            field: "students",
                            original: value,
                        })?;
                    body.students.get_or_insert_with(Vec::new).push(id);
                }
                _ => {}
            }
        }

        Ok(body)
    }
}

impl CourseBody {
    fn into_new_course(self) -> EnrolResult<AddCourse> {
        Ok(AddCourse {
            name: checked_name(self.name)?,
            students: self.students.unwrap_or_default().into_iter().collect(),
        })
    }

    fn into_patch(self) -> EnrolResult<CoursePatch> {
        Ok(CoursePatch {
            name: self.name.map(|name| checked_name(Some(name))).transpose()?,
            students: self.students.map(|students| students.into_iter().collect()),
        })
    }

    fn into_replacement(self) -> EnrolResult<CoursePatch> {
        Ok(CoursePatch {
            name: Some(checked_name(self.name)?),
            students: Some(
                self.students
                    .map(|students| students.into_iter().collect())
                    .unwrap_or_else(BTreeSet::new),
            ),
        })
    }
}

pub async fn get_courses(
    State(state): State<EnrolState>,
    filter: Result<Query<CourseFilter>, QueryRejection>,
) -> EnrolResult<Json<Vec<Course>>> {
    let Query(filter) = filter.context(BadQuerySnafu)?;
    debug!(?filter, "Listing courses");

    let courses = Course::filter(&filter, &mut *state.get_connection().await?).await?;
    Ok(Json(courses))
}

pub async fn get_course(
    State(state): State<EnrolState>,
    id: Result<Path<i64>, PathRejection>,
) -> EnrolResult<Json<Course>> {
    let Path(id) = id.context(BadPathSnafu)?;

    let course = Course::get_from_db_by_id(id, &mut *state.get_connection().await?)
        .await?
        .context(MissingCourseSnafu { id })?;
    Ok(Json(course))
}

pub async fn post_course(
    State(state): State<EnrolState>,
    Payload(body): Payload<CourseBody>,
) -> EnrolResult<(StatusCode, Json<Course>)> {
    let to_be_added = body.into_new_course()?;

    let mut transaction = state.get_write_transaction().await?;
    let id = Course::insert_into_database(to_be_added, &mut transaction).await?;
    let course = Course::get_from_db_by_id(id, &mut transaction)
        .await?
        .context(MissingCourseSnafu { id })?;
    transaction.commit().await?;

    info!(id, name = ?course.name, "Created course");
    Ok((StatusCode::CREATED, Json(course)))
}

async fn apply_patch(state: &EnrolState, id: i64, patch: CoursePatch) -> EnrolResult<Course> {
    let mut transaction = state.get_write_transaction().await?;
    let found = Course::update_in_database(id, patch, &mut transaction).await?;
    snafu::ensure!(found, MissingCourseSnafu { id });

    let course = Course::get_from_db_by_id(id, &mut transaction)
        .await?
        .context(MissingCourseSnafu { id })?;
    transaction.commit().await?;

    info!(id, "Updated course");
    Ok(course)
}

pub async fn patch_course(
    State(state): State<EnrolState>,
    id: Result<Path<i64>, PathRejection>,
    Payload(body): Payload<CourseBody>,
) -> EnrolResult<Json<Course>> {
    let Path(id) = id.context(BadPathSnafu)?;

    Ok(Json(apply_patch(&state, id, body.into_patch()?).await?))
}

pub async fn put_course(
    State(state): State<EnrolState>,
    id: Result<Path<i64>, PathRejection>,
    Payload(body): Payload<CourseBody>,
) -> EnrolResult<Json<Course>> {
    let Path(id) = id.context(BadPathSnafu)?;

    Ok(Json(apply_patch(&state, id, body.into_replacement()?).await?))
}

pub async fn delete_course(
    State(state): State<EnrolState>,
    id: Result<Path<i64>, PathRejection>,
) -> EnrolResult<StatusCode> {
    let Path(id) = id.context(BadPathSnafu)?;

    let mut transaction = state.get_write_transaction().await?;
    let removed = Course::remove_from_database(id, &mut transaction).await?;
    snafu::ensure!(removed, MissingCourseSnafu { id });
    transaction.commit().await?;

    info!(id, "Deleted course");
    Ok(StatusCode::NO_CONTENT)
}
