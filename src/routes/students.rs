use crate::{
    data::{
        DataType,
        student::{AddStudent, Student},
    },
    error::{BadPathSnafu, EnrolResult, MissingStudentSnafu},
    routes::{
        checked_name,
        payload::{FromFields, Payload},
    },
    state::EnrolState,
};
use axum::{
    Json,
    extract::{
        Path, State,
        rejection::PathRejection,
    },
    http::StatusCode,
};
use serde::Deserialize;
use snafu::{OptionExt, ResultExt};

#[derive(Deserialize, Debug)]
pub struct StudentBody {
    name: Option<String>,
}

impl FromFields for StudentBody {
    fn from_fields(fields: Vec<(String, String)>) -> EnrolResult<Self> {
        let name = fields
            .into_iter()
            .filter(|(key, _)| key == "name")
            .map(|(_, value)| value)
            .last();
        Ok(Self { name })
    }
}

pub async fn get_students(State(state): State<EnrolState>) -> EnrolResult<Json<Vec<Student>>> {
    Ok(Json(
        Student::get_all(&mut *state.get_connection().await?).await?,
    ))
}

pub async fn get_student(
    State(state): State<EnrolState>,
    id: Result<Path<i64>, PathRejection>,
) -> EnrolResult<Json<Student>> {
    let Path(id) = id.context(BadPathSnafu)?;

    let student = Student::get_from_db_by_id(id, &mut *state.get_connection().await?)
        .await?
        .context(MissingStudentSnafu { id })?;
    Ok(Json(student))
}

pub async fn post_student(
    State(state): State<EnrolState>,
    Payload(StudentBody { name }): Payload<StudentBody>,
) -> EnrolResult<(StatusCode, Json<Student>)> {
    let name = checked_name(name)?;

    let mut transaction = state.get_write_transaction().await?;
    let id = Student::insert_into_database(AddStudent { name }, &mut transaction).await?;
    let student = Student::get_from_db_by_id(id, &mut transaction)
        .await?
        .context(MissingStudentSnafu { id })?;
    transaction.commit().await?;

    info!(id, "Created student");
    Ok((StatusCode::CREATED, Json(student)))
}

pub async fn delete_student(
    State(state): State<EnrolState>,
    id: Result<Path<i64>, PathRejection>,
) -> EnrolResult<StatusCode> {
    let Path(id) = id.context(BadPathSnafu)?;

    let mut transaction = state.get_write_transaction().await?;
    let removed = Student::remove_from_database(id, &mut transaction).await?;
    snafu::ensure!(removed, MissingStudentSnafu { id });
    transaction.commit().await?;

    info!(id, "Deleted student, detached from all courses");
    Ok(StatusCode::NO_CONTENT)
}
