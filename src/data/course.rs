use crate::{
    data::{DataType, student::Student},
    error::{EnrolResult, MakeQuerySnafu, UnknownStudentsSnafu},
};
use futures::TryStreamExt;
use serde::{Deserialize, Deserializer, Serialize, Serializer, ser::SerializeStruct};
use snafu::ResultExt;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};
use std::{
    collections::{BTreeSet, HashMap},
    fmt::Display,
    str::FromStr,
};

const COURSE_FIELDS: [&str; 3] = ["id", "name", "students"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Course {
    pub id: i64,
    pub name: String,
    /// Ascending, no duplicates.
    pub students: Vec<i64>,
}

impl Serialize for Course {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let [id, name, students] = COURSE_FIELDS;

        let mut course = serializer.serialize_struct("Course", COURSE_FIELDS.len())?;
        course.serialize_field(id, &self.id)?;
        course.serialize_field(name, &self.name)?;
        course.serialize_field(students, &self.students)?;
        course.end()
    }
}

#[derive(sqlx::FromRow)]
struct CourseRow {
    id: i64,
    name: String,
}

impl CourseRow {
    fn with_students(self, students: Vec<i64>) -> Course {
        Course {
            id: self.id,
            name: self.name,
            students,
        }
    }
}

#[derive(Debug)]
pub struct AddCourse {
    pub name: String,
    pub students: BTreeSet<i64>,
}

/// Fields left as `None` keep whatever the course already had.
#[derive(Debug, Default)]
pub struct CoursePatch {
    pub name: Option<String>,
    pub students: Option<BTreeSet<i64>>,
}

/// Exact-match filter for listing. Both set means both must match, and an empty value
/// (`?id=`) is the same as leaving the parameter out.
#[derive(Deserialize, Debug, Default)]
pub struct CourseFilter {
    #[serde(default, deserialize_with = "empty_as_none")]
    pub id: Option<i64>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub name: Option<String>,
}

fn empty_as_none<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: Display,
{
    match Option::<String>::deserialize(deserializer)?.as_deref() {
        None | Some("") => Ok(None),
        Some(raw) => raw.parse().map(Some).map_err(serde::de::Error::custom),
    }
}

impl Course {
    pub async fn filter(filter: &CourseFilter, conn: &mut SqliteConnection) -> EnrolResult<Vec<Self>> {
        let mut query = QueryBuilder::<Sqlite>::new("SELECT id, name FROM courses WHERE 1 = 1");
        if let Some(id) = filter.id {
            query.push(" AND id = ").push_bind(id);
        }
        if let Some(name) = &filter.name {
            query.push(" AND name = ").push_bind(name.clone());
        }
        query.push(" ORDER BY id");

        let rows: Vec<CourseRow> = query
            .build_query_as()
            .fetch_all(&mut *conn)
            .await
            .context(MakeQuerySnafu)?;
        if rows.is_empty() {
            return Ok(vec![]);
        }

        let mut students = Self::all_enrolments(conn).await?;
        Ok(rows
            .into_iter()
            .map(|row| {
                let enrolled = students.remove(&row.id).unwrap_or_default();
                row.with_students(enrolled)
            })
            .collect())
    }

    async fn all_enrolments(conn: &mut SqliteConnection) -> EnrolResult<HashMap<i64, Vec<i64>>> {
        let mut enrolments: HashMap<i64, Vec<i64>> = HashMap::new();
        let mut rows = sqlx::query_as::<_, (i64, i64)>(
            "SELECT course_id, student_id FROM course_students ORDER BY course_id, student_id",
        )
        .fetch(conn);

        while let Some((course_id, student_id)) = rows.try_next().await.context(MakeQuerySnafu)? {
            enrolments.entry(course_id).or_default().push(student_id);
        }

        Ok(enrolments)
    }

    async fn students_of(id: i64, conn: &mut SqliteConnection) -> EnrolResult<Vec<i64>> {
        sqlx::query_scalar(
            "SELECT student_id FROM course_students WHERE course_id = ? ORDER BY student_id",
        )
        .bind(id)
        .fetch_all(conn)
        .await
        .context(MakeQuerySnafu)
    }

    async fn ensure_students_exist(
        students: &BTreeSet<i64>,
        conn: &mut SqliteConnection,
    ) -> EnrolResult<()> {
        let ids: Vec<i64> = students.iter().copied().collect();
        let missing = Student::find_missing(&ids, conn).await?;
        snafu::ensure!(missing.is_empty(), UnknownStudentsSnafu { ids: missing });
        Ok(())
    }

    /// Replaces the whole association set of a course.
    async fn set_students(
        id: i64,
        students: &BTreeSet<i64>,
        conn: &mut SqliteConnection,
    ) -> EnrolResult<()> {
        sqlx::query("DELETE FROM course_students WHERE course_id = ?")
            .bind(id)
            .execute(&mut *conn)
            .await
            .context(MakeQuerySnafu)?;

        for &student_id in students {
            sqlx::query("INSERT INTO course_students (course_id, student_id) VALUES (?, ?)")
                .bind(id)
                .bind(student_id)
                .execute(&mut *conn)
                .await
                .context(MakeQuerySnafu)?;
        }

        Ok(())
    }

    /// Must run inside a transaction: on a validation failure earlier writes are left for the
    /// caller to roll back. Returns `false` when there is no such course.
    pub async fn update_in_database(
        id: i64,
        patch: CoursePatch,
        conn: &mut SqliteConnection,
    ) -> EnrolResult<bool> {
        let exists = sqlx::query_scalar::<_, i64>("SELECT id FROM courses WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await
            .context(MakeQuerySnafu)?
            .is_some();
        if !exists {
            return Ok(false);
        }

        let CoursePatch { name, students } = patch;
        if let Some(students) = &students {
            Self::ensure_students_exist(students, conn).await?;
        }

        if let Some(name) = name {
            sqlx::query("UPDATE courses SET name = ? WHERE id = ?")
                .bind(name)
                .bind(id)
                .execute(&mut *conn)
                .await
                .context(MakeQuerySnafu)?;
        }
        if let Some(students) = students {
            Self::set_students(id, &students, conn).await?;
        }

        Ok(true)
    }
}

impl DataType for Course {
    type Id = i64;
    type FormForAdding = AddCourse;

    const FIELDS: &'static [&'static str] = &COURSE_FIELDS;

    async fn get_from_db_by_id(id: Self::Id, conn: &mut SqliteConnection) -> EnrolResult<Option<Self>> {
        let Some(row) = sqlx::query_as::<_, CourseRow>("SELECT id, name FROM courses WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await
            .context(MakeQuerySnafu)?
        else {
            return Ok(None);
        };

        let students = Self::students_of(id, conn).await?;
        Ok(Some(row.with_students(students)))
    }

    async fn get_all(conn: &mut SqliteConnection) -> EnrolResult<Vec<Self>> {
        Self::filter(&CourseFilter::default(), conn).await
    }

    /// Must run inside a transaction, same as [`Course::update_in_database`].
    async fn insert_into_database(
        to_be_added: Self::FormForAdding,
        conn: &mut SqliteConnection,
    ) -> EnrolResult<Self::Id> {
        let AddCourse { name, students } = to_be_added;

        Self::ensure_students_exist(&students, conn).await?;

        let id = sqlx::query("INSERT INTO courses (name) VALUES (?)")
            .bind(name)
            .execute(&mut *conn)
            .await
            .context(MakeQuerySnafu)?
            .last_insert_rowid();
        Self::set_students(id, &students, conn).await?;

        Ok(id)
    }

    async fn remove_from_database(id: Self::Id, conn: &mut SqliteConnection) -> EnrolResult<bool> {
        Ok(sqlx::query("DELETE FROM courses WHERE id = ?")
            .bind(id)
            .execute(conn)
            .await
            .context(MakeQuerySnafu)?
            .rows_affected()
            > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        data::{serialised_keys, student::AddStudent},
        error::EnrolError,
        state::EnrolState,
    };

    async fn add_student(state: &EnrolState, name: &str) -> i64 {
        let mut tx = state.get_write_transaction().await.unwrap();
        let id = Student::insert_into_database(
            AddStudent {
                name: name.to_string(),
            },
            &mut tx,
        )
        .await
        .unwrap();
        tx.commit().await.unwrap();
        id
    }

    async fn add_course(state: &EnrolState, name: &str, students: &[i64]) -> EnrolResult<i64> {
        let mut tx = state.get_write_transaction().await?;
        let id = Course::insert_into_database(
            AddCourse {
                name: name.to_string(),
                students: students.iter().copied().collect(),
            },
            &mut tx,
        )
        .await?;
        tx.commit().await?;
        Ok(id)
    }

    async fn get_course(state: &EnrolState, id: i64) -> Option<Course> {
        let mut conn = state.get_connection().await.unwrap();
        Course::get_from_db_by_id(id, &mut conn).await.unwrap()
    }

    #[tokio::test]
    async fn insert_defaults_to_no_students() {
        let state = EnrolState::in_memory().await;
        let id = add_course(&state, "subject", &[]).await.unwrap();

        let course = get_course(&state, id).await.unwrap();
        assert_eq!(course.name, "subject");
        assert!(course.students.is_empty());
        assert_eq!(serialised_keys(&course), Course::FIELDS);
    }

    #[tokio::test]
    async fn insert_with_unknown_student_creates_nothing() {
        let state = EnrolState::in_memory().await;
        let oak = add_student(&state, "Oak").await;

        let err = add_course(&state, "biology", &[oak, oak + 40]).await.unwrap_err();
        assert!(matches!(err, EnrolError::UnknownStudents { ref ids } if ids == &[oak + 40]));

        let mut conn = state.get_connection().await.unwrap();
        assert!(Course::get_all(&mut conn).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn filter_matches_exactly() {
        let state = EnrolState::in_memory().await;
        let first = add_course(&state, "maths", &[]).await.unwrap();
        add_course(&state, "Maths", &[]).await.unwrap();
        let third = add_course(&state, "maths", &[]).await.unwrap();

        let mut conn = state.get_connection().await.unwrap();
        let by_name = Course::filter(
            &CourseFilter {
                id: None,
                name: Some("maths".to_string()),
            },
            &mut conn,
        )
        .await
        .unwrap();
        assert_eq!(
            by_name.iter().map(|c| c.id).collect::<Vec<_>>(),
            vec![first, third]
        );

        let by_id = Course::filter(
            &CourseFilter {
                id: Some(third),
                name: None,
            },
            &mut conn,
        )
        .await
        .unwrap();
        assert_eq!(by_id.len(), 1);
        assert_eq!(by_id[0].id, third);

        let neither = Course::filter(
            &CourseFilter {
                id: Some(first),
                name: Some("Maths".to_string()),
            },
            &mut conn,
        )
        .await
        .unwrap();
        assert!(neither.is_empty());
    }

    #[tokio::test]
    async fn patch_only_touches_given_fields() {
        let state = EnrolState::in_memory().await;
        let oak = add_student(&state, "Oak").await;
        let elm = add_student(&state, "Elm").await;
        let id = add_course(&state, "history", &[oak]).await.unwrap();

        let mut tx = state.get_write_transaction().await.unwrap();
        let updated = Course::update_in_database(
            id,
            CoursePatch {
                name: Some("New course name".to_string()),
                students: None,
            },
            &mut tx,
        )
        .await
        .unwrap();
        tx.commit().await.unwrap();
        assert!(updated);

        let course = get_course(&state, id).await.unwrap();
        assert_eq!(course.name, "New course name");
        assert_eq!(course.students, vec![oak]);

        let mut tx = state.get_write_transaction().await.unwrap();
        Course::update_in_database(
            id,
            CoursePatch {
                name: None,
                students: Some([elm].into()),
            },
            &mut tx,
        )
        .await
        .unwrap();
        tx.commit().await.unwrap();

        let course = get_course(&state, id).await.unwrap();
        assert_eq!(course.name, "New course name");
        assert_eq!(course.students, vec![elm]);
    }

    #[tokio::test]
    async fn failed_patch_leaves_course_untouched() {
        let state = EnrolState::in_memory().await;
        let oak = add_student(&state, "Oak").await;
        let id = add_course(&state, "history", &[oak]).await.unwrap();

        let mut tx = state.get_write_transaction().await.unwrap();
        let err = Course::update_in_database(
            id,
            CoursePatch {
                name: Some("renamed".to_string()),
                students: Some([oak, oak + 1].into()),
            },
            &mut tx,
        )
        .await
        .unwrap_err();
        drop(tx);
        assert!(matches!(err, EnrolError::UnknownStudents { .. }));

        let course = get_course(&state, id).await.unwrap();
        assert_eq!(course.name, "history");
        assert_eq!(course.students, vec![oak]);
    }

    #[tokio::test]
    async fn patch_missing_course_reports_false() {
        let state = EnrolState::in_memory().await;
        let mut tx = state.get_write_transaction().await.unwrap();
        assert!(
            !Course::update_in_database(12, CoursePatch::default(), &mut tx)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn removing_a_student_detaches_it() {
        let state = EnrolState::in_memory().await;
        let oak = add_student(&state, "Oak").await;
        let elm = add_student(&state, "Elm").await;
        let id = add_course(&state, "botany", &[elm, oak]).await.unwrap();
        assert_eq!(get_course(&state, id).await.unwrap().students, vec![oak, elm]);

        let mut tx = state.get_write_transaction().await.unwrap();
        assert!(Student::remove_from_database(oak, &mut tx).await.unwrap());
        tx.commit().await.unwrap();

        let course = get_course(&state, id).await.unwrap();
        assert_eq!(course.students, vec![elm]);
    }

    #[tokio::test]
    async fn removing_a_course_keeps_its_students() {
        let state = EnrolState::in_memory().await;
        let oak = add_student(&state, "Oak").await;
        let id = add_course(&state, "botany", &[oak]).await.unwrap();

        let mut tx = state.get_write_transaction().await.unwrap();
        assert!(Course::remove_from_database(id, &mut tx).await.unwrap());
        assert!(!Course::remove_from_database(id, &mut tx).await.unwrap());
        tx.commit().await.unwrap();

        assert!(get_course(&state, id).await.is_none());
        let mut conn = state.get_connection().await.unwrap();
        assert!(Student::get_from_db_by_id(oak, &mut conn).await.unwrap().is_some());
    }
}
