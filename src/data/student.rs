use crate::{
    data::DataType,
    error::{EnrolResult, MakeQuerySnafu},
};
use serde::{Serialize, Serializer, ser::SerializeStruct};
use snafu::ResultExt;
use sqlx::SqliteConnection;

const STUDENT_FIELDS: [&str; 2] = ["id", "name"];

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Student {
    pub id: i64,
    pub name: String,
}

impl Serialize for Student {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let [id, name] = STUDENT_FIELDS;

        let mut student = serializer.serialize_struct("Student", STUDENT_FIELDS.len())?;
        student.serialize_field(id, &self.id)?;
        student.serialize_field(name, &self.name)?;
        student.end()
    }
}

#[derive(Debug)]
pub struct AddStudent {
    pub name: String,
}

impl Student {
    /// Every id in `ids` that has no matching student, ascending.
    pub async fn find_missing(ids: &[i64], conn: &mut SqliteConnection) -> EnrolResult<Vec<i64>> {
        let mut missing = vec![];
        for &id in ids {
            let exists = sqlx::query_scalar::<_, i64>("SELECT id FROM students WHERE id = ?")
                .bind(id)
                .fetch_optional(&mut *conn)
                .await
                .context(MakeQuerySnafu)?
                .is_some();
            if !exists {
                missing.push(id);
            }
        }

        missing.sort_unstable();
        missing.dedup();
        Ok(missing)
    }
}

impl DataType for Student {
    type Id = i64;
    type FormForAdding = AddStudent;

    const FIELDS: &'static [&'static str] = &STUDENT_FIELDS;

    async fn get_from_db_by_id(id: Self::Id, conn: &mut SqliteConnection) -> EnrolResult<Option<Self>> {
        sqlx::query_as::<_, Self>("SELECT id, name FROM students WHERE id = ?")
            .bind(id)
            .fetch_optional(conn)
            .await
            .context(MakeQuerySnafu)
    }

    async fn get_all(conn: &mut SqliteConnection) -> EnrolResult<Vec<Self>> {
        sqlx::query_as::<_, Self>("SELECT id, name FROM students ORDER BY id")
            .fetch_all(conn)
            .await
            .context(MakeQuerySnafu)
    }

    async fn insert_into_database(
        to_be_added: Self::FormForAdding,
        conn: &mut SqliteConnection,
    ) -> EnrolResult<Self::Id> {
        let AddStudent { name } = to_be_added;

        Ok(sqlx::query("INSERT INTO students (name) VALUES (?)")
            .bind(name)
            .execute(conn)
            .await
            .context(MakeQuerySnafu)?
            .last_insert_rowid())
    }

    //course_students rows go with it via ON DELETE CASCADE
    async fn remove_from_database(id: Self::Id, conn: &mut SqliteConnection) -> EnrolResult<bool> {
        Ok(sqlx::query("DELETE FROM students WHERE id = ?")
            .bind(id)
            .execute(conn)
            .await
            .context(MakeQuerySnafu)?
            .rows_affected()
            > 0)
    }
}
