use crate::error::EnrolResult;
use sqlx::SqliteConnection;

pub mod course;
pub mod student;

pub trait DataType: Sized {
    type Id;
    type FormForAdding;

    /// Field names in the order they are serialised. Responses expose exactly these keys.
    const FIELDS: &'static [&'static str];

    async fn get_from_db_by_id(id: Self::Id, conn: &mut SqliteConnection) -> EnrolResult<Option<Self>>;
    async fn get_all(conn: &mut SqliteConnection) -> EnrolResult<Vec<Self>>;
    async fn insert_into_database(
        to_be_added: Self::FormForAdding,
        conn: &mut SqliteConnection,
    ) -> EnrolResult<Self::Id>;
    /// Returns `false` when there was nothing with that id to remove.
    async fn remove_from_database(id: Self::Id, conn: &mut SqliteConnection) -> EnrolResult<bool>;
}

#[cfg(test)]
pub(crate) fn serialised_keys(value: &impl serde::Serialize) -> Vec<String> {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::Object(map)) => map.keys().cloned().collect(),
        other => panic!("expected a JSON object, got {other:?}"),
    }
}
