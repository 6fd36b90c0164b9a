use axum::{
    Json,
    extract::{
        multipart::{MultipartError, MultipartRejection},
        rejection::{FormRejection, JsonRejection, PathRejection, QueryRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use snafu::Snafu;
use std::num::ParseIntError;

pub type EnrolResult<T> = Result<T, EnrolError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum EnrolError {
    #[snafu(display("Error opening database"))]
    OpenDatabase { source: sqlx::Error },
    #[snafu(display("Error getting db connection"))]
    GetDatabaseConnection { source: sqlx::Error },
    #[snafu(display("Error making SQL query"))]
    MakeQuery { source: sqlx::Error },
    #[snafu(display("Error commiting SQL transaction"))]
    CommitTransaction { source: sqlx::Error },
    #[snafu(display("Error migrating DB schema"))]
    MigrateError { source: sqlx::migrate::MigrateError },
    #[snafu(display("Unable to retrieve env var `{}`", name))]
    BadEnvVar {
        source: dotenvy::Error,
        name: &'static str,
    },
    #[snafu(display("Unable to parse max connections {:?}", original))]
    ParseMaxConnections {
        source: ParseIntError,
        original: String,
    },
    #[snafu(display("Unable to listen on {}", server_ip))]
    BindListener {
        source: std::io::Error,
        server_ip: String,
    },
    #[snafu(display("Error serving app"))]
    Serve { source: std::io::Error },
    #[snafu(display("Unable to find course with ID: {}", id))]
    MissingCourse { id: i64 },
    #[snafu(display("Unable to find student with ID: {}", id))]
    MissingStudent { id: i64 },
    #[snafu(display("Not found."))]
    BadPath { source: PathRejection },
    #[snafu(display("This field is required."))]
    MissingField { field: &'static str },
    #[snafu(display("This field may not be blank."))]
    BlankField { field: &'static str },
    #[snafu(display("Students do not exist: {:?}", ids))]
    UnknownStudents { ids: Vec<i64> },
    #[snafu(display("Malformed JSON body: {}", source.body_text()))]
    JsonBody { source: JsonRejection },
    #[snafu(display("A valid integer is required, got {:?}.", original))]
    InvalidNumber {
        source: ParseIntError,
        field: &'static str,
        original: String,
    },
    #[snafu(display("Malformed form body: {}", source.body_text()))]
    FormBody { source: FormRejection },
    #[snafu(display("Malformed multipart body: {}", source.body_text()))]
    MultipartBody { source: MultipartRejection },
    #[snafu(display("Error with multipart form input"))]
    Multipart { source: MultipartError },
    #[snafu(display("Malformed query: {}", source.body_text()))]
    BadQuery { source: QueryRejection },
}

impl EnrolError {
    pub fn status_code(&self) -> StatusCode {
        const ISE: StatusCode = StatusCode::INTERNAL_SERVER_ERROR; //internal server error
        const NF: StatusCode = StatusCode::NOT_FOUND; //not found
        const BI: StatusCode = StatusCode::BAD_REQUEST; //bad input

        match self {
            Self::OpenDatabase { .. } | Self::GetDatabaseConnection { .. } => ISE,
            Self::MakeQuery { .. } | Self::CommitTransaction { .. } => ISE,
            Self::MigrateError { .. } => ISE,
            Self::BadEnvVar { .. } | Self::ParseMaxConnections { .. } => ISE,
            Self::BindListener { .. } | Self::Serve { .. } => ISE,
            Self::MissingCourse { .. } | Self::MissingStudent { .. } | Self::BadPath { .. } => NF,
            Self::MissingField { .. } | Self::BlankField { .. } => BI,
            Self::UnknownStudents { .. } => BI,
            Self::InvalidNumber { .. } => BI,
            Self::JsonBody { .. } | Self::FormBody { .. } | Self::BadQuery { .. } => BI,
            Self::MultipartBody { .. } => BI,
            Self::Multipart { source } => source.status(),
        }
    }

    /// The JSON body sent back to the client: per-field messages for validation failures,
    /// `{"detail": ..}` for everything else.
    pub fn body(&self) -> serde_json::Value {
        match self {
            Self::MissingField { field }
            | Self::BlankField { field }
            | Self::InvalidNumber { field, .. } => {
                let mut body = serde_json::Map::new();
                body.insert((*field).to_string(), json!([self.to_string()]));
                serde_json::Value::Object(body)
            }
            Self::UnknownStudents { ids } => {
                let messages: Vec<_> = ids
                    .iter()
                    .map(|id| format!("Invalid pk \"{id}\" - object does not exist."))
                    .collect();
                json!({ "students": messages })
            }
            _ => json!({ "detail": self.to_string() }),
        }
    }
}

impl IntoResponse for EnrolError {
    fn into_response(self) -> Response {
        let status_code = self.status_code();
        if status_code.is_server_error() {
            error!(?self, "Error!");
        } else {
            warn!(?self, %status_code, "Rejected request");
        }

        (status_code, Json(self.body())).into_response()
    }
}
