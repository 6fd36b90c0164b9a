use crate::error::{
    EnrolError, EnrolResult, FormBodySnafu, JsonBodySnafu, MultipartBodySnafu, MultipartSnafu,
};
use axum::{
    Form, Json,
    extract::{FromRequest, Multipart, Request},
    http::header,
};
use serde::de::DeserializeOwned;
use snafu::ResultExt;

/// A body that can also arrive as flat `key=value` pairs. Repeated keys carry list values.
pub trait FromFields: Sized {
    fn from_fields(fields: Vec<(String, String)>) -> EnrolResult<Self>;
}

enum BodyKind {
    Json,
    UrlEncoded,
    Multipart,
}

impl BodyKind {
    fn of(req: &Request) -> Self {
        let content_type = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();

        if content_type.starts_with("multipart/form-data") {
            Self::Multipart
        } else if content_type.starts_with("application/x-www-form-urlencoded") {
            Self::UrlEncoded
        } else {
            Self::Json
        }
    }
}

/// Request body accepted as JSON, url-encoded form or multipart form.
pub struct Payload<T>(pub T);

impl<S, T> FromRequest<S> for Payload<T>
where
    S: Send + Sync,
    T: DeserializeOwned + FromFields + Send,
{
    type Rejection = EnrolError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let fields = match BodyKind::of(&req) {
            BodyKind::Json => {
                let Json(body) = Json::<T>::from_request(req, state)
                    .await
                    .context(JsonBodySnafu)?;
                return Ok(Self(body));
            }
            BodyKind::UrlEncoded => {
                let Form(fields) = Form::<Vec<(String, String)>>::from_request(req, state)
                    .await
                    .context(FormBodySnafu)?;
                fields
            }
            BodyKind::Multipart => {
                let mut multipart = Multipart::from_request(req, state)
                    .await
                    .context(MultipartBodySnafu)?;

                let mut fields = vec![];
                while let Some(field) = multipart.next_field().await.context(MultipartSnafu)? {
                    //unnamed parts can't map onto anything
                    let Some(name) = field.name().map(ToString::to_string) else {
                        continue;
                    };
                    fields.push((name, field.text().await.context(MultipartSnafu)?));
                }
                fields
            }
        };

        T::from_fields(fields).map(Self)
    }
}
