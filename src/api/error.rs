use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use log::error;
use serde::Serialize;
use thiserror::Error;

use crate::db::DbError;

/// JSON error body.
#[derive(Serialize, Debug)]
pub struct ErrMsg {
    pub r#type: String,
    pub msg: String,
}

/// Error type for the HTTP API
#[derive(Error, Debug)]
pub enum AppError {
    #[error("invalid request: {0}")]
    InvalidRequest(anyhow::Error),
    #[error("user not found: {0}")]
    UserNotFound(String),
    #[error("internal error")]
    InternalErr(anyhow::Error),
}

impl AppError {
    fn type_str(&self) -> String {
        match self {
            Self::InvalidRequest(_) => "InvalidRequest",
            Self::UserNotFound(_) => "UserNotFound",
            Self::InternalErr(_) => "InternalErr",
        }
        .into()
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::UserNotFound(_) => StatusCode::NOT_FOUND,
            Self::InternalErr(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::InternalErr(err)
    }
}

impl From<DbError> for AppError {
    fn from(err: DbError) -> Self {
        Self::InternalErr(err.into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let code = self.status();
        error!("api error, code {code}: {self:?}");

        (code, Json(ErrMsg { r#type: self.type_str(), msg: self.to_string() })).into_response()
    }
}
