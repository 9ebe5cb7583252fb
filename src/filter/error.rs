use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ParamError {
    #[error("Missing user id")]
    MissingUserId,

    #[error("Invalid date for '{param}': {value}")]
    InvalidDate { param: &'static str, value: String },

    #[error("Invalid flag for '{param}': {value}")]
    InvalidFlag { param: &'static str, value: String },
}
