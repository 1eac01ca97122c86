use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid request JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("request contains no questions")]
    NoQuestions,

    #[error("none of the {0} questions has renderable content")]
    NoValidQuestions(usize),

    /// An image asset decoded from base64 but could not be embedded.
    #[error("image {id}: {reason}")]
    Image { id: String, reason: String },

    #[error("PDF assembly error: {0}")]
    Pdf(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        assert_eq!(Error::NoQuestions.to_string(), "request contains no questions");
        assert_eq!(
            Error::NoValidQuestions(3).to_string(),
            "none of the 3 questions has renderable content"
        );
        let err = Error::Image {
            id: "ab12".into(),
            reason: "unsupported format".into(),
        };
        assert_eq!(err.to_string(), "image ab12: unsupported format");
    }

    #[test]
    fn io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "missing");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
