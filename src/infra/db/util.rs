use crate::application::repos::RepoError;

const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";
const INVALID_TEXT_REPRESENTATION: &str = "22P02";
const QUERY_CANCELED: &str = "57014";

/// Classifies a driver error by its SQLSTATE.
pub fn map_sqlx_error(err: sqlx::Error) -> RepoError {
    match err {
        sqlx::Error::RowNotFound => RepoError::NotFound,
        sqlx::Error::PoolTimedOut => RepoError::Timeout,
        sqlx::Error::Database(db) => {
            let message = db.message().to_string();
            match db.code().as_deref() {
                Some(UNIQUE_VIOLATION) => RepoError::Duplicate {
                    constraint: db.constraint().unwrap_or("unknown").to_string(),
                },
                Some(FOREIGN_KEY_VIOLATION) | Some(INVALID_TEXT_REPRESENTATION) => {
                    RepoError::InvalidInput { message }
                }
                Some(QUERY_CANCELED) => RepoError::Timeout,
                Some(code) if code.starts_with("23") => RepoError::Integrity { message },
                _ => RepoError::Persistence(message),
            }
        }
        other => RepoError::from_persistence(other),
    }
}
