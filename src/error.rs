use thiserror::Error;

/// Błędy rdzenia (trackery w pamięci).
/// Jedyna kategoria: zły argument od wywołującego – nigdy nie ponawiamy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrackerError {
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
}

pub type TrackerResult<T> = Result<T, TrackerError>;
