use thiserror::Error;

use crate::ledger::error::LedgerError;

#[derive(Error, Debug)]
pub enum OrderError {
    #[error("listing is not active")]
    ListingNotActive,

    #[error("buyer cannot rent their own listing")]
    SelfRental,

    #[error("hours {hours} outside listing window [{min}, {max}]")]
    HoursOutOfRange { hours: u32, min: u32, max: u32 },

    #[error("buyer is banned")]
    BuyerBanned,

    #[error("order not found: {0}")]
    NotFound(String),

    #[error("order {0} is terminal and cannot be transitioned")]
    OrderTerminal(String),

    #[error("order {order} is in state {actual}, expected {expected}")]
    InvalidState {
        order: String,
        actual: String,
        expected: String,
    },

    #[error("dispute cannot be resolved: order is not in state dispute")]
    DisputeInvalidState,

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("internal error: {0}")]
    Internal(String),
}
