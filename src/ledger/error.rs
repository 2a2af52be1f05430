use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("insufficient funds: requested {requested}, available {available}")]
    InsufficientFunds { requested: String, available: String },

    #[error("arithmetic overflow")]
    Overflow,

    #[error("release_escrow: payout + refund ({sum}) must equal total_paid ({total})")]
    PayoutRefundMismatch { sum: String, total: String },

    #[error("release_escrow: commission ({commission}) exceeds payout ({payout})")]
    CommissionExceedsPayout { commission: String, payout: String },

    #[error("user not found: {0}")]
    UserNotFound(String),

    #[error("order not found: {0}")]
    OrderNotFound(String),

    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),
}
