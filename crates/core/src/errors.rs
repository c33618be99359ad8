use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    /// Unknown user, untracked channel and unknown ticket id all collapse into this.
    #[error("ticket not found")]
    TicketNotFound,
}
