//! Error taxonomy for script parsing, session lookup and browser execution.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// A malformed request body or script element. Reported as 400.
    #[error("{0}")]
    Validation(String),

    /// `load_tab` referenced a tab the registry no longer holds.
    #[error("tab with id \"{0}\" doesn't exist")]
    TabNotFound(String),

    /// A protocol-level failure from the browser.
    #[error(transparent)]
    Cdp(#[from] chromiumoxide::error::CdpError),

    /// A driver failure outside the protocol layer (bad params, closed pages).
    #[error("{0}")]
    Driver(String),

    /// A command exceeded the tab's effective deadline.
    #[error("browser command timed out")]
    Timeout,

    /// The session registry actor is gone; nothing can be scheduled.
    #[error("session registry unavailable")]
    RegistryClosed,

    #[error(transparent)]
    Encode(#[from] serde_json::Error),
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }
}
