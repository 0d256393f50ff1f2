/// Why a single transport call failed.
///
/// Fan-out only counts these; nothing is retried.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeliveryFailure {
    /// The recipient blocked the bot.
    Blocked,
    /// Chat deleted, user deactivated, or message no longer exists.
    Unreachable,
    /// Flood control kicked in.
    RateLimited,
    /// The platform refused the request (bad payload, message not modified, ...).
    Rejected,
    Other,
}

/// Core error type for the relay.
///
/// Adapter crates map their specific errors into this type so the core can
/// tell per-recipient delivery failures apart from store failures.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("delivery failed ({kind:?}): {detail}")]
    Delivery {
        kind: DeliveryFailure,
        detail: String,
    },

    #[error("invalid argument: {0}")]
    Invalid(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("external error: {0}")]
    External(String),
}

impl Error {
    pub fn delivery(kind: DeliveryFailure, detail: impl Into<String>) -> Self {
        Self::Delivery {
            kind,
            detail: detail.into(),
        }
    }

    pub fn delivery_kind(&self) -> Option<DeliveryFailure> {
        match self {
            Self::Delivery { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
