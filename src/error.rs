use thiserror::Error;

/// Failures scoped to a single verification session. None of them are
/// fatal to the application; every variant is recoverable by cancel or
/// retry.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("popup blocked: allow popups for this site and try again")]
    PopupBlocked,
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("server rejected request ({status}): {message}")]
    ServerRejected { status: u16, message: String },
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("invalid URL scheme: {0} (expected http or https)")]
    InvalidScheme(String),
    #[error("reward is not claimable until the watch time is complete")]
    ClaimNotReady,
    #[error("a claim request is already in flight")]
    ClaimInFlight,
    #[error("invalid quiz answers: {0}")]
    InvalidAnswers(String),
    #[error("no active visit")]
    NoActiveSession,
    #[error("a visit is already in progress")]
    SessionActive,
}

impl GatewayError {
    /// Text shown to the user. Server rejections are surfaced verbatim.
    pub fn user_message(&self) -> String {
        match self {
            GatewayError::ServerRejected { message, .. } => message.clone(),
            GatewayError::Network(_) => {
                "Could not reach the server. Check your connection and retry.".into()
            }
            other => other.to_string(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GatewayError::PopupBlocked
                | GatewayError::Network(_)
                | GatewayError::ServerRejected { .. }
                | GatewayError::ClaimInFlight
        )
    }
}

pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_rejection_is_surfaced_verbatim() {
        let err = GatewayError::ServerRejected {
            status: 409,
            message: "Reward already claimed".into(),
        };
        assert_eq!(err.user_message(), "Reward already claimed");
        assert!(err.is_retryable());
    }

    #[test]
    fn popup_blocked_has_actionable_message() {
        let message = GatewayError::PopupBlocked.user_message();
        assert!(message.contains("allow popups"));
    }

    #[test]
    fn state_errors_are_not_retryable() {
        assert!(!GatewayError::ClaimNotReady.is_retryable());
        assert!(!GatewayError::NoActiveSession.is_retryable());
    }
}
