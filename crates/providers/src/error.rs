//! Backend error classification.
//!
//! The fallback chain decides whether to try the next backend purely from
//! the [`BackendError`] variant, so every failure a provider can produce is
//! mapped here.

/// Substrings that mark a provider rejection as a content-safety decision.
const CONTENT_POLICY_MARKERS: &[&str] = &[
    "nsfw",
    "content policy",
    "safety filter",
    "safety system",
    "unsafe content",
    "flagged",
    "moderation",
    "sensitive content",
];

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// Payment required or account quota exhausted.
    #[error("Quota exceeded ({status}): {body}")]
    QuotaExceeded { status: u16, body: String },

    #[error("Rate limited: {body}")]
    RateLimited { body: String },

    /// The provider refused the request on content-safety grounds.
    #[error("Content policy rejection: {0}")]
    ContentPolicy(String),

    /// The provider rejected the request parameters.
    #[error("Invalid request ({status}): {body}")]
    Validation { status: u16, body: String },

    #[error("Backend error ({status}): {body}")]
    Server { status: u16, body: String },

    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The provider accepted the request but reported the prediction as
    /// failed in its immediate answer.
    #[error("Prediction failed: {0}")]
    Rejected(String),

    /// The provider answered with a body we could not interpret.
    #[error("Invalid backend response: {0}")]
    InvalidResponse(String),
}

impl BackendError {
    /// Map a non-2xx HTTP response onto a variant. Only a client error
    /// can be a content-policy rejection; a 5xx is always a server fault.
    pub fn classify(status: u16, body: String) -> Self {
        if (400..500).contains(&status) && is_content_policy_message(&body) {
            return Self::ContentPolicy(body);
        }
        match status {
            402 => Self::QuotaExceeded { status, body },
            429 => Self::RateLimited { body },
            400 | 422 => Self::Validation { status, body },
            _ => Self::Server { status, body },
        }
    }

    pub fn is_content_policy(&self) -> bool {
        matches!(self, Self::ContentPolicy(_))
    }

    pub fn is_quota_or_rate_limit(&self) -> bool {
        matches!(self, Self::QuotaExceeded { .. } | Self::RateLimited { .. })
    }

    /// Whether the fallback chain should move on to the next backend.
    /// Content-safety rejections are final: another provider will not
    /// resolve a policy violation.
    pub fn advances_chain(&self) -> bool {
        !self.is_content_policy()
    }
}

/// Whether a provider error message describes a content-safety rejection.
pub fn is_content_policy_message(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    CONTENT_POLICY_MARKERS.iter().any(|m| lower.contains(m))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
