use crate::{ResolveError, TransportError};

/// What a delivery attempt did to a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeliveryOutcome {
    /// 200: stamped, subject status true
    Delivered,
    /// 400/404: stamped and resolved, subject status false
    Rejected,
    /// Network error, 500 or any status outside the table: the drain loop
    /// applies the `init` policy
    Failed,
    /// Gateway directory unavailable: left pending for a later pass
    Deferred,
}

impl DeliveryOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryOutcome::Delivered => "delivered",
            DeliveryOutcome::Rejected => "rejected",
            DeliveryOutcome::Failed => "failed",
            DeliveryOutcome::Deferred => "deferred",
        }
    }
}

const STATUS_TABLE: &[(u16, DeliveryOutcome)] = &[
    (200, DeliveryOutcome::Delivered),
    (400, DeliveryOutcome::Rejected),
    (404, DeliveryOutcome::Rejected),
    (500, DeliveryOutcome::Failed),
];

pub fn classify_status(status: u16) -> DeliveryOutcome {
    STATUS_TABLE
        .iter()
        .find(|(code, _)| *code == status)
        .map(|(_, outcome)| *outcome)
        .unwrap_or(DeliveryOutcome::Failed)
}

/// Classify the result of the delivery call itself
pub fn classify(result: &Result<u16, TransportError>) -> DeliveryOutcome {
    match result {
        Ok(status) => classify_status(*status),
        Err(_) => DeliveryOutcome::Failed,
    }
}

/// Classify a failed gateway lookup. Nothing is sent in that case, so a
/// 400/404 from the directory is a hard failure rather than a rejection.
pub fn classify_resolve_error(err: &ResolveError) -> DeliveryOutcome {
    match err {
        ResolveError::Transport(_) | ResolveError::EmptyAddress => DeliveryOutcome::Failed,
        ResolveError::Status(400) | ResolveError::Status(404) => DeliveryOutcome::Failed,
        ResolveError::Status(_) => DeliveryOutcome::Deferred,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_table() {
        assert_eq!(classify_status(200), DeliveryOutcome::Delivered);
        assert_eq!(classify_status(400), DeliveryOutcome::Rejected);
        assert_eq!(classify_status(404), DeliveryOutcome::Rejected);
        assert_eq!(classify_status(500), DeliveryOutcome::Failed);
        assert_eq!(classify_status(503), DeliveryOutcome::Failed);
        assert_eq!(classify_status(201), DeliveryOutcome::Failed);
        assert_eq!(classify_status(401), DeliveryOutcome::Failed);
    }

    #[test]
    fn test_network_error_fails() {
        let result = Err(TransportError::Network("connection refused".to_string()));
        assert_eq!(classify(&result), DeliveryOutcome::Failed);
    }

    #[test]
    fn test_resolver_errors() {
        assert_eq!(classify_resolve_error(&ResolveError::Status(404)), DeliveryOutcome::Failed);
        assert_eq!(classify_resolve_error(&ResolveError::EmptyAddress), DeliveryOutcome::Failed);
        assert_eq!(classify_resolve_error(&ResolveError::Status(502)), DeliveryOutcome::Deferred);
    }
}
