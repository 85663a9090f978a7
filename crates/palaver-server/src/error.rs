use thiserror::Error;

/// Recoverable faults of the routing layer.
///
/// Each one is answered with an ERROR record to the originating peer (the
/// `Display` text is the record's content) and leaves the registry
/// untouched. Transport-level failures never appear here: a dead sink is
/// demoted to a deferred leave, and a read failure closes only its own
/// session.
#[derive(Debug, Error)]
pub enum RoutingError {
    #[error("Name '{0}' is already taken")]
    NameConflict(String),

    #[error("User '{0}' not found")]
    RecipientNotFound(String),
}
