//! Caller identity injection.
//!
//! The store forwards identity as opaque headers; it never decides what a
//! guest may do. Embedders plug in whatever session storage they use.

use stashbox_protocol::CallerIdentity;

/// Supplies the identity attached to every remote call.
pub trait CredentialProvider: Send + Sync {
    fn identity(&self) -> CallerIdentity;
}

/// A fixed identity.
#[derive(Debug, Clone)]
pub struct StaticCredentials(pub CallerIdentity);

impl CredentialProvider for StaticCredentials {
    fn identity(&self) -> CallerIdentity {
        self.0.clone()
    }
}

impl<F> CredentialProvider for F
where
    F: Fn() -> CallerIdentity + Send + Sync,
{
    fn identity(&self) -> CallerIdentity {
        self()
    }
}
