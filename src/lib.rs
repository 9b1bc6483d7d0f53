//! Local OAuth2 access-token cache and refresh manager.
//!
//! Reads a CLI-issued credential file, hands out a currently-valid bearer
//! token, and refreshes it against the provider's token endpoint when the
//! stored one is expired. Saves go through temp-file-then-rename so
//! concurrent readers never see a partial record.

pub mod authenticator;
pub mod error;
pub mod expiry;
pub mod lock;
pub mod provider;
pub mod record;
pub mod store;
pub mod transport;

#[cfg(test)]
mod test_support;

pub use authenticator::{Authenticator, CredentialStatus, ResolvedEndpoint};
pub use error::{AuthError, AuthResult};
pub use expiry::ExpiryPolicy;
pub use provider::{ApiBaseSource, Provider, ProviderAdapter, ProviderConfig};
pub use record::CredentialRecord;
pub use store::{CredentialStore, PersistObserver};
pub use transport::{RawExchange, TokenReply, TokenRequest, TokenTransport, TransportError};
