//! Infrastructure layer: identity provider adapter, membership store, role
//! resolver, session store and its configuration.

pub mod config;
pub mod identity_provider;
pub mod membership;
pub mod session_store;

pub use config::{ConfigError, SessionStoreConfig};
pub use identity_provider::{Credentials, IdentityProvider, InMemoryIdentityProvider, ProviderError};
pub use membership::{
    InMemoryMembershipStore, LookupError, MembershipRecord, MembershipStore, RetryPolicy,
    RoleResolver, select_membership,
};
pub use session_store::{NavigationSignal, SessionError, SessionStore};
