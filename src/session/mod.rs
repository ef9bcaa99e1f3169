//! Visitor sessions: server-side storage, the provider cookie sweep, and the
//! manager that derives authentication state and tears sessions down.

pub mod cookies;
pub mod manager;
pub mod store;

pub use manager::{
    AuthState, LogoutContext, LogoutOutcome, SessionManager, SessionState, UserProfile,
    UserRecord,
};
pub use store::{MemorySessionStore, SessionStore, SessionStoreState, StorageScope};
