//! Conversation persistence
//!
//! - `LocalStore`: durable per-user JSON files, always written
//! - `RemoteStore`: cloud document store, written while healthy
//! - `ConversationStore`: the dual-write policy tying them together
//! - `AuthProvider`: sign-in for the remote store
//!
//! Firestore and Firebase Auth REST adapters implement the remote traits.

mod auth;
mod conversation;
mod exchange;
mod firestore;
mod health;
mod local;
mod remote;
mod sanitize;

pub use auth::{AuthProvider, AuthSubscription, AuthUser, FirebaseAuth};
pub use conversation::ConversationStore;
pub use exchange::{ConversationExchange, Origin};
pub use firestore::FirestoreStore;
pub use health::{ConnectionHealth, HealthPolicy};
pub use local::LocalStore;
pub use remote::{Direction, OrderBy, QueryFilter, RemoteDocument, RemoteQuery, RemoteStore};
pub use sanitize::sanitize;
