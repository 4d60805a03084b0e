pub mod controller;
pub mod machine;
pub mod types;
pub mod upstream;

pub use controller::AuthSyncController;
pub use machine::{AuthState, FailureReason, RetryPolicy};
pub use types::{SsoFailure, SsoOutcome, SyncGrant};
pub use upstream::{IdentityProvider, MockIdentity, SupabaseIdentity, UpstreamSession};
