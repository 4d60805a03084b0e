pub mod cache;
pub mod loader;
pub mod normalize;
pub mod refresh;
pub mod types;

pub use cache::WindowCache;
pub use loader::PeriodDataLoader;
pub use normalize::{normalize_period_body, NormalizedPeriod};
pub use refresh::{AccountRefreshJob, JobState, PollCancel, PollOutcome, RefreshJobStatus, RefreshTicket};
pub use types::{
    AccountScope, AdMetadata, DatasetMetadata, Outcome, Period, PeriodDataset, RawAdRow, WindowKey,
    WindowReady,
};
