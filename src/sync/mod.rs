pub mod remote;
pub mod translate;

pub use remote::{PushSync, RemoteSync, SyncStatus};
pub use translate::{current_offset_minutes, to_utc, utc_views, UtcAlarmView};
