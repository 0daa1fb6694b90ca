pub mod dispatch;
pub mod model;
pub mod persist;
pub mod retry;
pub mod router;

pub use dispatch::{Dispatcher, RanJob};
pub use model::{Job, JobResult, SearchRequest};
pub use persist::RunArchive;
pub use router::{Router, UrlHint};

use chrono::Utc;

/// Current time as fractional epoch seconds, the unit delayed-set scores and
/// block timestamps are kept in.
pub fn epoch_seconds() -> f64 {
    let now = Utc::now();
    now.timestamp() as f64 + f64::from(now.timestamp_subsec_micros()) / 1e6
}
