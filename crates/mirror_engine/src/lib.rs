//! Mirror engine: fetching, reference extraction and the recursive session driver.
mod batch;
mod config;
mod decode;
mod extract;
mod fetch;
mod filename;
mod filter;
mod persist;
mod rate;
mod session;
mod types;
mod visited;

pub use batch::{parse_url_list, read_url_list, DownloadRequest};
pub use config::{ConfigError, EngineConfig};
pub use decode::{decode_text, DecodeError, DecodedText};
pub use extract::{resolve_reference, DocumentKind, ExtractionError, ReferenceExtractor};
pub use fetch::{
    ChannelProgressSink, FetchSettings, Fetcher, NoopProgressSink, ProgressSink, ReqwestFetcher,
};
pub use filename::{flat_file_name, mirror_path, DestinationRegistry, OutputLayout};
pub use filter::ReferenceFilter;
pub use persist::{ensure_output_dir, PersistError, StagedFile};
pub use rate::{throttle, RateLimitSpec, RateLimiter};
pub use session::MirrorSession;
pub use tokio_util::sync::CancellationToken;
pub use visited::VisitedSet;
pub use types::{
    EngineEvent, ExtractionFailure, Extraction, FailedFetch, FailureKind, FetchError,
    FetchResult, JobId, JobOutcome, JobProgress, SessionReport, Stage,
};
