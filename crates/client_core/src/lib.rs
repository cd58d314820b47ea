//! Client for the question-answering search backend: streamed searches with
//! paced progress phases, saved-search reloading, and assistant / api-key
//! administration.

pub mod api_keys;
pub mod assistant;
pub mod config;
pub mod error;
pub mod http;
pub mod phase;
pub mod session;
pub mod store;
pub mod stream;

pub use api_keys::{ApiKeyAdmin, ApiKeyForm};
pub use assistant::{AssistantEditor, AssistantForm, AssistantPayload};
pub use config::{load_settings, ClientSettings};
pub use error::{EditorError, RequestError, SubmitStage, ValidationErrors};
pub use http::ApiClient;
pub use phase::{Phase, PhaseTiming, PhaseTracker};
pub use session::{ResponseField, SearchSession, SessionEvent, SessionSnapshot};
pub use store::{dedupe_quotes, RestoredSearch, SearchResponse, SessionStateStore};
pub use stream::{stream_search, GuardedDispatcher, SearchHandlers, SearchQuery, StreamOutcome};
pub use tokio_util::sync::CancellationToken;
