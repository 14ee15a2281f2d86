//! Mirror core: pure per-URL display state folded from engine events.
mod effect;
mod msg;
mod state;
mod update;
mod view_model;

pub use effect::Effect;
pub use msg::Msg;
pub use state::{AppState, JobId, JobResultKind, Stage, UrlState};
pub use update::update;
pub use view_model::{AppViewModel, JobRowView, SummaryView};
