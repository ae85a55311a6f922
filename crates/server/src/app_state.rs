use session::SurveyContext;
use storage::Storage;

use crate::thumbnails::ThumbnailResolver;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) survey: SurveyContext,
    pub(crate) thumbnails: ThumbnailResolver,
    /// Present when the choice log is the SQLite sink; `/healthz` probes it.
    pub(crate) storage: Option<Storage>,
}
