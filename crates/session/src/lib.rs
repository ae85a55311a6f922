use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard,
    },
    time::{Duration, Instant},
};

use chrono::Utc;
use chrono_tz::Tz;
use rand::{rngs::StdRng, SeedableRng};
use shared::{
    domain::{ItemId, PageNumber, ParticipantId, SessionId},
    error::{ApiError, ErrorCode},
    protocol::{
        AdvanceOutcome, ChoiceRecord, PageItemView, PageView, Selection, SessionSnapshot,
        SessionStart,
    },
};
use storage::{Catalog, ChoiceSink};
use tracing::{debug, info, warn};

pub mod clock;
pub mod state;

pub use clock::{local_timestamp, parse_time_zone, DEFAULT_TIME_ZONE};
pub use state::{EnteredPage, SessionState, Transition};

#[derive(Clone)]
pub struct SurveyContext {
    pub catalog: Arc<Catalog>,
    pub sink: Arc<dyn ChoiceSink>,
    pub time_zone: Tz,
    pub sessions: SessionRegistry,
}

/// Idle sessions are dropped after this long unless the host configures otherwise.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(2 * 60 * 60);

struct SessionEntry {
    state: SessionState,
    last_seen: Instant,
}

/// In-memory session table. Sessions never outlive the process and are
/// evicted once idle for longer than the registry's TTL.
#[derive(Clone)]
pub struct SessionRegistry {
    inner: Arc<Mutex<HashMap<SessionId, SessionEntry>>>,
    seed: Option<u64>,
    ttl: Duration,
    created: Arc<AtomicU64>,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(None)
    }
}

impl SessionRegistry {
    /// With a seed, session `n` draws from `seed + n`; without one, each session is seeded from the OS.
    pub fn new(seed: Option<u64>) -> Self {
        Self {
            inner: Arc::default(),
            seed,
            ttl: DEFAULT_SESSION_TTL,
            created: Arc::default(),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn len(&self) -> Result<usize, ApiError> {
        Ok(self.lock()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, ApiError> {
        Ok(self.len()? == 0)
    }

    /// Drops every session idle for longer than the TTL and returns how many went.
    pub fn evict_idle(&self) -> Result<usize, ApiError> {
        let ttl = self.ttl;
        let mut sessions = self.lock()?;
        let before = sessions.len();
        sessions.retain(|_, entry| entry.last_seen.elapsed() <= ttl);
        let evicted = before - sessions.len();
        if evicted > 0 {
            debug!(evicted, remaining = sessions.len(), "evicted idle sessions");
        }
        Ok(evicted)
    }

    fn next_rng(&self) -> StdRng {
        let ordinal = self.created.fetch_add(1, Ordering::Relaxed);
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(ordinal)),
            None => StdRng::from_os_rng(),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<SessionId, SessionEntry>>, ApiError> {
        self.inner
            .lock()
            .map_err(|_| ApiError::new(ErrorCode::Internal, "session registry lock poisoned"))
    }

    fn insert(&self, session_id: SessionId, state: SessionState) -> Result<(), ApiError> {
        self.lock()?.insert(
            session_id,
            SessionEntry {
                state,
                last_seen: Instant::now(),
            },
        );
        Ok(())
    }

    fn with_session<T>(
        &self,
        session_id: SessionId,
        f: impl FnOnce(&mut SessionState) -> Result<T, ApiError>,
    ) -> Result<T, ApiError> {
        let not_found = || ApiError::new(ErrorCode::NotFound, "session not found");
        let mut sessions = self.lock()?;
        let expired = sessions
            .get(&session_id)
            .ok_or_else(not_found)?
            .last_seen
            .elapsed()
            > self.ttl;
        if expired {
            sessions.remove(&session_id);
            debug!(%session_id, "session expired");
            return Err(not_found());
        }
        let entry = sessions.get_mut(&session_id).ok_or_else(not_found)?;
        entry.last_seen = Instant::now();
        f(&mut entry.state)
    }
}

impl SurveyContext {
    pub fn new(catalog: Catalog, sink: Arc<dyn ChoiceSink>, time_zone: Tz, seed: Option<u64>) -> Self {
        Self {
            catalog: Arc::new(catalog),
            sink,
            time_zone,
            sessions: SessionRegistry::new(seed),
        }
    }

    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.sessions = self.sessions.with_ttl(ttl);
        self
    }
}

pub fn initialize_session(
    ctx: &SurveyContext,
    participant_id: ParticipantId,
) -> Result<SessionStart, ApiError> {
    let state = SessionState::new(
        participant_id.clone(),
        ctx.catalog.pages().to_vec(),
        ctx.sessions.next_rng(),
    )?;
    ctx.sessions.evict_idle()?;
    let start = SessionStart {
        session_id: SessionId::new(),
        participant_id,
        total_pages: state.pages().len(),
        last_page: state.last_page(),
    };
    ctx.sessions.insert(start.session_id, state)?;
    info!(
        session_id = %start.session_id,
        participant_id = %start.participant_id,
        total_pages = start.total_pages,
        "session started"
    );
    Ok(start)
}

pub fn enter_page(ctx: &SurveyContext, session_id: SessionId) -> Result<PageView, ApiError> {
    ctx.sessions.with_session(session_id, |state| {
        let page = state.current_page();
        let completed = state.is_completed();
        let position = state.page_index() + 1;
        let total_pages = state.pages().len();
        let last_page = state.last_page();
        let participant_id = state.participant_id().clone();

        let entered = state.enter_page(page, ctx.catalog.items_on(page));
        Ok(PageView {
            session_id,
            participant_id,
            page,
            position,
            total_pages,
            last_page,
            items: entered
                .items
                .into_iter()
                .map(|(item, role)| PageItemView {
                    item: item.clone(),
                    role,
                    thumbnail_url: None,
                })
                .collect(),
            assignment: entered.assignment,
            selection: entered.selection,
            completed,
            warning: ctx.catalog.page_warning(page),
        })
    })
}

pub fn select_item(
    ctx: &SurveyContext,
    session_id: SessionId,
    page: PageNumber,
    item_id: &ItemId,
) -> Result<Selection, ApiError> {
    ctx.sessions.with_session(session_id, |state| {
        let accepted = state.select_item(page, item_id, ctx.catalog.items_on(page));
        if !accepted {
            warn!(%session_id, %page, %item_id, "ignored selection outside the current page");
        }
        Ok(Selection {
            page,
            selection: state.selection(page).cloned(),
            accepted,
        })
    })
}

/// Moves the session past `page`. The first successful call per page writes one
/// record to the sink; a failed write is logged and does not hold the participant back.
pub async fn advance(
    ctx: &SurveyContext,
    session_id: SessionId,
    page: PageNumber,
) -> Result<AdvanceOutcome, ApiError> {
    let timestamp = local_timestamp(ctx.time_zone, Utc::now());
    let transition = ctx.sessions.with_session(session_id, |state| {
        state.advance(page, ctx.catalog.items_on(page), &timestamp)
    })?;

    if let Some(record) = transition.record {
        emit_record(ctx, session_id, &record).await;
    }
    if matches!(transition.outcome, AdvanceOutcome::Completed { logged: true }) {
        info!(%session_id, "session completed");
    }
    Ok(transition.outcome)
}

pub fn snapshot(ctx: &SurveyContext, session_id: SessionId) -> Result<SessionSnapshot, ApiError> {
    ctx.sessions.with_session(session_id, |state| {
        Ok(SessionSnapshot {
            session_id,
            participant_id: state.participant_id().clone(),
            page_index: state.page_index(),
            current_page: state.current_page(),
            completed: state.is_completed(),
            selections: state.selections(),
            logged_pages: state.logged_pages(),
        })
    })
}

async fn emit_record(ctx: &SurveyContext, session_id: SessionId, record: &ChoiceRecord) {
    match ctx.sink.append(record).await {
        Ok(()) => info!(
            %session_id,
            participant_id = %record.participant_id,
            page = %record.page,
            chosen = %record.chosen_internal_id,
            sink = ctx.sink.name(),
            "choice logged"
        ),
        Err(error) => warn!(
            %session_id,
            participant_id = %record.participant_id,
            page = %record.page,
            sink = ctx.sink.name(),
            error = %format!("{error:#}"),
            "failed to write choice log; continuing"
        ),
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
