use engine_logging::{engine_debug, engine_info, engine_warn};
use serde_json::Value;

use crate::cursor::Continuation;
use crate::state::Phase;
use crate::{
    Cursor, Effect, FetchError, HarvestState, Msg, RawPage, SleepReason, TerminalReason,
};

/// Pure update function: applies a message to the controller state and
/// returns the effects the session must execute next.
///
/// At most one `Fetch` is ever outstanding, and a finished harvest ignores
/// every further message.
pub fn update(mut state: HarvestState, msg: Msg) -> (HarvestState, Vec<Effect>) {
    if state.is_finished() {
        return (state, Vec::new());
    }

    let effects = match msg {
        Msg::Start => {
            if !matches!(state.phase(), Phase::Idle) {
                Vec::new()
            } else if state.max_pages() == Some(0) {
                finish(&mut state, TerminalReason::PageLimitReached)
            } else {
                let cursor = state.pagination().first_cursor();
                enter_fetching(&mut state, cursor, 1)
            }
        }
        Msg::CancelRequested => {
            state.request_cancel();
            Vec::new()
        }
        Msg::Wake => match state.take_phase() {
            Phase::Sleeping { cursor, attempt } => enter_fetching(&mut state, cursor, attempt),
            other => {
                state.set_phase(other);
                Vec::new()
            }
        },
        Msg::PageLoaded { cursor, page } => {
            if is_current(&state, &cursor) {
                on_page_loaded(&mut state, cursor, page)
            } else {
                engine_warn!("Ignoring page for stale cursor {}", cursor);
                Vec::new()
            }
        }
        Msg::FetchFailed { cursor, error } => {
            if is_current(&state, &cursor) {
                on_fetch_failed(&mut state, cursor, error)
            } else {
                engine_warn!("Ignoring failure for stale cursor {}", cursor);
                Vec::new()
            }
        }
    };

    (state, effects)
}

fn is_current(state: &HarvestState, cursor: &Cursor) -> bool {
    matches!(state.phase(), Phase::Fetching { cursor: current, .. } if current == cursor)
}

/// Top of every FETCHING entry; the only place cancellation is observed.
fn enter_fetching(state: &mut HarvestState, cursor: Cursor, attempt: u32) -> Vec<Effect> {
    if state.cancel_requested() {
        return finish(state, TerminalReason::Cancelled);
    }
    state.set_phase(Phase::Fetching {
        cursor: cursor.clone(),
        attempt,
    });
    vec![Effect::Fetch { cursor, attempt }]
}

fn on_page_loaded(state: &mut HarvestState, cursor: Cursor, page: RawPage) -> Vec<Effect> {
    if let Some(total) = state.note_declared_total(&page) {
        engine_info!("{} declares {} results", state.source(), total);
    }
    let records: &[Value] = match state.extractor().try_extract(&page.body) {
        Ok(records) => records,
        Err(err) => {
            engine_warn!("Extraction failed at {}: {}; treating page as empty", cursor, err);
            state.record_soft_failure();
            &[]
        }
    };
    state.record_page();

    if records.is_empty() {
        engine_info!("No records at {}", cursor);
        return finish(state, TerminalReason::Empty);
    }

    let count = records.len();
    let rows: Vec<_> = records
        .iter()
        .flat_map(|record| state.normalizer().normalize(record))
        .collect();
    let row_count = rows.len();
    for row in rows {
        state.accept_row(row);
    }
    engine_debug!(
        "{} records ({} rows) at {}, {} rows total",
        count,
        row_count,
        cursor,
        state.rows().len()
    );

    if let Some(page_size) = state.pagination().page_size() {
        if count < page_size {
            engine_info!("Short page at {} ({} < {})", cursor, count, page_size);
            return finish(state, TerminalReason::ShortPage);
        }
    }

    if state.max_pages().is_some_and(|limit| state.pages() >= limit) {
        return finish(state, TerminalReason::PageLimitReached);
    }

    match state.pagination().next(&cursor, &page) {
        Continuation::NoMoreLink => {
            engine_info!("No continuation after {}", cursor);
            finish(state, TerminalReason::NoMoreLink)
        }
        Continuation::Next(next) => {
            let duration = state.politeness();
            state.set_phase(Phase::Sleeping {
                cursor: next,
                attempt: 1,
            });
            vec![Effect::Sleep {
                duration,
                reason: SleepReason::Politeness,
            }]
        }
    }
}

fn on_fetch_failed(state: &mut HarvestState, cursor: Cursor, error: FetchError) -> Vec<Effect> {
    let attempt = match state.phase() {
        Phase::Fetching { attempt, .. } => *attempt,
        _ => return Vec::new(),
    };
    let retry = state.retry();
    if error.kind.is_retryable() && attempt < retry.max_attempts {
        engine_warn!(
            "Fetch failed at {} (attempt {}/{}): {}",
            cursor,
            attempt,
            retry.max_attempts,
            error
        );
        state.set_phase(Phase::Sleeping {
            cursor,
            attempt: attempt + 1,
        });
        return vec![Effect::Sleep {
            duration: retry.delay(),
            reason: SleepReason::Retry,
        }];
    }
    engine_warn!("Giving up at {} after {} attempt(s): {}", cursor, attempt, error);
    finish(state, TerminalReason::FetchError(error))
}

fn finish(state: &mut HarvestState, reason: TerminalReason) -> Vec<Effect> {
    engine_info!(
        "Harvest {} finished: {} ({} pages, {} rows)",
        state.source(),
        reason,
        state.pages(),
        state.rows().len()
    );
    state.set_phase(Phase::Finished(reason.clone()));
    vec![Effect::Finish(reason)]
}
