#![allow(dead_code)]

use std::collections::VecDeque;
use std::ops::Range;
use std::sync::Once;

use harvester_core::{
    update, Cursor, Effect, FetchError, HarvestResult, HarvestState, Msg, RawPage, SleepReason,
    SourceConfig,
};
use serde_json::{json, Value};

pub fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(engine_logging::initialize_for_tests);
}

/// Listing source with `id` and `title` columns; `overrides` are merged on top.
pub fn listing_config(pagination: Value, overrides: Value) -> SourceConfig {
    let mut base = json!({
        "name": "tvil",
        "endpoint": "https://tvil.example/api/entities",
        "pagination": pagination,
        "fields": [
            { "name": "id", "path": "id" },
            { "name": "title", "path": "attributes.title" },
        ],
        "retry": { "max_attempts": 3, "delay_ms": 5 },
        "politeness_delay_ms": 0,
    });
    if let (Some(base), Some(extra)) = (base.as_object_mut(), overrides.as_object()) {
        for (key, value) in extra {
            base.insert(key.clone(), value.clone());
        }
    }
    serde_json::from_value(base).expect("valid config")
}

pub fn listing(id: usize) -> Value {
    json!({ "id": id.to_string(), "attributes": { "title": format!("Hotel {id}") } })
}

pub fn listing_page(ids: Range<usize>) -> RawPage {
    RawPage::new(json!({ "data": ids.map(listing).collect::<Vec<_>>() }))
}

/// What the controller asked for while it was driven.
#[derive(Debug, Default)]
pub struct Transcript {
    pub fetches: Vec<(Cursor, u32)>,
    pub sleeps: Vec<SleepReason>,
}

/// Runs the controller to completion against scripted transport results,
/// the way the engine session would. Panics on a fetch the script does not
/// cover, so tests also prove no extra page was requested.
pub fn drive(
    config: &SourceConfig,
    responses: Vec<Result<RawPage, FetchError>>,
) -> (HarvestResult, Transcript) {
    drive_with(config, responses, |_, _| false)
}

/// Like [`drive`], but `cancel_after` is asked after each page whether the
/// caller cancels before the next fetch.
pub fn drive_with(
    config: &SourceConfig,
    responses: Vec<Result<RawPage, FetchError>>,
    mut cancel_after: impl FnMut(usize, &HarvestState) -> bool,
) -> (HarvestResult, Transcript) {
    let mut responses: VecDeque<_> = responses.into();
    let mut transcript = Transcript::default();
    let state = HarvestState::new(config).expect("valid config");
    let (mut state, effects) = update(state, Msg::Start);
    let mut queue: VecDeque<Effect> = effects.into();

    while let Some(effect) = queue.pop_front() {
        let msg = match effect {
            Effect::Fetch { cursor, attempt } => {
                transcript.fetches.push((cursor.clone(), attempt));
                match responses.pop_front().expect("unexpected fetch") {
                    Ok(page) => Msg::PageLoaded { cursor, page },
                    Err(error) => Msg::FetchFailed { cursor, error },
                }
            }
            Effect::Sleep { reason, .. } => {
                transcript.sleeps.push(reason);
                if cancel_after(transcript.fetches.len(), &state) {
                    let (next, _) = update(state, Msg::CancelRequested);
                    state = next;
                }
                Msg::Wake
            }
            Effect::Finish(_) => break,
        };
        let (next, effects) = update(state, msg);
        state = next;
        queue.extend(effects);
    }

    (state.into_result().expect("harvest finished"), transcript)
}

pub fn ids(result: &HarvestResult) -> Vec<String> {
    result
        .rows
        .iter()
        .map(|row| row.get("id").map(ToString::to_string).unwrap_or_default())
        .collect()
}
