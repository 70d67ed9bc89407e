use std::sync::{Arc, PoisonError};

use tracing::{debug, debug_span};

use super::{Shared, State};

/// Worker loop: take the slot, resolve outside the lock, store the result.
pub(super) fn run(shared: Arc<Shared>) {
    let _span = debug_span!("recognizer_worker").entered();
    let mut state = shared.lock();
    let mut did_work = false;

    loop {
        if state.zombie {
            break;
        }

        let Some(item) = state.slot.take() else {
            // Drained: requests that were superseded before dispatch revert
            // to absent instead of staying "in progress".
            state.pending.clear();
            if did_work {
                did_work = false;
                signal(&shared, &state);
            }
            state = shared
                .work
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
            continue;
        };

        state.busy = true;
        let epoch = state.epoch;
        drop(state);

        let result = shared.resolver.resolve(&item.word);

        state = shared.lock();
        state.busy = false;
        if state.zombie {
            break;
        }
        did_work = true;
        if state.epoch != epoch {
            debug!(key = %item.key, "dropping result computed before clear");
            continue;
        }

        let State {
            arena,
            confirmed,
            pending,
            ..
        } = &mut *state;
        pending.remove(arena, &item.key);
        if !confirmed.insert(arena, &item.key, result) {
            debug!(key = %item.key, "recognizer arena exhausted");
        }
        debug!(key = %item.key, ?result, "recognized");
        signal(&shared, &state);
    }

    state.busy = false;
    drop(state);
    shared.ready.notify_all();
}

fn signal(shared: &Shared, state: &State) {
    shared.ready.notify_all();
    if let Some(wake) = &state.wake {
        wake.set();
    }
}
