//! Backend selection
//!
//! Which backends a narration tries, in order. Pure function over the
//! engine's current conditions so the policy can be tested without
//! playing anything.

use narrator_common::events::BackendKind;

/// Conditions that influence backend order
#[derive(Debug, Clone, Copy)]
pub struct SelectionInput<'a> {
    /// Configured preference among audio backends
    pub order: &'a [BackendKind],
    pub has_payload: bool,
    pub decode_context_running: bool,
    /// Last narration succeeded on `BufferedElement` right after a gesture
    pub prefer_buffered_once: bool,
}

/// Backends to try, ending with `Synthetic`
pub fn plan(input: SelectionInput<'_>) -> Vec<BackendKind> {
    if !input.has_payload {
        return vec![BackendKind::Synthetic];
    }

    let mut chain: Vec<BackendKind> = Vec::with_capacity(input.order.len() + 1);
    for kind in input.order {
        if *kind != BackendKind::Synthetic && !chain.contains(kind) {
            chain.push(*kind);
        }
    }

    if input.prefer_buffered_once {
        move_to_front(&mut chain, BackendKind::BufferedElement);
    } else if !input.decode_context_running {
        // Tried last; an unlock on the way may have resumed the context
        move_to_back(&mut chain, BackendKind::StreamingDecode);
    }

    chain.push(BackendKind::Synthetic);
    chain
}

fn move_to_front(chain: &mut Vec<BackendKind>, kind: BackendKind) {
    if let Some(pos) = chain.iter().position(|k| *k == kind) {
        let k = chain.remove(pos);
        chain.insert(0, k);
    }
}

fn move_to_back(chain: &mut Vec<BackendKind>, kind: BackendKind) {
    if let Some(pos) = chain.iter().position(|k| *k == kind) {
        let k = chain.remove(pos);
        chain.push(k);
    }
}
