//! Blocking wait primitives: one-shot signal + self-unregistering handler.
//!
//! Every primitive follows the same shape. Create a [`OneShot`], register a
//! self-filtering handler (or arm an Ask bubble) whose callback releases the
//! signal exactly once, block, then let the subscription guard unregister on
//! the way out. Cancellable callers (player actors) re-check their cancel
//! flag between short waits; plain callers block indefinitely, which is the
//! documented contract for these operations.

use scenescript_core::{
    Answer, BubbleSpec, EventFilter, InputEvent, KeyboardKey, MouseButton, Output, PlayerId,
    Position, SceneCommand,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::signal::OneShot;
use crate::store::{Attachment, ControlError, SceneStore};

/// How often a cancellable wait re-checks its cancel flag.
pub(crate) const CANCEL_POLL: Duration = Duration::from_millis(50);

pub(crate) fn block_on<T>(
    signal: &OneShot<T>,
    cancel: Option<&AtomicBool>,
) -> Result<T, ControlError> {
    match cancel {
        None => Ok(signal.wait()),
        Some(flag) => loop {
            if let Some(value) = signal.wait_deadline(CANCEL_POLL) {
                return Ok(value);
            }
            if flag.load(Ordering::Acquire) {
                return Err(ControlError::Cancelled);
            }
        },
    }
}

pub(crate) fn wait_for_key(
    store: &SceneStore,
    key: KeyboardKey,
    cancel: Option<&AtomicBool>,
) -> Result<(), ControlError> {
    let signal = Arc::new(OneShot::new());
    let released = Arc::clone(&signal);
    let subscription = store.subscribe(EventFilter::KeyDown(Some(key)), move |_| {
        released.release(());
    })?;
    let result = block_on(&signal, cancel);
    drop(subscription);
    result
}

pub(crate) fn wait_for_any_key(
    store: &SceneStore,
    cancel: Option<&AtomicBool>,
) -> Result<KeyboardKey, ControlError> {
    let signal = Arc::new(OneShot::new());
    let released = Arc::clone(&signal);
    let subscription = store.subscribe(EventFilter::KeyDown(None), move |event| {
        if let InputEvent::KeyDown(key) = event {
            released.release(*key);
        }
    })?;
    let result = block_on(&signal, cancel);
    drop(subscription);
    result
}

pub(crate) fn wait_for_click(
    store: &SceneStore,
    cancel: Option<&AtomicBool>,
) -> Result<(Position, MouseButton), ControlError> {
    let signal = Arc::new(OneShot::new());
    let released = Arc::clone(&signal);
    let subscription = store.subscribe(EventFilter::SceneClick, move |event| {
        if let InputEvent::SceneClick { position, button } = event {
            released.release((*position, *button));
        }
    })?;
    let result = block_on(&signal, cancel);
    drop(subscription);
    result
}

pub(crate) fn ask(
    store: &SceneStore,
    player: PlayerId,
    question: String,
    cancel: Option<&AtomicBool>,
) -> Result<Answer, ControlError> {
    let signal: Arc<OneShot<Option<Answer>>> = Arc::new(OneShot::new());
    let released = Arc::clone(&signal);
    let committed = store.dispatch_with_attachment(
        SceneCommand::SetSpeechBubble {
            player,
            bubble: Some(BubbleSpec::Ask { question }),
        },
        Attachment::Answer(Box::new(move |answer| {
            released.release(answer);
        })),
    )?;
    if !matches!(committed.output, Output::AskArmed(_)) {
        // The player was already removed; the dispatcher has resolved the
        // callback with `None`.
        return Err(ControlError::PlayerGone);
    }
    match block_on(&signal, cancel)? {
        Some(answer) => Ok(answer),
        None => Err(ControlError::Cancelled),
    }
}

pub(crate) fn ask_text(
    store: &SceneStore,
    player: PlayerId,
    question: String,
    cancel: Option<&AtomicBool>,
) -> Result<String, ControlError> {
    match ask(store, player, question, cancel)? {
        Answer::Text(text) => Ok(text),
        Answer::Bool(_) => Err(ControlError::AnswerKind { expected: "text" }),
    }
}

pub(crate) fn ask_bool(
    store: &SceneStore,
    player: PlayerId,
    question: String,
    cancel: Option<&AtomicBool>,
) -> Result<bool, ControlError> {
    match ask(store, player, question, cancel)? {
        Answer::Bool(value) => Ok(value),
        Answer::Text(_) => Err(ControlError::AnswerKind { expected: "bool" }),
    }
}

impl SceneStore {
    /// Block until the given key is pressed.
    pub fn wait_for_key(&self, key: KeyboardKey) -> Result<(), ControlError> {
        wait_for_key(self, key, None)
    }

    /// Block until any key is pressed, returning it.
    pub fn wait_for_any_key(&self) -> Result<KeyboardKey, ControlError> {
        wait_for_any_key(self, None)
    }

    /// Block until the scene is clicked, returning position and button.
    pub fn wait_for_click(&self) -> Result<(Position, MouseButton), ControlError> {
        wait_for_click(self, None)
    }
}
