//! Scoped event subscriptions delivered off the dispatcher thread.

use scenescript_core::{
    EventFilter, HandlerId, InputEvent, KeyboardKey, MouseButton, Output, PlayerId, Position,
    SceneCommand,
};
use std::sync::Arc;
use tracing::debug;

use crate::store::{Attachment, ControlError, SceneStore};

/// RAII registration of an event handler.
///
/// Registering commits `AddEventHandler`; dropping the guard dispatches
/// `RemoveEventHandler` and discards the callback, so a handler can be
/// scoped to a block (the bracketed form every blocking wait uses).
pub struct Subscription {
    store: SceneStore,
    handler: HandlerId,
}

impl Subscription {
    /// Identifier of the underlying registration.
    #[must_use]
    pub const fn handler_id(&self) -> HandlerId {
        self.handler
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let removed = self.store.dispatch(SceneCommand::RemoveEventHandler {
            handler: self.handler,
        });
        if removed.is_err() {
            debug!(handler = ?self.handler, "subscription dropped after scene shutdown");
        }
    }
}

impl SceneStore {
    /// Register an event handler. The callback runs on a background thread
    /// per matched event and may itself dispatch commands or block without
    /// stalling the dispatcher or other handlers.
    pub fn subscribe<F>(&self, filter: EventFilter, callback: F) -> Result<Subscription, ControlError>
    where
        F: Fn(&InputEvent) + Send + Sync + 'static,
    {
        let committed = self.dispatch_with_attachment(
            SceneCommand::AddEventHandler { filter },
            Attachment::Handler(Arc::new(callback)),
        )?;
        let handler = match committed.output {
            Output::HandlerAdded(handler) => handler,
            other => unreachable!("AddEventHandler commits HandlerAdded, got {other:?}"),
        };
        Ok(Subscription {
            store: self.clone(),
            handler,
        })
    }

    /// Subscribe to key-down events; `None` accepts any key.
    pub fn on_key_down<F>(
        &self,
        key: Option<KeyboardKey>,
        callback: F,
    ) -> Result<Subscription, ControlError>
    where
        F: Fn(KeyboardKey) + Send + Sync + 'static,
    {
        self.subscribe(EventFilter::KeyDown(key), move |event| {
            if let InputEvent::KeyDown(pressed) = event {
                callback(*pressed);
            }
        })
    }

    /// Subscribe to clicks on empty scene space.
    pub fn on_scene_click<F>(&self, callback: F) -> Result<Subscription, ControlError>
    where
        F: Fn(Position, MouseButton) + Send + Sync + 'static,
    {
        self.subscribe(EventFilter::SceneClick, move |event| {
            if let InputEvent::SceneClick { position, button } = event {
                callback(*position, *button);
            }
        })
    }

    /// Subscribe to clicks on one specific player.
    pub fn on_player_click<F>(
        &self,
        player: PlayerId,
        callback: F,
    ) -> Result<Subscription, ControlError>
    where
        F: Fn(MouseButton) + Send + Sync + 'static,
    {
        self.subscribe(EventFilter::PlayerClick(player), move |event| {
            if let InputEvent::PlayerClick { button, .. } = event {
                callback(*button);
            }
        })
    }

    /// Subscribe to the mouse cursor entering one specific player.
    pub fn on_mouse_enter<F>(
        &self,
        player: PlayerId,
        callback: F,
    ) -> Result<Subscription, ControlError>
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.subscribe(EventFilter::MouseEnter(player), move |_| callback())
    }
}
