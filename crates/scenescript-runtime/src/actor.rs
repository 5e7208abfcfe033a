//! Thread-per-player actors running user control routines.

use scenescript_core::{Output, PlayerDefinition, PlayerId, SceneCommand};
use slotmap::Key;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::thread;
use tracing::{debug, warn};

use crate::handle::PlayerHandle;
use crate::store::{ControlError, SceneStore};

impl SceneStore {
    /// Add a player and spawn an independent actor thread running
    /// `routine` against its handle.
    ///
    /// The call returns as soon as `AddPlayer` has committed; it never
    /// waits for the routine. The routine thread winds down cooperatively
    /// when the player is removed: every blocking handle operation then
    /// returns [`ControlError::Cancelled`], which `?` propagates out of the
    /// routine.
    pub fn add_player<F>(
        &self,
        definition: PlayerDefinition,
        routine: F,
    ) -> Result<PlayerHandle, ControlError>
    where
        F: FnOnce(&PlayerHandle) -> Result<(), ControlError> + Send + 'static,
    {
        let handle = self.add_idle_player(definition)?;
        let actor_handle = handle.clone();
        // The routine thread is detached; cancellation, not join, winds it down.
        let _actor = thread::Builder::new()
            .name(format!("player-{}", handle.id().data().as_ffi()))
            .spawn(move || {
                let player = actor_handle.id();
                match routine(&actor_handle) {
                    Ok(()) => debug!(?player, "control routine finished"),
                    Err(ControlError::Cancelled) => {
                        debug!(?player, "control routine cancelled")
                    }
                    Err(error) => warn!(?player, %error, "control routine aborted"),
                }
            })?;
        Ok(handle)
    }

    /// Add a player without a control routine; it only moves when driven
    /// through the returned handle or by event handlers.
    pub fn add_idle_player(
        &self,
        definition: PlayerDefinition,
    ) -> Result<PlayerHandle, ControlError> {
        let committed = self.dispatch_and_wait(SceneCommand::AddPlayer { definition })?;
        let id = match committed.output {
            Output::PlayerAdded(id) => id,
            other => unreachable!("AddPlayer commits PlayerAdded, got {other:?}"),
        };
        let cancel = Arc::new(AtomicBool::new(false));
        self.register_actor(id, Arc::clone(&cancel));
        Ok(PlayerHandle::new(self.clone(), id, cancel))
    }

    /// Remove a player from the scene and cancel its actor.
    ///
    /// A pending Ask on the player resolves as displaced, unblocking an
    /// actor stuck in `ask`; other blocking operations observe the cancel
    /// flag at their next check. The actor thread is never joined here.
    pub fn remove_player(&self, player: PlayerId) -> Result<(), ControlError> {
        self.dispatch_and_wait(SceneCommand::RemovePlayer { player })?;
        self.cancel_actor(player);
        Ok(())
    }
}
