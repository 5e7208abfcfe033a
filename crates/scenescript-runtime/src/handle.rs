//! Synchronous per-player control surface used by control routines.

use ordered_float::OrderedFloat;
use scenescript_core::{
    BubbleSpec, KeyboardKey, MouseButton, Pen, Player, PlayerId, Position, Rgba, SceneCommand,
};
use scenescript_index::{NeighborhoodIndex, UniformGridIndex};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::store::{ControlError, SceneStore};
use crate::wait::{self, CANCEL_POLL};

/// Handle on one player in the scene.
///
/// Every mutating operation builds a command and blocks until the
/// dispatcher commits it, so a single routine's operations are strictly
/// sequential while different players interleave at command granularity.
/// Queries read the current published snapshot without dispatching. All
/// operations return [`ControlError::Cancelled`] once the player has been
/// removed, which is how a still-running control routine is asked to wind
/// down.
#[derive(Clone)]
pub struct PlayerHandle {
    store: SceneStore,
    id: PlayerId,
    cancel: Arc<AtomicBool>,
}

impl PlayerHandle {
    pub(crate) fn new(store: SceneStore, id: PlayerId, cancel: Arc<AtomicBool>) -> Self {
        Self { store, id, cancel }
    }

    /// Id of the player this handle controls.
    #[must_use]
    pub const fn id(&self) -> PlayerId {
        self.id
    }

    /// Store this handle dispatches through.
    #[must_use]
    pub const fn store(&self) -> &SceneStore {
        &self.store
    }

    fn guard(&self) -> Result<(), ControlError> {
        if self.cancel.load(Ordering::Acquire) {
            Err(ControlError::Cancelled)
        } else {
            Ok(())
        }
    }

    fn commit(&self, command: SceneCommand) -> Result<(), ControlError> {
        self.guard()?;
        self.store.dispatch_and_wait(command).map(|_| ())
    }

    fn snapshot_player(&self) -> Result<Player, ControlError> {
        self.guard()?;
        self.store
            .state()
            .player(self.id)
            .cloned()
            .ok_or(ControlError::PlayerGone)
    }

    // Movement -----------------------------------------------------------

    /// Walk `distance` units along the current heading, drawing if the pen
    /// is down.
    pub fn forward(&self, distance: f64) -> Result<(), ControlError> {
        let player = self.snapshot_player()?;
        let target = player.position.translated(player.heading, distance);
        self.commit(SceneCommand::SetPosition {
            player: self.id,
            position: target,
        })
    }

    /// Walk backwards without changing the heading.
    pub fn backward(&self, distance: f64) -> Result<(), ControlError> {
        self.forward(-distance)
    }

    /// Rotate counter-clockwise by `degrees`.
    pub fn turn_left(&self, degrees: f64) -> Result<(), ControlError> {
        let player = self.snapshot_player()?;
        self.commit(SceneCommand::SetHeading {
            player: self.id,
            heading: player.heading + degrees,
        })
    }

    /// Rotate clockwise by `degrees`.
    pub fn turn_right(&self, degrees: f64) -> Result<(), ControlError> {
        self.turn_left(-degrees)
    }

    /// Point along an absolute heading in degrees.
    pub fn set_heading(&self, heading: f64) -> Result<(), ControlError> {
        self.commit(SceneCommand::SetHeading {
            player: self.id,
            heading,
        })
    }

    /// Jump (or draw) straight to a position.
    pub fn go_to(&self, position: Position) -> Result<(), ControlError> {
        self.commit(SceneCommand::SetPosition {
            player: self.id,
            position,
        })
    }

    // Pen ----------------------------------------------------------------

    /// Start drawing on subsequent movement.
    pub fn pen_down(&self) -> Result<(), ControlError> {
        let mut pen = self.snapshot_player()?.pen;
        pen.down = true;
        self.set_pen(pen)
    }

    /// Stop drawing.
    pub fn pen_up(&self) -> Result<(), ControlError> {
        let mut pen = self.snapshot_player()?.pen;
        pen.down = false;
        self.set_pen(pen)
    }

    /// Replace the whole pen state.
    pub fn set_pen(&self, pen: Pen) -> Result<(), ControlError> {
        self.commit(SceneCommand::SetPen {
            player: self.id,
            pen,
        })
    }

    /// Change the pen stroke weight.
    pub fn set_pen_weight(&self, weight: f64) -> Result<(), ControlError> {
        let mut pen = self.snapshot_player()?.pen;
        pen.weight = weight;
        self.set_pen(pen)
    }

    /// Change the pen color.
    pub fn set_pen_color(&self, color: Rgba) -> Result<(), ControlError> {
        let mut pen = self.snapshot_player()?.pen;
        pen.color = color;
        self.set_pen(pen)
    }

    // Appearance ---------------------------------------------------------

    /// Scale the player sprite.
    pub fn set_size_factor(&self, factor: f64) -> Result<(), ControlError> {
        self.commit(SceneCommand::SetSizeFactor {
            player: self.id,
            factor,
        })
    }

    /// Advance to the next costume, wrapping at the end of the list.
    pub fn next_costume(&self) -> Result<(), ControlError> {
        self.commit(SceneCommand::NextCostume { player: self.id })
    }

    /// Select a costume by index; out-of-range indices leave it unchanged.
    pub fn set_costume(&self, index: usize) -> Result<(), ControlError> {
        self.commit(SceneCommand::SetCostume {
            player: self.id,
            index,
        })
    }

    /// Show or hide the player.
    pub fn set_visible(&self, visible: bool) -> Result<(), ControlError> {
        self.commit(SceneCommand::SetVisible {
            player: self.id,
            visible,
        })
    }

    /// Move the player to a different draw layer.
    pub fn set_layer(&self, layer: i64) -> Result<(), ControlError> {
        self.commit(SceneCommand::SetLayer {
            player: self.id,
            layer,
        })
    }

    // Speech -------------------------------------------------------------

    /// Show a speech bubble with the given text.
    pub fn say(&self, text: impl Into<String>) -> Result<(), ControlError> {
        self.commit(SceneCommand::SetSpeechBubble {
            player: self.id,
            bubble: Some(BubbleSpec::Say { text: text.into() }),
        })
    }

    /// Show a speech bubble for `duration`, then clear it.
    pub fn say_for(&self, text: impl Into<String>, duration: Duration) -> Result<(), ControlError> {
        self.say(text)?;
        self.sleep(duration)?;
        self.clear_bubble()
    }

    /// Remove the current speech bubble, if any.
    pub fn clear_bubble(&self) -> Result<(), ControlError> {
        self.commit(SceneCommand::SetSpeechBubble {
            player: self.id,
            bubble: None,
        })
    }

    /// Prompt with a question and block until a text answer arrives.
    pub fn ask(&self, question: impl Into<String>) -> Result<String, ControlError> {
        self.guard()?;
        wait::ask_text(&self.store, self.id, question.into(), Some(self.cancel.as_ref()))
    }

    /// Prompt with a question and block until a boolean answer arrives.
    pub fn ask_bool(&self, question: impl Into<String>) -> Result<bool, ControlError> {
        self.guard()?;
        wait::ask_bool(&self.store, self.id, question.into(), Some(self.cancel.as_ref()))
    }

    // Blocking waits -----------------------------------------------------

    /// Block until the given key is pressed.
    pub fn wait_for_key(&self, key: KeyboardKey) -> Result<(), ControlError> {
        self.guard()?;
        wait::wait_for_key(&self.store, key, Some(self.cancel.as_ref()))
    }

    /// Block until any key is pressed, returning it.
    pub fn wait_for_any_key(&self) -> Result<KeyboardKey, ControlError> {
        self.guard()?;
        wait::wait_for_any_key(&self.store, Some(self.cancel.as_ref()))
    }

    /// Block until the scene is clicked, returning position and button.
    pub fn wait_for_click(&self) -> Result<(Position, MouseButton), ControlError> {
        self.guard()?;
        wait::wait_for_click(&self.store, Some(self.cancel.as_ref()))
    }

    /// Sleep while remaining responsive to cancellation.
    pub fn sleep(&self, duration: Duration) -> Result<(), ControlError> {
        let deadline = Instant::now() + duration;
        loop {
            self.guard()?;
            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }
            std::thread::sleep(CANCEL_POLL.min(deadline - now));
        }
    }

    // Queries ------------------------------------------------------------

    /// Current position.
    pub fn position(&self) -> Result<Position, ControlError> {
        Ok(self.snapshot_player()?.position)
    }

    /// Current heading in degrees.
    pub fn heading(&self) -> Result<f64, ControlError> {
        Ok(self.snapshot_player()?.heading)
    }

    /// Current pen state.
    pub fn pen(&self) -> Result<Pen, ControlError> {
        Ok(self.snapshot_player()?.pen)
    }

    /// Whether the player is shown.
    pub fn is_visible(&self) -> Result<bool, ControlError> {
        Ok(self.snapshot_player()?.visible)
    }

    /// Name of the currently worn costume.
    pub fn current_costume(&self) -> Result<Option<String>, ControlError> {
        Ok(self
            .snapshot_player()?
            .current_costume()
            .map(str::to_owned))
    }

    /// Last reported mouse position.
    pub fn mouse_position(&self) -> Result<Position, ControlError> {
        self.guard()?;
        Ok(self.store.state().mouse_position())
    }

    /// Whether a key is currently held down.
    pub fn key_pressed(&self, key: KeyboardKey) -> Result<bool, ControlError> {
        self.guard()?;
        Ok(self.store.state().is_key_pressed(key))
    }

    /// Other players within `radius` of this player, nearest first.
    pub fn nearby_players(&self, radius: f64) -> Result<Vec<PlayerId>, ControlError> {
        let origin = self.snapshot_player()?.position;
        if !(radius > 0.0) || !radius.is_finite() {
            return Ok(Vec::new());
        }
        let state = self.store.state();
        let ids: Vec<PlayerId> = state.players().map(|player| player.id).collect();
        let positions: Vec<(f64, f64)> = state
            .players()
            .map(|player| (player.position.x, player.position.y))
            .collect();

        let mut index = UniformGridIndex::new(radius);
        if index.rebuild(&positions).is_err() {
            return Ok(Vec::new());
        }
        let mut hits: Vec<(OrderedFloat<f64>, PlayerId)> = Vec::new();
        index.neighbors_within((origin.x, origin.y), radius * radius, &mut |idx, dist_sq| {
            let id = ids[idx];
            if id != self.id {
                hits.push((dist_sq, id));
            }
        });
        hits.sort_unstable();
        Ok(hits.into_iter().map(|(_, id)| id).collect())
    }

    /// Remove this player from the scene and cancel its control routine.
    pub fn remove(&self) -> Result<(), ControlError> {
        self.store.remove_player(self.id)
    }
}
