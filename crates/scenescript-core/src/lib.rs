//! Core scene state shared across the SceneScript workspace.
//!
//! This crate owns the authoritative data model for a scene full of
//! scriptable players plus the pure reducer that advances it. Everything in
//! here is plain data: callbacks, threads, and channels live in
//! `scenescript-runtime`, which feeds committed [`SceneCommand`]s through
//! [`apply_command`] one at a time and acts on the returned [`Effect`]s
//! after each snapshot is published.

use serde::{Deserialize, Serialize};
use slotmap::{SlotMap, new_key_type};
use smallvec::SmallVec;
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;

new_key_type! {
    /// Stable handle for players backed by a generational slot map.
    pub struct PlayerId;
}

/// Monotonic snapshot counter; every committed command produces a new one.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct Revision(pub u64);

impl Revision {
    /// Returns the next sequential revision.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Resets the revision counter back to zero.
    #[must_use]
    pub const fn zero() -> Self {
        Self(0)
    }
}

/// Identifier handed out when an event handler is registered.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
pub struct HandlerId(pub u64);

/// Identifier linking an in-progress Ask bubble to its completion callback.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
pub struct AskTicket(pub u64);

/// Normalizes an angle in degrees into `[0, 360)`.
///
/// NaN and infinite inputs collapse to `0.0` so a malformed rotation can
/// never poison the stored heading.
#[must_use]
pub fn wrap_degrees(angle: f64) -> f64 {
    if !angle.is_finite() {
        return 0.0;
    }
    let wrapped = angle.rem_euclid(360.0);
    // rem_euclid(360.0) can return 360.0 for tiny negative inputs.
    if wrapped >= 360.0 { 0.0 } else { wrapped }
}

/// 2D scene-space position.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    /// Construct a new position.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Position reached by walking `distance` units along `heading` degrees
    /// (0° points along +x, counter-clockwise positive).
    #[must_use]
    pub fn translated(self, heading: f64, distance: f64) -> Self {
        let radians = heading.to_radians();
        Self {
            x: self.x + distance * radians.cos(),
            y: self.y + distance * radians.sin(),
        }
    }

    /// Squared distance to another position.
    #[must_use]
    pub fn distance_sq(self, other: Self) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }
}

/// Width/height pair used for the scene extent.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    /// Construct a new size.
    #[must_use]
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// Whether both extents are finite and strictly positive.
    #[must_use]
    pub fn is_valid(self) -> bool {
        self.width.is_finite() && self.height.is_finite() && self.width > 0.0 && self.height > 0.0
    }
}

/// Axis-aligned rectangle, `min` inclusive lower-left, `max` upper-right.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Rect {
    pub min: Position,
    pub max: Position,
}

impl Rect {
    /// Construct a rectangle from its corners.
    #[must_use]
    pub const fn new(min: Position, max: Position) -> Self {
        Self { min, max }
    }

    /// Rectangle of the given size centered on the origin.
    #[must_use]
    pub fn centered(size: Size) -> Self {
        let half_w = size.width * 0.5;
        let half_h = size.height * 0.5;
        Self {
            min: Position::new(-half_w, -half_h),
            max: Position::new(half_w, half_h),
        }
    }

    /// Extent of the rectangle.
    #[must_use]
    pub fn size(self) -> Size {
        Size::new(self.max.x - self.min.x, self.max.y - self.min.y)
    }

    /// Whether the position lies inside the rectangle (inclusive edges).
    #[must_use]
    pub fn contains(self, position: Position) -> bool {
        position.x >= self.min.x
            && position.x <= self.max.x
            && position.y >= self.min.y
            && position.y <= self.max.y
    }
}

/// 8-bit RGBA color attached to pens and pen lines.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    /// Construct a fully opaque color.
    #[must_use]
    pub const fn opaque(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    /// Construct a color with an explicit alpha channel.
    #[must_use]
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }
}

impl Default for Rgba {
    fn default() -> Self {
        Self::opaque(0, 0, 0)
    }
}

/// Drawing state carried by each player.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Pen {
    pub down: bool,
    pub weight: f64,
    pub color: Rgba,
}

impl Default for Pen {
    fn default() -> Self {
        Self {
            down: false,
            weight: 1.0,
            color: Rgba::default(),
        }
    }
}

/// A persisted drawn segment left behind by a moving player with an active pen.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PenLine {
    pub start: Position,
    pub end: Position,
    pub weight: f64,
    pub color: Rgba,
}

/// Answer payload delivered to a completed Ask prompt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum Answer {
    Text(String),
    Bool(bool),
}

/// Transient prompt/message attached to a player.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum SpeechBubble {
    /// Display-only message.
    Say { text: String },
    /// Interactive prompt. `answer` holds the draft text the answering side
    /// has typed so far; `ticket` links the bubble to its completion
    /// callback held by the dispatcher.
    Ask {
        question: String,
        answer: String,
        ticket: AskTicket,
    },
}

/// Requested bubble shape carried by [`SceneCommand::SetSpeechBubble`].
///
/// Ask tickets are allocated by the reducer, so the request form has no
/// ticket field; the committed ticket comes back via [`Output::AskArmed`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum BubbleSpec {
    Say { text: String },
    Ask { question: String },
}

/// Abstract keyboard keys delivered by the input source.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
pub enum KeyboardKey {
    Space,
    Escape,
    Up,
    Down,
    Left,
    Right,
    A,
    B,
    C,
    D,
    E,
    F,
    G,
    H,
    I,
    J,
    K,
    L,
    M,
    N,
    O,
    P,
    Q,
    R,
    S,
    T,
    U,
    V,
    W,
    X,
    Y,
    Z,
    Digit0,
    Digit1,
    Digit2,
    Digit3,
    Digit4,
    Digit5,
    Digit6,
    Digit7,
    Digit8,
    Digit9,
}

/// Abstract mouse buttons delivered by the input source.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
pub enum MouseButton {
    Primary,
    Secondary,
}

/// Raw input event translated by the presentation layer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum InputEvent {
    KeyDown(KeyboardKey),
    KeyUp(KeyboardKey),
    SceneClick {
        position: Position,
        button: MouseButton,
    },
    PlayerClick {
        player: PlayerId,
        button: MouseButton,
    },
    MouseEnter {
        player: PlayerId,
    },
    MouseMove {
        position: Position,
    },
}

/// What a registered handler wants to be invoked for.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum EventFilter {
    /// Key-down events; `None` accepts any key.
    KeyDown(Option<KeyboardKey>),
    /// Clicks on empty scene space.
    SceneClick,
    /// Clicks on one specific player.
    PlayerClick(PlayerId),
    /// The mouse cursor entering one specific player.
    MouseEnter(PlayerId),
}

/// Handler registration recorded in the scene state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RegisteredHandler {
    pub id: HandlerId,
    pub filter: EventFilter,
}

impl RegisteredHandler {
    /// Whether this handler accepts the event. Handlers self-filter: a
    /// key-down handler ignores other keys, player-scoped handlers compare
    /// player ids.
    #[must_use]
    pub fn handles(&self, event: &InputEvent) -> bool {
        match (self.filter, event) {
            (EventFilter::KeyDown(None), InputEvent::KeyDown(_)) => true,
            (EventFilter::KeyDown(Some(key)), InputEvent::KeyDown(pressed)) => key == *pressed,
            (EventFilter::SceneClick, InputEvent::SceneClick { .. }) => true,
            (EventFilter::PlayerClick(id), InputEvent::PlayerClick { player, .. }) => {
                id == *player
            }
            (EventFilter::MouseEnter(id), InputEvent::MouseEnter { player }) => id == *player,
            _ => false,
        }
    }
}

/// Scalar fields supplied when adding a player to the scene.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerDefinition {
    pub position: Position,
    pub heading: f64,
    pub pen: Pen,
    pub size_factor: f64,
    pub costumes: Vec<String>,
    pub visible: bool,
    pub layer: i64,
}

impl Default for PlayerDefinition {
    fn default() -> Self {
        Self {
            position: Position::default(),
            heading: 0.0,
            pen: Pen::default(),
            size_factor: 1.0,
            costumes: Vec::new(),
            visible: true,
            layer: 0,
        }
    }
}

/// A controllable sprite entity with position, heading, pen, and costumes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Player {
    pub id: PlayerId,
    pub position: Position,
    /// Degrees in `[0, 360)`; 0° points along +x, counter-clockwise positive.
    pub heading: f64,
    pub pen: Pen,
    pub size_factor: f64,
    pub costumes: Vec<String>,
    /// Always `< costumes.len()` while `costumes` is non-empty.
    pub costume_index: usize,
    pub bubble: Option<SpeechBubble>,
    pub visible: bool,
    pub layer: i64,
}

impl Player {
    fn from_definition(id: PlayerId, definition: PlayerDefinition) -> Self {
        Self {
            id,
            position: definition.position,
            heading: wrap_degrees(definition.heading),
            pen: definition.pen,
            size_factor: definition.size_factor,
            costumes: definition.costumes,
            costume_index: 0,
            bubble: None,
            visible: definition.visible,
            layer: definition.layer,
        }
    }

    /// Name of the currently worn costume, if the player has any.
    #[must_use]
    pub fn current_costume(&self) -> Option<&str> {
        self.costumes.get(self.costume_index).map(String::as_str)
    }
}

/// Errors that can occur when constructing scene state.
#[derive(Debug, Error)]
pub enum SceneStateError {
    /// Indicates an invalid configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
}

/// Static configuration for a scene.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SceneConfig {
    /// Extent of the scene, centered on the origin.
    pub scene_size: Size,
    /// Bound of the dispatch queue shared by all command producers.
    pub command_queue_capacity: usize,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            scene_size: Size::new(600.0, 400.0),
            command_queue_capacity: 256,
        }
    }
}

impl SceneConfig {
    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), SceneStateError> {
        if !self.scene_size.is_valid() {
            return Err(SceneStateError::InvalidConfig(
                "scene size must be finite and positive",
            ));
        }
        if self.command_queue_capacity == 0 {
            return Err(SceneStateError::InvalidConfig(
                "command queue capacity must be non-zero",
            ));
        }
        Ok(())
    }
}

/// Immutable snapshot of everything the scene knows.
///
/// Exactly one canonical instance exists at any time; the dispatcher clones
/// the current snapshot, applies one command, and replaces it wholesale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneState {
    revision: Revision,
    bounds: Rect,
    players: SlotMap<PlayerId, Player>,
    order: Vec<PlayerId>,
    pen_lines: Vec<PenLine>,
    mouse_position: Position,
    pressed_keys: BTreeSet<KeyboardKey>,
    handlers: Vec<RegisteredHandler>,
    handler_seq: u64,
    ask_seq: u64,
}

impl PartialEq for SceneState {
    fn eq(&self, other: &Self) -> bool {
        self.revision == other.revision
            && self.bounds == other.bounds
            && self.order == other.order
            && self.players.iter().eq(other.players.iter())
            && self.pen_lines == other.pen_lines
            && self.mouse_position == other.mouse_position
            && self.pressed_keys == other.pressed_keys
            && self.handlers == other.handlers
            && self.handler_seq == other.handler_seq
            && self.ask_seq == other.ask_seq
    }
}

impl SceneState {
    /// Instantiate the initial snapshot for a validated configuration.
    pub fn new(config: &SceneConfig) -> Result<Self, SceneStateError> {
        config.validate()?;
        Ok(Self {
            revision: Revision::zero(),
            bounds: Rect::centered(config.scene_size),
            players: SlotMap::with_key(),
            order: Vec::new(),
            pen_lines: Vec::new(),
            mouse_position: Position::default(),
            pressed_keys: BTreeSet::new(),
            handlers: Vec::new(),
            handler_seq: 0,
            ask_seq: 0,
        })
    }

    /// Snapshot counter; bumps once per committed command.
    #[must_use]
    pub const fn revision(&self) -> Revision {
        self.revision
    }

    /// Current scene bounds.
    #[must_use]
    pub const fn bounds(&self) -> Rect {
        self.bounds
    }

    /// Look up one player.
    #[must_use]
    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        self.players.get(id)
    }

    /// Number of players currently in the scene.
    #[must_use]
    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    /// Players in insertion order.
    pub fn players(&self) -> impl Iterator<Item = &Player> + '_ {
        self.order.iter().filter_map(|id| self.players.get(*id))
    }

    /// Player ids in insertion order.
    #[must_use]
    pub fn player_ids(&self) -> &[PlayerId] {
        &self.order
    }

    /// Pen lines drawn so far, in draw order.
    #[must_use]
    pub fn pen_lines(&self) -> &[PenLine] {
        &self.pen_lines
    }

    /// Last reported mouse position.
    #[must_use]
    pub const fn mouse_position(&self) -> Position {
        self.mouse_position
    }

    /// Whether a key is currently held down.
    #[must_use]
    pub fn is_key_pressed(&self, key: KeyboardKey) -> bool {
        self.pressed_keys.contains(&key)
    }

    /// Keys currently held down.
    #[must_use]
    pub const fn pressed_keys(&self) -> &BTreeSet<KeyboardKey> {
        &self.pressed_keys
    }

    /// Currently registered event handlers, in registration order.
    #[must_use]
    pub fn handlers(&self) -> &[RegisteredHandler] {
        &self.handlers
    }
}

/// Tagged union of every mutation request accepted by the reducer.
///
/// Commands are plain data. The callbacks backing Ask prompts, event
/// handlers, and deferred effects travel beside the command in the dispatch
/// envelope; only tickets and handler ids appear in the state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum SceneCommand {
    AddPlayer {
        definition: PlayerDefinition,
    },
    RemovePlayer {
        player: PlayerId,
    },
    SetPosition {
        player: PlayerId,
        position: Position,
    },
    SetHeading {
        player: PlayerId,
        heading: f64,
    },
    SetPen {
        player: PlayerId,
        pen: Pen,
    },
    SetSizeFactor {
        player: PlayerId,
        factor: f64,
    },
    NextCostume {
        player: PlayerId,
    },
    SetCostume {
        player: PlayerId,
        index: usize,
    },
    SetVisible {
        player: PlayerId,
        visible: bool,
    },
    SetLayer {
        player: PlayerId,
        layer: i64,
    },
    ClearScene,
    SetSceneSize {
        size: Size,
    },
    SetSpeechBubble {
        player: PlayerId,
        bubble: Option<BubbleSpec>,
    },
    UpdateAnswer {
        player: PlayerId,
        text: String,
    },
    ApplyAnswer {
        player: PlayerId,
        answer: Answer,
    },
    AddEventHandler {
        filter: EventFilter,
    },
    RemoveEventHandler {
        handler: HandlerId,
    },
    TriggerEvent {
        event: InputEvent,
    },
    SetMousePosition {
        position: Position,
    },
    SetKeyPressed {
        key: KeyboardKey,
    },
    SetKeyReleased {
        key: KeyboardKey,
    },
    /// Marker for a deferred closure attached to the dispatch envelope; the
    /// dispatcher runs it after this command's snapshot is published.
    RunEffect,
}

/// Committed result handed back to the caller that dispatched the command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Output {
    #[default]
    None,
    PlayerAdded(PlayerId),
    HandlerAdded(HandlerId),
    AskArmed(AskTicket),
}

/// Post-commit work emitted by the reducer and drained by the dispatcher
/// only after the new snapshot is visible to readers.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Invoke the listed handlers with the event on background workers.
    Deliver {
        handlers: SmallVec<[HandlerId; 4]>,
        event: InputEvent,
    },
    /// Resolve the Ask callback for `ticket` with a genuine answer.
    CompleteAsk { ticket: AskTicket, answer: Answer },
    /// Discard the Ask callback for `ticket`; the prompt was displaced
    /// without an answer.
    DropAsk { ticket: AskTicket },
    /// Run the closure attached to the command's envelope.
    RunEffect,
}

/// Outcome of one reducer application.
#[derive(Debug, Default, PartialEq)]
pub struct Applied {
    pub output: Output,
    pub effects: SmallVec<[Effect; 2]>,
}

impl Applied {
    fn none() -> Self {
        Self::default()
    }

    fn output(output: Output) -> Self {
        Self {
            output,
            effects: SmallVec::new(),
        }
    }

    fn effect(effect: Effect) -> Self {
        let mut effects = SmallVec::new();
        effects.push(effect);
        Self {
            output: Output::None,
            effects,
        }
    }
}

/// Applies one command to the state, returning the committed output and any
/// post-commit effects.
///
/// This is the single transition function for the whole scene: no other code
/// mutates [`SceneState`]. It performs no I/O and consults no clocks or
/// randomness, so replaying a command sequence over equal initial states
/// yields equal results. Commands addressing a player that has already been
/// removed are no-ops: an actor may legitimately race its own removal.
pub fn apply_command(state: &mut SceneState, command: SceneCommand) -> Applied {
    state.revision = state.revision.next();
    match command {
        SceneCommand::AddPlayer { definition } => {
            let id = state
                .players
                .insert_with_key(|id| Player::from_definition(id, definition));
            state.order.push(id);
            Applied::output(Output::PlayerAdded(id))
        }
        SceneCommand::RemovePlayer { player } => match state.players.remove(player) {
            Some(removed) => {
                state.order.retain(|id| *id != player);
                match removed.bubble {
                    Some(SpeechBubble::Ask { ticket, .. }) => {
                        Applied::effect(Effect::DropAsk { ticket })
                    }
                    _ => Applied::none(),
                }
            }
            None => Applied::none(),
        },
        SceneCommand::SetPosition { player, position } => {
            if let Some(entry) = state.players.get_mut(player) {
                let previous = entry.position;
                entry.position = position;
                if entry.pen.down && previous != position {
                    state.pen_lines.push(PenLine {
                        start: previous,
                        end: position,
                        weight: entry.pen.weight,
                        color: entry.pen.color,
                    });
                }
            }
            Applied::none()
        }
        SceneCommand::SetHeading { player, heading } => {
            if let Some(entry) = state.players.get_mut(player) {
                entry.heading = wrap_degrees(heading);
            }
            Applied::none()
        }
        SceneCommand::SetPen { player, pen } => {
            if let Some(entry) = state.players.get_mut(player) {
                entry.pen = pen;
            }
            Applied::none()
        }
        SceneCommand::SetSizeFactor { player, factor } => {
            if let Some(entry) = state.players.get_mut(player) {
                entry.size_factor = factor;
            }
            Applied::none()
        }
        SceneCommand::NextCostume { player } => {
            if let Some(entry) = state.players.get_mut(player) {
                if !entry.costumes.is_empty() {
                    entry.costume_index = (entry.costume_index + 1) % entry.costumes.len();
                }
            }
            Applied::none()
        }
        SceneCommand::SetCostume { player, index } => {
            if let Some(entry) = state.players.get_mut(player) {
                if index < entry.costumes.len() {
                    entry.costume_index = index;
                }
            }
            Applied::none()
        }
        SceneCommand::SetVisible { player, visible } => {
            if let Some(entry) = state.players.get_mut(player) {
                entry.visible = visible;
            }
            Applied::none()
        }
        SceneCommand::SetLayer { player, layer } => {
            if let Some(entry) = state.players.get_mut(player) {
                entry.layer = layer;
            }
            Applied::none()
        }
        SceneCommand::ClearScene => {
            state.pen_lines.clear();
            Applied::none()
        }
        SceneCommand::SetSceneSize { size } => {
            if size.is_valid() {
                state.bounds = Rect::centered(size);
            }
            Applied::none()
        }
        SceneCommand::SetSpeechBubble { player, bubble } => {
            let Some(entry) = state.players.get_mut(player) else {
                return Applied::none();
            };
            let displaced = match entry.bubble.take() {
                Some(SpeechBubble::Ask { ticket, .. }) => Some(ticket),
                _ => None,
            };
            let mut applied = match bubble {
                Some(BubbleSpec::Say { text }) => {
                    entry.bubble = Some(SpeechBubble::Say { text });
                    Applied::none()
                }
                Some(BubbleSpec::Ask { question }) => {
                    let ticket = AskTicket(state.ask_seq);
                    state.ask_seq += 1;
                    entry.bubble = Some(SpeechBubble::Ask {
                        question,
                        answer: String::new(),
                        ticket,
                    });
                    Applied::output(Output::AskArmed(ticket))
                }
                None => Applied::none(),
            };
            if let Some(ticket) = displaced {
                applied.effects.push(Effect::DropAsk { ticket });
            }
            applied
        }
        SceneCommand::UpdateAnswer { player, text } => {
            if let Some(entry) = state.players.get_mut(player) {
                if let Some(SpeechBubble::Ask { answer, .. }) = entry.bubble.as_mut() {
                    *answer = text;
                }
            }
            Applied::none()
        }
        SceneCommand::ApplyAnswer { player, answer } => {
            let Some(entry) = state.players.get_mut(player) else {
                return Applied::none();
            };
            match entry.bubble.take() {
                Some(SpeechBubble::Ask { ticket, .. }) => {
                    Applied::effect(Effect::CompleteAsk { ticket, answer })
                }
                other => {
                    // Say bubbles and empty slots are left untouched.
                    entry.bubble = other;
                    Applied::none()
                }
            }
        }
        SceneCommand::AddEventHandler { filter } => {
            let id = HandlerId(state.handler_seq);
            state.handler_seq += 1;
            state.handlers.push(RegisteredHandler { id, filter });
            Applied::output(Output::HandlerAdded(id))
        }
        SceneCommand::RemoveEventHandler { handler } => {
            state.handlers.retain(|entry| entry.id != handler);
            Applied::none()
        }
        SceneCommand::TriggerEvent { event } => {
            match event {
                InputEvent::KeyDown(key) => {
                    state.pressed_keys.insert(key);
                }
                InputEvent::KeyUp(key) => {
                    state.pressed_keys.remove(&key);
                }
                InputEvent::SceneClick { position, .. } | InputEvent::MouseMove { position } => {
                    state.mouse_position = position;
                }
                InputEvent::PlayerClick { .. } | InputEvent::MouseEnter { .. } => {}
            }
            let handlers: SmallVec<[HandlerId; 4]> = state
                .handlers
                .iter()
                .filter(|entry| entry.handles(&event))
                .map(|entry| entry.id)
                .collect();
            if handlers.is_empty() {
                Applied::none()
            } else {
                Applied::effect(Effect::Deliver { handlers, event })
            }
        }
        SceneCommand::SetMousePosition { position } => {
            state.mouse_position = position;
            Applied::none()
        }
        SceneCommand::SetKeyPressed { key } => {
            state.pressed_keys.insert(key);
            Applied::none()
        }
        SceneCommand::SetKeyReleased { key } => {
            state.pressed_keys.remove(&key);
            Applied::none()
        }
        SceneCommand::RunEffect => Applied::effect(Effect::RunEffect),
    }
}
