//! The dispatch channel: one serialized queue of scene commands, one
//! dispatcher thread applying them, one published snapshot per commit.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::thread::{self, JoinHandle};

use crossfire::{MRx, MTx, TrySendError, detect_backoff_cfg, mpmc};
use scenescript_core::{
    Answer, AskTicket, Effect, HandlerId, InputEvent, Output, PlayerId, SceneCommand, SceneConfig,
    SceneState, SceneStateError, apply_command,
};
use thiserror::Error;
use tracing::{debug, warn};

use crate::signal::OneShot;

/// Callback invoked with a matched input event, off the dispatcher thread.
pub type HandlerFn = Arc<dyn Fn(&InputEvent) + Send + Sync>;
/// Ask completion callback: `Some` carries a genuine answer, `None` means
/// the prompt was displaced (bubble replaced, player removed, shutdown).
pub type AnswerFn = Box<dyn FnOnce(Option<Answer>) + Send>;
/// Deferred closure run on the dispatcher after its command commits.
pub type EffectFn = Box<dyn FnOnce() + Send>;

/// Render-facing push interface, invoked once per committed command.
///
/// Implementations must tolerate being asked to render the same state again
/// and must not feed commands back synchronously from inside the callback.
pub trait RenderSink: Send {
    fn on_state_committed(&mut self, state: &SceneState);
}

/// No-op render sink.
#[derive(Debug, Default)]
pub struct NullRenderSink;

impl RenderSink for NullRenderSink {
    fn on_state_committed(&mut self, _state: &SceneState) {}
}

/// Errors that can occur when launching a scene.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// The configuration failed validation.
    #[error(transparent)]
    Config(#[from] SceneStateError),
    /// The dispatcher thread could not be spawned.
    #[error("failed to spawn dispatcher thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Errors surfaced to command dispatchers and control routines.
#[derive(Debug, Error)]
pub enum ControlError {
    /// The scene store has shut down; no further commands are accepted.
    #[error("scene has shut down")]
    SceneClosed,
    /// The player backing this handle was removed from the scene.
    #[error("player was removed from the scene")]
    Cancelled,
    /// A query addressed a player that no longer exists in the snapshot.
    #[error("player no longer exists")]
    PlayerGone,
    /// An Ask prompt was answered with the wrong payload kind.
    #[error("answer kind mismatch: expected {expected}")]
    AnswerKind { expected: &'static str },
    /// The actor thread could not be spawned.
    #[error("failed to spawn actor thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Committed result handed back to a blocking dispatcher.
#[derive(Debug, Clone)]
pub struct Committed {
    /// The snapshot produced by this command, already published.
    pub state: Arc<SceneState>,
    /// The reducer's output for this command.
    pub output: Output,
}

type Reply = Arc<OneShot<Result<Committed, ControlError>>>;

/// Callback payload traveling beside a command through the queue. The
/// command enum itself stays plain data; the dispatcher files the
/// attachment under the ticket or handler id the reducer allocates.
pub(crate) enum Attachment {
    Handler(HandlerFn),
    Answer(AnswerFn),
    Effect(EffectFn),
}

enum Envelope {
    Command {
        command: SceneCommand,
        attachment: Option<Attachment>,
        reply: Option<Reply>,
    },
    SuspendNotify,
    ResumeNotify,
    Shutdown {
        done: Arc<OneShot<()>>,
    },
}

struct StoreInner {
    tx: MTx<Envelope>,
    snapshot: Arc<RwLock<Arc<SceneState>>>,
    actors: Mutex<HashMap<PlayerId, Arc<AtomicBool>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

/// Handle on a running scene: the sole entry point for mutating it.
///
/// Cloning is cheap; every clone feeds the same serialized queue and reads
/// the same published snapshot. Dropping the last clone closes the queue
/// and lets the dispatcher drain and exit; [`SceneStore::shutdown`] does
/// the same deterministically and joins the dispatcher.
#[derive(Clone)]
pub struct SceneStore {
    inner: Arc<StoreInner>,
}

impl SceneStore {
    /// Launch a scene with a no-op render sink.
    pub fn launch(config: SceneConfig) -> Result<Self, LaunchError> {
        Self::launch_with_render_sink(config, Box::new(NullRenderSink))
    }

    /// Launch a scene, validating the configuration and spawning the
    /// dispatcher thread.
    pub fn launch_with_render_sink(
        config: SceneConfig,
        sink: Box<dyn RenderSink>,
    ) -> Result<Self, LaunchError> {
        let initial = Arc::new(SceneState::new(&config)?);
        detect_backoff_cfg();
        let (tx, rx) = mpmc::bounded_blocking(config.command_queue_capacity);
        let snapshot = Arc::new(RwLock::new(Arc::clone(&initial)));
        let worker_snapshot = Arc::clone(&snapshot);
        let worker = thread::Builder::new()
            .name("scene-dispatch".to_owned())
            .spawn(move || run_dispatcher(rx, worker_snapshot, initial, sink))?;
        Ok(Self {
            inner: Arc::new(StoreInner {
                tx,
                snapshot,
                actors: Mutex::new(HashMap::new()),
                worker: Mutex::new(Some(worker)),
                closed: AtomicBool::new(false),
            }),
        })
    }

    /// Current published snapshot. Never blocks on in-flight commands; a
    /// reader either sees the state before a command or the state after it,
    /// never anything partial.
    #[must_use]
    pub fn state(&self) -> Arc<SceneState> {
        Arc::clone(
            &self
                .inner
                .snapshot
                .read()
                .unwrap_or_else(PoisonError::into_inner),
        )
    }

    /// Enqueue a command and block until its reducer application has
    /// committed, returning the published snapshot and the command output.
    pub fn dispatch_and_wait(&self, command: SceneCommand) -> Result<Committed, ControlError> {
        self.dispatch_inner(command, None)
    }

    pub(crate) fn dispatch_with_attachment(
        &self,
        command: SceneCommand,
        attachment: Attachment,
    ) -> Result<Committed, ControlError> {
        self.dispatch_inner(command, Some(attachment))
    }

    fn dispatch_inner(
        &self,
        command: SceneCommand,
        attachment: Option<Attachment>,
    ) -> Result<Committed, ControlError> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(ControlError::SceneClosed);
        }
        let reply: Reply = Arc::new(OneShot::new());
        let envelope = Envelope::Command {
            command,
            attachment,
            reply: Some(Arc::clone(&reply)),
        };
        self.inner
            .tx
            .send(envelope)
            .map_err(|_| ControlError::SceneClosed)?;
        reply.wait()
    }

    /// Enqueue a command without waiting for the commit. Used where the
    /// caller has nothing to learn from the result (input injection,
    /// subscription teardown).
    pub fn dispatch(&self, command: SceneCommand) -> Result<(), ControlError> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(ControlError::SceneClosed);
        }
        self.inner
            .tx
            .send(Envelope::Command {
                command,
                attachment: None,
                reply: None,
            })
            .map_err(|_| ControlError::SceneClosed)
    }

    /// Feed one translated input event into the scene. Drops the event
    /// (with a warning) rather than blocking when the queue is saturated;
    /// input sources must never stall on a busy scene.
    pub fn inject_event(&self, event: InputEvent) -> bool {
        if self.inner.closed.load(Ordering::Acquire) {
            return false;
        }
        match self
            .inner
            .tx
            .try_send(Envelope::Command {
                command: SceneCommand::TriggerEvent { event },
                attachment: None,
                reply: None,
            }) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(?event, "scene command queue full; dropping input event");
                false
            }
            Err(TrySendError::Disconnected(_)) => {
                warn!(?event, "scene command queue disconnected");
                false
            }
        }
    }

    /// Replace the draft text of a player's in-progress Ask prompt.
    pub fn update_answer(&self, player: PlayerId, text: String) -> Result<(), ControlError> {
        self.dispatch_and_wait(SceneCommand::UpdateAnswer { player, text })
            .map(|_| ())
    }

    /// Complete a player's Ask prompt. The cleared bubble is committed and
    /// published before the stored callback observes the answer.
    pub fn apply_answer(&self, player: PlayerId, answer: Answer) -> Result<(), ControlError> {
        self.dispatch_and_wait(SceneCommand::ApplyAnswer { player, answer })
            .map(|_| ())
    }

    /// Run a closure on the dispatcher thread after every previously
    /// enqueued command has committed. The closure sees the committed
    /// state and must not dispatch-and-wait (the dispatcher would be
    /// waiting on itself).
    pub fn run_effect<F>(&self, effect: F) -> Result<(), ControlError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.dispatch_with_attachment(
            SceneCommand::RunEffect,
            Attachment::Effect(Box::new(effect)),
        )
        .map(|_| ())
    }

    /// Open a batch scope: render notifications are deferred until the
    /// outermost guard drops, while commands keep committing in order.
    pub fn batch(&self) -> Result<BatchGuard, ControlError> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(ControlError::SceneClosed);
        }
        self.inner
            .tx
            .send(Envelope::SuspendNotify)
            .map_err(|_| ControlError::SceneClosed)?;
        Ok(BatchGuard {
            store: self.clone(),
        })
    }

    /// Stop accepting commands, drain the queue, resolve outstanding Ask
    /// prompts with `None`, and join the dispatcher thread. Actor threads
    /// are cancelled cooperatively and left to unwind on their own.
    pub fn shutdown(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        {
            let actors = self
                .inner
                .actors
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            for cancel in actors.values() {
                cancel.store(true, Ordering::Release);
            }
        }
        let done = Arc::new(OneShot::new());
        if self
            .inner
            .tx
            .send(Envelope::Shutdown {
                done: Arc::clone(&done),
            })
            .is_ok()
        {
            done.wait();
        }
        let worker = self
            .inner
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(worker) = worker {
            if worker.join().is_err() {
                warn!("scene dispatcher thread panicked");
            }
        }
    }

    pub(crate) fn register_actor(&self, player: PlayerId, cancel: Arc<AtomicBool>) {
        self.inner
            .actors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(player, cancel);
    }

    pub(crate) fn cancel_actor(&self, player: PlayerId) {
        let cancel = self
            .inner
            .actors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&player);
        if let Some(cancel) = cancel {
            cancel.store(true, Ordering::Release);
        }
    }
}

/// Scope guard for [`SceneStore::batch`]; dropping it closes the scope.
pub struct BatchGuard {
    store: SceneStore,
}

impl Drop for BatchGuard {
    fn drop(&mut self) {
        if self.store.inner.tx.send(Envelope::ResumeNotify).is_err() {
            debug!("batch resume after scene shutdown");
        }
    }
}

/// Dispatcher-thread state: the authoritative snapshot plus the callback
/// tables that back tickets and handler ids in the scene state.
struct DispatchCore {
    state: Arc<SceneState>,
    snapshot: Arc<RwLock<Arc<SceneState>>>,
    sink: Box<dyn RenderSink>,
    asks: HashMap<AskTicket, AnswerFn>,
    handler_fns: HashMap<HandlerId, HandlerFn>,
    suspend_depth: usize,
    dirty: bool,
}

impl DispatchCore {
    fn commit(&mut self, command: SceneCommand, mut attachment: Option<Attachment>) -> Committed {
        debug!(?command, "applying scene command");
        let removed_handler = match &command {
            SceneCommand::RemoveEventHandler { handler } => Some(*handler),
            _ => None,
        };

        let mut next = SceneState::clone(&self.state);
        let applied = apply_command(&mut next, command);
        let committed = Arc::new(next);
        *self
            .snapshot
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Arc::clone(&committed);
        self.state = Arc::clone(&committed);

        if let Some(handler) = removed_handler {
            self.handler_fns.remove(&handler);
        }

        // File the attachment under the id the reducer allocated for it.
        match applied.output {
            Output::HandlerAdded(id) => {
                if let Some(Attachment::Handler(callback)) = attachment.take() {
                    self.handler_fns.insert(id, callback);
                }
            }
            Output::AskArmed(ticket) => {
                if let Some(Attachment::Answer(callback)) = attachment.take() {
                    self.asks.insert(ticket, callback);
                }
            }
            Output::None | Output::PlayerAdded(_) => {}
        }

        for effect in applied.effects {
            match effect {
                Effect::Deliver { handlers, event } => self.deliver(&handlers, event),
                Effect::CompleteAsk { ticket, answer } => {
                    if let Some(callback) = self.asks.remove(&ticket) {
                        callback(Some(answer));
                    }
                }
                Effect::DropAsk { ticket } => {
                    if let Some(callback) = self.asks.remove(&ticket) {
                        callback(None);
                    }
                }
                Effect::RunEffect => {
                    if let Some(Attachment::Effect(callback)) = attachment.take() {
                        callback();
                    }
                }
            }
        }

        // An Ask aimed at a removed player never arms a ticket; resolve its
        // callback instead of leaving the asker blocked forever.
        if let Some(Attachment::Answer(callback)) = attachment.take() {
            callback(None);
        }

        if self.suspend_depth == 0 {
            self.sink.on_state_committed(&self.state);
        } else {
            self.dirty = true;
        }

        Committed {
            state: Arc::clone(&self.state),
            output: applied.output,
        }
    }

    fn deliver(&self, handlers: &[HandlerId], event: InputEvent) {
        for id in handlers {
            let Some(callback) = self.handler_fns.get(id) else {
                continue;
            };
            let callback = Arc::clone(callback);
            let spawned = thread::Builder::new()
                .name("scene-event".to_owned())
                .spawn(move || callback(&event));
            if let Err(error) = spawned {
                warn!(%error, "could not spawn event delivery thread");
            }
        }
    }

    fn resolve_pending(&mut self) {
        for (_, callback) in self.asks.drain() {
            callback(None);
        }
        self.handler_fns.clear();
    }
}

fn run_dispatcher(
    rx: MRx<Envelope>,
    snapshot: Arc<RwLock<Arc<SceneState>>>,
    initial: Arc<SceneState>,
    sink: Box<dyn RenderSink>,
) {
    let mut core = DispatchCore {
        state: initial,
        snapshot,
        sink,
        asks: HashMap::new(),
        handler_fns: HashMap::new(),
        suspend_depth: 0,
        dirty: false,
    };

    while let Ok(envelope) = rx.recv() {
        match envelope {
            Envelope::Command {
                command,
                attachment,
                reply,
            } => {
                let committed = core.commit(command, attachment);
                if let Some(reply) = reply {
                    reply.release(Ok(committed));
                }
            }
            Envelope::SuspendNotify => {
                core.suspend_depth += 1;
            }
            Envelope::ResumeNotify => {
                core.suspend_depth = core.suspend_depth.saturating_sub(1);
                if core.suspend_depth == 0 && core.dirty {
                    core.sink.on_state_committed(&core.state);
                    core.dirty = false;
                }
            }
            Envelope::Shutdown { done } => {
                // Commands enqueued behind the shutdown marker are refused,
                // not silently swallowed.
                while let Ok(envelope) = rx.try_recv() {
                    if let Envelope::Command {
                        attachment, reply, ..
                    } = envelope
                    {
                        if let Some(Attachment::Answer(callback)) = attachment {
                            callback(None);
                        }
                        if let Some(reply) = reply {
                            reply.release(Err(ControlError::SceneClosed));
                        }
                    }
                }
                core.resolve_pending();
                done.release(());
                debug!("scene dispatcher stopped");
                return;
            }
        }
    }
    // Every sender dropped without an explicit shutdown.
    core.resolve_pending();
    debug!("scene dispatcher drained after last store handle dropped");
}
