//! Runtime shell for SceneScript scenes.
//!
//! `scenescript-core` defines the scene state and the pure reducer; this
//! crate makes them concurrent. A [`SceneStore`] owns the single serialized
//! command queue and its dispatcher thread, player actors run user control
//! routines on threads of their own, event handlers fire on background
//! workers, and the blocking wait primitives tie them together with
//! one-shot signals.

mod actor;
mod events;
mod handle;
mod signal;
mod store;
mod wait;

pub use events::Subscription;
pub use handle::PlayerHandle;
pub use signal::OneShot;
pub use store::{
    BatchGuard, Committed, ControlError, HandlerFn, LaunchError, NullRenderSink, RenderSink,
    SceneStore,
};
