use scenescript_core::{
    Answer, InputEvent, KeyboardKey, Pen, PlayerDefinition, Position, Revision, Rgba,
    SceneCommand, SceneConfig, SpeechBubble,
};
use scenescript_runtime::{ControlError, RenderSink, SceneStore};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn launch() -> SceneStore {
    init_tracing();
    SceneStore::launch(SceneConfig::default()).expect("launch scene")
}

fn wait_until(timeout: Duration, mut probe: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if probe() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    probe()
}

fn assert_close(actual: Position, expected: Position) {
    assert!(
        (actual.x - expected.x).abs() < 1e-9 && (actual.y - expected.y).abs() < 1e-9,
        "expected {expected:?}, got {actual:?}"
    );
}

struct CountingSink {
    commits: Arc<AtomicUsize>,
}

impl RenderSink for CountingSink {
    fn on_state_committed(&mut self, _state: &scenescript_core::SceneState) {
        self.commits.fetch_add(1, Ordering::SeqCst);
    }
}

/// Sets its flag when dropped; lets tests observe a routine thread winding
/// down regardless of how the routine exits.
struct DoneFlag(Arc<AtomicBool>);

impl Drop for DoneFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Release);
    }
}

#[test]
fn commands_from_many_threads_commit_in_total_order() {
    let store = launch();
    let threads: Vec<_> = (0..4)
        .map(|lane| {
            let store = store.clone();
            thread::spawn(move || {
                for step in 0..25 {
                    store
                        .dispatch_and_wait(SceneCommand::SetMousePosition {
                            position: Position::new(f64::from(lane), f64::from(step)),
                        })
                        .expect("dispatch");
                }
            })
        })
        .collect();
    for thread in threads {
        thread.join().expect("producer thread");
    }

    // One revision per committed command, no lost or duplicated commits.
    assert_eq!(store.state().revision(), Revision(100));
    store.shutdown();
}

#[test]
fn render_sink_sees_every_commit() {
    init_tracing();
    let commits = Arc::new(AtomicUsize::new(0));
    let store = SceneStore::launch_with_render_sink(
        SceneConfig::default(),
        Box::new(CountingSink {
            commits: Arc::clone(&commits),
        }),
    )
    .expect("launch scene");

    for step in 0..7 {
        store
            .dispatch_and_wait(SceneCommand::SetMousePosition {
                position: Position::new(f64::from(step), 0.0),
            })
            .expect("dispatch");
    }
    assert_eq!(commits.load(Ordering::SeqCst), 7);
    store.shutdown();
}

#[test]
fn batching_defers_notifications_until_outermost_scope_closes() {
    init_tracing();
    let commits = Arc::new(AtomicUsize::new(0));
    let store = SceneStore::launch_with_render_sink(
        SceneConfig::default(),
        Box::new(CountingSink {
            commits: Arc::clone(&commits),
        }),
    )
    .expect("launch scene");

    let outer = store.batch().expect("outer batch");
    let inner = store.batch().expect("inner batch");
    for step in 0..5 {
        store
            .dispatch_and_wait(SceneCommand::SetMousePosition {
                position: Position::new(f64::from(step), 1.0),
            })
            .expect("dispatch");
    }
    // State mutation is immediate; notification is what gets deferred.
    assert_eq!(store.state().revision(), Revision(5));
    assert_eq!(commits.load(Ordering::SeqCst), 0);

    drop(inner);
    store
        .dispatch_and_wait(SceneCommand::SetMousePosition {
            position: Position::new(9.0, 9.0),
        })
        .expect("dispatch");
    assert_eq!(commits.load(Ordering::SeqCst), 0, "inner close must not notify");

    drop(outer);
    assert!(
        wait_until(Duration::from_secs(2), || {
            commits.load(Ordering::SeqCst) == 1
        }),
        "outermost close flushes exactly one notification"
    );
    store.shutdown();
}

#[test]
fn control_routine_draws_sequentially() {
    let store = launch();
    let handle = store
        .add_player(
            PlayerDefinition {
                pen: Pen {
                    down: true,
                    weight: 1.0,
                    color: Rgba::opaque(255, 0, 0),
                },
                ..PlayerDefinition::default()
            },
            |handle| {
                for _ in 0..4 {
                    handle.forward(10.0)?;
                    handle.turn_left(90.0)?;
                }
                Ok(())
            },
        )
        .expect("add player");

    assert!(
        wait_until(Duration::from_secs(5), || {
            store.state().pen_lines().len() == 4
        }),
        "square should leave four pen lines"
    );

    let state = store.state();
    let lines = state.pen_lines();
    assert_close(lines[0].start, Position::new(0.0, 0.0));
    assert_close(lines[0].end, Position::new(10.0, 0.0));
    assert_close(lines[3].end, Position::new(0.0, 0.0));
    assert_close(
        state.player(handle.id()).expect("player").position,
        Position::new(0.0, 0.0),
    );
    store.shutdown();
}

#[test]
fn remove_player_cancels_control_routine() {
    let store = launch();
    let done = Arc::new(AtomicBool::new(false));
    let routine_done = Arc::clone(&done);
    let handle = store
        .add_player(PlayerDefinition::default(), move |handle| {
            let _done = DoneFlag(routine_done);
            loop {
                handle.forward(1.0)?;
                handle.sleep(Duration::from_millis(5))?;
            }
        })
        .expect("add player");

    assert!(wait_until(Duration::from_secs(2), || {
        store.state().revision() > Revision(5)
    }));

    store.remove_player(handle.id()).expect("remove player");
    assert_eq!(store.state().player_count(), 0);
    assert!(
        wait_until(Duration::from_secs(5), || done.load(Ordering::Acquire)),
        "cancelled routine should wind down"
    );
    store.shutdown();
}

#[test]
fn wait_for_key_releases_on_match_only() {
    let store = launch();
    let hit = Arc::new(AtomicBool::new(false));
    let waiter = {
        let store = store.clone();
        let hit = Arc::clone(&hit);
        thread::spawn(move || {
            store
                .wait_for_key(KeyboardKey::Space)
                .expect("wait for key");
            hit.store(true, Ordering::Release);
        })
    };

    assert!(wait_until(Duration::from_secs(2), || {
        store.state().handlers().len() == 1
    }));

    store.inject_event(InputEvent::KeyDown(KeyboardKey::Up));
    thread::sleep(Duration::from_millis(150));
    assert!(
        !hit.load(Ordering::Acquire),
        "non-matching key must not release the wait"
    );

    store.inject_event(InputEvent::KeyDown(KeyboardKey::Space));
    assert!(wait_until(Duration::from_secs(2), || {
        hit.load(Ordering::Acquire)
    }));
    waiter.join().expect("waiter thread");

    // The wait's handler unregistered itself on the way out.
    assert!(wait_until(Duration::from_secs(2), || {
        store.state().handlers().is_empty()
    }));
    store.shutdown();
}

#[test]
fn wait_for_any_key_returns_the_pressed_key() {
    let store = launch();
    let waiter = {
        let store = store.clone();
        thread::spawn(move || store.wait_for_any_key().expect("wait for any key"))
    };
    assert!(wait_until(Duration::from_secs(2), || {
        store.state().handlers().len() == 1
    }));

    store.inject_event(InputEvent::KeyDown(KeyboardKey::K));
    assert_eq!(waiter.join().expect("waiter thread"), KeyboardKey::K);
    store.shutdown();
}

#[test]
fn ask_blocks_until_answer_and_observes_cleared_bubble() {
    let store = launch();
    let recorded: Arc<Mutex<Option<(String, bool)>>> = Arc::new(Mutex::new(None));
    let routine_recorded = Arc::clone(&recorded);
    let handle = store
        .add_player(PlayerDefinition::default(), move |handle| {
            let answer = handle.ask("name?")?;
            let bubble_cleared = handle
                .store()
                .state()
                .player(handle.id())
                .map(|player| player.bubble.is_none())
                .unwrap_or(false);
            *routine_recorded.lock().expect("recorded slot") = Some((answer, bubble_cleared));
            Ok(())
        })
        .expect("add player");

    assert!(wait_until(Duration::from_secs(2), || {
        matches!(
            store
                .state()
                .player(handle.id())
                .and_then(|player| player.bubble.clone()),
            Some(SpeechBubble::Ask { .. })
        )
    }));

    store
        .update_answer(handle.id(), "x".to_owned())
        .expect("update answer");
    match store
        .state()
        .player(handle.id())
        .and_then(|player| player.bubble.clone())
    {
        Some(SpeechBubble::Ask { answer, .. }) => assert_eq!(answer, "x"),
        other => panic!("unexpected bubble: {other:?}"),
    }

    store
        .apply_answer(handle.id(), Answer::Text("x".to_owned()))
        .expect("apply answer");

    assert!(wait_until(Duration::from_secs(2), || {
        recorded.lock().expect("recorded slot").is_some()
    }));
    let (answer, bubble_cleared) = recorded
        .lock()
        .expect("recorded slot")
        .take()
        .expect("recorded value");
    assert_eq!(answer, "x");
    assert!(
        bubble_cleared,
        "ask caller must observe the already-cleared bubble"
    );
    store.shutdown();
}

#[test]
fn ask_bool_rejects_text_answer() {
    let store = launch();
    let recorded: Arc<Mutex<Option<Result<bool, ControlError>>>> = Arc::new(Mutex::new(None));
    let routine_recorded = Arc::clone(&recorded);
    let handle = store
        .add_player(PlayerDefinition::default(), move |handle| {
            let result = handle.ask_bool("ready?");
            *routine_recorded.lock().expect("recorded slot") = Some(result);
            Ok(())
        })
        .expect("add player");

    assert!(wait_until(Duration::from_secs(2), || {
        matches!(
            store
                .state()
                .player(handle.id())
                .and_then(|player| player.bubble.clone()),
            Some(SpeechBubble::Ask { .. })
        )
    }));

    store
        .apply_answer(handle.id(), Answer::Text("yes".to_owned()))
        .expect("apply answer");

    assert!(wait_until(Duration::from_secs(2), || {
        recorded.lock().expect("recorded slot").is_some()
    }));
    let result = recorded
        .lock()
        .expect("recorded slot")
        .take()
        .expect("recorded value");
    assert!(matches!(result, Err(ControlError::AnswerKind { .. })));
    store.shutdown();
}

#[test]
fn removing_player_mid_ask_unblocks_with_cancelled() {
    let store = launch();
    let recorded: Arc<Mutex<Option<Result<String, ControlError>>>> = Arc::new(Mutex::new(None));
    let routine_recorded = Arc::clone(&recorded);
    let handle = store
        .add_player(PlayerDefinition::default(), move |handle| {
            let result = handle.ask("stranded?");
            *routine_recorded.lock().expect("recorded slot") = Some(result);
            Ok(())
        })
        .expect("add player");

    assert!(wait_until(Duration::from_secs(2), || {
        matches!(
            store
                .state()
                .player(handle.id())
                .and_then(|player| player.bubble.clone()),
            Some(SpeechBubble::Ask { .. })
        )
    }));

    store.remove_player(handle.id()).expect("remove player");

    assert!(wait_until(Duration::from_secs(2), || {
        recorded.lock().expect("recorded slot").is_some()
    }));
    let result = recorded
        .lock()
        .expect("recorded slot")
        .take()
        .expect("recorded value");
    assert!(matches!(result, Err(ControlError::Cancelled)));
    store.shutdown();
}

#[test]
fn blocking_handler_does_not_stall_other_handlers() {
    let store = launch();
    let slow_done = Arc::new(AtomicBool::new(false));
    let fast_done = Arc::new(AtomicBool::new(false));

    let slow_flag = Arc::clone(&slow_done);
    let _slow = store
        .on_key_down(None, move |_| {
            thread::sleep(Duration::from_millis(1500));
            slow_flag.store(true, Ordering::Release);
        })
        .expect("slow handler");
    let fast_flag = Arc::clone(&fast_done);
    let _fast = store
        .on_key_down(None, move |_| {
            fast_flag.store(true, Ordering::Release);
        })
        .expect("fast handler");

    store.inject_event(InputEvent::KeyDown(KeyboardKey::Space));
    assert!(
        wait_until(Duration::from_millis(700), || {
            fast_done.load(Ordering::Acquire)
        }),
        "fast handler must run while the slow one is still sleeping"
    );
    assert!(!slow_done.load(Ordering::Acquire));
    store.shutdown();
}

#[test]
fn handlers_may_dispatch_reentrantly() {
    let store = launch();
    let dispatcher = store.clone();
    let _sub = store
        .on_key_down(Some(KeyboardKey::Space), move |_| {
            dispatcher
                .dispatch_and_wait(SceneCommand::SetMousePosition {
                    position: Position::new(9.0, 9.0),
                })
                .expect("reentrant dispatch");
        })
        .expect("subscribe");

    store.inject_event(InputEvent::KeyDown(KeyboardKey::Space));
    assert!(wait_until(Duration::from_secs(2), || {
        store.state().mouse_position() == Position::new(9.0, 9.0)
    }));
    store.shutdown();
}

#[test]
fn dropped_subscription_stops_receiving_events() {
    let store = launch();
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);
    let subscription = store
        .on_key_down(None, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .expect("subscribe");

    store.inject_event(InputEvent::KeyDown(KeyboardKey::A));
    assert!(wait_until(Duration::from_secs(2), || {
        hits.load(Ordering::SeqCst) == 1
    }));

    drop(subscription);
    assert!(wait_until(Duration::from_secs(2), || {
        store.state().handlers().is_empty()
    }));

    store.inject_event(InputEvent::KeyDown(KeyboardKey::A));
    thread::sleep(Duration::from_millis(150));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    store.shutdown();
}

#[test]
fn nearby_players_orders_by_distance_and_excludes_self() {
    let store = launch();
    let at = |x: f64, y: f64| PlayerDefinition {
        position: Position::new(x, y),
        ..PlayerDefinition::default()
    };
    let origin = store.add_idle_player(at(0.0, 0.0)).expect("player");
    let near = store.add_idle_player(at(5.0, 0.0)).expect("player");
    let far = store.add_idle_player(at(50.0, 0.0)).expect("player");

    assert_eq!(
        origin.nearby_players(10.0).expect("nearby"),
        vec![near.id()]
    );
    assert_eq!(
        origin.nearby_players(100.0).expect("nearby"),
        vec![near.id(), far.id()]
    );
    assert!(origin.nearby_players(0.0).expect("nearby").is_empty());
    store.shutdown();
}

#[test]
fn shutdown_refuses_further_commands() {
    let store = launch();
    store
        .dispatch_and_wait(SceneCommand::SetMousePosition {
            position: Position::new(1.0, 2.0),
        })
        .expect("dispatch");
    store.shutdown();

    let refused = store.dispatch_and_wait(SceneCommand::SetMousePosition {
        position: Position::new(3.0, 4.0),
    });
    assert!(matches!(refused, Err(ControlError::SceneClosed)));
    // The last published snapshot stays readable.
    assert_eq!(store.state().mouse_position(), Position::new(1.0, 2.0));
}
