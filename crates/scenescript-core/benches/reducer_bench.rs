use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use scenescript_core::{
    Output, Pen, PlayerDefinition, PlayerId, Position, Rgba, SceneCommand, SceneConfig,
    SceneState, apply_command,
};

fn seeded_scene() -> (SceneState, PlayerId) {
    let mut state = SceneState::new(&SceneConfig::default()).expect("scene state");
    let applied = apply_command(
        &mut state,
        SceneCommand::AddPlayer {
            definition: PlayerDefinition {
                pen: Pen {
                    down: true,
                    weight: 2.0,
                    color: Rgba::opaque(20, 120, 220),
                },
                ..PlayerDefinition::default()
            },
        },
    );
    let id = match applied.output {
        Output::PlayerAdded(id) => id,
        other => panic!("unexpected output: {other:?}"),
    };
    (state, id)
}

fn bench_reducer(c: &mut Criterion) {
    let mut group = c.benchmark_group("apply_command");
    // Steps per bench iteration (override via SC_BENCH_STEPS).
    let steps: usize = std::env::var("SC_BENCH_STEPS")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(1024);

    group.bench_function(format!("pen_moves_{steps}"), |b| {
        b.iter_batched(
            seeded_scene,
            |(mut state, id)| {
                for step in 0..steps {
                    let angle = step as f64;
                    apply_command(
                        &mut state,
                        SceneCommand::SetPosition {
                            player: id,
                            position: Position::new(angle.cos() * 90.0, angle.sin() * 90.0),
                        },
                    );
                }
                state
            },
            BatchSize::SmallInput,
        )
    });
    group.finish();
}

criterion_group!(benches, bench_reducer);
criterion_main!(benches);
