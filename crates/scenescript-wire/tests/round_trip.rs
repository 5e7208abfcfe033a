use scenescript_core::{
    Output, Pen, PlayerDefinition, Player, PlayerId, Position, Rect, Rgba, SceneCommand,
    SceneConfig, SceneState, Size, SpeechBubble, apply_command,
};
use scenescript_wire::{
    WirePen, WirePlayer, WirePlayerId, WirePosition, WireRect, WireRgba, WireSize,
    WireSpeechBubble, decode_bubble, decode_player, encode_bubble, encode_player,
};

fn sample_player() -> Player {
    let mut state = SceneState::new(&SceneConfig::default()).expect("scene state");
    let applied = apply_command(
        &mut state,
        SceneCommand::AddPlayer {
            definition: PlayerDefinition {
                position: Position::new(3.5, -2.25),
                heading: 90.0,
                pen: Pen {
                    down: true,
                    weight: 2.5,
                    color: Rgba::new(10, 20, 30, 255),
                },
                size_factor: 1.5,
                costumes: vec!["idle".to_owned(), "walk".to_owned()],
                visible: true,
                layer: 3,
            },
        },
    );
    let id = match applied.output {
        Output::PlayerAdded(id) => id,
        other => panic!("unexpected output: {other:?}"),
    };
    state.player(id).expect("player").clone()
}

#[test]
fn position_round_trips() {
    let position = Position::new(3.5, -2.25);
    let wire = WirePosition::from(position);
    assert_eq!(Position::try_from(wire).expect("position"), position);
}

#[test]
fn size_round_trips() {
    let size = Size::new(100.0, 40.0);
    let wire = WireSize::from(size);
    assert_eq!(Size::try_from(wire).expect("size"), size);
}

#[test]
fn rect_round_trips() {
    let rect = Rect::new(Position::new(-300.0, -200.0), Position::new(300.0, 200.0));
    let wire = WireRect::from(rect);
    assert_eq!(Rect::try_from(wire).expect("rect"), rect);
}

#[test]
fn rgba_round_trips() {
    let color = Rgba::new(10, 20, 30, 255);
    let wire = WireRgba::from(color);
    assert_eq!(Rgba::from(wire), color);
}

#[test]
fn pen_round_trips() {
    let pen = Pen {
        down: true,
        weight: 0.75,
        color: Rgba::opaque(200, 100, 50),
    };
    let wire = WirePen::from(pen);
    assert_eq!(Pen::try_from(wire).expect("pen"), pen);
}

#[test]
fn player_id_round_trips() {
    let id = sample_player().id;
    let wire = WirePlayerId::from(id);
    assert_eq!(PlayerId::from(wire), id);
}

#[test]
fn say_bubble_round_trips() {
    let bubble = SpeechBubble::Say {
        text: "hello".to_owned(),
    };
    let json = encode_bubble(&bubble).expect("encode");
    assert_eq!(decode_bubble(&json).expect("decode"), bubble);
}

#[test]
fn ask_bubble_round_trips() {
    let mut state = SceneState::new(&SceneConfig::default()).expect("scene state");
    let id = match apply_command(
        &mut state,
        SceneCommand::AddPlayer {
            definition: PlayerDefinition::default(),
        },
    )
    .output
    {
        Output::PlayerAdded(id) => id,
        other => panic!("unexpected output: {other:?}"),
    };
    apply_command(
        &mut state,
        SceneCommand::SetSpeechBubble {
            player: id,
            bubble: Some(scenescript_core::BubbleSpec::Ask {
                question: "favorite color?".to_owned(),
            }),
        },
    );
    apply_command(
        &mut state,
        SceneCommand::UpdateAnswer {
            player: id,
            text: "re".to_owned(),
        },
    );
    let bubble = state
        .player(id)
        .expect("player")
        .bubble
        .clone()
        .expect("bubble");

    let json = encode_bubble(&bubble).expect("encode");
    assert_eq!(decode_bubble(&json).expect("decode"), bubble);
}

#[test]
fn player_round_trips_through_json() {
    let player = sample_player();
    let json = encode_player(&player).expect("encode");
    assert_eq!(decode_player(&json).expect("decode"), player);
}

#[test]
fn unknown_bubble_kind_fails_fast() {
    let json = r#"{"kind":"shout","text":"HI"}"#;
    assert!(decode_bubble(json).is_err());
}

#[test]
fn unknown_player_field_fails_fast() {
    let player = sample_player();
    let json = encode_player(&player).expect("encode");
    let tampered = json.replacen("\"visible\"", "\"opacity\"", 1);
    assert!(decode_player(&tampered).is_err());
}

#[test]
fn out_of_range_costume_index_is_rejected() {
    let mut wire = WirePlayer::from(&sample_player());
    wire.costume_index = 9;
    assert!(Player::try_from(wire).is_err());
}

#[test]
fn non_finite_position_is_rejected() {
    let wire = WirePosition {
        x: f64::NAN,
        y: 0.0,
    };
    assert!(Position::try_from(wire).is_err());
}

#[test]
fn heading_outside_range_is_rejected() {
    let mut wire = WirePlayer::from(&sample_player());
    wire.heading = 360.0;
    assert!(Player::try_from(wire).is_err());
}
