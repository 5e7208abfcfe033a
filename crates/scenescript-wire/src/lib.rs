//! Lossless value converters for the renderer wire boundary.
//!
//! An out-of-process renderer exchanges scene values as JSON. The wire
//! structs in this crate mirror the domain types field by field, with
//! `deny_unknown_fields` and a tagged speech-bubble enum so an unmapped or
//! misspelled wire variant fails fast instead of silently defaulting.
//! Every converter pair satisfies `to_domain(from_domain(x)) == x` for
//! valid `x`; `to_domain` validates what JSON cannot express (finiteness,
//! costume-index bounds, heading range) and rejects the rest.

use scenescript_core::{AskTicket, Pen, Player, PlayerId, Position, Rect, Rgba, Size, SpeechBubble};
use serde::{Deserialize, Serialize};
use slotmap::{Key, KeyData};
use thiserror::Error;

/// Errors produced when decoding wire payloads.
#[derive(Debug, Error)]
pub enum WireError {
    /// The payload did not parse as the expected wire shape.
    #[error("malformed wire payload: {0}")]
    Malformed(#[from] serde_json::Error),
    /// The payload parsed but carried a value the domain rejects.
    #[error("invalid {field}: {reason}")]
    Invalid {
        field: &'static str,
        reason: &'static str,
    },
}

fn finite(value: f64, field: &'static str) -> Result<f64, WireError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(WireError::Invalid {
            field,
            reason: "must be finite",
        })
    }
}

/// Wire form of [`Position`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct WirePosition {
    pub x: f64,
    pub y: f64,
}

impl From<Position> for WirePosition {
    fn from(position: Position) -> Self {
        Self {
            x: position.x,
            y: position.y,
        }
    }
}

impl TryFrom<WirePosition> for Position {
    type Error = WireError;

    fn try_from(wire: WirePosition) -> Result<Self, Self::Error> {
        Ok(Self::new(
            finite(wire.x, "position.x")?,
            finite(wire.y, "position.y")?,
        ))
    }
}

/// Wire form of [`Size`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct WireSize {
    pub width: f64,
    pub height: f64,
}

impl From<Size> for WireSize {
    fn from(size: Size) -> Self {
        Self {
            width: size.width,
            height: size.height,
        }
    }
}

impl TryFrom<WireSize> for Size {
    type Error = WireError;

    fn try_from(wire: WireSize) -> Result<Self, Self::Error> {
        let size = Self::new(
            finite(wire.width, "size.width")?,
            finite(wire.height, "size.height")?,
        );
        if size.is_valid() {
            Ok(size)
        } else {
            Err(WireError::Invalid {
                field: "size",
                reason: "extents must be positive",
            })
        }
    }
}

/// Wire form of [`Rect`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct WireRect {
    pub min: WirePosition,
    pub max: WirePosition,
}

impl From<Rect> for WireRect {
    fn from(rect: Rect) -> Self {
        Self {
            min: rect.min.into(),
            max: rect.max.into(),
        }
    }
}

impl TryFrom<WireRect> for Rect {
    type Error = WireError;

    fn try_from(wire: WireRect) -> Result<Self, Self::Error> {
        let rect = Self::new(wire.min.try_into()?, wire.max.try_into()?);
        if rect.min.x <= rect.max.x && rect.min.y <= rect.max.y {
            Ok(rect)
        } else {
            Err(WireError::Invalid {
                field: "rect",
                reason: "min corner must not exceed max corner",
            })
        }
    }
}

/// Wire form of [`Rgba`]. Byte channels survive JSON exactly, so this
/// conversion is infallible in both directions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct WireRgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl From<Rgba> for WireRgba {
    fn from(color: Rgba) -> Self {
        Self {
            r: color.r,
            g: color.g,
            b: color.b,
            a: color.a,
        }
    }
}

impl From<WireRgba> for Rgba {
    fn from(wire: WireRgba) -> Self {
        Self::new(wire.r, wire.g, wire.b, wire.a)
    }
}

/// Wire form of [`Pen`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct WirePen {
    pub down: bool,
    pub weight: f64,
    pub color: WireRgba,
}

impl From<Pen> for WirePen {
    fn from(pen: Pen) -> Self {
        Self {
            down: pen.down,
            weight: pen.weight,
            color: pen.color.into(),
        }
    }
}

impl TryFrom<WirePen> for Pen {
    type Error = WireError;

    fn try_from(wire: WirePen) -> Result<Self, Self::Error> {
        let weight = finite(wire.weight, "pen.weight")?;
        if weight < 0.0 {
            return Err(WireError::Invalid {
                field: "pen.weight",
                reason: "must not be negative",
            });
        }
        Ok(Self {
            down: wire.down,
            weight,
            color: wire.color.into(),
        })
    }
}

/// Wire form of [`PlayerId`], carrying the generational key as its ffi value.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct WirePlayerId(pub u64);

impl From<PlayerId> for WirePlayerId {
    fn from(id: PlayerId) -> Self {
        Self(id.data().as_ffi())
    }
}

impl From<WirePlayerId> for PlayerId {
    fn from(wire: WirePlayerId) -> Self {
        Self::from(KeyData::from_ffi(wire.0))
    }
}

/// Wire form of [`SpeechBubble`]. The tag makes unknown bubble kinds a
/// decode error rather than a silent default.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WireSpeechBubble {
    Say {
        text: String,
    },
    Ask {
        question: String,
        answer: String,
        ask_id: u64,
    },
}

impl From<&SpeechBubble> for WireSpeechBubble {
    fn from(bubble: &SpeechBubble) -> Self {
        match bubble {
            SpeechBubble::Say { text } => Self::Say { text: text.clone() },
            SpeechBubble::Ask {
                question,
                answer,
                ticket,
            } => Self::Ask {
                question: question.clone(),
                answer: answer.clone(),
                ask_id: ticket.0,
            },
        }
    }
}

impl From<WireSpeechBubble> for SpeechBubble {
    fn from(wire: WireSpeechBubble) -> Self {
        match wire {
            WireSpeechBubble::Say { text } => Self::Say { text },
            WireSpeechBubble::Ask {
                question,
                answer,
                ask_id,
            } => Self::Ask {
                question,
                answer,
                ticket: AskTicket(ask_id),
            },
        }
    }
}

/// Wire form of [`Player`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct WirePlayer {
    pub id: WirePlayerId,
    pub position: WirePosition,
    pub heading: f64,
    pub pen: WirePen,
    pub size_factor: f64,
    pub costumes: Vec<String>,
    pub costume_index: usize,
    pub bubble: Option<WireSpeechBubble>,
    pub visible: bool,
    pub layer: i64,
}

impl From<&Player> for WirePlayer {
    fn from(player: &Player) -> Self {
        Self {
            id: player.id.into(),
            position: player.position.into(),
            heading: player.heading,
            pen: player.pen.into(),
            size_factor: player.size_factor,
            costumes: player.costumes.clone(),
            costume_index: player.costume_index,
            bubble: player.bubble.as_ref().map(WireSpeechBubble::from),
            visible: player.visible,
            layer: player.layer,
        }
    }
}

impl TryFrom<WirePlayer> for Player {
    type Error = WireError;

    fn try_from(wire: WirePlayer) -> Result<Self, Self::Error> {
        let heading = finite(wire.heading, "player.heading")?;
        if !(0.0..360.0).contains(&heading) {
            return Err(WireError::Invalid {
                field: "player.heading",
                reason: "must lie in [0, 360)",
            });
        }
        if !wire.costumes.is_empty() && wire.costume_index >= wire.costumes.len() {
            return Err(WireError::Invalid {
                field: "player.costume_index",
                reason: "must address an existing costume",
            });
        }
        if wire.costumes.is_empty() && wire.costume_index != 0 {
            return Err(WireError::Invalid {
                field: "player.costume_index",
                reason: "must be zero without costumes",
            });
        }
        Ok(Self {
            id: wire.id.into(),
            position: wire.position.try_into()?,
            heading,
            pen: wire.pen.try_into()?,
            size_factor: finite(wire.size_factor, "player.size_factor")?,
            costumes: wire.costumes,
            costume_index: wire.costume_index,
            bubble: wire.bubble.map(SpeechBubble::from),
            visible: wire.visible,
            layer: wire.layer,
        })
    }
}

/// Encode a player as a JSON wire payload.
pub fn encode_player(player: &Player) -> Result<String, WireError> {
    Ok(serde_json::to_string(&WirePlayer::from(player))?)
}

/// Decode a player from a JSON wire payload, rejecting malformed or
/// unmapped input.
pub fn decode_player(json: &str) -> Result<Player, WireError> {
    Player::try_from(serde_json::from_str::<WirePlayer>(json)?)
}

/// Encode a speech bubble as a JSON wire payload.
pub fn encode_bubble(bubble: &SpeechBubble) -> Result<String, WireError> {
    Ok(serde_json::to_string(&WireSpeechBubble::from(bubble))?)
}

/// Decode a speech bubble from a JSON wire payload.
pub fn decode_bubble(json: &str) -> Result<SpeechBubble, WireError> {
    Ok(SpeechBubble::from(serde_json::from_str::<WireSpeechBubble>(
        json,
    )?))
}
