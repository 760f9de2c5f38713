//! Sample game shipped with the server binary.
//!
//! Every player gets an avatar entity with a replicated position. Chat lines
//! are relayed to the whole room and move events update the sender's avatar.

use std::sync::Arc;

use arena_core::{
    EntityType, EventCode, EventError, EventTarget, FloatCompressor, PluginError, PluginFactory,
    PlayerId, RoomContext, RoomPlugin, WireBuffer, WireCodec, WireError,
};
use tracing::info;

pub const CHAT: EventCode = 1;
pub const MOVE: EventCode = 2;
pub const AVATAR: EntityType = 1;

/// World coordinates are kept within this square at centimetre precision.
const WORLD_EXTENT: f32 = 1000.0;

fn coordinate() -> FloatCompressor {
    FloatCompressor::new(-WORLD_EXTENT, WORLD_EXTENT, 2)
}

/// A move request: the new position of the sender's avatar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Move {
    pub x: f32,
    pub y: f32,
}

impl WireCodec for Move {
    fn write(&self, buffer: &mut WireBuffer) {
        let coordinate = coordinate();
        coordinate.write(buffer, self.x);
        coordinate.write(buffer, self.y);
    }

    fn read(buffer: &mut WireBuffer) -> Result<Self, WireError> {
        let coordinate = coordinate();
        Ok(Move {
            x: coordinate.read(buffer)?,
            y: coordinate.read(buffer)?,
        })
    }
}

/// Chat relay plus avatar movement.
#[derive(Debug, Default)]
pub struct RelayGame;

impl RoomPlugin for RelayGame {
    fn name(&self) -> &str {
        "relay_game"
    }

    fn on_start(&mut self, ctx: &mut RoomContext) -> Result<(), PluginError> {
        ctx.subscribe(CHAT, |ctx: &mut RoomContext, sender, line: String| {
            let name = sender
                .and_then(|id| ctx.player(id))
                .map(|player| player.name().to_string())
                .unwrap_or_else(|| "server".to_string());
            ctx.send_event(EventTarget::Room, CHAT, &format!("{name}: {line}"));
            Ok(())
        })?;

        ctx.subscribe(MOVE, |ctx: &mut RoomContext, sender, to: Move| {
            let sender = sender.ok_or_else(|| EventError::Handler("move without sender".into()))?;
            let avatar = ctx
                .player(sender)
                .and_then(|player| player.owned_entities().iter().next().copied());
            if let Some(entity) = avatar.and_then(|id| ctx.entity_mut(id)) {
                entity.state_mut().set("x", &to.x);
                entity.state_mut().set("y", &to.y);
            }
            Ok(())
        })?;

        info!(room = %ctx.room_id(), map = ctx.map(), "🎮 Relay game started");
        Ok(())
    }

    fn on_player_joined(
        &mut self,
        ctx: &mut RoomContext,
        player: PlayerId,
        _payload: &[u8],
    ) -> Result<(), PluginError> {
        let avatar = ctx.create_entity(AVATAR, Some(player));
        if let Some(entity) = ctx.entity_mut(avatar) {
            entity.state_mut().set("x", &0f32);
            entity.state_mut().set("y", &0f32);
        }
        Ok(())
    }
}

/// Factory that runs [`RelayGame`] on every map.
pub fn relay_factory() -> Arc<dyn PluginFactory> {
    Arc::new(|_map: &str| -> Result<Box<dyn RoomPlugin>, PluginError> { Ok(Box::new(RelayGame)) })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_move_is_quantized_to_centimetres() {
        let original = Move { x: 12.345, y: -999.99 };
        let decoded = Move::from_bytes(&original.to_bytes()).unwrap();
        assert!((decoded.x - original.x).abs() <= 0.005 + f32::EPSILON * 1000.0);
        assert!((decoded.y - original.y).abs() <= 0.005 + f32::EPSILON * 1000.0);
        // Two coordinates, far fewer bits than two raw floats.
        assert!(original.to_bytes().len() < 8);
    }

    #[test]
    fn test_factory_accepts_any_map() {
        let factory = relay_factory();
        assert_eq!(factory.create("dust").unwrap().name(), "relay_game");
        assert_eq!(factory.create("").unwrap().name(), "relay_game");
    }
}
