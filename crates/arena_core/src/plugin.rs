//! # Room Plugin Contract
//!
//! Game logic is supplied as a [`RoomPlugin`]. Every room owns exactly one
//! plugin instance, created by the server's [`PluginFactory`] when the room
//! is opened for a map. All hooks run on the tick thread with exclusive
//! access to the room through [`RoomContext`].
//!
//! ## Hook Order
//!
//! 1. `on_start` once, when the room begins running
//! 2. `on_player_joined` / `on_player_loaded` / `on_player_left` as players
//!    come and go
//! 3. `on_tick` once per simulation step
//! 4. `on_stop` once, when the room shuts down
//!
//! `on_entity_created` and `on_entity_destroyed` are delivered after the hook
//! (or event handler, or scheduled task) that created or destroyed the
//! entity has returned, never re-entrantly.

use std::time::Duration;

use crate::error::PluginError;
use crate::player::Player;
use crate::replication::Entity;
use crate::room::RoomContext;
use crate::types::{EntityId, PlayerId};

/// What happens to a departing player's entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeparturePolicy {
    /// Destroy every entity the player owns.
    #[default]
    DestroyOwned,
    /// Keep the entities and hand ownership to the room.
    TransferToRoom,
}

/// Game logic for one room.
///
/// Every hook has a no-op default, so a plugin only implements what it needs.
/// Returning an error from a hook is logged and does not stop the room,
/// except from [`on_start`](RoomPlugin::on_start), which faults it.
pub trait RoomPlugin: Send {
    /// Returns the plugin name used in logs.
    fn name(&self) -> &str {
        "room_plugin"
    }

    /// Called once when the room starts running.
    ///
    /// Use this to register event handlers, create room-owned entities and
    /// schedule recurring tasks.
    ///
    /// # Returns
    ///
    /// Returns `Ok(())` if the room can start, or `Err(PluginError)` to fault
    /// the room before any player joins.
    fn on_start(&mut self, _ctx: &mut RoomContext) -> Result<(), PluginError> {
        Ok(())
    }

    /// Called once when the room stops, before remaining players are removed.
    fn on_stop(&mut self, _ctx: &mut RoomContext) -> Result<(), PluginError> {
        Ok(())
    }

    /// Called after a player has been added to the room.
    ///
    /// # Arguments
    ///
    /// * `player` - The joining player, already present in `ctx.players()`
    /// * `payload` - Opaque join payload supplied by the client
    fn on_player_joined(
        &mut self,
        _ctx: &mut RoomContext,
        _player: PlayerId,
        _payload: &[u8],
    ) -> Result<(), PluginError> {
        Ok(())
    }

    /// Called when a player reports that it has finished loading.
    fn on_player_loaded(
        &mut self,
        _ctx: &mut RoomContext,
        _player: PlayerId,
    ) -> Result<(), PluginError> {
        Ok(())
    }

    /// Called after a player has been removed and the departure policy has
    /// been applied to its entities.
    ///
    /// # Arguments
    ///
    /// * `player` - The departed player, no longer in `ctx.players()`
    /// * `payload` - Leave payload; empty for disconnects and timeouts
    fn on_player_left(
        &mut self,
        _ctx: &mut RoomContext,
        _player: &Player,
        _payload: &[u8],
    ) -> Result<(), PluginError> {
        Ok(())
    }

    fn on_entity_created(
        &mut self,
        _ctx: &mut RoomContext,
        _entity: EntityId,
    ) -> Result<(), PluginError> {
        Ok(())
    }

    /// Receives the evicted entity; its id may already be reused.
    fn on_entity_destroyed(
        &mut self,
        _ctx: &mut RoomContext,
        _entity: &Entity,
    ) -> Result<(), PluginError> {
        Ok(())
    }

    /// Called once per simulation step with the fixed step length.
    fn on_tick(&mut self, _ctx: &mut RoomContext, _dt: Duration) -> Result<(), PluginError> {
        Ok(())
    }

    fn departure_policy(&self) -> DeparturePolicy {
        DeparturePolicy::default()
    }
}

/// Creates the plugin for a newly opened room.
///
/// Closures of the form `Fn(&str) -> Result<Box<dyn RoomPlugin>, PluginError>`
/// implement this trait.
pub trait PluginFactory: Send + Sync {
    fn create(&self, map: &str) -> Result<Box<dyn RoomPlugin>, PluginError>;
}

impl<F> PluginFactory for F
where
    F: Fn(&str) -> Result<Box<dyn RoomPlugin>, PluginError> + Send + Sync,
{
    fn create(&self, map: &str) -> Result<Box<dyn RoomPlugin>, PluginError> {
        self(map)
    }
}
