//! Client/server control protocol.
//!
//! Every message opens with a 4-bit kind. Client and server kinds are
//! separate namespaces since each side only ever decodes the other's
//! messages.
//!
//! ```text
//! event         = [kind:4][code:16][payload]
//! state block   = [count:varint]{[name][value length][value bytes]}*
//! entity header = [id:32][type:16][has owner:1][owner:128]?
//! ```

use crate::error::WireError;
use crate::replication::{read_properties, write_property_count, Entity};
use crate::types::{EntityId, EntityType, EventCode, PlayerId, RoomId};
use crate::wire::{WireBuffer, WireCodec};

pub const KIND_BITS: u32 = 4;
pub const EVENT_CODE_BITS: u32 = 16;
const REASON_BITS: u32 = 4;
const ENTITY_ID_BITS: u32 = 32;
const ENTITY_TYPE_BITS: u32 = 16;

mod client_kind {
    pub const AUTHORIZE: u8 = 0;
    pub const JOIN: u8 = 1;
    pub const JOIN_OR_CREATE: u8 = 2;
    pub const LEAVE: u8 = 3;
    pub const LOADED: u8 = 4;
    pub const EVENT: u8 = 5;
}

mod server_kind {
    pub const AUTHORIZED: u8 = 0;
    pub const AUTH_REJECTED: u8 = 1;
    pub const JOIN_REJECTED: u8 = 2;
    pub const ROOM_JOINED: u8 = 3;
    pub const ROOM_LEFT: u8 = 4;
    pub const SNAPSHOT: u8 = 5;
    pub const ENTITY_CREATED: u8 = 6;
    pub const ENTITY_DESTROYED: u8 = 7;
    pub const STATE_UPDATE: u8 = 8;
    pub const EVENT: u8 = 9;
}

/// Why a join request was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    RoomFull,
    RoomNotFound,
    NotAuthorized,
    AlreadyInRoom,
    NotRunning,
}

impl RejectReason {
    fn code(self) -> u64 {
        match self {
            RejectReason::RoomFull => 0,
            RejectReason::RoomNotFound => 1,
            RejectReason::NotAuthorized => 2,
            RejectReason::AlreadyInRoom => 3,
            RejectReason::NotRunning => 4,
        }
    }

    fn from_code(code: u64) -> Result<Self, WireError> {
        Ok(match code {
            0 => RejectReason::RoomFull,
            1 => RejectReason::RoomNotFound,
            2 => RejectReason::NotAuthorized,
            3 => RejectReason::AlreadyInRoom,
            4 => RejectReason::NotRunning,
            other => {
                return Err(WireError::InvalidValue(format!(
                    "unknown reject reason {other}"
                )))
            }
        })
    }
}

/// Messages sent by clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    Authorize {
        credentials: Vec<u8>,
    },
    Join {
        room_id: RoomId,
        payload: Vec<u8>,
    },
    JoinOrCreate {
        map: String,
        min_players: u32,
        max_players: u32,
        payload: Vec<u8>,
    },
    Leave {
        payload: Vec<u8>,
    },
    Loaded,
    Event {
        code: EventCode,
        entity: Option<EntityId>,
        payload: Vec<u8>,
    },
}

impl ClientMessage {
    pub fn write(&self, buffer: &mut WireBuffer) {
        match self {
            ClientMessage::Authorize { credentials } => {
                write_kind(buffer, client_kind::AUTHORIZE);
                buffer.write_binary(credentials);
            }
            ClientMessage::Join { room_id, payload } => {
                write_kind(buffer, client_kind::JOIN);
                write_room_id(buffer, *room_id);
                buffer.write_binary(payload);
            }
            ClientMessage::JoinOrCreate {
                map,
                min_players,
                max_players,
                payload,
            } => {
                write_kind(buffer, client_kind::JOIN_OR_CREATE);
                buffer.write_string(map);
                buffer.write_varint(*min_players as u64);
                buffer.write_varint(*max_players as u64);
                buffer.write_binary(payload);
            }
            ClientMessage::Leave { payload } => {
                write_kind(buffer, client_kind::LEAVE);
                buffer.write_binary(payload);
            }
            ClientMessage::Loaded => write_kind(buffer, client_kind::LOADED),
            ClientMessage::Event {
                code,
                entity,
                payload,
            } => {
                write_kind(buffer, client_kind::EVENT);
                buffer.write_bits(*code as u64, EVENT_CODE_BITS);
                entity.write(buffer);
                buffer.write_binary(payload);
            }
        }
    }

    pub fn read(buffer: &mut WireBuffer) -> Result<Self, WireError> {
        let kind = buffer.read_bits(KIND_BITS)? as u8;
        Ok(match kind {
            client_kind::AUTHORIZE => ClientMessage::Authorize {
                credentials: buffer.read_binary()?,
            },
            client_kind::JOIN => ClientMessage::Join {
                room_id: read_room_id(buffer)?,
                payload: buffer.read_binary()?,
            },
            client_kind::JOIN_OR_CREATE => ClientMessage::JoinOrCreate {
                map: buffer.read_string()?,
                min_players: read_u32_varint(buffer)?,
                max_players: read_u32_varint(buffer)?,
                payload: buffer.read_binary()?,
            },
            client_kind::LEAVE => ClientMessage::Leave {
                payload: buffer.read_binary()?,
            },
            client_kind::LOADED => ClientMessage::Loaded,
            client_kind::EVENT => ClientMessage::Event {
                code: buffer.read_bits(EVENT_CODE_BITS)? as EventCode,
                entity: Option::<EntityId>::read(buffer)?,
                payload: buffer.read_binary()?,
            },
            other => return Err(WireError::UnknownMessageKind(other)),
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buffer = WireBuffer::new();
        self.write(&mut buffer);
        buffer.into_bytes()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        Self::read(&mut WireBuffer::from_bytes(bytes.to_vec()))
    }
}

/// Decoded form of a replicated entity as a client sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityRecord {
    pub id: EntityId,
    pub type_tag: EntityType,
    pub owner: Option<PlayerId>,
    pub properties: Vec<(String, Vec<u8>)>,
}

impl EntityRecord {
    fn write(&self, buffer: &mut WireBuffer) {
        write_entity_header(buffer, self.id, self.type_tag, self.owner);
        write_property_count(buffer, self.properties.len());
        for (name, value) in &self.properties {
            buffer.write_string(name);
            buffer.write_binary(value);
        }
    }

    fn read(buffer: &mut WireBuffer) -> Result<Self, WireError> {
        let id = EntityId(buffer.read_bits(ENTITY_ID_BITS)? as u32);
        let type_tag = buffer.read_bits(ENTITY_TYPE_BITS)? as EntityType;
        let owner = Option::<PlayerId>::read(buffer)?;
        Ok(Self {
            id,
            type_tag,
            owner,
            properties: read_properties(buffer)?,
        })
    }
}

/// Messages sent by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    Authorized {
        player_id: PlayerId,
        name: String,
    },
    AuthRejected {
        reason: u16,
    },
    JoinRejected {
        reason: RejectReason,
    },
    RoomJoined {
        room_id: RoomId,
        map: String,
    },
    RoomLeft,
    Snapshot {
        entities: Vec<EntityRecord>,
    },
    EntityCreated {
        entity: EntityRecord,
    },
    EntityDestroyed {
        entity_id: EntityId,
    },
    StateUpdate {
        entity_id: EntityId,
        properties: Vec<(String, Vec<u8>)>,
    },
    Event {
        code: EventCode,
        payload: Vec<u8>,
    },
}

impl ServerMessage {
    pub fn write(&self, buffer: &mut WireBuffer) {
        match self {
            ServerMessage::Authorized { player_id, name } => {
                write_kind(buffer, server_kind::AUTHORIZED);
                player_id.write(buffer);
                buffer.write_string(name);
            }
            ServerMessage::AuthRejected { reason } => {
                write_kind(buffer, server_kind::AUTH_REJECTED);
                buffer.write_bits(*reason as u64, 16);
            }
            ServerMessage::JoinRejected { reason } => {
                write_kind(buffer, server_kind::JOIN_REJECTED);
                buffer.write_bits(reason.code(), REASON_BITS);
            }
            ServerMessage::RoomJoined { room_id, map } => {
                write_kind(buffer, server_kind::ROOM_JOINED);
                write_room_id(buffer, *room_id);
                buffer.write_string(map);
            }
            ServerMessage::RoomLeft => write_kind(buffer, server_kind::ROOM_LEFT),
            ServerMessage::Snapshot { entities } => {
                write_kind(buffer, server_kind::SNAPSHOT);
                buffer.write_varint(entities.len() as u64);
                for entity in entities {
                    entity.write(buffer);
                }
            }
            ServerMessage::EntityCreated { entity } => {
                write_kind(buffer, server_kind::ENTITY_CREATED);
                entity.write(buffer);
            }
            ServerMessage::EntityDestroyed { entity_id } => {
                write_kind(buffer, server_kind::ENTITY_DESTROYED);
                buffer.write_bits(entity_id.0 as u64, ENTITY_ID_BITS);
            }
            ServerMessage::StateUpdate {
                entity_id,
                properties,
            } => {
                write_kind(buffer, server_kind::STATE_UPDATE);
                buffer.write_bits(entity_id.0 as u64, ENTITY_ID_BITS);
                write_property_count(buffer, properties.len());
                for (name, value) in properties {
                    buffer.write_string(name);
                    buffer.write_binary(value);
                }
            }
            ServerMessage::Event { code, payload } => {
                write_event_header(buffer, *code);
                buffer.write_binary(payload);
            }
        }
    }

    pub fn read(buffer: &mut WireBuffer) -> Result<Self, WireError> {
        let kind = buffer.read_bits(KIND_BITS)? as u8;
        Ok(match kind {
            server_kind::AUTHORIZED => ServerMessage::Authorized {
                player_id: PlayerId::read(buffer)?,
                name: buffer.read_string()?,
            },
            server_kind::AUTH_REJECTED => ServerMessage::AuthRejected {
                reason: buffer.read_bits(16)? as u16,
            },
            server_kind::JOIN_REJECTED => ServerMessage::JoinRejected {
                reason: RejectReason::from_code(buffer.read_bits(REASON_BITS)?)?,
            },
            server_kind::ROOM_JOINED => ServerMessage::RoomJoined {
                room_id: read_room_id(buffer)?,
                map: buffer.read_string()?,
            },
            server_kind::ROOM_LEFT => ServerMessage::RoomLeft,
            server_kind::SNAPSHOT => {
                let count = buffer.read_varint()? as usize;
                let mut entities = Vec::with_capacity(count.min(256));
                for _ in 0..count {
                    entities.push(EntityRecord::read(buffer)?);
                }
                ServerMessage::Snapshot { entities }
            }
            server_kind::ENTITY_CREATED => ServerMessage::EntityCreated {
                entity: EntityRecord::read(buffer)?,
            },
            server_kind::ENTITY_DESTROYED => ServerMessage::EntityDestroyed {
                entity_id: EntityId(buffer.read_bits(ENTITY_ID_BITS)? as u32),
            },
            server_kind::STATE_UPDATE => ServerMessage::StateUpdate {
                entity_id: EntityId(buffer.read_bits(ENTITY_ID_BITS)? as u32),
                properties: read_properties(buffer)?,
            },
            server_kind::EVENT => ServerMessage::Event {
                code: buffer.read_bits(EVENT_CODE_BITS)? as EventCode,
                payload: buffer.read_binary()?,
            },
            other => return Err(WireError::UnknownMessageKind(other)),
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buffer = WireBuffer::new();
        self.write(&mut buffer);
        buffer.into_bytes()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        Self::read(&mut WireBuffer::from_bytes(bytes.to_vec()))
    }
}

// Server-side writers that serialize straight from the entity table, so the
// flush path never copies state into an `EntityRecord` first. Their output
// decodes as the matching `ServerMessage` variant.

/// `EntityCreated` carrying the full state; clears the entity's dirty flags.
pub fn encode_entity_created(entity: &mut Entity) -> Vec<u8> {
    let mut buffer = WireBuffer::new();
    write_kind(&mut buffer, server_kind::ENTITY_CREATED);
    write_entity_header(&mut buffer, entity.id(), entity.type_tag(), entity.owner());
    entity.state_mut().write(&mut buffer);
    buffer.into_bytes()
}

/// `StateUpdate` carrying only dirty properties, or `None` when nothing
/// changed since the last flush.
pub fn encode_state_update(entity: &mut Entity) -> Option<Vec<u8>> {
    if !entity.state().is_dirty() {
        return None;
    }
    let mut buffer = WireBuffer::new();
    write_kind(&mut buffer, server_kind::STATE_UPDATE);
    buffer.write_bits(entity.id().0 as u64, ENTITY_ID_BITS);
    entity.state_mut().write_diff(&mut buffer);
    Some(buffer.into_bytes())
}

/// `Snapshot` of the given entities; leaves dirty flags untouched.
pub fn encode_snapshot<'a>(entities: impl ExactSizeIterator<Item = &'a Entity>) -> Vec<u8> {
    let mut buffer = WireBuffer::new();
    write_kind(&mut buffer, server_kind::SNAPSHOT);
    buffer.write_varint(entities.len() as u64);
    for entity in entities {
        write_entity_header(&mut buffer, entity.id(), entity.type_tag(), entity.owner());
        entity.state().snapshot(&mut buffer);
    }
    buffer.into_bytes()
}

/// Server `Event` message around an already-encoded payload.
pub fn encode_event(code: EventCode, payload: &[u8]) -> Vec<u8> {
    let mut buffer = WireBuffer::new();
    write_event_header(&mut buffer, code);
    buffer.write_binary(payload);
    buffer.into_bytes()
}

fn write_kind(buffer: &mut WireBuffer, kind: u8) {
    buffer.write_bits(kind as u64, KIND_BITS);
}

fn write_event_header(buffer: &mut WireBuffer, code: EventCode) {
    write_kind(buffer, server_kind::EVENT);
    buffer.write_bits(code as u64, EVENT_CODE_BITS);
}

fn write_entity_header(
    buffer: &mut WireBuffer,
    id: EntityId,
    type_tag: EntityType,
    owner: Option<PlayerId>,
) {
    buffer.write_bits(id.0 as u64, ENTITY_ID_BITS);
    buffer.write_bits(type_tag as u64, ENTITY_TYPE_BITS);
    owner.write(buffer);
}

fn write_room_id(buffer: &mut WireBuffer, room_id: RoomId) {
    let (high, low) = room_id.to_parts();
    buffer.write_bits(high, 64);
    buffer.write_bits(low, 64);
}

fn read_room_id(buffer: &mut WireBuffer) -> Result<RoomId, WireError> {
    let high = buffer.read_bits(64)?;
    let low = buffer.read_bits(64)?;
    Ok(RoomId::from_parts(high, low))
}

fn read_u32_varint(buffer: &mut WireBuffer) -> Result<u32, WireError> {
    let value = buffer.read_varint()?;
    u32::try_from(value).map_err(|_| WireError::InvalidValue(format!("{value} exceeds u32")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replication::EntityCache;

    #[test]
    fn test_event_layout() {
        let bytes = encode_event(123, &String::from("hi").to_bytes());
        let mut buffer = WireBuffer::from_bytes(bytes.clone());
        assert_eq!(buffer.read_bits(KIND_BITS).unwrap(), server_kind::EVENT as u64);
        assert_eq!(buffer.read_bits(EVENT_CODE_BITS).unwrap(), 123);

        match ServerMessage::decode(&bytes).unwrap() {
            ServerMessage::Event { code, payload } => {
                assert_eq!(code, 123);
                assert_eq!(String::from_bytes(&payload).unwrap(), "hi");
            }
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn test_client_messages_decode() {
        let room_id = RoomId::new();
        let messages = vec![
            ClientMessage::Authorize {
                credentials: b"alice".to_vec(),
            },
            ClientMessage::Join {
                room_id,
                payload: vec![],
            },
            ClientMessage::JoinOrCreate {
                map: "arena".into(),
                min_players: 1,
                max_players: 4,
                payload: vec![7],
            },
            ClientMessage::Leave { payload: vec![] },
            ClientMessage::Loaded,
            ClientMessage::Event {
                code: 9,
                entity: Some(EntityId(3)),
                payload: vec![1, 2],
            },
        ];

        for message in messages {
            assert_eq!(ClientMessage::decode(&message.encode()).unwrap(), message);
        }
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        assert_eq!(
            ClientMessage::decode(&[0xF0]).unwrap_err(),
            WireError::UnknownMessageKind(15)
        );
        assert!(ServerMessage::decode(&[]).is_err());
    }

    #[test]
    fn test_entity_writers_match_message_variants() {
        let owner = PlayerId::new();
        let mut cache = EntityCache::new();
        let id = cache.create(7, Some(owner));
        let entity = cache.get_mut(id).unwrap();
        entity.state_mut().set("hp", &100u16);

        let created = ServerMessage::decode(&encode_entity_created(entity)).unwrap();
        assert_eq!(
            created,
            ServerMessage::EntityCreated {
                entity: EntityRecord {
                    id,
                    type_tag: 7,
                    owner: Some(owner),
                    properties: vec![("hp".into(), 100u16.to_bytes())],
                }
            }
        );
        assert!(encode_state_update(entity).is_none());

        entity.state_mut().set("hp", &60u16);
        let update = ServerMessage::decode(&encode_state_update(entity).unwrap()).unwrap();
        assert_eq!(
            update,
            ServerMessage::StateUpdate {
                entity_id: id,
                properties: vec![("hp".into(), 60u16.to_bytes())],
            }
        );

        match ServerMessage::decode(&encode_snapshot(cache.iter())).unwrap() {
            ServerMessage::Snapshot { entities } => {
                assert_eq!(entities.len(), 1);
                assert_eq!(entities[0].properties[0].1, 60u16.to_bytes());
            }
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn test_join_rejected_reason() {
        let message = ServerMessage::JoinRejected {
            reason: RejectReason::RoomFull,
        };
        assert_eq!(ServerMessage::decode(&message.encode()).unwrap(), message);
    }
}
