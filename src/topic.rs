//! MQTT topics the agent publishes on.

use std::fmt;

/// A static, room-qualified topic.
///
/// Topics are bound when a task is constructed and never derived from the
/// message contents.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Topic(String);

impl Topic {
    /// `<room>/person/status`
    pub fn person_status(room: &Room) -> Topic {
        Topic(format!("{}/person/status", room.0))
    }

    /// `<room>/temperature`
    pub fn temperature(room: &Room) -> Topic {
        Topic(format!("{}/temperature", room.0))
    }

    /// `<room>/humidity`
    pub fn humidity(room: &Room) -> Topic {
        Topic(format!("{}/humidity", room.0))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The room this agent reports for. Used as the first topic level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Room(String);

impl Room {
    pub fn new<T: Into<String>>(name: T) -> Result<Room, InvalidRoom> {
        let name = name.into();

        if name.is_empty() {
            return Err(InvalidRoom::Empty);
        }
        if let Some(c) = name.chars().find(|c| matches!(c, '/' | '+' | '#' | '\0')) {
            return Err(InvalidRoom::ReservedCharacter(c));
        }

        Ok(Room(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Room {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum InvalidRoom {
    #[error("room name is empty")]
    Empty,

    #[error("room name contains reserved character {0:?}")]
    ReservedCharacter(char),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topics_are_room_qualified() {
        let room = Room::new("roomA").unwrap();

        assert_eq!(Topic::person_status(&room).as_str(), "roomA/person/status");
        assert_eq!(Topic::temperature(&room).as_str(), "roomA/temperature");
        assert_eq!(Topic::humidity(&room).as_str(), "roomA/humidity");
    }

    #[test]
    fn rejects_wildcards_and_separators() {
        assert_eq!(Room::new(""), Err(InvalidRoom::Empty));
        assert_eq!(Room::new("a/b"), Err(InvalidRoom::ReservedCharacter('/')));
        assert_eq!(Room::new("room+"), Err(InvalidRoom::ReservedCharacter('+')));
        assert_eq!(Room::new("#"), Err(InvalidRoom::ReservedCharacter('#')));
    }
}
