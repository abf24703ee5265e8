use std::fmt;

/// A broker-managed named group of sessions receiving the same message
/// stream (Glossary: "Room"). `Display` gives the canonical room key used
/// both as the `DashMap` key and in client-facing room names.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Room {
    Vehicle(String),
    Fleet(String),
    NearbyAll,
}

impl fmt::Display for Room {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Room::Vehicle(id) => write!(f, "vehicle:{id}"),
            Room::Fleet(id) => write!(f, "fleet:{id}"),
            Room::NearbyAll => write!(f, "nearby-all"),
        }
    }
}
