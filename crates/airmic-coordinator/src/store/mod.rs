//! Room Store: the in-memory registry of rooms and their mics.
//!
//! The store is an owned handle (`RoomStore` is cheap to clone) passed to
//! every component that needs it. It knows nothing about connections or
//! messages; notifying peers is the caller's job.

mod registry;
mod types;

#[cfg(test)]
mod tests;

pub use registry::{CodeReservation, RoomStore, StoreConfig};
pub use types::{
    JoinedMic, Membership, Mic, Room, RoomSettingsPatch, RoomStat, SettingsPatch, StoreStats,
};
