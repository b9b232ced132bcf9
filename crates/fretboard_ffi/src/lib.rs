//! Flutter-facing bindings for the fretboard sync engine.

pub mod api;
