//! Deckhand library exports

pub mod release;
