//! Core data model types: addresses, decoded messages, and contacts.

pub mod address;
pub mod contact;
pub mod message;
