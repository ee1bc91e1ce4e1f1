pub mod ephemeral;

pub use ephemeral::{Ed25519KeyFactory, EphemeralKeyPair, KeyAuthorizer, KeyFactory};
