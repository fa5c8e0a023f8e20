pub mod amount;
pub mod assembler;
pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod fee;
pub mod memory;
pub mod model;
pub mod provider;
pub mod selection;
pub mod signer;
pub mod sweep;
pub mod tx_utils;
pub mod verifier;
