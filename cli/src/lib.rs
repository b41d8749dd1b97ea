//! CVM Attest CLI - command-line surface over the attestation runtime.

pub mod commands;
