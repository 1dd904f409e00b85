//! Wire and data types for the RFC 3161 / RFC 5816 timestamp authority mediator.
//!
//! This crate is intentionally inert: no async, no network I/O, no cryptography.
//! It defines the shapes that flow between the mediator's components (see
//! `tsa-core` for the engine that operates on them) — ASN.1 DER wire types for
//! the Time-Stamp Protocol, the tenant policy data model, health snapshots,
//! and the closed error/reason enumerations that cross every public boundary.
//!
//! # Modules
//!
//! - [`oid`] — object identifier validation and well-known OIDs.
//! - [`imprint`] — [`imprint::MessageImprint`] and supported hash algorithms.
//! - [`nonce`] — [`nonce::Nonce`], a constant-time-comparable big integer.
//! - [`wire`] — ASN.1 DER types for `TimeStampReq` / `TimeStampResp` / `TSTInfo`.
//! - [`token`] — [`token::TimeStampToken`], the transient verification input.
//! - [`trust_anchor`] — [`trust_anchor::TrustAnchor`].
//! - [`policy`] — [`policy::TenantPolicy`], [`policy::PolicyRecord`], audit entries.
//! - [`health`] — provider health snapshot types shared between monitor and caller.
//! - [`error`] — the closed [`error::CoreError`] and [`error::ValidationReason`] enums.
//! - [`error_class`] — the fixed adapter→monitor error-classification vocabulary.

pub mod error;
pub mod error_class;
pub mod gen_time;
pub mod health;
pub mod imprint;
pub mod nonce;
pub mod oid;
pub mod policy;
pub mod token;
pub mod trust_anchor;
pub mod wire;
