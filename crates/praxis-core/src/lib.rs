//! Core library for the praxis placement coordination platform.
//!
//! Praxis coordinates multi-party internship placements (student, employer,
//! institution) and keeps a tamper-evident history of every state change for
//! dispute resolution and compliance audit. This crate contains the two
//! subsystems with real invariants:
//!
//! - **Event ledger** ([`ledger`]): an append-only, hash-chained log of every
//!   business-significant mutation, recorded per entity through a
//!   transactional outbox and verifiable offline by replay.
//! - **Workflow engine** ([`workflow`]): typed state machines for Opportunity
//!   and Application entities, with an authority predicate supplied by the
//!   caller and evidence-review guards gating completion.
//!
//! # Architecture
//!
//! ```text
//! Service layer
//!     |
//!     v
//! PlacementEngine::transition()
//!     |-- path validation (transition table)
//!     |-- authority check (TransitionAuthorizer)
//!     |-- guards (evidence aggregate, same transaction)
//!     |-- version-checked mutation
//!     `-- outbox enqueue ------ commit ------> OutboxDrain
//!                                                  |
//!                                                  v
//!                                          ledger_events (hash chain)
//!                                                  |
//!                                                  v
//!                                          ChainValidator (offline)
//! ```
//!
//! Everything shares one `SQLite` database so a business mutation and its
//! ledger enqueue commit atomically; an aborted operation never produces a
//! ledger entry.

pub mod actor;
pub mod canonical;
pub mod config;
pub mod crypto;
pub mod evidence;
pub mod ledger;
pub mod store;
pub mod workflow;
