//! TutorDesk backend.
//!
//! Persistence (SQLite via sqlx), the blob store, notifications and the
//! HTTP / SSE / WebSocket surface around the rules in `tutordesk_core`.
//!
//! | Module        | Role                                                   |
//! |---------------|--------------------------------------------------------|
//! | [`db`]        | migrations, row mapping, guarded writes                |
//! | [`ledger`]    | credits, approvals, withdrawals, refunds, charges      |
//! | [`lifecycle`] | assignment creation, gating, status updates, completion|
//! | [`chat`]      | message relay, fan-out registry, SSE and WS transports |
//! | [`blob`]      | blob store boundary and filesystem implementation      |
//! | [`notify`]    | fire-and-forget notifications                          |
//! | [`api`]       | router and handlers                                    |

pub mod api;
pub mod blob;
pub mod chat;
pub mod config;
pub mod db;
pub mod errors;
pub mod ledger;
pub mod lifecycle;
pub mod notify;

#[cfg(test)]
mod test_http;
