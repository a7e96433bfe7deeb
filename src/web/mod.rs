//! HTTP surface for loadstone.
//!
//! Thin transport over the tracking core; all state lives in the store.
//!
//! ```text
//! Client ─── POST /chat ────────────► ActivityRecorder + AssignmentReconciler
//!        ─── POST /wizard/traveler ─► AssignmentReconciler
//!        ─── POST /wizard/shift ────► ShiftManager
//!        ◄── GET  / ────────────────── LoadMonitor (overload report)
//!        ◄── GET  /api/health ──────── liveness probe
//! ```

pub mod server;
pub mod types;

pub use server::{start_server, AppState};
