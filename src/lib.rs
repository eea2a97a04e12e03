//! Authoritative replicated player simulation
//!
//! One state authority simulates every avatar at a fixed tick; participants
//! send per-tick input and role-checked RPCs, predict their own avatar and
//! render everything else from replicated snapshots.

pub mod app;
pub mod chat;
pub mod config;
pub mod game;
pub mod http;
pub mod util;
pub mod ws;
