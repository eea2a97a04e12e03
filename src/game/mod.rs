//! Simulation core: authority, input, movement, combat, RPCs and lifecycle

pub mod authority;
pub mod combat;
pub mod input;
pub mod lifecycle;
pub mod physics;
pub mod player;
pub mod prediction;
pub mod replica;
pub mod rpc;
pub mod session;
pub mod snapshot;

pub use authority::{Authority, AuthorityResolver, EntityId, ParticipantId, Role};
pub use player::PlayerEntity;
pub use replica::ClientSession;
pub use session::{Outbound, Session, SessionHandle, SessionInput, SessionSettings};
