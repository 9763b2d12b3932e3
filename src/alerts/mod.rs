//! Alert delivery: the abstract chat egress and the multi-tenant
//! fan-out router that feeds it.

pub mod egress;
pub mod router;

pub use egress::{AlertPayload, ChatEgress, DiscordEgress, EgressError, LogEgress};
pub use router::AlertRouter;
