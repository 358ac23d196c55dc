//! These models represent the objects passed around by the agent
//!
//! The wire format spoken to the model endpoint (contents/parts with
//! functionCall and functionResponse parts) does not match what the loop
//! wants to reason about, so everything is converted into these internal
//! structs at the transport boundary and back out again on the way in.
pub mod message;
pub mod role;
pub mod tool;
