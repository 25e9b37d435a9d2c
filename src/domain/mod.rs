//! Domain model of the gateway: merchants, channel products and candidates,
//! orders and their settlement snapshot, plus the ports the core talks to.

pub mod channel;
pub mod money;
pub mod order;
pub mod ports;
