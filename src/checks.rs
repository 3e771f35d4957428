//! Checks encapsulate verifications that can be performed on a built stack
//! before it is handed to the provisioning engine.
//!
//! Right now the following checks are implemented:
//! - graph: ingress rules, instance placement, DNS target and declaration
//!   order.

pub mod graph;
