//! # dss-core
//!
//! Shared runtime pieces for the DSS components: UDP request/reply
//! helpers with uniform timeout+retry, the striping/parity engine,
//! and the fault injector used to exercise read verification.

pub mod fault;
pub mod net;
pub mod stripe;

pub use fault::FaultInjector;
pub use net::ExchangePolicy;
pub use stripe::StripeGeometry;
