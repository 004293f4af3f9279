//! loadcast-scaler — the orchestrator-facing external scaler.
//!
//! Two layers, deliberately separated:
//!
//! - [`decision`]: a pure function from a forecast to a clamped replica
//!   count and metric value, unit-testable without any RPC machinery.
//! - [`server`]: a thin tonic adapter that owns timing, streaming, and the
//!   fail-open fallbacks. Every upstream failure degrades to a safe
//!   default value; none of the five RPCs ever returns an error status.

pub mod decision;
pub mod provider;
pub mod server;

/// Generated protobuf types and gRPC service stubs.
pub mod proto {
    tonic::include_proto!("externalscaler");
}

pub use decision::{DrivingMode, ScalerConfig, ScalingDecision, decide};
pub use provider::ForecastProvider;
pub use server::ScalerServer;
