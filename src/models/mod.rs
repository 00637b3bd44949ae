//! Request and Response models for the operator API
//!
//! DTOs used for serializing/deserializing HTTP request and response bodies.

pub mod requests;
pub mod responses;

// Re-export commonly used types
pub use requests::SetRequest;
pub use responses::{
    BackoffResponse, CircuitsResponse, ClearResponse, DeleteResponse, ErrorTypeOutcomes,
    GetResponse, HealthResponse, ResetResponse, SetResponse, StatsResponse,
};
