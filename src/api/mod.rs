//! API Module
//!
//! HTTP handlers and routing for the operator API.
//!
//! # Endpoints
//! - `PUT /set` - Store a key-value pair
//! - `GET /get/:key` - Retrieve a value by key
//! - `DELETE /del/:key` - Delete a key
//! - `DELETE /cache` - Clear every level
//! - `GET /stats` - Get cache statistics
//! - `POST /stats/reset` - Zero the statistics counters
//! - `GET /circuits` - List circuit breakers
//! - `GET /circuits/:name` - One circuit breaker
//! - `POST /circuits/reset` - Close every circuit breaker
//! - `GET /health` - Health check endpoint

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
