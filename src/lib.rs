pub mod client;
pub mod configuration;
pub mod mcp;
pub mod routes;
pub mod startup;
pub mod telemetry;
