// Structured query API (GraphQL over HTTP, API-key authenticated).

pub mod client;

pub use client::QueryClient;
