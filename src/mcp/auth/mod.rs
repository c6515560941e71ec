//! MCP resource installation and OAuth 2.0 / OIDC authorization
//!
//! This module discovers OAuth-protected MCP resources, registers this
//! client with their authorization servers, and runs the PKCE authorization
//! code flow on behalf of a browser session.
//!
//! # Module Layout
//!
//! - [`discovery`]    -- RFC 9728 protected resource metadata and RFC 8414 /
//!   OIDC authorization server discovery
//! - [`registration`] -- RFC 7591 dynamic client registration
//! - [`scopes`]       -- Scope negotiation
//! - [`orchestrator`] -- Streamed discovery and registration with fallback
//! - [`pkce`]         -- PKCE `S256` verifier and challenge generation
//! - [`flow`]         -- Authorization code flow with PKCE
//! - [`tokens`]       -- Token sets and token endpoint responses
//! - [`store`]        -- Server-side session store
//! - [`manager`]      -- High-level façade coordinating all sub-modules

pub mod discovery;
pub mod flow;
pub mod manager;
pub mod orchestrator;
pub mod pkce;
pub mod registration;
pub mod scopes;
pub mod store;
pub mod tokens;
