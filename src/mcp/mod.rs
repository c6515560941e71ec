//! Model Context Protocol (MCP) server installation support
//!
//! Everything needed to take the address of an OAuth-protected MCP server
//! and end up with a bearer token the chat client can present to it.

pub mod auth;
