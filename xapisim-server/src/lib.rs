//! # xapisim Server
//!
//! Serves the simulated XenAPI as XML-RPC over HTTP. Every call is a
//! `POST /` whose response is the XenAPI envelope struct
//! (`Status`/`Value`/`ErrorDescription`).

pub mod cli;
pub mod config;
pub mod server;
pub mod xmlrpc;
