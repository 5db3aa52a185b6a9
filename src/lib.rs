//! # Switchyard
//!
//! `switchyard` is the messaging core of a middleware that connects proxies
//! (consumers) with providers through request/reply, fire-and-forget
//! requests, attribute and broadcast subscriptions, and multicasts.
//!
//! ## Core Modules
//!
//! The library is structured into several modules, each with a distinct responsibility:
//!
//! - `message`: Mutable and immutable messages, message types and messaging QoS.
//! - `payload`: The typed operations carried in message payloads and their JSON codec.
//! - `factory`: Builds messages from operations, applying expiry and header rules.
//! - `sender`: Sends operations through a router and registers reply callers.
//! - `dispatcher`: Demultiplexes received messages onto the local parties handling them.
//! - `publication`: Provider-side subscription lifecycle, publishing and persistence.
//! - `subscription`: Consumer-side subscription callbacks.
//! - `provider`: The request caller, interpreter and listener seams of a provider.
//! - `router`: In-process message routing between dispatchers.
//! - `persistence`: Durable storage for outstanding subscription requests.
//! - `config`: Handles loading and managing runtime configuration.
//! - `utils`: Contains shared utilities, such as error handling, logging and time.

pub mod config;
pub mod dispatcher;
pub mod factory;
pub mod message;
pub mod payload;
pub mod persistence;
pub mod provider;
pub mod publication;
pub mod router;
pub mod sender;
pub mod subscription;
pub mod utils;
