//! # Chat Hub Library
//!
//! This crate provides a real-time chat backend with:
//! - A WebSocket gateway fanning domain events out to connected clients
//! - An in-process event bus between the command pipeline and the hub
//! - A RESTful HTTP API for queries and commands
//! - PostgreSQL or in-memory persistence behind one store trait
//!
//! ## Architecture
//!
//! - **Domain Layer**: Entities, domain events, store traits
//! - **Application Layer**: Event bus, command and query services, DTOs
//! - **Infrastructure Layer**: PostgreSQL and in-memory stores, metrics
//! - **Presentation Layer**: HTTP handlers, the hub and WebSocket gateway
//!
//! ## Module Structure
//!
//! ```text
//! chat_hub/
//! +-- config/         Configuration management
//! +-- domain/         Entities, events, store traits
//! +-- application/    Event bus, services and DTOs
//! +-- infrastructure/ Stores and metrics
//! +-- presentation/   HTTP routes, hub and WebSocket handlers
//! +-- shared/         Common error type
//! ```

// Configuration module
pub mod config;

// Domain layer - Core business logic
pub mod domain;

// Application layer - Business services
pub mod application;

// Infrastructure layer - External implementations
pub mod infrastructure;

// Presentation layer - HTTP and WebSocket handlers
pub mod presentation;

// Shared utilities
pub mod shared;

// Application startup and state management
pub mod startup;

// Telemetry and observability
pub mod telemetry;
