//! # courier-core
//!
//! Shared building blocks for the Courier messaging relay.
//!
//! This crate provides the pieces both SDK halves are assembled from:
//!
//! - **Dispatcher** - Named-event publish/subscribe primitive
//! - **Registry** - Dual-indexed store of live server sessions
//! - **Session** - Per-connection handle with auth state and outbound queue
//! - **User** - Authenticated identity bound to one live session
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐     ┌────────────┐     ┌────────────┐
//! │ Connection │────▶│  Session   │◀───▶│  Registry  │
//! └────────────┘     └────────────┘     └────────────┘
//!                          │
//!                          ▼
//!                    ┌────────────┐
//!                    │ Dispatcher │
//!                    └────────────┘
//! ```

pub mod dispatcher;
pub mod message;
pub mod registry;
pub mod session;
pub mod user;

pub use dispatcher::{Dispatcher, HandlerError, SubscriptionId};
pub use message::{generate_message_id, now_millis, MessageId};
pub use registry::{Registry, RegistryError};
pub use session::{FrameListener, Session, SessionCommand, SessionId};
pub use user::User;
