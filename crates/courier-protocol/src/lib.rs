//! # courier-protocol
//!
//! Wire protocol definitions for the Courier realtime messaging relay.
//!
//! This crate defines the event frames exchanged between Courier clients
//! and servers, the binary codec, and protocol versioning.
//!
//! ## Frame Types
//!
//! - `Authenticate` / `Authenticated` / `AuthError` - Login handshake
//! - `GetOnlineStatus` / `OnlineStatus` - Presence queries
//! - `UserOnline` / `UserOffline` - Presence broadcasts
//! - `SendMessage` / `ReceiveMessage` / `MessageDelivered` / `MessageError` -
//!   Point-to-point delivery
//! - `TypingStart` / `TypingStop` - Ephemeral typing indicators
//!
//! ## Example
//!
//! ```rust
//! use courier_protocol::{Frame, codec};
//!
//! let frame = Frame::authenticate("secret-token");
//!
//! // Encode and decode
//! let encoded = codec::encode(&frame).unwrap();
//! let decoded = codec::decode(&encoded).unwrap();
//! ```

pub mod codec;
pub mod frames;
pub mod version;

pub use codec::{decode, encode, ProtocolError};
pub use frames::{Frame, FrameKind, MessageId};
pub use version::{Version, PROTOCOL_VERSION};
