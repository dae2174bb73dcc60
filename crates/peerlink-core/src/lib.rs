//! # PeerLink Core
//!
//! Peer handshake for blockchain node networking.
//!
//! Every new connection runs through an ordered chain of stages before the
//! application sees it:
//!
//! - [`ChannelNegotiator`]: agree on a channel and exchange declared addresses
//! - [`Authenticator`]: negotiate ECDHE or TLS transport security, upgrade the
//!   connection in place, and bind the remote's Ed25519 identity to it
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        PeerManager                              │
//! │   (one task per connection, timeout, ready queue, peer table)   │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                        HandlerChain                             │
//! │   ChannelNegotiator ──► Authenticator ──► ReadyPeer             │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                        Connection                               │
//! │   (plain ──► ECDHE record layer | TLS 1.3)                      │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod handler;
pub mod identity;
pub mod manager;
pub mod message;
pub mod packet;
pub mod peer;
pub mod suite;

pub use config::{ChannelSuites, HandshakeConfig};
pub use error::{ErrorCategory, HandshakeError, Result};
pub use handler::{Authenticator, ChannelNegotiator, Flow, HandlerChain, PeerHandler};
pub use identity::{Identity, PeerId};
pub use manager::PeerManager;
pub use message::{SecureError, SecureSuite};
pub use packet::{ControlKind, PROTO_CONTROL, Packet};
pub use peer::{Peer, PeerInfo, ReadyPeer, Rtt};
pub use suite::SuitePolicy;
