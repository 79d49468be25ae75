//! Protocol constants and tuning parameters.
//!
//! Wire-format values are fixed by the peer protocol. The timing values are
//! defaults; most of them can be overridden through [`crate::config::Config`].

use std::time::Duration;

// ============================================================================
// Client identification
// ============================================================================

/// Client ID prefix for peer ID generation (Azureus-style)
pub const CLIENT_PREFIX: &[u8; 8] = b"-CB0001-";

// ============================================================================
// Wire protocol
// ============================================================================

/// Protocol string carried in every handshake
pub const PROTOCOL: &[u8; 19] = b"BitTorrent protocol";

/// Fixed length of a handshake record
pub const HANDSHAKE_LEN: usize = 68;

/// Size of the big-endian length prefix in front of every generic message
pub const LENGTH_PREFIX: usize = 4;

/// Frames declaring more than this are treated as a broken stream
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

// ============================================================================
// Block and piece sizes
// ============================================================================

/// Standard block size (16KB)
pub const BLOCK_SIZE: u32 = 16384;

/// Inbound requests for more than this many bytes are not served
pub const MAX_REQUEST_LENGTH: u32 = 128 * 1024;

// ============================================================================
// Read buffers
// ============================================================================

/// Spare capacity reserved in a peer's accumulator before each socket read
pub const READ_CHUNK: usize = 32 * 1024;

/// Most bytes taken from one peer per tick; the rest waits in the socket
pub const MAX_READ_PER_TICK: usize = 4 * 1024 * 1024;

// ============================================================================
// Connection limits
// ============================================================================

/// Maximum live peer sessions per torrent
pub const MAX_PEERS: usize = 50;

// ============================================================================
// Timeouts
// ============================================================================

/// TCP connection timeout
pub const CONNECTION_TIMEOUT: Duration = Duration::from_secs(5);

/// Time allowed for the remote handshake to arrive after we sent ours
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Upper bound on a single socket write
pub const PEER_WRITE_TIMEOUT: Duration = Duration::from_secs(30);

/// Blocks left in Pending longer than this go back to Free
pub const PENDING_TIMEOUT: Duration = Duration::from_secs(5);

/// A piece is not requested again within this window
pub const REREQUEST_WINDOW: Duration = Duration::from_secs(4);

/// Minimum gap between two requests scheduled on the same peer
pub const MIN_REQUEST_INTERVAL: Duration = Duration::ZERO;

/// Scheduler tick for the manager and engine loops
pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

// ============================================================================
// Named-data transport
// ============================================================================

/// Name prefix registered with the named-data daemon
pub const NDN_PREFIX: &str = "ccnx:/BitTorrent";

/// CUBIC scaling constant
pub const CUBIC_C: f64 = 0.4;

/// CUBIC multiplicative decrease factor
pub const CUBIC_BETA: f64 = 0.7;

/// Slow-start threshold a fresh controller starts with
pub const INITIAL_SSTHRESH: f64 = 64.0;

/// RTT estimate before the first matched response
pub const INITIAL_RTT: Duration = Duration::from_millis(100);

/// How long one receive call on the named-data face may block
pub const NDN_RECEIVE_TIMEOUT: Duration = Duration::from_secs(1);
