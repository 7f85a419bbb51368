//! Protocol constants shared by server and client.

/// Room every session belongs to before its first `join`.
pub const DEFAULT_ROOM: &str = "general";

/// Username assigned until the client identifies.
pub const ANONYMOUS_USERNAME: &str = "Anonymous";

/// Action assumed when an inbound envelope omits `action`.
pub const DEFAULT_ACTION: &str = "message";

/// Body of the `connected` greeting.
pub const CONNECTED_GREETING: &str = "Connected to chat server";

/// Reply sent when an unidentified session tries to post.
pub const IDENTIFY_FIRST: &str = "Please identify yourself first";

/// Author fields stamped on system notices.
pub const SYSTEM_USER_ID: &str = "system";
/// Display name stamped on system notices.
pub const SYSTEM_USERNAME: &str = "System";

/// Page size used by `history` when the caller omits `limit`.
pub const DEFAULT_HISTORY_LIMIT: u32 = 50;

/// Largest page `history` will serve.
pub const MAX_HISTORY_LIMIT: u32 = 100;
