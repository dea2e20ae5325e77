/// Literal third segment of a push-channel topic carrying resource sync traffic.
pub const SYNC_MARKER: &str = "sync";

/// Exact number of `/`-separated segments in a sync topic.
pub const TOPIC_SEGMENT_COUNT: usize = 5;

/// Server-id sentinel for resources that have not been assigned an id yet.
pub const NO_SERVER_ID: i64 = 0;

/// Folder hierarchies are fixed at three levels: root, medial, terminal.
pub const FOLDER_MAX_DEPTH: usize = 3;

/// Default time-to-live for outstanding-request entries, in seconds.
///
/// Bounds tracker growth when a push notification is dropped and the echo
/// for a local write never arrives.
pub const DEFAULT_ECHO_TTL_SECS: u64 = 300;

/// Default channel prefix for sync topics.
pub const DEFAULT_CHANNEL_PREFIX: &str = "bot";

/// Config file name under the platform config directory.
pub const CONFIG_FILE: &str = "fieldlink/config.toml";

/// Snapshot schema version written to disk.
pub const SNAPSHOT_VERSION: u32 = 1;
