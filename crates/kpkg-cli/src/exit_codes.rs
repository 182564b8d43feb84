//! Standard exit codes for CLI operations
//!
//! These exit codes follow Unix conventions and sysexits.h where applicable.

/// Success - operation completed without errors
#[allow(dead_code)]
pub const SUCCESS: i32 = 0;

/// General error - unspecified failure
pub const ERROR: i32 = 1;

/// Invalid argument - the request was rejected before touching the cluster
pub const INVALID_ARGUMENT: i32 = 2;

/// Not found - the package, install or repository does not exist
pub const NOT_FOUND: i32 = 3;

/// Access error - the cluster denied or could not authenticate the request
pub const ACCESS_ERROR: i32 = 4;

/// Conflict - the object exists already or is busy reconciling
pub const CONFLICT: i32 = 5;

/// Cluster error - the cluster could not be reached
pub const CLUSTER_ERROR: i32 = 69;

/// Config error - the plugin configuration file is invalid (sysexits EX_CONFIG)
pub const CONFIG_ERROR: i32 = 78;
