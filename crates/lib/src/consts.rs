//! Product and host-application constants baked into every build.

/// Directory name of the host application under the per-user data roots.
pub const HOST_APP_DIR: &str = "REAPER";

/// Subdirectory the host scans for plugin binaries.
pub const HOST_PLUGIN_SUBDIR: &str = "UserPlugins";

/// Default stem of the plugin file name (`<stem>_<tag>_<arch>.<ext>`).
pub const DEFAULT_PRODUCT: &str = "reaper_livepresets";

/// Feature macro defined by the extended variant.
pub const EXTENDED_MACRO: &str = "LPE_ULTIMATE";

/// Metadata macro carrying the VCS describe string.
pub const BUILD_VERSION_MACRO: &str = "BUILD_VERSION";

/// Metadata macro carrying the build date.
pub const BUILD_DATE_MACRO: &str = "BUILD_DATE";

/// Name of the optional project configuration file.
pub const CONFIG_FILENAME: &str = "plugbuild.toml";

/// Environment variable that selects the facet when no flag is given.
pub const FACET_ENV: &str = "PLUGBUILD_FACET";

/// Suffix of the fingerprint sidecar written next to each output.
pub const FINGERPRINT_EXT: &str = "fp";

/// Length of the hex digest stored in fingerprint sidecars.
pub const FINGERPRINT_LEN: usize = 64;
