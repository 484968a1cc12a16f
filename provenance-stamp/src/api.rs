// Interface contract. Shared verbatim with build.rs through `include!`.

/// Major version of the public interface.
pub const API_VERSION_MAJOR: u8 = 0;
/// Minor version of the public interface.
pub const API_VERSION_MINOR: u8 = 11;
