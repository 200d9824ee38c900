/// Re-export `Config` from `guildpulse-core` for use within this crate.
///
/// Environment parsing lives in `guildpulse-core` so the Discord and Sheets
/// crates read the same settings without depending on the server.
pub use guildpulse_core::config::Config;
