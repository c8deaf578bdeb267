//! Shared UI icons and emojis.
//!
//! Each icon falls back to a plain ASCII tag on terminals without emoji support.

use console::Emoji;

// Status indicators
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "[OK]");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "[ERR]");
pub static SPARKLE: Emoji<'_, '_> = Emoji("✨ ", "*");

// Connection indicators
pub static LINK: Emoji<'_, '_> = Emoji("🔗 ", "[LIVE]");
pub static RETRY: Emoji<'_, '_> = Emoji("🔄 ", "[RETRY]");
pub static POLL: Emoji<'_, '_> = Emoji("📡 ", "[POLL]");

// Progress indicators
pub static PROGRESS: Emoji<'_, '_> = Emoji("📊 ", "[PROG]");
pub static CLOCK: Emoji<'_, '_> = Emoji("⏱️  ", "[T]");
pub static REPORT: Emoji<'_, '_> = Emoji("📄 ", "");
