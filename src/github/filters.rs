//! Commit filters that keep dashboard bot activity out of the statistics

/// Author names used by the dashboard automation
const BOT_AUTHORS: [&str; 4] = ["Cosmic-Bot", "cosmic-bot", "github-actions[bot]", "github-actions"];

/// Commit message fragments produced by the dashboard automation (matched case-insensitively)
const BOT_MESSAGE_PATTERNS: [&str; 5] = [
    "update cosmic dashboard",
    "update cosmic cockpit",
    "⭐ update cosmic",
    "auto-update",
    "[skip ci]",
];

/// Paths the dashboard itself writes to
const DASHBOARD_PATHS: [&str; 4] = ["README.md", "assets/", "dist/", "data/"];

/// Returns true if a commit was made by the dashboard bot
pub fn is_bot_commit(message: &str, author: &str) -> bool {
    if BOT_AUTHORS.iter().any(|bot| author.contains(bot)) {
        return true;
    }
    let message = message.to_lowercase();
    BOT_MESSAGE_PATTERNS
        .iter()
        .any(|pattern| message.contains(pattern))
}

/// Returns true if every changed file belongs to the dashboard output
///
/// An empty file list is not considered dashboard-only.
pub fn is_dashboard_only_change<S: AsRef<str>>(files: &[S]) -> bool {
    !files.is_empty()
        && files.iter().all(|file| {
            let file = file.as_ref();
            DASHBOARD_PATHS
                .iter()
                .any(|path| file.starts_with(path) || file == path.trim_end_matches('/'))
        })
}
