//! Tracing setup for the venue binaries.

use tracing_subscriber::filter::{Directive, EnvFilter, LevelFilter};

/// Workspace crates that log through this subscriber.
const VENUE_CRATES: &[&str] = &["exchange", "broker", "trading_venue"];

/// Installs the global tracing subscriber.
///
/// A RUST_LOG value wins outright. Without one, the venue crates log at
/// `level` and everything else, sqlx's per-query chatter included, is capped
/// at warn.
pub fn init_tracing(level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(venue_filter(level))
        .init();
}

fn venue_filter(level: &str) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }

    VENUE_CRATES
        .iter()
        .filter_map(|crate_name| format!("{crate_name}={level}").parse::<Directive>().ok())
        .fold(
            EnvFilter::default().add_directive(LevelFilter::WARN.into()),
            |filter, directive| filter.add_directive(directive),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_raises_venue_crates_and_caps_the_rest() {
        // Clear env var so the built-in default applies
        std::env::remove_var("RUST_LOG");

        let rendered = venue_filter("debug").to_string();

        for crate_name in VENUE_CRATES {
            assert!(rendered.contains(&format!("{crate_name}=debug")), "{rendered}");
        }
        assert!(rendered.contains("warn"), "{rendered}");
    }

    #[test]
    fn garbage_levels_still_leave_the_global_cap() {
        std::env::remove_var("RUST_LOG");

        let rendered = venue_filter("no-such-level").to_string();

        assert!(rendered.contains("warn"), "{rendered}");
        assert!(!rendered.contains("exchange"), "{rendered}");
    }
}
