//! Tracing setup for tools embedding the verifier

use tracing::Level;

/// Install a fmt subscriber. Returns false if one was already installed.
pub fn init_tracing(debug: bool) -> bool {
    let level = if debug { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_harmless() {
        init_tracing(true);
        assert!(!init_tracing(false));
    }
}
