//! Tolerant environment-variable parsing.
//!
//! Every configuration knob is an env-shaped scalar with a documented
//! default. An unparsable value falls back to the default with a warning;
//! it never aborts startup.

use std::time::Duration;

use tracing::warn;

pub fn env_string(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|raw| !raw.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

pub fn env_u64(name: &str, default: u64) -> u64 {
    parse_env(name, default)
}

pub fn env_u32(name: &str, default: u32) -> u32 {
    parse_env(name, default)
}

pub fn env_usize(name: &str, default: usize) -> usize {
    parse_env(name, default)
}

pub fn env_f64(name: &str, default: f64) -> f64 {
    parse_env(name, default)
}

/// Reads a millisecond-valued variable as a `Duration`.
pub fn env_duration_ms(name: &str, default_ms: u64) -> Duration {
    Duration::from_millis(env_u64(name, default_ms))
}

fn parse_env<T: std::str::FromStr + Copy>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(raw) => match raw.trim().parse::<T>() {
            Ok(value) => value,
            Err(_) => {
                warn!(var = name, value = %raw, "invalid value, using default");
                default
            }
        },
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, MutexGuard, OnceLock};

    fn env_guard() -> MutexGuard<'static, ()> {
        static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        LOCK.get_or_init(|| Mutex::new(()))
            .lock()
            .unwrap_or_else(|err| err.into_inner())
    }

    #[test]
    fn missing_vars_use_defaults() {
        let _guard = env_guard();
        unsafe {
            std::env::remove_var("INV_TEST_MISSING");
        }
        assert_eq!(env_u64("INV_TEST_MISSING", 42), 42);
        assert_eq!(env_string("INV_TEST_MISSING", "dft"), "dft");
    }

    #[test]
    fn invalid_values_fall_back() {
        let _guard = env_guard();
        unsafe {
            std::env::set_var("INV_TEST_BAD", "not-a-number");
        }
        assert_eq!(env_u64("INV_TEST_BAD", 7), 7);
        unsafe {
            std::env::remove_var("INV_TEST_BAD");
        }
    }

    #[test]
    fn valid_values_parse() {
        let _guard = env_guard();
        unsafe {
            std::env::set_var("INV_TEST_OK", "250");
        }
        assert_eq!(env_u64("INV_TEST_OK", 1), 250);
        assert_eq!(env_duration_ms("INV_TEST_OK", 1), Duration::from_millis(250));
        unsafe {
            std::env::remove_var("INV_TEST_OK");
        }
    }
}
