//! Global bypass switches
//!
//! Two independent ways to take every breaker out of the request path, both
//! consulted on each `perform` call:
//!
//! - **Kill switch**: an environment variable read fresh every time
//! - **Feature toggle**: an external boolean gate ([`FeatureToggle`])

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::constants::KILL_SWITCH_ENV;

/// External gate enabling or disabling all breakers
pub trait FeatureToggle: Send + Sync {
    fn breaker_enabled(&self) -> bool;
}

/// Toggle that never disables the breaker
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysEnabled;

impl FeatureToggle for AlwaysEnabled {
    fn breaker_enabled(&self) -> bool {
        true
    }
}

/// Toggle flipped at runtime (admin endpoint, config reload, tests)
#[derive(Debug)]
pub struct RuntimeToggle {
    enabled: AtomicBool,
}

impl RuntimeToggle {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }
}

impl FeatureToggle for RuntimeToggle {
    fn breaker_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }
}

/// Environment override forcing every breaker closed
#[derive(Debug, Clone)]
pub struct KillSwitch {
    env_var: String,
}

impl KillSwitch {
    pub fn from_env(env_var: impl Into<String>) -> Self {
        Self {
            env_var: env_var.into(),
        }
    }

    /// Reads the variable on every call; `1`, `true`, `yes` and `on` engage it
    pub fn engaged(&self) -> bool {
        std::env::var(&self.env_var)
            .map(|value| {
                matches!(
                    value.trim().to_ascii_lowercase().as_str(),
                    "1" | "true" | "yes" | "on"
                )
            })
            .unwrap_or(false)
    }
}

impl Default for KillSwitch {
    fn default() -> Self {
        Self::from_env(KILL_SWITCH_ENV)
    }
}

/// Kill switch plus feature toggle, shared by all breakers of a registry
#[derive(Clone)]
pub struct BreakerSwitches {
    kill_switch: KillSwitch,
    toggle: Arc<dyn FeatureToggle>,
}

impl BreakerSwitches {
    pub fn new(kill_switch: KillSwitch, toggle: Arc<dyn FeatureToggle>) -> Self {
        Self {
            kill_switch,
            toggle,
        }
    }

    /// True when operations should run without consulting the breaker
    pub fn bypass(&self) -> bool {
        self.kill_switch.engaged() || !self.toggle.breaker_enabled()
    }
}

impl Default for BreakerSwitches {
    fn default() -> Self {
        Self::new(KillSwitch::default(), Arc::new(AlwaysEnabled))
    }
}

impl std::fmt::Debug for BreakerSwitches {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BreakerSwitches")
            .field("kill_switch", &self.kill_switch)
            .field("breaker_enabled", &self.toggle.breaker_enabled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kill_switch_unset_is_disengaged() {
        let switch = KillSwitch::from_env("STORAGE_CIRCUIT_TEST_UNSET_SWITCH");
        assert!(!switch.engaged());
    }

    #[test]
    fn test_kill_switch_is_read_fresh_each_call() {
        let var = "STORAGE_CIRCUIT_TEST_FRESH_SWITCH";
        let switch = KillSwitch::from_env(var);

        std::env::set_var(var, "true");
        assert!(switch.engaged());

        std::env::set_var(var, "0");
        assert!(!switch.engaged());

        std::env::remove_var(var);
        assert!(!switch.engaged());
    }

    #[test]
    fn test_kill_switch_accepts_common_truthy_values() {
        let var = "STORAGE_CIRCUIT_TEST_TRUTHY_SWITCH";
        let switch = KillSwitch::from_env(var);
        for value in ["1", "TRUE", "yes", " on "] {
            std::env::set_var(var, value);
            assert!(switch.engaged(), "{:?} should engage", value);
        }
        std::env::remove_var(var);
    }

    #[test]
    fn test_runtime_toggle_disables_breakers() {
        let toggle = Arc::new(RuntimeToggle::new(true));
        let switches = BreakerSwitches::new(
            KillSwitch::from_env("STORAGE_CIRCUIT_TEST_TOGGLE_SWITCH"),
            toggle.clone(),
        );
        assert!(!switches.bypass());

        toggle.set_enabled(false);
        assert!(switches.bypass());
    }
}
