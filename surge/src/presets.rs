use surge_core::PlanOptions;

use crate::plan_yaml;

/// Built-in plans, embedded at compile time.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum, strum::Display, strum::EnumIter,
)]
#[strum(serialize_all = "kebab-case")]
pub enum Preset {
    RollingUpdate,
    GracefulShutdown,
    GatewayRetry,
    Basic,
    Spike,
    Stress,
    Soak,
}

impl Preset {
    pub fn yaml(self) -> &'static str {
        match self {
            Self::RollingUpdate => include_str!("../presets/rolling-update.yaml"),
            Self::GracefulShutdown => include_str!("../presets/graceful-shutdown.yaml"),
            Self::GatewayRetry => include_str!("../presets/gateway-retry.yaml"),
            Self::Basic => include_str!("../presets/basic.yaml"),
            Self::Spike => include_str!("../presets/spike.yaml"),
            Self::Stress => include_str!("../presets/stress.yaml"),
            Self::Soak => include_str!("../presets/soak.yaml"),
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::RollingUpdate => "warmup 5 VUs, rolling_update 20 VUs for 90s, cooldown 5 VUs",
            Self::GracefulShutdown => "ramp to 10, hold 20 VUs for 2m, ramp down",
            Self::GatewayRetry => "ramp to 10, hold 20 VUs for 90s with the gateway body check",
            Self::Basic => "10 VUs for 30s",
            Self::Spike => "5 VUs, sudden burst to 200, back to 5",
            Self::Stress => "step up to 100 VUs and hold",
            Self::Soak => "30 VUs for 5m",
        }
    }

    pub fn load(self) -> anyhow::Result<PlanOptions> {
        plan_yaml::parse_plan(self.yaml().as_bytes(), &format!("preset {self}"))
    }
}

pub fn render_list() -> String {
    use std::fmt::Write as _;
    use strum::IntoEnumIterator as _;

    let mut out = String::new();
    for p in Preset::iter() {
        writeln!(out, "{:<18} {}", p.to_string(), p.description()).ok();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator as _;
    use surge_core::{RunConfig, ScenarioExecutor, resolve_plan};

    fn resolve(p: Preset) -> surge_core::RunPlan {
        let opts = p.load().unwrap_or_else(|e| panic!("{p}: {e:#}"));
        resolve_plan(
            opts,
            RunConfig {
                target: Some("http://localhost:8080/".to_string()),
                ..RunConfig::default()
            },
        )
        .unwrap_or_else(|e| panic!("{p}: {e}"))
    }

    #[test]
    fn every_preset_resolves() {
        for p in Preset::iter() {
            let plan = resolve(p);
            assert!(!plan.scenarios.is_empty(), "{p}");
            assert!(!plan.total_duration().is_zero(), "{p}");
        }
    }

    #[test]
    fn rolling_update_runs_three_scenarios_back_to_back() {
        let plan = resolve(Preset::RollingUpdate);
        let names: Vec<&str> = plan.scenarios.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["warmup", "rolling_update", "cooldown"]);
        assert_eq!(plan.total_duration().as_secs(), 120);
        assert_eq!(plan.pause.as_millis(), 300);
        assert!(
            matches!(plan.scenarios[1].executor, ScenarioExecutor::ConstantVus { vus: 20, .. })
        );
        assert!(plan.scenarios[1].note.as_deref().is_some_and(|n| n.starts_with("TRIGGER")));
        assert_eq!(plan.thresholds.len(), 2);
    }

    #[test]
    fn preset_names_are_kebab_case() {
        assert_eq!(Preset::GatewayRetry.to_string(), "gateway-retry");
        assert!(render_list().lines().any(|l| l.starts_with("rolling-update ")));
    }
}
