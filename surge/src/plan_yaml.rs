use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use anyhow::Context as _;
use serde::Deserialize;
use surge_core::{
    BodyCheck, Phase, PlanOptions, Ramp, ScenarioOptions, ThresholdSet, parse_threshold_metric_key,
};

/// Plan document. Either a flat single scenario (`vus`/`duration` or `stages`) or a
/// `scenarios` list.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct PlanYaml {
    target: Option<String>,

    #[serde(default)]
    timeout: Option<YamlDuration>,

    /// Sleep between requests of one VU.
    #[serde(default)]
    pause: Option<YamlDuration>,

    #[serde(default, deserialize_with = "deserialize_tags")]
    headers: BTreeMap<String, String>,

    check: Option<CheckYaml>,

    vus: Option<u64>,

    #[serde(default)]
    duration: Option<YamlDuration>,

    /// Flat ramping plans start from zero VUs.
    #[serde(default)]
    stages: Vec<StageYaml>,

    #[serde(default)]
    scenarios: Vec<ScenarioYaml>,

    #[serde(default)]
    thresholds: BTreeMap<String, ThresholdExprYaml>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ScenarioYaml {
    name: String,

    /// constant-vus | ramping-vus
    executor: Option<String>,

    #[serde(default, deserialize_with = "deserialize_tags")]
    tags: BTreeMap<String, String>,

    vus: Option<u64>,

    #[serde(default)]
    duration: Option<YamlDuration>,

    #[serde(rename = "startVUs")]
    start_vus: Option<u64>,

    #[serde(default)]
    stages: Vec<StageYaml>,

    #[serde(default)]
    start_time: Option<YamlDuration>,

    /// Logged when the scenario starts.
    note: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct StageYaml {
    name: Option<String>,

    #[serde(default)]
    duration: YamlDuration,

    target: u64,

    /// linear (default) | instant
    ramp: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum CheckYaml {
    /// `none` or `gateway`.
    Named(String),
    Json {
        #[serde(default)]
        require: Vec<String>,
        #[serde(default)]
        equals: BTreeMap<String, serde_json::Value>,
    },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum ThresholdExprYaml {
    One(String),
    Many(Vec<String>),
}

#[derive(Debug, Clone, Copy, Default)]
struct YamlDuration(Duration);

impl<'de> Deserialize<'de> for YamlDuration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct V;

        impl serde::de::Visitor<'_> for V {
            type Value = YamlDuration;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("duration as string (e.g. 10s), integer seconds, or float seconds")
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(YamlDuration(Duration::from_secs(v)))
            }

            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                u64::try_from(v)
                    .map(|v| YamlDuration(Duration::from_secs(v)))
                    .map_err(|_| E::custom("duration must not be negative"))
            }

            fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Duration::try_from_secs_f64(v)
                    .map(YamlDuration)
                    .map_err(|_| E::custom("duration must be a finite, non-negative number"))
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                humantime::parse_duration(v.trim())
                    .map(YamlDuration)
                    .map_err(E::custom)
            }
        }

        deserializer.deserialize_any(V)
    }
}

fn deserialize_tags<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = BTreeMap::<String, serde_yaml::Value>::deserialize(deserializer)?;
    let mut out = BTreeMap::new();

    for (k, v) in raw {
        let s = match v {
            serde_yaml::Value::Null => continue,
            serde_yaml::Value::Bool(b) => b.to_string(),
            serde_yaml::Value::Number(n) => n.to_string(),
            serde_yaml::Value::String(s) => s,
            _ => continue,
        };
        out.insert(k, s);
    }

    Ok(out)
}

pub fn looks_like_yaml_path(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|s| s.to_str()).map(|s| s.to_ascii_lowercase()),
        Some(ext) if ext == "yml" || ext == "yaml"
    )
}

pub async fn load_plan(path: &Path) -> anyhow::Result<PlanOptions> {
    if !looks_like_yaml_path(path) {
        anyhow::bail!("unsupported plan file `{}` (expected .yaml or .yml)", path.display());
    }
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read plan: {}", path.display()))?;
    parse_plan(&bytes, &path.display().to_string())
}

/// `origin` names the document in error messages.
pub fn parse_plan(bytes: &[u8], origin: &str) -> anyhow::Result<PlanOptions> {
    let doc: PlanYaml =
        serde_yaml::from_slice(bytes).with_context(|| format!("failed to parse YAML: {origin}"))?;
    into_plan_options(doc).with_context(|| format!("invalid plan: {origin}"))
}

fn into_plan_options(doc: PlanYaml) -> anyhow::Result<PlanOptions> {
    let scenarios = doc
        .scenarios
        .into_iter()
        .map(|s| -> anyhow::Result<ScenarioOptions> {
            Ok(ScenarioOptions {
                stages: stages(s.stages).with_context(|| format!("scenario `{}`", s.name))?,
                name: s.name,
                tags: s.tags.into_iter().collect(),
                executor: s.executor,
                vus: s.vus,
                duration: s.duration.map(|d| d.0),
                start_vus: s.start_vus,
                start_time: s.start_time.map(|d| d.0),
                note: s.note,
            })
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    Ok(PlanOptions {
        target: doc.target,
        headers: doc.headers.into_iter().collect(),
        timeout: doc.timeout.map(|d| d.0),
        pause: doc.pause.map(|d| d.0),
        check: doc.check.map(body_check).transpose()?,
        vus: doc.vus,
        duration: doc.duration.map(|d| d.0),
        stages: stages(doc.stages)?,
        scenarios,
        thresholds: thresholds(doc.thresholds)?,
    })
}

fn stages(raw: Vec<StageYaml>) -> surge_core::Result<Vec<Phase>> {
    raw.into_iter()
        .map(|s| -> surge_core::Result<Phase> {
            let ramp = match s.ramp.as_deref() {
                Some(r) => r
                    .parse::<Ramp>()
                    .map_err(|_| surge_core::Error::InvalidRamp(r.to_string()))?,
                None => Ramp::Linear,
            };
            Ok(Phase {
                name: s.name,
                duration: s.duration.0,
                target: s.target,
                ramp,
            })
        })
        .collect()
}

fn body_check(raw: CheckYaml) -> surge_core::Result<BodyCheck> {
    match raw {
        CheckYaml::Named(name) => match name.trim().to_ascii_lowercase().as_str() {
            "none" | "status" => Ok(BodyCheck::None),
            "gateway" => Ok(BodyCheck::gateway()),
            _ => Err(surge_core::Error::InvalidBodyCheck(format!(
                "unknown check `{name}` (expected `none`, `gateway`, or a {{ require, equals }} map)"
            ))),
        },
        CheckYaml::Json { require, equals } => Ok(BodyCheck::Json {
            require,
            equals: equals.into_iter().collect(),
        }),
    }
}

fn thresholds(raw: BTreeMap<String, ThresholdExprYaml>) -> surge_core::Result<Vec<ThresholdSet>> {
    raw.into_iter()
        .map(|(key, exprs)| -> surge_core::Result<ThresholdSet> {
            let (metric, tags) = parse_threshold_metric_key(&key)
                .map_err(|error| surge_core::Error::InvalidThreshold {
                    metric: key.clone(),
                    error,
                })?;
            let expressions = match exprs {
                ThresholdExprYaml::One(s) => vec![s],
                ThresholdExprYaml::Many(v) => v,
            };
            Ok(ThresholdSet {
                metric,
                tags,
                expressions,
            })
        })
        .collect()
}
