use serde_json::Value;

use crate::error::{Error, Result};

/// Validity rule for successful (200) response bodies.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum BodyCheck {
    /// Any 200 counts as success.
    #[default]
    None,

    /// Body must parse as JSON; every `require` path must hold a truthy value and every
    /// `equals` path must hold exactly the given value. Paths are dot separated and
    /// numeric segments index arrays (`backends.0.hostname`).
    Json {
        require: Vec<String>,
        equals: Vec<(String, Value)>,
    },
}

/// Result of inspecting one response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BodyVerdict {
    pub valid: bool,
    /// Retry count reported by the gateway, if any.
    pub retries: u64,
}

impl BodyCheck {
    /// Checks the built-in gateway emulator response shape.
    pub fn gateway() -> Self {
        BodyCheck::Json {
            require: vec!["worker".to_string(), "gateway".to_string()],
            equals: vec![("status".to_string(), Value::String("ok".to_string()))],
        }
    }

    #[must_use]
    pub fn with_required(self, fields: impl IntoIterator<Item = String>) -> Self {
        match self {
            BodyCheck::None => BodyCheck::Json {
                require: fields.into_iter().collect(),
                equals: Vec::new(),
            },
            BodyCheck::Json {
                mut require,
                equals,
            } => {
                for f in fields {
                    if !require.contains(&f) {
                        require.push(f);
                    }
                }
                BodyCheck::Json { require, equals }
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        let BodyCheck::Json { require, equals } = self else {
            return Ok(());
        };
        for path in require.iter().chain(equals.iter().map(|(p, _)| p)) {
            if path.is_empty() || path.split('.').any(str::is_empty) {
                return Err(Error::InvalidBodyCheck(format!("invalid field path `{path}`")));
            }
        }
        Ok(())
    }

    /// Never fails: unparseable bodies are simply invalid.
    pub fn evaluate(&self, body: &[u8]) -> BodyVerdict {
        let parsed = serde_json::from_slice::<Value>(body).ok();
        let retries = parsed.as_ref().map(retries_of).unwrap_or(0);

        let valid = match self {
            BodyCheck::None => true,
            BodyCheck::Json { require, equals } => parsed.as_ref().is_some_and(|doc| {
                require.iter().all(|p| lookup(doc, p).is_some_and(truthy))
                    && equals.iter().all(|(p, want)| lookup(doc, p) == Some(want))
            }),
        };

        BodyVerdict { valid, retries }
    }
}

fn retries_of(doc: &Value) -> u64 {
    match doc.get("retries") {
        Some(Value::Number(n)) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f > 0.0).map(|f| f as u64))
            .unwrap_or(0),
        _ => 0,
    }
}

fn lookup<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(doc, |cur, seg| match cur {
        Value::Object(map) => map.get(seg),
        Value::Array(items) => seg.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

fn truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OK_BODY: &[u8] =
        br#"{"status":"ok","gateway":"gw-1","worker":"w-3","backend":{"hostname":"pod-a"},"retries":2}"#;

    #[test]
    fn none_accepts_anything_but_still_reads_retries() {
        let v = BodyCheck::None.evaluate(OK_BODY);
        assert!(v.valid);
        assert_eq!(v.retries, 2);

        let v = BodyCheck::None.evaluate(b"<html>bad gateway</html>");
        assert!(v.valid);
        assert_eq!(v.retries, 0);
    }

    #[test]
    fn gateway_check_accepts_healthy_body() {
        assert!(BodyCheck::gateway().evaluate(OK_BODY).valid);
    }

    #[test]
    fn gateway_check_rejects_incomplete_bodies() {
        let check = BodyCheck::gateway();
        for body in [
            &br#"{"status":"degraded","gateway":"gw","worker":"w"}"#[..],
            br#"{"status":"ok","gateway":"gw","worker":""}"#,
            br#"{"status":"ok","gateway":"gw"}"#,
            b"not json",
            b"",
        ] {
            assert!(!check.evaluate(body).valid, "accepted {:?}", String::from_utf8_lossy(body));
        }
    }

    #[test]
    fn nested_and_indexed_paths() {
        let check = BodyCheck::None.with_required(["backend.hostname".to_string()]);
        assert!(check.evaluate(OK_BODY).valid);

        let arr = BodyCheck::None.with_required(["pods.1.ready".to_string()]);
        assert!(arr.evaluate(br#"{"pods":[{"ready":false},{"ready":true}]}"#).valid);
        assert!(!arr.evaluate(br#"{"pods":[{"ready":true}]}"#).valid);
    }

    #[test]
    fn non_positive_or_non_numeric_retries_are_zero() {
        for body in [
            &br#"{"retries":0}"#[..],
            br#"{"retries":-3}"#,
            br#"{"retries":"2"}"#,
            br#"[1,2]"#,
        ] {
            assert_eq!(BodyCheck::None.evaluate(body).retries, 0);
        }
    }

    #[test]
    fn empty_path_segments_are_rejected() {
        let check = BodyCheck::None.with_required(["backend..hostname".to_string()]);
        assert!(matches!(check.validate(), Err(Error::InvalidBodyCheck(_))));
        assert!(BodyCheck::gateway().validate().is_ok());
    }
}
