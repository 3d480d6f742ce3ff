pub(super) fn has_header(headers: &[(String, String)], name: &str) -> bool {
    headers.iter().any(|(k, _)| k.eq_ignore_ascii_case(name))
}

pub(super) fn host_header_value(target: &url::Url) -> Option<String> {
    let host = target.host_str()?;
    Some(match target.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

/// True when any error in the source chain is an OS-level connection refusal.
pub(super) fn is_connection_refused(err: &(dyn std::error::Error + 'static)) -> bool {
    std::iter::successors(Some(err), |e| e.source()).any(|e| {
        e.downcast_ref::<std::io::Error>()
            .is_some_and(|io| io.kind() == std::io::ErrorKind::ConnectionRefused)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct ConnectFailed(std::io::Error);

    impl std::fmt::Display for ConnectFailed {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str("connect failed")
        }
    }

    impl std::error::Error for ConnectFailed {
        fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
            Some(&self.0)
        }
    }

    #[test]
    fn refusal_is_found_behind_wrappers() {
        let refused = ConnectFailed(std::io::ErrorKind::ConnectionRefused.into());
        assert!(is_connection_refused(&refused));

        let reset = ConnectFailed(std::io::ErrorKind::ConnectionReset.into());
        assert!(!is_connection_refused(&reset));
    }

    #[test]
    fn host_header_keeps_explicit_port() {
        let u = url::Url::parse("http://gateway.local:30080/").unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(host_header_value(&u).as_deref(), Some("gateway.local:30080"));

        let u = url::Url::parse("http://gateway.local/").unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(host_header_value(&u).as_deref(), Some("gateway.local"));
    }
}
