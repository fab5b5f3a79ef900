use crate::config::DeploymentConfig;

/// Builds the shareable connection URI for one client:
/// `vless://<client_id>@<host>:<port>?encryption=none&security=tls&type=tcp#<tag>-<label>`.
#[must_use]
pub fn connection_uri(config: &DeploymentConfig, client_id: &str, label: &str) -> String {
    format!(
        "vless://{client_id}@{host}:{port}?encryption=none&security=tls&type=tcp#{tag}-{label}",
        host = config.public_host,
        port = config.public_port,
        tag = config.profile_tag,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uri_matches_client_format() {
        let config = DeploymentConfig::default();
        assert_eq!(
            connection_uri(&config, "0f8fad5b-d9cb-469f-a165-70867728950e", "tg_42"),
            "vless://0f8fad5b-d9cb-469f-a165-70867728950e@vpn.example.com:443\
             ?encryption=none&security=tls&type=tcp#NixVPN-tg_42"
        );
    }

    #[test]
    fn test_uri_uses_deployment_settings() {
        let config = DeploymentConfig {
            public_host: "edge.example.net".to_string(),
            public_port: 8443,
            profile_tag: "Edge".to_string(),
            ..DeploymentConfig::default()
        };
        let uri = connection_uri(&config, "abc", "tg_7");
        assert!(uri.starts_with("vless://abc@edge.example.net:8443?"));
        assert!(uri.ends_with("#Edge-tg_7"));
    }
}
