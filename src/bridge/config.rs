//! Configuration supplied through the control channel before a run.

use super::error::ControlError;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Configuration shared between the control surface and the session.
pub type SharedConfig = Arc<Mutex<SessionConfig>>;

/// A speed-test server the engine should use instead of discovering one.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ServerDescriptor {
    pub id: Option<i64>,
    pub scheme: Option<String>,
    pub domain: Option<String>,
    pub download_path: Option<String>,
    pub upload_path: Option<String>,
    pub upload_script_name: Option<String>,
    pub country_code: Option<String>,
    pub city_name: Option<String>,
}

impl ServerDescriptor {
    pub fn with_domain(domain: impl Into<String>) -> Self {
        Self {
            domain: Some(domain.into()),
            ..Self::default()
        }
    }

    /// An empty or absent domain means "no override".
    pub fn has_domain(&self) -> bool {
        self.domain.as_deref().is_some_and(|d| !d.trim().is_empty())
    }

    pub fn domain_or_empty(&self) -> &str {
        self.domain.as_deref().unwrap_or("")
    }

    /// Short location description, e.g. "Berlin, DE".
    pub fn describe(&self) -> String {
        match (self.city_name.as_deref(), self.country_code.as_deref()) {
            (Some(city), Some(cc)) => format!("{}, {}", city, cc),
            (Some(city), None) => city.to_string(),
            (None, Some(cc)) => cc.to_string(),
            (None, None) => self.domain_or_empty().to_string(),
        }
    }
}

/// Engine tuning. Every field falls back to the baseline when not supplied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TuningOptions {
    pub download_duration_ms: u64,
    pub upload_duration_ms: u64,
    pub download_thread_count: u32,
    pub upload_thread_count: u32,
    pub auxiliary_thread_count: u32,
    pub connection_timeout_ms: u64,
    pub report_results_to_provider: bool,
}

impl Default for TuningOptions {
    fn default() -> Self {
        Self {
            download_duration_ms: 7_000,
            upload_duration_ms: 7_000,
            download_thread_count: 4,
            upload_thread_count: 4,
            auxiliary_thread_count: 2,
            connection_timeout_ms: 5_000,
            report_results_to_provider: true,
        }
    }
}

/// How the engine is asked to start, chosen once per run.
#[derive(Debug, Clone, PartialEq)]
pub enum StartRequest {
    ServerWithOptions {
        server: ServerDescriptor,
        options: TuningOptions,
    },
    Server {
        server: ServerDescriptor,
    },
    /// Default server discovery with custom tuning.
    Options {
        options: TuningOptions,
    },
    /// Capability-limited test used when no license key is set.
    Free,
    Licensed {
        license_key: String,
    },
}

impl StartRequest {
    pub fn server(&self) -> Option<&ServerDescriptor> {
        match self {
            StartRequest::ServerWithOptions { server, .. } | StartRequest::Server { server } => {
                Some(server)
            }
            _ => None,
        }
    }

    /// Effective tuning, baseline when none was configured.
    pub fn options(&self) -> TuningOptions {
        match self {
            StartRequest::ServerWithOptions { options, .. } | StartRequest::Options { options } => {
                *options
            }
            _ => TuningOptions::default(),
        }
    }

    pub fn is_free(&self) -> bool {
        matches!(self, StartRequest::Free)
    }

    /// Mode name for logs; never includes the license key.
    pub fn kind(&self) -> &'static str {
        match self {
            StartRequest::ServerWithOptions { .. } => "server+options",
            StartRequest::Server { .. } => "server",
            StartRequest::Options { .. } => "options",
            StartRequest::Free => "free",
            StartRequest::Licensed { .. } => "licensed",
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CustomServerArgs {
    id: Option<i64>,
    scheme: Option<String>,
    domain: Option<String>,
    download_folder_path: Option<String>,
    upload_folder_path: Option<String>,
    upload_script: Option<String>,
    country_code: Option<String>,
    city: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OptionsArgs {
    download_time_ms: Option<u64>,
    upload_time_ms: Option<u64>,
    download_threads_count: Option<u32>,
    upload_threads_count: Option<u32>,
    additional_threads_count: Option<u32>,
    connection_timeout_ms: Option<u64>,
    send_results_to_provider: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LicenseKeyArgs {
    license_key: String,
}

/// Folder paths may arrive in another platform's convention.
fn strip_backslashes(path: Option<String>) -> Option<String> {
    path.map(|p| p.replace('\\', ""))
}

fn parse_args<T: DeserializeOwned>(payload: &Value, method: &str) -> Result<T, ControlError> {
    if !payload.is_object() {
        return Err(ControlError::bad_arguments(format!(
            "{} expects a map of arguments",
            method
        )));
    }
    serde_json::from_value(payload.clone())
        .map_err(|e| ControlError::bad_arguments(format!("{}: {}", method, e)))
}

/// Values set through control calls ahead of a run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionConfig {
    pub custom_server: Option<ServerDescriptor>,
    pub options: Option<TuningOptions>,
    pub license_key: Option<String>,
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedConfig {
        Arc::new(Mutex::new(Self::new()))
    }

    pub fn set_custom_server(&mut self, payload: &Value) -> Result<&'static str, ControlError> {
        let args: CustomServerArgs = parse_args(payload, "set-custom-server")?;
        let server = ServerDescriptor {
            id: args.id,
            scheme: args.scheme,
            domain: args.domain,
            download_path: strip_backslashes(args.download_folder_path),
            upload_path: strip_backslashes(args.upload_folder_path),
            upload_script_name: args.upload_script,
            country_code: args.country_code,
            city_name: args.city,
        };
        if !server.has_domain() {
            debug!("Custom server has no domain, default discovery will be used");
        }
        self.custom_server = Some(server);
        Ok("Custom server set")
    }

    pub fn set_options(&mut self, payload: &Value) -> Result<&'static str, ControlError> {
        let args: OptionsArgs = parse_args(payload, "set-options")?;
        let base = TuningOptions::default();
        self.options = Some(TuningOptions {
            download_duration_ms: args.download_time_ms.unwrap_or(base.download_duration_ms),
            upload_duration_ms: args.upload_time_ms.unwrap_or(base.upload_duration_ms),
            download_thread_count: args
                .download_threads_count
                .unwrap_or(base.download_thread_count),
            upload_thread_count: args.upload_threads_count.unwrap_or(base.upload_thread_count),
            auxiliary_thread_count: args
                .additional_threads_count
                .unwrap_or(base.auxiliary_thread_count),
            connection_timeout_ms: args
                .connection_timeout_ms
                .unwrap_or(base.connection_timeout_ms),
            report_results_to_provider: args
                .send_results_to_provider
                .unwrap_or(base.report_results_to_provider),
        });
        Ok("Options set")
    }

    pub fn set_license_key(&mut self, payload: &Value) -> Result<&'static str, ControlError> {
        let args: LicenseKeyArgs = parse_args(payload, "set-license-key")?;
        self.license_key = Some(args.license_key);
        Ok("License key set")
    }

    /// Drops per-run settings. The license key outlives a single run.
    pub fn clear(&mut self) {
        self.custom_server = None;
        self.options = None;
    }

    pub fn usable_server(&self) -> Option<&ServerDescriptor> {
        self.custom_server.as_ref().filter(|s| s.has_domain())
    }

    /// Picks the start mode: custom server first, then options, then the
    /// license key decides between a licensed and a free test.
    pub fn start_request(&self) -> StartRequest {
        match (self.usable_server(), self.options) {
            (Some(server), Some(options)) => StartRequest::ServerWithOptions {
                server: server.clone(),
                options,
            },
            (Some(server), None) => StartRequest::Server {
                server: server.clone(),
            },
            (None, Some(options)) => StartRequest::Options { options },
            (None, None) => match self.license_key.as_deref() {
                Some(key) if !key.is_empty() => StartRequest::Licensed {
                    license_key: key.to_string(),
                },
                _ => StartRequest::Free,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_custom_server_strips_backslashes() {
        let mut config = SessionConfig::new();
        let msg = config
            .set_custom_server(&json!({
                "id": 104,
                "domain": "speed.example.net",
                "downloadFolderPath": "\\/speedtest\\/",
                "uploadFolderPath": "/speedtest/",
                "countryCode": "DE",
                "city": "Berlin"
            }))
            .unwrap();

        assert_eq!(msg, "Custom server set");
        let server = config.custom_server.unwrap();
        assert_eq!(server.id, Some(104));
        assert_eq!(server.download_path.as_deref(), Some("/speedtest/"));
        assert_eq!(server.describe(), "Berlin, DE");
    }

    #[test]
    fn test_custom_server_without_domain_is_not_usable() {
        let mut config = SessionConfig::new();
        config.set_custom_server(&json!({ "domain": "" })).unwrap();
        assert!(config.custom_server.is_some());
        assert!(config.usable_server().is_none());

        config.set_custom_server(&json!({ "city": "Oslo" })).unwrap();
        assert!(config.usable_server().is_none());
    }

    #[test]
    fn test_set_custom_server_rejects_non_map() {
        let mut config = SessionConfig::new();
        let err = config.set_custom_server(&json!("speed.example.net")).unwrap_err();
        assert_eq!(err.code(), "BAD_ARGS");
        assert!(config.custom_server.is_none());
    }

    #[test]
    fn test_set_options_defaults_missing_fields() {
        let mut config = SessionConfig::new();
        config.set_options(&json!({ "downloadTimeMs": 5000 })).unwrap();

        let options = config.options.unwrap();
        assert_eq!(options.download_duration_ms, 5000);
        assert_eq!(
            options,
            TuningOptions {
                download_duration_ms: 5000,
                ..TuningOptions::default()
            }
        );
    }

    #[test]
    fn test_set_options_rejects_mistyped_field() {
        let mut config = SessionConfig::new();
        let err = config
            .set_options(&json!({ "uploadThreadsCount": "many" }))
            .unwrap_err();
        assert_eq!(err.code(), "BAD_ARGS");
        assert!(config.options.is_none());
    }

    #[test]
    fn test_set_options_treats_null_as_absent() {
        let mut config = SessionConfig::new();
        config
            .set_options(&json!({ "connectionTimeoutMs": null, "sendResultsToProvider": false }))
            .unwrap();
        let options = config.options.unwrap();
        assert_eq!(options.connection_timeout_ms, 5_000);
        assert!(!options.report_results_to_provider);
    }

    #[test]
    fn test_set_license_key_requires_field() {
        let mut config = SessionConfig::new();
        let err = config.set_license_key(&json!({ "key": "abc" })).unwrap_err();
        assert_eq!(err.code(), "BAD_ARGS");
        assert_eq!(config, SessionConfig::new());

        let err = config.set_license_key(&json!({ "licenseKey": 42 })).unwrap_err();
        assert_eq!(err.code(), "BAD_ARGS");

        config.set_license_key(&json!({ "licenseKey": "abc" })).unwrap();
        assert_eq!(config.license_key.as_deref(), Some("abc"));
    }

    #[test]
    fn test_clear_keeps_license_key() {
        let mut config = SessionConfig::new();
        config.set_custom_server(&json!({ "domain": "a.example" })).unwrap();
        config.set_options(&json!({})).unwrap();
        config.set_license_key(&json!({ "licenseKey": "k" })).unwrap();

        config.clear();

        assert!(config.custom_server.is_none());
        assert!(config.options.is_none());
        assert_eq!(config.license_key.as_deref(), Some("k"));
    }

    #[test]
    fn test_start_request_priority() {
        let mut config = SessionConfig::new();
        assert_eq!(config.start_request(), StartRequest::Free);

        config.license_key = Some(String::new());
        assert_eq!(config.start_request(), StartRequest::Free);

        config.license_key = Some("key".into());
        assert_eq!(
            config.start_request(),
            StartRequest::Licensed {
                license_key: "key".into()
            }
        );

        let options = TuningOptions::default();
        config.options = Some(options);
        assert_eq!(config.start_request(), StartRequest::Options { options });

        config.custom_server = Some(ServerDescriptor::default());
        assert_eq!(config.start_request(), StartRequest::Options { options });

        let server = ServerDescriptor::with_domain("s.example");
        config.custom_server = Some(server.clone());
        assert_eq!(
            config.start_request(),
            StartRequest::ServerWithOptions {
                server: server.clone(),
                options
            }
        );

        config.options = None;
        assert_eq!(config.start_request(), StartRequest::Server { server });
    }
}
