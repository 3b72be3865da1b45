//! Configuration types for the riversist daemon.

use crate::error::ConfigError;
use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::sync::OnceLock;
use std::time::Duration;

/// Placeholder substituted with the evaluated address in command templates.
pub const IP_PLACEHOLDER: &str = "{ip}";

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Capture, action and tracking settings.
    #[serde(default)]
    pub settings: Settings,

    /// Reputation checkers, evaluated in order.
    #[serde(default = "default_checkers")]
    pub checkers: Vec<CheckerConfig>,

    /// Addresses or networks that are never evaluated.
    #[serde(default)]
    pub ignore: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            settings: Settings::default(),
            checkers: default_checkers(),
            ignore: Vec::new(),
        }
    }
}

/// Daemon settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    /// Network interface to capture on.
    #[serde(default = "default_interface")]
    pub interface: String,

    /// BPF capture filter.
    #[serde(default = "default_capture_filter")]
    pub capture_filter: String,

    /// Bytes captured per packet. Headers are all we need.
    #[serde(default = "default_snaplen")]
    pub snaplen: i32,

    /// Put the interface in promiscuous mode.
    #[serde(default = "default_true")]
    pub promiscuous: bool,

    /// Command run for addresses judged legit. Empty disables it.
    #[serde(default)]
    pub legit_ip_cmd: String,

    /// Command run for addresses judged malicious. Empty disables it.
    #[serde(default)]
    pub malicious_ip_cmd: String,

    /// How long a verdict stays cached. 0 keeps verdicts forever.
    #[serde(default = "default_completed_ttl")]
    pub completed_ttl_seconds: u64,

    /// How often expired verdicts are pruned.
    #[serde(default = "default_completed_prune_interval")]
    pub completed_prune_interval_seconds: u64,

    /// Age after which an in-flight evaluation is considered lost.
    #[serde(default = "default_pending_threshold")]
    pub pending_threshold_seconds: u64,

    /// How often lost evaluations are pruned.
    #[serde(default = "default_pending_prune_interval")]
    pub pending_prune_interval_seconds: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            interface: default_interface(),
            capture_filter: default_capture_filter(),
            snaplen: default_snaplen(),
            promiscuous: true,
            legit_ip_cmd: String::new(),
            malicious_ip_cmd: String::new(),
            completed_ttl_seconds: default_completed_ttl(),
            completed_prune_interval_seconds: default_completed_prune_interval(),
            pending_threshold_seconds: default_pending_threshold(),
            pending_prune_interval_seconds: default_pending_prune_interval(),
        }
    }
}

impl Settings {
    /// TTL of completed entries, `None` when they never expire.
    pub fn completed_ttl(&self) -> Option<Duration> {
        (self.completed_ttl_seconds > 0).then(|| Duration::from_secs(self.completed_ttl_seconds))
    }

    pub fn completed_prune_interval(&self) -> Duration {
        Duration::from_secs(self.completed_prune_interval_seconds)
    }

    pub fn pending_threshold(&self) -> Duration {
        Duration::from_secs(self.pending_threshold_seconds)
    }

    pub fn pending_prune_interval(&self) -> Duration {
        Duration::from_secs(self.pending_prune_interval_seconds)
    }
}

fn default_interface() -> String {
    "eth0".to_string()
}

fn default_capture_filter() -> String {
    "tcp and ip".to_string()
}

fn default_snaplen() -> i32 {
    128
}

fn default_completed_ttl() -> u64 {
    86400
}

fn default_completed_prune_interval() -> u64 {
    1800
}

fn default_pending_threshold() -> u64 {
    60
}

fn default_pending_prune_interval() -> u64 {
    60
}

fn default_true() -> bool {
    true
}

fn default_checkers() -> Vec<CheckerConfig> {
    vec![CheckerConfig::ProjectHoneyPot(ProjectHoneyPotConfig::default())]
}

/// One entry of the checker chain.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CheckerConfig {
    /// Project Honey Pot http:BL.
    #[serde(rename = "project_honeypot")]
    ProjectHoneyPot(ProjectHoneyPotConfig),
    /// Generic DNSBL zone scoring on the last answer octet.
    Dnsbl(DnsblConfig),
}

impl CheckerConfig {
    pub fn is_enabled(&self) -> bool {
        match self {
            CheckerConfig::ProjectHoneyPot(c) => c.enabled,
            CheckerConfig::Dnsbl(c) => c.enabled,
        }
    }
}

/// Project Honey Pot http:BL checker configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ProjectHoneyPotConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// http:BL access key (supports ${ENV_VAR} syntax).
    #[serde(default)]
    pub api_key: String,

    /// Listings older than this many days are ignored.
    #[serde(default = "default_stale_period")]
    pub stale_period_days: u32,

    /// Addresses scoring above this are malicious.
    #[serde(default = "default_max_score")]
    pub max_score: u32,
}

impl Default for ProjectHoneyPotConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key: String::new(),
            stale_period_days: default_stale_period(),
            max_score: default_max_score(),
        }
    }
}

fn default_stale_period() -> u32 {
    14
}

fn default_max_score() -> u32 {
    25
}

/// Generic DNSBL checker configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct DnsblConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// DNSBL zone, e.g. `dnsbl.example.org`.
    pub host: String,

    /// Addresses whose answer score is >= this are malicious. Values above
    /// 255 never match.
    pub malicious_threshold: u32,
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn load(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse and validate configuration from YAML text.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(content);
        let config: Config = serde_yaml::from_str(&expanded)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let settings = &self.settings;

        if settings.interface.trim().is_empty() {
            return Err(invalid("Interface cannot be left empty"));
        }

        validate_template("legit_ip_cmd", &settings.legit_ip_cmd)?;
        validate_template("malicious_ip_cmd", &settings.malicious_ip_cmd)?;

        if settings.pending_prune_interval_seconds == 0 {
            return Err(invalid("pending_prune_interval_seconds must be > 0"));
        }
        if settings.completed_ttl_seconds > 0 && settings.completed_prune_interval_seconds == 0 {
            return Err(invalid(
                "completed_prune_interval_seconds must be > 0 when completed_ttl_seconds is set",
            ));
        }

        for checker in &self.checkers {
            match checker {
                CheckerConfig::ProjectHoneyPot(c) => {
                    if c.enabled && c.api_key.trim().is_empty() {
                        return Err(invalid("An API key for Project HoneyPot must be set"));
                    }
                }
                CheckerConfig::Dnsbl(c) => {
                    if c.enabled && c.host.trim().is_empty() {
                        return Err(invalid("A DNSBL checker is enabled but its host is empty"));
                    }
                }
            }
        }

        for entry in &self.ignore {
            if parse_ignore_entry(entry).is_none() {
                return Err(invalid(format!("Invalid ignore entry: {}", entry)));
            }
        }

        Ok(())
    }

    /// Parse ignore entries into networks. Single addresses become host networks.
    pub fn parse_ignore(&self) -> Vec<IpNet> {
        self.ignore
            .iter()
            .filter_map(|s| parse_ignore_entry(s))
            .collect()
    }

    /// Generate example configuration YAML.
    pub fn example() -> String {
        r#"# riversist configuration

settings:
  interface: eth0
  capture_filter: "tcp and ip"
  snaplen: 128
  promiscuous: true

  # Commands run once per evaluated address. {ip} is replaced by the address.
  # Leave empty to do nothing for that verdict.
  legit_ip_cmd: "/sbin/pfctl -t legit -T add {ip}"
  malicious_ip_cmd: "/sbin/pfctl -t malicious -T add {ip}"

  completed_ttl_seconds: 86400           # re-evaluate after a day (0 = never)
  completed_prune_interval_seconds: 1800
  pending_threshold_seconds: 60          # give up on lookups stuck this long
  pending_prune_interval_seconds: 60

# Checkers are evaluated in order; the first malicious verdict wins.
checkers:
  - type: project_honeypot
    enabled: true
    api_key: "${HTTPBL_API_KEY}"
    stale_period_days: 14
    max_score: 25

  - type: dnsbl
    enabled: true
    host: "dnsbl.example.org"
    malicious_threshold: 10

# Addresses and networks that are never evaluated, in addition to the
# addresses of this host's own interfaces.
ignore:
  - "127.0.0.0/8"
"#
        .to_string()
    }
}

fn invalid(msg: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(msg.into())
}

fn validate_template(name: &str, template: &str) -> Result<(), ConfigError> {
    if template.trim().is_empty() {
        return Ok(());
    }
    let placeholders = template.matches(IP_PLACEHOLDER).count();
    if placeholders != 1 {
        return Err(invalid(format!(
            "{} must contain exactly one {} placeholder, found {}",
            name, IP_PLACEHOLDER, placeholders
        )));
    }
    Ok(())
}

fn parse_ignore_entry(s: &str) -> Option<IpNet> {
    let s = s.trim();
    if let Ok(ip) = s.parse::<IpAddr>() {
        return Some(IpNet::from(ip));
    }
    s.parse::<IpNet>().ok()
}

/// Expand environment variables in the format ${VAR_NAME}.
fn expand_env_vars(content: &str) -> String {
    static ENV_VAR: OnceLock<regex::Regex> = OnceLock::new();
    let re = ENV_VAR.get_or_init(|| {
        regex::Regex::new(r"\$\{([^}]+)\}").expect("env var pattern is valid")
    });

    re.replace_all(content, |cap: &regex::Captures<'_>| {
        std::env::var(&cap[1]).unwrap_or_default()
    })
    .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn valid_config() -> Config {
        Config {
            settings: Settings::default(),
            checkers: vec![CheckerConfig::ProjectHoneyPot(ProjectHoneyPotConfig {
                api_key: "abcdefghijkl".to_string(),
                ..Default::default()
            })],
            ignore: vec![],
        }
    }

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.interface, "eth0");
        assert_eq!(settings.capture_filter, "tcp and ip");
        assert_eq!(settings.completed_ttl(), Some(Duration::from_secs(86400)));
        assert_eq!(settings.completed_prune_interval(), Duration::from_secs(1800));
        assert_eq!(settings.pending_threshold(), Duration::from_secs(60));
        assert_eq!(settings.pending_prune_interval(), Duration::from_secs(60));
        assert!(settings.legit_ip_cmd.is_empty());
    }

    #[test]
    fn test_default_honeypot() {
        let config = ProjectHoneyPotConfig::default();
        assert!(config.enabled);
        assert_eq!(config.stale_period_days, 14);
        assert_eq!(config.max_score, 25);
    }

    #[test]
    fn test_zero_ttl_disables_expiry() {
        let settings = Settings {
            completed_ttl_seconds: 0,
            ..Default::default()
        };
        assert_eq!(settings.completed_ttl(), None);
    }

    #[test]
    fn test_expand_env_vars() {
        std::env::set_var("RIVERSIST_TEST_KEY", "secret123");
        let input = "api_key: \"${RIVERSIST_TEST_KEY}\"";
        let result = expand_env_vars(input);
        assert_eq!(result, "api_key: \"secret123\"");
        std::env::remove_var("RIVERSIST_TEST_KEY");
    }

    #[test]
    fn test_expand_env_vars_missing() {
        let input = "api_key: \"${RIVERSIST_NONEXISTENT_VAR}\"";
        let result = expand_env_vars(input);
        assert_eq!(result, "api_key: \"\"");
    }

    #[test]
    fn test_parse_config_yaml() {
        let yaml = r#"
settings:
  interface: em0
  malicious_ip_cmd: "pfctl -t bad -T add {ip}"
  completed_ttl_seconds: 3600

checkers:
  - type: dnsbl
    host: dnsbl.example.org
    malicious_threshold: 10
  - type: project_honeypot
    api_key: abcdefghijkl
    max_score: 30

ignore:
  - "192.168.1.1"
  - "10.0.0.0/8"
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.settings.interface, "em0");
        assert_eq!(config.settings.capture_filter, "tcp and ip");
        assert_eq!(config.settings.completed_ttl_seconds, 3600);
        assert_eq!(config.checkers.len(), 2);
        assert_eq!(
            config.checkers[0],
            CheckerConfig::Dnsbl(DnsblConfig {
                enabled: true,
                host: "dnsbl.example.org".to_string(),
                malicious_threshold: 10,
            })
        );
        match &config.checkers[1] {
            CheckerConfig::ProjectHoneyPot(c) => {
                assert_eq!(c.api_key, "abcdefghijkl");
                assert_eq!(c.stale_period_days, 14);
                assert_eq!(c.max_score, 30);
            }
            other => panic!("unexpected checker {:?}", other),
        }
        assert_eq!(config.parse_ignore().len(), 2);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(
            b"settings:\n  interface: lo\ncheckers:\n  - type: dnsbl\n    host: bl.example\n    malicious_threshold: 5\n",
        )
        .unwrap();
        file.flush().unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.settings.interface, "lo");
        assert_eq!(config.checkers.len(), 1);
        assert!(config.checkers[0].is_enabled());
    }

    #[test]
    fn test_dnsbl_threshold_above_octet_range_parses() {
        let config = Config::from_yaml(
            "settings:\n  interface: lo\ncheckers:\n  - type: dnsbl\n    host: bl.example\n    malicious_threshold: 1000\n",
        )
        .unwrap();
        match &config.checkers[0] {
            CheckerConfig::Dnsbl(c) => assert_eq!(c.malicious_threshold, 1000),
            other => panic!("unexpected checker {:?}", other),
        }
    }

    #[test]
    fn test_load_missing_file() {
        let err = Config::load(std::path::Path::new("/nonexistent/riversist.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn test_default_config_requires_api_key() {
        // The honeypot checker is enabled by default and has no key.
        assert!(Config::default().validate().is_err());
        assert!(Config::from_yaml("settings:\n  interface: eth0\n").is_err());
    }

    #[test]
    fn test_validate_empty_interface() {
        let mut config = valid_config();
        config.settings.interface = "  ".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Interface"));
    }

    #[test]
    fn test_validate_disabled_honeypot_without_key() {
        let config = Config {
            checkers: vec![CheckerConfig::ProjectHoneyPot(ProjectHoneyPotConfig {
                enabled: false,
                ..Default::default()
            })],
            ..valid_config()
        };
        assert!(config.validate().is_ok());
        assert!(!config.checkers[0].is_enabled());
    }

    #[test]
    fn test_validate_dnsbl_without_host() {
        let config = Config {
            checkers: vec![CheckerConfig::Dnsbl(DnsblConfig {
                enabled: true,
                host: String::new(),
                malicious_threshold: 1,
            })],
            ..valid_config()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_command_placeholder() {
        let mut config = valid_config();
        config.settings.malicious_ip_cmd = "pfctl -t bad -T add".to_string();
        assert!(config.validate().is_err());

        config.settings.malicious_ip_cmd = "echo {ip} {ip}".to_string();
        assert!(config.validate().is_err());

        config.settings.malicious_ip_cmd = "pfctl -t bad -T add {ip}".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_ignore_invalid() {
        let mut config = valid_config();
        config.ignore = vec!["not-an-ip".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_ignore_single_is_host_net() {
        let mut config = valid_config();
        config.ignore = vec!["192.168.1.1".to_string()];
        let nets = config.parse_ignore();
        assert!(nets[0].contains(&"192.168.1.1".parse::<IpAddr>().unwrap()));
        assert!(!nets[0].contains(&"192.168.1.2".parse::<IpAddr>().unwrap()));
    }

    #[test]
    fn test_example_config_parses() {
        std::env::set_var("HTTPBL_API_KEY", "abcdefghijkl");
        let config = Config::from_yaml(&Config::example()).unwrap();
        assert_eq!(config.checkers.len(), 2);
        assert!(config.settings.malicious_ip_cmd.contains(IP_PLACEHOLDER));
    }
}
