//! YAML configuration surface.
//!
//! Program options keep supervisord's names (`numprocs`, `startsecs`,
//! `startretries`, `stopsignal`, `stopwaitsecs`, `stdout_logfile_maxbytes`,
//! ...) so existing stanzas translate one to one.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use warden_common::{SupervisorError, SupervisorResult};
use warden_process::{validate_program, validate_program_name, StopSignal};

use crate::spec::{
    LogSpec, ProcessSpec, DEFAULT_LOG_BACKUPS, DEFAULT_LOG_MAX_BYTES, DEFAULT_PRIORITY,
};

/// Top-level configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SupervisorConfig {
    #[serde(default)]
    pub supervisor: SupervisorOptions,
    pub programs: Vec<ProgramConfig>,
}

/// Daemon-wide options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SupervisorOptions {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_shutdown_timeout", with = "duration_serde")]
    pub shutdown_timeout: Duration,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            shutdown_timeout: default_shutdown_timeout(),
        }
    }
}

/// One supervised program stanza
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProgramConfig {
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "default_numprocs")]
    pub numprocs: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory: Option<String>,
    /// Octal string, e.g. "022". Parsed for fidelity, not applied at spawn.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub umask: Option<String>,
    /// Bulk-start ordering; lower starts earlier
    #[serde(default = "default_priority")]
    pub priority: i32,
    #[serde(default = "default_true")]
    pub autostart: bool,
    #[serde(default = "default_true")]
    pub autorestart: bool,
    #[serde(default = "default_startsecs", with = "duration_serde")]
    pub startsecs: Duration,
    #[serde(default = "default_startretries")]
    pub startretries: u32,
    #[serde(default)]
    pub stopsignal: StopSignal,
    #[serde(default = "default_stopwaitsecs", with = "duration_serde")]
    pub stopwaitsecs: Duration,
    /// Run-as user. Parsed for fidelity, not applied at spawn.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub stdout_logfile: Option<String>,
    #[serde(
        default,
        with = "option_bytes_serde",
        skip_serializing_if = "Option::is_none"
    )]
    pub stdout_logfile_maxbytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stdout_logfile_backups: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub stderr_logfile: Option<String>,
    #[serde(
        default,
        with = "option_bytes_serde",
        skip_serializing_if = "Option::is_none"
    )]
    pub stderr_logfile_maxbytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stderr_logfile_backups: Option<u32>,
}

impl ProgramConfig {
    /// Build the immutable launch spec for this stanza.
    pub fn to_spec(&self) -> SupervisorResult<ProcessSpec> {
        let umask = match &self.umask {
            Some(raw) => Some(u32::from_str_radix(raw, 8).map_err(|_| {
                SupervisorError::config(format!(
                    "invalid umask '{}' for program '{}'",
                    raw, self.name
                ))
            })?),
            None => None,
        };

        let stdout_log = self.stdout_logfile.as_ref().map(|path| LogSpec {
            path: path.into(),
            max_bytes: self.stdout_logfile_maxbytes.unwrap_or(DEFAULT_LOG_MAX_BYTES),
            backups: self.stdout_logfile_backups.unwrap_or(DEFAULT_LOG_BACKUPS),
        });
        let stderr_log = self.stderr_logfile.as_ref().map(|path| LogSpec {
            path: path.into(),
            max_bytes: self.stderr_logfile_maxbytes.unwrap_or(DEFAULT_LOG_MAX_BYTES),
            backups: self.stderr_logfile_backups.unwrap_or(DEFAULT_LOG_BACKUPS),
        });

        let spec = ProcessSpec {
            program: self.name.clone(),
            command: self.command.clone(),
            args: self.args.clone(),
            num_procs: self.numprocs,
            working_directory: self.directory.as_ref().map(Into::into),
            umask,
            run_as_user: self.user.clone(),
            priority: self.priority,
            autostart: self.autostart,
            autorestart: self.autorestart,
            start_seconds: self.startsecs,
            start_retries: self.startretries,
            stop_signal: self.stopsignal,
            stop_wait: self.stopwaitsecs,
            stdout_log,
            stderr_log,
        };
        spec.validate()?;
        Ok(spec)
    }
}

impl SupervisorConfig {
    /// Load configuration from a YAML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        Self::load_from_string(&content)
    }

    /// Load configuration from a YAML string
    pub fn load_from_string(content: &str) -> Result<Self> {
        let config: SupervisorConfig =
            serde_yaml::from_str(content).context("Failed to parse YAML configuration")?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> SupervisorResult<()> {
        let mut seen = HashSet::new();
        for program in &self.programs {
            validate_program_name(&program.name)?;
            validate_program(&program.command)?;

            if program.numprocs == 0 {
                return Err(SupervisorError::config(format!(
                    "numprocs must be at least 1 for program '{}'",
                    program.name
                )));
            }
            if !seen.insert(program.name.as_str()) {
                return Err(SupervisorError::config(format!(
                    "duplicate program name '{}'",
                    program.name
                )));
            }
            if let Some(raw) = &program.umask {
                if u32::from_str_radix(raw, 8).is_err() {
                    return Err(SupervisorError::config(format!(
                        "invalid umask '{}' for program '{}'",
                        raw, program.name
                    )));
                }
            }
        }
        Ok(())
    }

    /// Programs in bulk-start order: ascending priority, config order for ties.
    pub fn programs_by_priority(&self) -> Vec<&ProgramConfig> {
        let mut ordered: Vec<&ProgramConfig> = self.programs.iter().collect();
        ordered.sort_by_key(|p| p.priority);
        ordered
    }
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_numprocs() -> u32 {
    1
}

fn default_priority() -> i32 {
    DEFAULT_PRIORITY
}

fn default_true() -> bool {
    true
}

fn default_startsecs() -> Duration {
    Duration::from_secs(1)
}

fn default_startretries() -> u32 {
    3
}

fn default_stopwaitsecs() -> Duration {
    Duration::from_secs(10)
}

// Custom serialization for Duration. Accepts bare numbers (seconds, the
// supervisord convention) or suffixed strings ("500ms", "10s", "1m").
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Seconds(u64),
        Text(String),
    }

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{}ms", duration.as_millis()))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Raw::deserialize(deserializer)? {
            Raw::Seconds(secs) => Ok(Duration::from_secs(secs)),
            Raw::Text(s) => parse_duration(&s).map_err(serde::de::Error::custom),
        }
    }

    pub(super) fn parse_duration(s: &str) -> Result<Duration, String> {
        // Check for "ms" BEFORE "s" since "ms" ends with 's'
        if let Some(num) = s.strip_suffix("ms") {
            let millis: u64 = num
                .parse()
                .map_err(|_| format!("Invalid duration: {}", s))?;
            Ok(Duration::from_millis(millis))
        } else if let Some(num) = s.strip_suffix('s') {
            let secs: u64 = num
                .parse()
                .map_err(|_| format!("Invalid duration: {}", s))?;
            Ok(Duration::from_secs(secs))
        } else if let Some(num) = s.strip_suffix('m') {
            let mins: u64 = num
                .parse()
                .map_err(|_| format!("Invalid duration: {}", s))?;
            Ok(Duration::from_secs(mins * 60))
        } else if let Ok(secs) = s.parse::<u64>() {
            Ok(Duration::from_secs(secs))
        } else {
            Err(format!("Duration must end with 's', 'ms', or 'm': {}", s))
        }
    }
}

// Custom serialization for Option<u64> byte sizes. Accepts bare numbers or
// KB/MB/GB suffixed strings ("50MB").
mod option_bytes_serde {
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Bytes(u64),
        Text(String),
    }

    pub fn serialize<S>(value: &Option<u64>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(bytes) => serializer.serialize_u64(*bytes),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let opt: Option<Raw> = Option::deserialize(deserializer)?;
        match opt {
            None => Ok(None),
            Some(Raw::Bytes(b)) => Ok(Some(b)),
            Some(Raw::Text(s)) => parse_bytes(&s).map(Some).map_err(serde::de::Error::custom),
        }
    }

    pub(super) fn parse_bytes(s: &str) -> Result<u64, String> {
        let upper = s.to_ascii_uppercase();
        let (num, multiplier) = if let Some(num) = upper.strip_suffix("KB") {
            (num, 1024u64)
        } else if let Some(num) = upper.strip_suffix("MB") {
            (num, 1024 * 1024)
        } else if let Some(num) = upper.strip_suffix("GB") {
            (num, 1024 * 1024 * 1024)
        } else {
            (upper.as_str(), 1)
        };
        let value: u64 = num
            .trim()
            .parse()
            .map_err(|_| format!("Invalid byte size: {}", s))?;
        Ok(value * multiplier)
    }
}
