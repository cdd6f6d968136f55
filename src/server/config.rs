//! Configuration loading and validation (SPEC_FULL.md §3, §6, "Ambient
//! stack / Configuration loading & validation").
//!
//! A raw, permissive `serde` shape is parsed first and then converted,
//! with validation, into [`ProgramConfig`]. The on-disk document may use
//! either a `programs:` map or a `services:` list; both normalize to the
//! same `Vec<ProgramConfig>`.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;
use tcl::error::ConfigError;
use tcl::signal::Signal;

/// How a program instance should be restarted after it exits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AutoRestart {
    Always,
    Unexpected,
    Never,
}

impl Default for AutoRestart {
    fn default() -> Self {
        AutoRestart::Never
    }
}

/// A fully validated, owned program declaration (SPEC_FULL.md §3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgramConfig {
    pub name: String,
    pub cmd: String,
    pub numprocs: usize,
    pub workingdir: Option<String>,
    pub umask: u32,
    pub env: HashMap<String, String>,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
    pub user: Option<String>,
    pub autostart: bool,
    pub autorestart: AutoRestart,
    pub exitcodes: Vec<i32>,
    pub startretries: u32,
    pub starttime: u64,
    pub stopsignal: Signal,
    pub stoptime: u64,
}

/// The normalized result of loading a config file: the programs plus
/// whatever opaque `email:` block (if any) the document carried.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub programs: Vec<ProgramConfig>,
    pub email: Option<serde_yaml::Value>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&contents, path)
    }

    fn parse(contents: &str, path: &Path) -> Result<Self, ConfigError> {
        let raw: RawDocument = serde_yaml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;

        let raw_programs: Vec<(String, RawProgramConfig)> = if let Some(programs) = raw.programs {
            programs.into_iter().collect()
        } else if let Some(services) = raw.services {
            services
                .into_iter()
                .map(|svc| (svc.name.clone().unwrap_or_default(), svc))
                .collect()
        } else {
            return Err(ConfigError::MissingRoot);
        };

        let mut seen = std::collections::HashSet::new();
        let mut programs = Vec::with_capacity(raw_programs.len());
        for (name, raw) in raw_programs {
            let program = ProgramConfig::try_from_raw(name, raw)?;
            if !seen.insert(program.name.clone()) {
                return Err(ConfigError::DuplicateName(program.name));
            }
            programs.push(program);
        }

        Ok(Config {
            programs,
            email: raw.email,
        })
    }
}

impl ProgramConfig {
    fn try_from_raw(name_from_key: String, raw: RawProgramConfig) -> Result<Self, ConfigError> {
        let name = raw.name.unwrap_or(name_from_key);
        let fail = |reason: &str| ConfigError::InvalidProgram {
            name: name.clone(),
            reason: reason.to_owned(),
        };

        if name.is_empty() {
            return Err(ConfigError::InvalidProgram {
                name: "<unnamed>".to_owned(),
                reason: "program name must not be empty".to_owned(),
            });
        }
        if raw.cmd.trim().is_empty() {
            return Err(fail("cmd must not be empty"));
        }
        if !(1..=32).contains(&raw.numprocs) {
            return Err(fail("numprocs must be between 1 and 32"));
        }
        if raw.umask.0 > 0o777 {
            return Err(fail("umask must be between 0 and 0o777"));
        }
        if raw.exitcodes.is_empty() {
            return Err(fail("exitcodes must not be empty"));
        }

        Ok(ProgramConfig {
            name,
            cmd: raw.cmd,
            numprocs: raw.numprocs,
            workingdir: raw.workingdir,
            umask: raw.umask.0,
            env: raw.env,
            stdout: raw.stdout,
            stderr: raw.stderr,
            user: raw.user,
            autostart: raw.autostart,
            autorestart: raw.autorestart,
            exitcodes: raw.exitcodes,
            startretries: raw.startretries,
            starttime: raw.starttime,
            stopsignal: Signal::from_name(&raw.stopsignal),
            stoptime: raw.stoptime,
        })
    }
}

/* -------------------------------------------------------------------------- */
/*                             Raw, on-disk shapes                            */
/* -------------------------------------------------------------------------- */

#[derive(Debug, Default, Deserialize)]
struct RawDocument {
    #[serde(default)]
    programs: Option<HashMap<String, RawProgramConfig>>,
    #[serde(default)]
    services: Option<Vec<RawProgramConfig>>,
    #[serde(default)]
    email: Option<serde_yaml::Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawProgramConfig {
    name: Option<String>,
    cmd: String,
    #[serde(default = "default_numprocs")]
    numprocs: usize,
    workingdir: Option<String>,
    #[serde(default)]
    umask: Umask,
    #[serde(default)]
    env: HashMap<String, String>,
    stdout: Option<String>,
    stderr: Option<String>,
    user: Option<String>,
    autostart: bool,
    #[serde(default)]
    autorestart: AutoRestart,
    #[serde(default = "default_exitcodes")]
    exitcodes: Vec<i32>,
    startretries: u32,
    starttime: u64,
    #[serde(default = "default_stopsignal")]
    stopsignal: String,
    #[serde(default = "default_stoptime")]
    stoptime: u64,
}

fn default_numprocs() -> usize {
    1
}

fn default_exitcodes() -> Vec<i32> {
    vec![0]
}

fn default_stopsignal() -> String {
    "TERM".to_owned()
}

fn default_stoptime() -> u64 {
    5
}

/// `umask` accepts either an integer (e.g. `18`) or an octal string
/// (e.g. `"022"`) in the config file; both parse to the same `u32`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Umask(u32);

impl<'de> Deserialize<'de> for Umask {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct UmaskVisitor;

        impl<'de> serde::de::Visitor<'de> for UmaskVisitor {
            type Value = Umask;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an integer or an octal string umask")
            }

            fn visit_u64<E>(self, v: u64) -> Result<Umask, E>
            where
                E: serde::de::Error,
            {
                Ok(Umask(v as u32))
            }

            fn visit_i64<E>(self, v: i64) -> Result<Umask, E>
            where
                E: serde::de::Error,
            {
                Ok(Umask(v as u32))
            }

            fn visit_str<E>(self, v: &str) -> Result<Umask, E>
            where
                E: serde::de::Error,
            {
                u32::from_str_radix(v, 8)
                    .map(Umask)
                    .map_err(|_| serde::de::Error::custom(format!("invalid octal umask '{v}'")))
            }
        }

        deserializer.deserialize_any(UmaskVisitor)
    }
}

/// Resolves the username the supervisor itself is running as, for the
/// `user` mismatch check in `Instance::spawn` (SPEC_FULL.md §4.2).
pub fn current_username() -> Option<String> {
    std::env::var("USER").ok().or_else(|| std::env::var("LOGNAME").ok())
}

/// True when the supervisor runs with root privileges (allowed to spawn
/// as any configured `user`).
pub fn is_privileged() -> bool {
    unsafe { libc::geteuid() == 0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_programs_map_shape() {
        let yaml = r#"
programs:
  web:
    cmd: "/bin/sleep 30"
    numprocs: 2
    autostart: true
"#;
        let config = Config::parse(yaml, Path::new("test.yaml")).unwrap();
        assert_eq!(config.programs.len(), 1);
        assert_eq!(config.programs[0].name, "web");
        assert_eq!(config.programs[0].numprocs, 2);
        assert!(config.programs[0].autostart);
        assert_eq!(config.programs[0].exitcodes, vec![0]);
    }

    #[test]
    fn parses_services_list_shape() {
        let yaml = r#"
services:
  - name: web
    cmd: "/bin/sleep 30"
    numprocs: 2
    autostart: true
"#;
        let config = Config::parse(yaml, Path::new("test.yaml")).unwrap();
        assert_eq!(config.programs.len(), 1);
        assert_eq!(config.programs[0].name, "web");
    }

    #[test]
    fn both_shapes_agree() {
        let map_yaml = r#"
programs:
  web:
    cmd: "/bin/true"
"#;
        let list_yaml = r#"
services:
  - name: web
    cmd: "/bin/true"
"#;
        let a = Config::parse(map_yaml, Path::new("a.yaml")).unwrap();
        let b = Config::parse(list_yaml, Path::new("b.yaml")).unwrap();
        assert_eq!(a.programs, b.programs);
    }

    #[test]
    fn umask_accepts_integer_or_octal_string() {
        let int_yaml = "programs:\n  web:\n    cmd: \"/bin/true\"\n    umask: 18\n";
        let str_yaml = "programs:\n  web:\n    cmd: \"/bin/true\"\n    umask: \"022\"\n";
        let a = Config::parse(int_yaml, Path::new("a.yaml")).unwrap();
        let b = Config::parse(str_yaml, Path::new("b.yaml")).unwrap();
        assert_eq!(a.programs[0].umask, b.programs[0].umask);
    }

    #[test]
    fn numprocs_out_of_range_is_rejected() {
        let yaml = "programs:\n  web:\n    cmd: \"/bin/true\"\n    numprocs: 33\n";
        assert!(Config::parse(yaml, Path::new("a.yaml")).is_err());
    }

    #[test]
    fn unknown_key_is_rejected() {
        let yaml = "programs:\n  web:\n    cmd: \"/bin/true\"\n    unmask: 18\n";
        assert!(Config::parse(yaml, Path::new("a.yaml")).is_err());
    }

    #[test]
    fn missing_root_is_rejected() {
        let yaml = "foo: bar\n";
        assert!(matches!(
            Config::parse(yaml, Path::new("a.yaml")),
            Err(ConfigError::MissingRoot)
        ));
    }
}
