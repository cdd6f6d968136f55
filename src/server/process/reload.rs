//! Diffs a freshly parsed configuration against the running Registry and
//! applies the minimum set of add/remove/replace actions (SPEC_FULL.md
//! §4.6). Everything here runs under the Registry mutex in one
//! transaction, so no caller ever observes a half-diffed group map.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::time::Duration;

use crate::config::{Config, ProgramConfig};
use crate::process::group::ProgramGroup;
use crate::process::registry::{start_nolock, stop_nolock, Registry};

impl Registry {
    /// Applies `new_config` (already parsed and validated). Returns `true`
    /// iff at least one group was added or removed, which callers use to
    /// decide whether the Monitor task should be cancel-and-respawned.
    pub async fn reload(&self, new_config: Config, config_path: PathBuf) -> bool {
        let mut state = self.state.lock().await;

        let email = new_config.email.clone();
        let new_by_name: HashMap<String, ProgramConfig> =
            new_config.programs.into_iter().map(|cfg| (cfg.name.clone(), cfg)).collect();

        let current_names: HashSet<String> = state.groups.keys().cloned().collect();
        let new_names: HashSet<String> = new_by_name.keys().cloned().collect();

        let removed: Vec<&String> = current_names.difference(&new_names).collect();
        let added: Vec<&String> = new_names.difference(&current_names).collect();
        let kept: Vec<&String> = current_names.intersection(&new_names).collect();

        let mut structure_changed = false;

        for name in removed {
            tracing::info!(program = %name, "reload: removing obsolete program");
            stop_nolock(&mut state, name).await;
            state.groups.remove(name);
            structure_changed = true;
        }

        for name in added {
            let cfg = new_by_name.get(name).expect("name came from new_by_name's own keys").clone();
            tracing::info!(program = %name, "reload: adding new program");
            let autostart = cfg.autostart;
            state.groups.insert(name.clone(), ProgramGroup::new(cfg));
            if autostart {
                start_nolock(&mut state, name).await;
            } else {
                tracing::debug!(program = %name, "reload: new program has autostart=false, not starting");
            }
            structure_changed = true;
        }

        for name in kept {
            let new_cfg = new_by_name.get(name).expect("name came from new_by_name's own keys");
            let unchanged = state.groups.get(name).is_some_and(|g| !config_changed(&g.config, new_cfg));
            if unchanged {
                tracing::debug!(program = %name, "reload: unchanged, keeping running instances");
                continue;
            }

            tracing::info!(program = %name, "reload: config changed, replacing group");
            stop_nolock(&mut state, name).await;
            tokio::time::sleep(Duration::from_millis(100)).await;
            let autostart = new_cfg.autostart;
            state.groups.insert(name.clone(), ProgramGroup::new(new_cfg.clone()));
            if autostart {
                start_nolock(&mut state, name).await;
            }
        }

        state.config_path = config_path;
        if email.is_some() {
            state.email = email;
        }

        tracing::info!("reload complete");
        structure_changed
    }
}

/// SPEC_FULL.md §4.6 `_config_changed`: drop `{_internal, env}`, normalize
/// recursively (sort map keys, sort list elements, stringify scalar
/// leaves), and compare the resulting canonical forms.
fn config_changed(old: &ProgramConfig, new: &ProgramConfig) -> bool {
    canonical(old) != canonical(new)
}

fn canonical(config: &ProgramConfig) -> serde_yaml::Value {
    let mut value = serde_yaml::to_value(config).expect("ProgramConfig is always representable as YAML");
    if let serde_yaml::Value::Mapping(map) = &mut value {
        map.remove(serde_yaml::Value::String("env".to_owned()));
        map.remove(serde_yaml::Value::String("_internal".to_owned()));
    }
    normalize(value)
}

/// Recursively normalizes a [`serde_yaml::Value`]: list elements are
/// sorted (by their normalized textual form), mapping keys are sorted, and
/// every scalar leaf is stringified. This is what makes the comparison
/// insensitive to map-key order and to integer-vs-octal-string spelling of
/// fields like `umask`.
fn normalize(value: serde_yaml::Value) -> serde_yaml::Value {
    use serde_yaml::Value;
    match value {
        Value::Sequence(seq) => {
            let mut items: Vec<Value> = seq.into_iter().map(normalize).collect();
            items.sort_by_key(sort_key);
            Value::Sequence(items)
        }
        Value::Mapping(map) => {
            let mut entries: Vec<(Value, Value)> = map.into_iter().map(|(k, v)| (k, normalize(v))).collect();
            entries.sort_by_key(|(k, _)| sort_key(k.clone()));
            let mut sorted = serde_yaml::Mapping::new();
            for (k, v) in entries {
                sorted.insert(k, v);
            }
            Value::Mapping(sorted)
        }
        Value::Number(n) => Value::String(n.to_string()),
        Value::Bool(b) => Value::String(b.to_string()),
        other => other,
    }
}

fn sort_key(value: serde_yaml::Value) -> String {
    serde_yaml::to_string(&value).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AutoRestart;
    use tcl::signal::Signal;

    fn config(name: &str, cmd: &str, autostart: bool) -> ProgramConfig {
        ProgramConfig {
            name: name.to_owned(),
            cmd: cmd.to_owned(),
            numprocs: 1,
            workingdir: None,
            umask: 0o22,
            env: Default::default(),
            stdout: None,
            stderr: None,
            user: None,
            autostart,
            autorestart: AutoRestart::Never,
            exitcodes: vec![0],
            startretries: 0,
            starttime: 0,
            stopsignal: Signal::Term,
            stoptime: 1,
        }
    }

    #[test]
    fn canonical_is_insensitive_to_exitcode_order_and_umask_spelling() {
        let mut a = config("web", "/bin/true", false);
        a.exitcodes = vec![0, 1, 2];
        a.umask = 0o22;
        let mut b = a.clone();
        b.exitcodes = vec![2, 1, 0];
        assert_eq!(canonical(&a), canonical(&b));
        assert!(!config_changed(&a, &b));
    }

    #[test]
    fn env_differences_are_ignored() {
        let mut a = config("web", "/bin/true", false);
        let mut b = a.clone();
        a.env.insert("FOO".to_owned(), "bar".to_owned());
        b.env.insert("FOO".to_owned(), "baz".to_owned());
        assert!(!config_changed(&a, &b));
    }

    #[test]
    fn cmd_change_is_detected() {
        let a = config("web", "/bin/true", false);
        let mut b = a.clone();
        b.cmd = "/bin/false".to_owned();
        assert!(config_changed(&a, &b));
    }

    #[tokio::test]
    async fn add_remove_replace() {
        let registry = Registry::new(PathBuf::from("a.yml"));
        registry
            .load(
                Config {
                    programs: vec![config("a", "/bin/true", false), config("b", "/bin/true", false)],
                    email: None,
                },
                PathBuf::from("a.yml"),
            )
            .await;

        let changed = registry
            .reload(
                Config {
                    programs: vec![config("a", "/bin/true", false), config("c", "/bin/true", false)],
                    email: None,
                },
                PathBuf::from("b.yml"),
            )
            .await;

        assert!(changed);
        let names = registry.program_names().await;
        assert!(names.contains(&"a".to_owned()));
        assert!(names.contains(&"c".to_owned()));
        assert!(!names.contains(&"b".to_owned()));
    }

    #[tokio::test]
    async fn reload_with_only_field_reorder_is_a_no_op() {
        let registry = Registry::new(PathBuf::from("a.yml"));
        registry
            .load(
                Config {
                    programs: vec![config("a", "/bin/true", false)],
                    email: None,
                },
                PathBuf::from("a.yml"),
            )
            .await;

        let changed = registry
            .reload(
                Config {
                    programs: vec![config("a", "/bin/true", false)],
                    email: None,
                },
                PathBuf::from("a.yml"),
            )
            .await;

        assert!(!changed);
    }
}
