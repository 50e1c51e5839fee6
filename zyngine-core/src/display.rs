//! Remote display discovery for engines with their own GUI.

use std::path::Path;

use crate::config::DisplaySettings;

/// Variables to add to the engine environment so its GUI opens on the remote
/// display, or `None` if no display is configured.
///
/// The configured environment variable wins; otherwise the `KEY=VALUE` file is
/// read. Either way the result only counts if it sets a non-empty `DISPLAY`.
pub fn remote_display_vars(settings: &DisplaySettings) -> Option<Vec<(String, String)>> {
    let vars = match std::env::var(&settings.env_var) {
        Ok(display) if !display.is_empty() => vec![("DISPLAY".to_string(), display)],
        _ => read_env_file(&settings.env_file),
    };
    match vars.iter().find(|(k, _)| k == "DISPLAY") {
        Some((_, display)) if !display.is_empty() => {
            log::info!(target: "engine::display", "REMOTE DISPLAY: {}", display);
            Some(vars)
        }
        _ => {
            log::info!(target: "engine::display", "NO REMOTE DISPLAY");
            None
        }
    }
}

fn read_env_file(path: &Path) -> Vec<(String, String)> {
    match std::fs::read_to_string(path) {
        Ok(contents) => parse_env_lines(&contents),
        Err(e) => {
            log::debug!(target: "engine::display", "{}: {}", path.display(), e);
            Vec::new()
        }
    }
}

/// Parse `KEY=VALUE` lines. Lines without `=` or with an empty value are
/// skipped; later keys override earlier ones.
fn parse_env_lines(contents: &str) -> Vec<(String, String)> {
    let mut vars: Vec<(String, String)> = Vec::new();
    for line in contents.lines() {
        let Some((key, value)) = line.trim().split_once('=') else {
            continue;
        };
        let (key, value) = (key.trim(), value.trim());
        if key.is_empty() || value.is_empty() {
            continue;
        }
        vars.retain(|(k, _)| k != key);
        vars.push((key.to_string(), value.to_string()));
    }
    vars
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn settings(env_var: &str, env_file: &Path) -> DisplaySettings {
        DisplaySettings {
            env_var: env_var.to_string(),
            env_file: env_file.to_path_buf(),
        }
    }

    #[test]
    fn parse_skips_empty_values() {
        let vars = parse_env_lines("DISPLAY=:1\nXAUTHORITY=\n# comment\n\nLANG = C\nDISPLAY=:2\n");
        assert_eq!(
            vars,
            vec![
                ("LANG".to_string(), "C".to_string()),
                ("DISPLAY".to_string(), ":2".to_string()),
            ]
        );
    }

    #[test]
    fn env_file_provides_display() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "DISPLAY=remote:10.0\nXAUTHORITY=/tmp/xauth").unwrap();
        let vars = remote_display_vars(&settings("ZYNGINE_TEST_UNSET_DISPLAY", file.path())).unwrap();
        assert!(vars.contains(&("DISPLAY".to_string(), "remote:10.0".to_string())));
        assert!(vars.contains(&("XAUTHORITY".to_string(), "/tmp/xauth".to_string())));
    }

    #[test]
    fn no_display_without_file_or_variable() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("remote_display_env");
        assert!(remote_display_vars(&settings("ZYNGINE_TEST_UNSET_DISPLAY", &missing)).is_none());
    }

    #[test]
    fn file_without_display_is_ignored() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "DISPLAY=\nXAUTHORITY=/tmp/xauth").unwrap();
        assert!(remote_display_vars(&settings("ZYNGINE_TEST_UNSET_DISPLAY", file.path())).is_none());
    }
}
