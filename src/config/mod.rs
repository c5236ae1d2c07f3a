//! Compiler and dispatch configuration.
//!
//! Read from `kernelforge.toml`:
//!
//! ```toml
//! [compiler]
//! dxc = "/opt/dxc/bin/dxc"
//! profile = "cs_6_6"
//! optimization = 3
//! args = ["-enable-16bit-types"]
//!
//! [dispatch]
//! thread_group = [64, 1, 1]
//! pool_capacity = 16
//! ```
//!
//! Every key is optional; [`CompilerConfig::default`] needs no file.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::kernel::{check_thread_group, DEFAULT_THREAD_GROUP};

/// File name searched for by [`CompilerConfig::discover`].
pub const CONFIG_FILE: &str = "kernelforge.toml";

/// Environment variable overriding the compiler executable.
pub const DXC_ENV: &str = "KERNELFORGE_DXC";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompilerConfig {
    /// Path or bare name of the `dxc` executable.
    pub dxc_path: PathBuf,
    /// Target profile passed as `-T`.
    pub profile: String,
    /// `-O0` through `-O3`.
    pub optimization: u8,
    /// Passed to the compiler verbatim, before the source path.
    pub extra_args: Vec<String>,
    /// `[numthreads]` of kernels that do not choose one.
    pub thread_group: [u32; 3],
    /// Idle dispatch-data buffers kept for reuse.
    pub pool_capacity: usize,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            dxc_path: PathBuf::from("dxc"),
            profile: "cs_6_0".to_string(),
            optimization: 3,
            extra_args: Vec::new(),
            thread_group: DEFAULT_THREAD_GROUP,
            pool_capacity: 16,
        }
    }
}

impl CompilerConfig {
    /// Find `kernelforge.toml` in `dir` or its ancestors. Defaults apply
    /// when there is none; the environment override applies either way.
    pub fn discover(dir: &Path) -> Result<Self> {
        let found = dir.ancestors().map(|d| d.join(CONFIG_FILE)).find(|p| p.is_file());
        let config = match found {
            Some(path) => Self::load(&path)?,
            None => Self::default(),
        };
        Ok(config.with_env_overrides())
    }

    /// Load a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("cannot read config '{}': {}", path.display(), e),
        })?;
        Self::parse(&content, path)
    }

    /// Parse configuration text; `path` only labels errors.
    pub fn parse(content: &str, path: &Path) -> Result<Self> {
        let err = |msg: String| Error::Config {
            message: format!("{}: {}", path.display(), msg),
        };

        let mut config = Self::default();
        let mut section = String::new();

        for (n, line) in content.lines().enumerate() {
            let trimmed = strip_comment(line).trim();
            if trimmed.is_empty() {
                continue;
            }
            if trimmed.starts_with('[') && trimmed.ends_with(']') {
                section = trimmed[1..trimmed.len() - 1].trim().to_string();
                continue;
            }
            let Some((key, value)) = trimmed.split_once('=') else {
                return Err(err(format!("line {}: expected `key = value`", n + 1)));
            };
            let key = key.trim();
            let value = value.trim();
            let unquoted = value.trim_matches('"');

            match (section.as_str(), key) {
                ("compiler", "dxc") => {
                    if unquoted.is_empty() {
                        return Err(err("compiler.dxc must not be empty".to_string()));
                    }
                    config.dxc_path = PathBuf::from(unquoted);
                }
                ("compiler", "profile") => {
                    if !unquoted.starts_with("cs_") {
                        return Err(err(format!(
                            "invalid compiler.profile '{}': expected a compute profile such as cs_6_0",
                            unquoted
                        )));
                    }
                    config.profile = unquoted.to_string();
                }
                ("compiler", "optimization") => {
                    config.optimization = match value.parse::<u8>() {
                        Ok(level) if level <= 3 => level,
                        _ => return Err(err(format!("invalid compiler.optimization: {}", value))),
                    };
                }
                ("compiler", "args") => {
                    if !is_array(value) {
                        return Err(err(format!("compiler.args must be an array: {}", value)));
                    }
                    config.extra_args = parse_string_array(value);
                }
                ("dispatch", "thread_group") => {
                    config.thread_group = parse_thread_group(value).map_err(err)?;
                }
                ("dispatch", "pool_capacity") => {
                    config.pool_capacity = value
                        .parse()
                        .map_err(|_| err(format!("invalid dispatch.pool_capacity: {}", value)))?;
                }
                ("compiler", _) | ("dispatch", _) => {
                    return Err(err(format!("unknown key {}.{}", section, key)));
                }
                _ => {}
            }
        }

        Ok(config)
    }

    /// Apply `KERNELFORGE_DXC` if it is set.
    pub fn with_env_overrides(self) -> Self {
        let value = std::env::var(DXC_ENV).ok();
        self.with_dxc_override(value.as_deref())
    }

    /// Replace the compiler path with `value` unless it is absent or blank.
    pub fn with_dxc_override(mut self, value: Option<&str>) -> Self {
        if let Some(path) = value.map(str::trim).filter(|v| !v.is_empty()) {
            self.dxc_path = PathBuf::from(path);
        }
        self
    }
}

fn strip_comment(line: &str) -> &str {
    let mut in_string = false;
    for (i, c) in line.char_indices() {
        match c {
            '"' => in_string = !in_string,
            '#' if !in_string => return &line[..i],
            _ => {}
        }
    }
    line
}

fn is_array(s: &str) -> bool {
    s.starts_with('[') && s.ends_with(']')
}

/// Parse a simple TOML array of strings: `["a", "b"]`.
fn parse_string_array(s: &str) -> Vec<String> {
    let s = s.trim();
    if !is_array(s) {
        return Vec::new();
    }
    let inner = &s[1..s.len() - 1];
    inner
        .split(',')
        .map(|part| part.trim().trim_matches('"').to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_thread_group(value: &str) -> std::result::Result<[u32; 3], String> {
    let invalid = || format!("invalid dispatch.thread_group: {}", value);
    if !is_array(value) {
        return Err(invalid());
    }
    let parts = parse_string_array(value);
    let [x, y, z] = parts.as_slice() else {
        return Err(invalid());
    };
    let mut size = [0u32; 3];
    for (slot, part) in size.iter_mut().zip([x, y, z]) {
        *slot = part.parse().map_err(|_| invalid())?;
    }
    check_thread_group(size).map_err(|message| format!("dispatch.{}", message))?;
    Ok(size)
}

#[cfg(test)]
mod tests;
