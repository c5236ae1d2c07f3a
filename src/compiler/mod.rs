//! Native shader compilation.
//!
//! [`ShaderCompiler`] is the seam between generated dialect text and a
//! compiled program. [`DxcCompiler`] drives the `dxc` executable; tests and
//! hosts without one plug in their own implementation.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::debug;

use crate::config::CompilerConfig;
use crate::error::{Error, Result};

/// Output of one successful compilation.
#[derive(Clone, PartialEq, Eq)]
pub struct CompiledProgram {
    bytecode: Vec<u8>,
    entry_point: String,
}

impl CompiledProgram {
    pub fn new(bytecode: Vec<u8>, entry_point: impl Into<String>) -> Self {
        Self {
            bytecode,
            entry_point: entry_point.into(),
        }
    }

    pub fn bytecode(&self) -> &[u8] {
        &self.bytecode
    }

    pub fn entry_point(&self) -> &str {
        &self.entry_point
    }
}

impl fmt::Debug for CompiledProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledProgram")
            .field("entry_point", &self.entry_point)
            .field("bytes", &self.bytecode.len())
            .finish()
    }
}

/// Turns dialect source into a program. Runs synchronously and only on a
/// cache miss.
pub trait ShaderCompiler: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Compile `source`, whose entry function is `entry_point`. A rejected
    /// source is [`Error::Compilation`] carrying the compiler's own text.
    fn compile(&self, source: &str, entry_point: &str) -> Result<CompiledProgram>;
}

// ─── dxc ───────────────────────────────────────────────────────────

/// Runs `dxc -T <profile> -E <entry> -O<level> [args] -Fo <out> <source>`.
#[derive(Clone, Debug)]
pub struct DxcCompiler {
    executable: PathBuf,
    profile: String,
    optimization: u8,
    extra_args: Vec<String>,
}

impl DxcCompiler {
    pub fn new(config: &CompilerConfig) -> Self {
        Self {
            executable: config.dxc_path.clone(),
            profile: config.profile.clone(),
            optimization: config.optimization,
            extra_args: config.extra_args.clone(),
        }
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    fn command(&self, entry_point: &str, source: &Path, output: &Path) -> Command {
        let mut cmd = Command::new(&self.executable);
        cmd.arg("-T")
            .arg(&self.profile)
            .arg("-E")
            .arg(entry_point)
            .arg(format!("-O{}", self.optimization))
            .args(&self.extra_args)
            .arg("-Fo")
            .arg(output)
            .arg(source);
        cmd
    }
}

impl ShaderCompiler for DxcCompiler {
    fn name(&self) -> &str {
        "dxc"
    }

    fn compile(&self, source: &str, entry_point: &str) -> Result<CompiledProgram> {
        let dir = tempfile::tempdir()?;
        let source_path = dir.path().join("kernel.hlsl");
        let output_path = dir.path().join("kernel.dxil");
        std::fs::write(&source_path, source)?;

        debug!(
            executable = %self.executable.display(),
            profile = %self.profile,
            entry_point,
            bytes = source.len(),
            "invoking dxc"
        );
        let output = self
            .command(entry_point, &source_path, &output_path)
            .output()
            .map_err(|e| Error::Io {
                message: format!("failed to run {}: {}", self.executable.display(), e),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let diagnostics = if stderr.trim().is_empty() {
                let stdout = String::from_utf8_lossy(&output.stdout);
                if stdout.trim().is_empty() {
                    format!("{} exited with {}", self.executable.display(), output.status)
                } else {
                    stdout.into_owned()
                }
            } else {
                stderr.into_owned()
            };
            return Err(Error::Compilation { diagnostics });
        }

        let bytecode = std::fs::read(&output_path).map_err(|e| Error::Io {
            message: format!("cannot read compiler output '{}': {}", output_path.display(), e),
        })?;
        Ok(CompiledProgram::new(bytecode, entry_point))
    }
}
