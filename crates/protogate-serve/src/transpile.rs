//! JSX/TypeScript syntax stripping.
//!
//! Transpilation is delegated to an `esbuild` executable in transform mode:
//! source on stdin, ES module on stdout. Only syntax is rewritten; imports
//! are left for the browser's module loader and nothing is bundled.

use std::path::PathBuf;
use std::process::Stdio;

use anyhow::{Context, bail};
use async_trait::async_trait;
use protogate_core::FileKind;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Source dialect of a component artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// JavaScript with JSX.
    Jsx,
    /// TypeScript with JSX.
    Tsx,
}

impl Dialect {
    /// Dialect for a file kind, if it is a component.
    pub fn for_kind(kind: FileKind) -> Option<Self> {
        match kind {
            FileKind::Jsx => Some(Self::Jsx),
            FileKind::Tsx => Some(Self::Tsx),
            _ => None,
        }
    }

    fn loader(&self) -> &'static str {
        match self {
            Self::Jsx => "jsx",
            Self::Tsx => "tsx",
        }
    }
}

/// Strips type annotations and JSX from a component module.
///
/// Output must use the classic runtime (`React.createElement`) and keep
/// `import`/`export` statements intact.
#[async_trait]
pub trait Transpiler: Send + Sync {
    /// Transform `source` into a plain ES module.
    async fn transpile(&self, source: &str, dialect: Dialect) -> anyhow::Result<String>;
}

/// [`Transpiler`] that runs `esbuild` as a subprocess.
#[derive(Debug, Clone)]
pub struct EsbuildTranspiler {
    program: PathBuf,
}

impl EsbuildTranspiler {
    /// Use the `esbuild` executable at `program` (a bare name is looked up on `PATH`).
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn args(dialect: Dialect) -> Vec<String> {
        vec![
            format!("--loader={}", dialect.loader()),
            "--jsx=transform".to_string(),
            "--jsx-factory=React.createElement".to_string(),
            "--jsx-fragment=React.Fragment".to_string(),
            "--format=esm".to_string(),
            "--log-level=error".to_string(),
        ]
    }
}

#[async_trait]
impl Transpiler for EsbuildTranspiler {
    async fn transpile(&self, source: &str, dialect: Dialect) -> anyhow::Result<String> {
        let mut child = Command::new(&self.program)
            .args(Self::args(dialect))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to spawn {}", self.program.display()))?;

        // esbuild reads all of stdin before writing, so write then wait
        let mut stdin = child.stdin.take().context("transpiler stdin unavailable")?;
        stdin
            .write_all(source.as_bytes())
            .await
            .context("failed to write source to transpiler")?;
        drop(stdin);

        let output = child
            .wait_with_output()
            .await
            .context("failed to wait for transpiler")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("transpiler exited with {}: {}", output.status, stderr.trim());
        }

        String::from_utf8(output.stdout).context("transpiler produced invalid UTF-8")
    }
}
