use anyhow::{Context, Result};
use patcher_jartools::{
    default_output_path, diff_signatures, load_signatures, write_signatures, JarDumper,
};
use patcher_runner::ShellRunner;
use std::path::Path;
use tracing::info;

pub fn dump(jar: &Path, output: Option<&Path>) -> Result<i32> {
    let dumper = JarDumper::locate(ShellRunner::default())?;
    let signatures = dumper
        .dump(jar)
        .with_context(|| format!("failed to dump {}", jar.display()))?;

    let output = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| default_output_path(jar));
    write_signatures(&signatures, &output)?;
    info!(path = %output.display(), classes = signatures.len(), "signatures written");
    Ok(0)
}

pub fn diff(a: &Path, b: &Path) -> Result<i32> {
    let old = load_signatures(a)?;
    let new = load_signatures(b)?;
    let report = diff_signatures(&old, &new, &b.display().to_string());
    print!("{report}");
    if report.is_compatible() {
        info!("no removed classes or members");
    }
    Ok(0)
}
