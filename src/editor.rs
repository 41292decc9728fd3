use crate::error::{Result, XgitError};
use std::io::Write;
use std::process::Command;
use tempfile::Builder;

pub fn resolve_editor(configured: Option<&str>) -> Result<String> {
    configured
        .map(str::to_string)
        .or_else(|| std::env::var("VISUAL").ok())
        .or_else(|| std::env::var("EDITOR").ok())
        .map(|e| e.trim().to_string())
        .filter(|e| !e.is_empty())
        .ok_or_else(|| XgitError::Editor("set `editor` in config.toml, $VISUAL or $EDITOR".to_string()))
}

/// Opens `text` in an external editor and returns the saved result. The temp
/// file keeps the extension of `path_hint` so editors pick the right syntax.
pub fn edit_text(editor: &str, path_hint: &str, text: &str) -> Result<String> {
    let suffix = std::path::Path::new(path_hint)
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_else(|| ".txt".to_string());

    let mut temp_file = Builder::new()
        .prefix("xgit-")
        .suffix(&suffix)
        .tempfile()?;
    temp_file.write_all(text.as_bytes())?;
    temp_file.flush()?;

    let temp_path = temp_file.path().to_owned();
    let quoted = shlex::try_quote(&temp_path.to_string_lossy())
        .map_err(|e| XgitError::Editor(e.to_string()))?
        .into_owned();

    // run via the shell so EDITOR may carry its own arguments
    let status = Command::new("sh")
        .arg("-c")
        .arg(format!("{editor} {quoted}"))
        .status()
        .map_err(|e| XgitError::Editor(format!("failed to run {editor}: {e}")))?;

    if !status.success() {
        return Err(XgitError::Editor(format!("{editor} exited with {status}")));
    }

    Ok(std::fs::read_to_string(&temp_path)?)
}
