use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use which::which;

/// Launcher names ZAP ships under, tried in order.
const ZAP_LAUNCHERS: &[&str] = &["zap.sh", "zap", "zaproxy", "zap.bat"];

/// Resolves the full path to the scanner launcher.
/// Search order: explicit path → ./tools/{name} → System PATH
pub fn get_scanner_path(explicit: Option<&str>) -> Option<String> {
    // 1. Explicit setting wins; it may be a bare name to look up on PATH
    if let Some(path) = explicit.map(str::trim).filter(|p| !p.is_empty()) {
        if Path::new(path).exists() {
            return Some(path.to_string());
        }
        return which(path).ok().map(|p| p.to_string_lossy().to_string());
    }

    discover_launcher(Path::new("./tools"))
}

fn discover_launcher(tools_dir: &Path) -> Option<String> {
    for name in ZAP_LAUNCHERS {
        // 2. Check the tools directory
        let tools_path = tools_dir.join(name);
        if tools_path.exists() {
            return Some(tools_path.to_string_lossy().to_string());
        }

        // 3. Check system PATH
        if let Ok(path) = which(name) {
            return Some(path.to_string_lossy().to_string());
        }
    }

    None
}

/// Atomic write: write to `<path>.tmp`, then rename over the real file,
/// so readers never observe a half-written artifact.
pub fn write_atomic(path: &Path, contents: &str) -> io::Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    if let Err(e) = fs::write(&tmp, contents).and_then(|_| fs::rename(&tmp, path)) {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    Ok(())
}
