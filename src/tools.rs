// External tool resolver for ffmpeg/ffprobe
//
// Resolution order:
// 1) Environment variable override (REELVAULT_FFPROBE_PATH, REELVAULT_FFMPEG_PATH)
// 2) Binary in the same directory as the reelvault executable
// 3) PATH fallback

use std::env;
use std::path::{Path, PathBuf};

/// Get the directory containing the current executable
fn exe_dir() -> Option<PathBuf> {
    env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|d| d.to_path_buf()))
}

/// Resolve a tool path.
fn resolve_tool(env_key: &str, default_name: &str) -> PathBuf {
    resolve_from(env_key, default_name, exe_dir().as_deref())
}

fn resolve_from(env_key: &str, default_name: &str, exe_dir: Option<&Path>) -> PathBuf {
    // 1) Check environment variable override
    if let Ok(v) = env::var(env_key) {
        let p = PathBuf::from(&v);
        if p.exists() {
            return p;
        }
    }

    // Add .exe on Windows
    let mut filename = default_name.to_string();
    if cfg!(windows) && !filename.to_lowercase().ends_with(".exe") {
        filename.push_str(".exe");
    }

    // 2) Check next to executable
    if let Some(dir) = exe_dir {
        let candidate = dir.join(&filename);
        if candidate.exists() {
            return candidate;
        }
    }

    // 3) Fall back to PATH
    PathBuf::from(default_name)
}

/// Get path to ffprobe binary
pub fn ffprobe_path() -> PathBuf {
    resolve_tool("REELVAULT_FFPROBE_PATH", "ffprobe")
}

/// Get path to ffmpeg binary
pub fn ffmpeg_path() -> PathBuf {
    resolve_tool("REELVAULT_FFMPEG_PATH", "ffmpeg")
}

/// Check if a tool is available at the resolved path
pub fn is_tool_available(tool: &str) -> bool {
    let path = match tool {
        "ffprobe" => ffprobe_path(),
        "ffmpeg" => ffmpeg_path(),
        _ => return false,
    };

    // Resolved tools are always executed once; an existing file may still be broken
    std::process::Command::new(&path)
        .arg("-version")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}
