//! Path normalizer (C2): turns whatever a client or config file hands us
//! into the single canonical form the catalog stores paths under.
//!
//! `normalize_file` and `normalize_root` are pure functions of their
//! input plus ambient OS state (home dir, mounted drives); the only
//! process-wide cache is for the Windows drive->UNC lookup, which is
//! expensive and stable for the life of the process.

#[cfg(target_os = "windows")]
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
#[cfg(target_os = "windows")]
use std::sync::Mutex;

#[cfg(target_os = "windows")]
mod unc_cache {
    use super::*;
    use std::sync::OnceLock;

    static CACHE: OnceLock<Mutex<HashMap<String, Option<String>>>> = OnceLock::new();

    pub fn get() -> &'static Mutex<HashMap<String, Option<String>>> {
        CACHE.get_or_init(|| Mutex::new(HashMap::new()))
    }
}

/// Strip a single layer of matching `"` or `'` quotes wrapping the string.
fn strip_quotes(s: &str) -> &str {
    let s = s.trim();
    for q in ['"', '\''] {
        if s.len() >= 2 && s.starts_with(q) && s.ends_with(q) {
            return &s[1..s.len() - 1];
        }
    }
    s
}

/// Expand a leading `~` or `$HOME`/`%USERPROFILE%`-style reference.
fn expand_home(s: &str) -> String {
    if let Some(rest) = s.strip_prefix("~/").or_else(|| s.strip_prefix("~\\")) {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest).to_string_lossy().into_owned();
        }
    }
    if s == "~" {
        if let Some(home) = dirs::home_dir() {
            return home.to_string_lossy().into_owned();
        }
    }
    s.to_string()
}

/// Collapse `.`/`..` components and unify separators without touching the
/// filesystem (the path may not exist yet, e.g. a root being registered).
fn lexically_normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                // Only pop if it wouldn't climb above a root/prefix.
                match out.components().next_back() {
                    Some(Component::Normal(_)) => {
                        out.pop();
                    }
                    _ => out.push(".."),
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn absolutize(s: &str) -> PathBuf {
    let expanded = expand_home(s);
    let path = Path::new(&expanded);
    if path.is_absolute() {
        lexically_normalize(path)
    } else {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"));
        lexically_normalize(&cwd.join(path))
    }
}

#[cfg(target_os = "windows")]
fn case_fold(s: &str) -> String {
    s.to_lowercase()
}

#[cfg(not(target_os = "windows"))]
fn case_fold(s: &str) -> String {
    // macOS's default filesystem is also case-insensitive, but unlike
    // Windows there's no single universal answer; we only fold on the
    // platform where it is unconditionally true.
    s.to_string()
}

/// Best-effort resolution of a mapped drive letter (`V:\`) to a stable
/// `\\host\share` UNC form via `WNetGetUniversalName`. Falls back to the
/// local form on any failure, and caches results process-wide since the
/// mapping is stable for the process lifetime.
#[cfg(target_os = "windows")]
fn resolve_unc(local_path: &str) -> String {
    let cache = unc_cache::get();
    {
        let guard = cache.lock().unwrap();
        if let Some(cached) = guard.get(local_path) {
            return cached.clone().unwrap_or_else(|| local_path.to_string());
        }
    }

    let resolved = win_unc::try_resolve(local_path);
    let mut guard = cache.lock().unwrap();
    guard.insert(local_path.to_string(), resolved.clone());
    resolved.unwrap_or_else(|| local_path.to_string())
}

#[cfg(target_os = "windows")]
mod win_unc {
    use windows::core::PCWSTR;
    use windows::Win32::Foundation::ERROR_MORE_DATA;
    use windows::Win32::NetworkManagement::WNet::{WNetGetUniversalNameW, UNIVERSAL_NAME_INFOW};

    /// Returns `Some(unc_path)` if the given local path is on a mapped
    /// network drive and the OS was able to resolve it, `None` otherwise.
    pub fn try_resolve(local_path: &str) -> Option<String> {
        let wide: Vec<u16> = local_path.encode_utf16().chain(std::iter::once(0)).collect();
        let mut buf = vec![0u8; 1024];
        loop {
            let mut size = buf.len() as u32;
            let result = unsafe {
                WNetGetUniversalNameW(
                    PCWSTR(wide.as_ptr()),
                    UNIVERSAL_NAME_INFOW,
                    buf.as_mut_ptr() as *mut _,
                    &mut size,
                )
            };
            if result.is_ok() {
                let info = unsafe { &*(buf.as_ptr() as *const UNIVERSAL_NAME_INFOW) };
                let s = unsafe { info.lpUniversalName.to_string().ok()? };
                return Some(s);
            }
            if result.0 == ERROR_MORE_DATA.0 {
                buf.resize(size as usize, 0);
                continue;
            }
            return None;
        }
    }
}

/// Normalize a file path: strip quotes, expand `~`, absolutize, collapse
/// `.`/`..`, unify separators, and case-fold on case-insensitive platforms.
/// Never performs the Windows drive->UNC lookup (see module docs).
pub fn normalize_file(raw: &str) -> String {
    let stripped = strip_quotes(raw);
    let abs = absolutize(stripped);
    let unified = abs.to_string_lossy().replace('\\', "/");
    case_fold(&unified)
}

/// Normalize a library root path. On Windows, additionally attempts to
/// resolve a mapped drive letter to a stable UNC form; every other
/// platform behaves identically to [`normalize_file`].
pub fn normalize_root(raw: &str) -> String {
    let stripped = strip_quotes(raw);
    let abs = absolutize(stripped);
    let local = abs.to_string_lossy().replace('\\', "/");

    #[cfg(target_os = "windows")]
    {
        let windows_form = local.replace('/', "\\");
        let resolved = resolve_unc(&windows_form);
        return case_fold(&resolved.replace('\\', "/"));
    }

    #[cfg(not(target_os = "windows"))]
    {
        case_fold(&local)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_wrapping_quotes() {
        assert_eq!(strip_quotes("\"/a/b\""), "/a/b");
        assert_eq!(strip_quotes("'/a/b'"), "/a/b");
        assert_eq!(strip_quotes("/a/b"), "/a/b");
    }

    #[test]
    fn collapses_dot_and_dotdot() {
        let p = lexically_normalize(Path::new("/a/b/../c/./d"));
        assert_eq!(p, PathBuf::from("/a/c/d"));
    }

    #[test]
    fn normalize_file_is_idempotent() {
        let once = normalize_file("/tmp/lib/../lib/a.zip");
        let twice = normalize_file(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn normalize_file_unifies_separators() {
        let n = normalize_file("/tmp/a/./b.zip");
        assert!(!n.contains('\\'));
    }
}
