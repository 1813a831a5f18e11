use std::path::Path;

/// Render `path` on `host` as a UNC-style reference (`\\host\drive\rest...`)
/// so that a results file produced on one machine still points somewhere
/// meaningful when opened from another, matching the original's
/// `__unc_path` helper. A Windows drive prefix (`C:`) is stripped in favor
/// of the bare drive letter; on Unix there is no drive letter to strip, so
/// the path is used as-is.
pub fn to_unc_path(host: &str, path: &Path) -> String {
    let raw = path.to_string_lossy().replace('/', "\\");
    let stripped = match raw.as_bytes() {
        [drive, b':', ..] if drive.is_ascii_alphabetic() => {
            format!("{}{}", (*drive as char).to_ascii_uppercase(), &raw[2..])
        }
        _ => raw,
    };
    let stripped = stripped.trim_start_matches('\\');
    format!("\\\\{host}\\{stripped}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn strips_windows_drive_letter() {
        let got = to_unc_path("buildhost", &PathBuf::from("C:\\work\\output\\run.log"));
        assert_eq!(got, "\\\\buildhost\\C\\work\\output\\run.log");
    }

    #[test]
    fn unix_path_has_no_drive_to_strip() {
        let got = to_unc_path("buildhost", &PathBuf::from("/var/sysrun/output/run.log"));
        assert_eq!(got, "\\\\buildhost\\var\\sysrun\\output\\run.log");
    }
}
