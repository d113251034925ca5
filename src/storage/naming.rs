use std::path::Path;

/// Build a collision-resistant stored name from an uploaded file name:
/// `<base><uuid>.<ext>`, where `base` is everything before the first `.`
/// and `ext` everything after the last one.
pub fn unique_name(original: &str) -> String {
    let token = uuid::Uuid::new_v4();
    let file_name = Path::new(original)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    // Browsers on Windows may send backslash-separated paths
    let file_name = file_name.rsplit('\\').next().unwrap_or_default();

    let base = file_name.split('.').next().unwrap_or_default();
    match file_name.rsplit_once('.') {
        Some((_, ext)) if !ext.is_empty() => format!("{}{}.{}", base, token, ext),
        _ => format!("{}{}", base, token),
    }
}

/// Stored names are flat: no separators, no parent references, not empty.
pub fn is_safe_name(name: &str) -> bool {
    !name.is_empty()
        && !name.contains('/')
        && !name.contains('\\')
        && !name.contains("..")
        && name != "."
}
