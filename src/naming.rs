use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Inserts `suffix` between the file stem and its final extension:
/// `tile01.tif` becomes `tile01_ETM.tif`. Only the last extension is touched,
/// so `a.tif.tif` becomes `a.tif_ETM.tif`. The extension keeps its case.
/// A bare `.tif` has an empty stem and becomes `_ETM.tif`.
pub fn corrected_file_name(file_name: &Path, suffix: &str) -> Option<OsString> {
    if file_name.extension().is_none()
        && let Some(extension) = file_name
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(|name| name.strip_prefix('.'))
        && !extension.is_empty()
    {
        return Some(OsString::from(format!("{}.{}", suffix, extension)));
    }

    let stem = file_name.file_stem()?;
    let mut name = stem.to_os_string();
    name.push(suffix);

    if let Some(extension) = file_name.extension() {
        name.push(".");
        name.push(extension);
    }

    Some(name)
}

/// Output location of the corrected counterpart of `input`.
pub fn output_path(input: &Path, output_folder: &Path, suffix: &str) -> Option<PathBuf> {
    let file_name = Path::new(input.file_name()?);
    corrected_file_name(file_name, suffix).map(|name| output_folder.join(name))
}
