// Library interface for pkg-rs
// This allows tests and potentially other crates to use internal functions

pub mod util;

use anyhow::{Result, anyhow};
use orbispkg::Platform;
use std::path::{Path, PathBuf};

/// Determine output directory for extraction
///
/// Without an explicit output, entries go to a directory named after the
/// package, next to it.
pub fn determine_extract_output(input: &Path, specified_output: Option<&Path>) -> PathBuf {
    match specified_output {
        Some(output) => output.to_path_buf(),
        None => input.with_extension(""),
    }
}

/// Determine output file for creating a package
pub fn determine_create_output(
    content_id: &str,
    specified_output: Option<&Path>,
    overwrite: bool,
) -> Result<PathBuf> {
    if let Some(output) = specified_output {
        if output.is_dir() {
            let suggested = output.join(format!("{content_id}.pkg"));
            return Ok(util::get_final_output_path(suggested, overwrite));
        }
        return Ok(output.to_path_buf());
    }

    let current_dir = std::env::current_dir()?;
    let suggested = current_dir.join(format!("{content_id}.pkg"));
    Ok(util::get_final_output_path(suggested, overwrite))
}

/// Determine output file for a PSARC platform patch
///
/// The default is `<stem>_<platform>.psarc` next to the input.
pub fn determine_patch_output(
    input: &Path,
    platform: Platform,
    specified_output: Option<&Path>,
    overwrite: bool,
) -> Result<PathBuf> {
    if let Some(output) = specified_output {
        return Ok(output.to_path_buf());
    }

    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| anyhow!("Invalid input file name: {}", input.display()))?;
    let suggested = input.with_file_name(format!("{stem}_{}.psarc", platform.suffix()));
    Ok(util::get_final_output_path(suggested, overwrite))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_extract_output() {
        let input = Path::new("dlc/UP0001-TEST.pkg");
        assert_eq!(
            determine_extract_output(input, None),
            PathBuf::from("dlc/UP0001-TEST")
        );
        assert_eq!(
            determine_extract_output(input, Some(Path::new("out"))),
            PathBuf::from("out")
        );
    }

    #[test]
    fn test_create_output_in_directory() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let output = determine_create_output("UP0001-TEST", Some(temp_dir.path()), true)?;
        assert_eq!(output, temp_dir.path().join("UP0001-TEST.pkg"));

        let file = temp_dir.path().join("named.pkg");
        assert_eq!(determine_create_output("UP0001-TEST", Some(&file), false)?, file);
        Ok(())
    }

    #[test]
    fn test_patch_output() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let input = temp_dir.path().join("cooppois_p.psarc");

        let output = determine_patch_output(&input, Platform::Generic, None, false)?;
        assert_eq!(output, temp_dir.path().join("cooppois_p_pc.psarc"));

        let output = determine_patch_output(&input, Platform::AlternatePlatform, None, false)?;
        assert_eq!(output, temp_dir.path().join("cooppois_p_ps4.psarc"));
        Ok(())
    }
}
