use anyhow::{Context, Result, anyhow, bail};
use orbispkg::{format, psarc, sfo};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

pub fn glob_expand(input: &str) -> Result<Vec<PathBuf>> {
    let paths = glob::glob(input)?.collect::<Result<Vec<_>, _>>()?;
    if paths.is_empty() {
        return Err(anyhow!("No files found matching pattern: '{}'", input));
    }
    Ok(paths)
}

/// Container format recognized by its magic number
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    Pkg,
    Psarc,
    Sfo,
    Unknown,
}

/// Classifies the first bytes of a file
pub fn detect_format(head: &[u8]) -> InputFormat {
    if format::validate_magic(head).is_ok() {
        InputFormat::Pkg
    } else if psarc::validate_magic(head).is_ok() {
        InputFormat::Psarc
    } else if sfo::validate_magic(head).is_ok() {
        InputFormat::Sfo
    } else {
        InputFormat::Unknown
    }
}

/// Reads the magic number of a file and classifies it
pub fn sniff_format(path: &Path) -> Result<InputFormat> {
    let mut head = Vec::with_capacity(4);
    File::open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?
        .take(4)
        .read_to_end(&mut head)?;
    Ok(detect_format(&head))
}

/// Parses a decimal or `0x`-prefixed hexadecimal number
pub fn parse_number(input: &str) -> Result<u64> {
    let input = input.trim();
    let value = match input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
    {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => input.parse(),
    };
    value.with_context(|| format!("Invalid number: '{input}'"))
}

/// Parses a 32-bit header value given as decimal or hex
pub fn parse_u32(input: &str) -> Result<u32> {
    let value = parse_number(input)?;
    u32::try_from(value).map_err(|_| anyhow!("Value out of range for 32 bits: '{input}'"))
}

/// Parses an `ID=PATH` entry specification; the id is hexadecimal
pub fn parse_entry_spec(spec: &str) -> Result<(u32, PathBuf)> {
    let (id, path) = spec
        .split_once('=')
        .ok_or_else(|| anyhow!("Entry must be given as ID=PATH, got '{spec}'"))?;
    let id = id.trim();
    let id = id
        .strip_prefix("0x")
        .or_else(|| id.strip_prefix("0X"))
        .unwrap_or(id);
    let id = u32::from_str_radix(id, 16).with_context(|| format!("Invalid entry id in '{spec}'"))?;
    if path.is_empty() {
        bail!("Missing path in entry '{spec}'");
    }
    Ok((id, PathBuf::from(path)))
}

/// Title id embedded in a content id, e.g. `CUSA00745` in `UP0001-CUSA00745_00-...`
pub fn title_id_from_content_id(content_id: &str) -> Option<&str> {
    let title_id = content_id.get(7..16)?;
    title_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric())
        .then_some(title_id)
}

/// input: dir: workdir/test stem: song ext: psarc
/// output: Ok(workdir/test/song.psarc) or Ok(workdir/test/song.000.psarc)
pub fn try_get_next_nonexist(dir: &Path, stem: &str, ext: &str) -> PathBuf {
    let path = dir.join(format!("{stem}.{ext}"));
    if !path.exists() {
        return path;
    }
    let mut i = 0;
    loop {
        let path = dir.join(format!("{stem}.{i:03}.{ext}"));
        if !path.exists() {
            return path;
        }
        i += 1;
    }
}

/// Picks a free output path unless overwriting is allowed
pub fn get_final_output_path(suggested_output: PathBuf, overwrite: bool) -> PathBuf {
    if overwrite {
        return suggested_output;
    }
    let parent = suggested_output.parent().unwrap_or(Path::new(""));
    match (
        suggested_output.file_stem().and_then(|s| s.to_str()),
        suggested_output.extension().and_then(|s| s.to_str()),
    ) {
        (Some(stem), Some(ext)) => try_get_next_nonexist(parent, stem, ext),
        _ => suggested_output,
    }
}
