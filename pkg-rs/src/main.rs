use anyhow::{Context, Result, anyhow, bail};
use clap::CommandFactory;
use clap::{Parser, Subcommand};
use log::{error, info, warn};
use orbispkg::diff::{self, HeaderFields};
use orbispkg::format;
use orbispkg::{
    ArchiveHandler, ControlAction, EntryId, Platform, PkgArchive, PkgBuilder, PkgReader,
    PsarcHeader, SfoDocument, psarc,
};
use pkg_rs::util::{self, InputFormat};
use pkg_rs::{determine_create_output, determine_extract_output, determine_patch_output};
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Create, inspect and compare PS4 DLC packages and PSARC archives
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Commands>,
    /// Change to directory before performing operations
    #[arg(short = 'C', long = "directory", global = true)]
    directory: Option<PathBuf>,
    /// Force overwrite existing files
    #[arg(short = 'f', long = "force", global = true, default_value_t = false)]
    overwrite: bool,
    /// Quiet mode (no progress output)
    #[arg(short = 'q', long = "quiet", global = true, default_value_t = false)]
    quiet: bool,
    /// Verbose mode (show detailed information)
    #[arg(short = 'v', long = "verbose", global = true, default_value_t = false)]
    verbose: bool,
    /// Input file use for drag-in
    #[arg(hide = true)]
    inputs: Vec<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a PKG from files/directories
    ///
    /// Directories are walked recursively. Well-known sce_sys names
    /// (param.sfo, icon0.png, ...) get their fixed ids, every other file
    /// gets the next free data id starting at 0x1201.
    #[command(visible_alias = "c", alias = "pack", alias = "p")]
    Create {
        /// Input file(s) or directories
        inputs: Vec<PathBuf>,
        /// Output pkg file (optional, default: <content-id>.pkg)
        #[arg(short = 'o', long = "output")]
        output: Option<PathBuf>,
        /// 36-character content id, e.g. UP0001-CUSA00745_00-RS001PACK0000001
        /// (default: generated from the first input's file name)
        #[arg(long)]
        content_id: Option<String>,
        /// Region prefix of a generated content id
        #[arg(long, default_value = format::DEFAULT_REGION)]
        region: String,
        /// Add the standard key, digest and license placeholder entries
        #[arg(long, default_value_t = false)]
        standard: bool,
        /// Generate a param.sfo with this title
        #[arg(long)]
        title: Option<String>,
        /// Title id for the generated param.sfo and content id (default: taken from the content id)
        #[arg(long)]
        title_id: Option<String>,
        /// Version for the generated param.sfo
        #[arg(long, default_value = "01.00")]
        app_version: String,
        /// Explicit entry as ID=PATH with a hex id, may be repeated
        #[arg(short = 'e', long = "entry", value_name = "ID=PATH")]
        entries: Vec<String>,
        /// Payload alignment in bytes
        #[arg(long, value_name = "N")]
        align: Option<String>,
        /// DRM type header value
        #[arg(long, value_name = "N")]
        drm_type: Option<String>,
        /// Content type header value
        #[arg(long, value_name = "N")]
        content_type: Option<String>,
        /// Content flags header value
        #[arg(long, value_name = "N")]
        content_flags: Option<String>,
    },
    /// Show header, entry table and structural checks of pkg file(s)
    #[command(visible_alias = "i", alias = "list", alias = "l")]
    Info {
        /// Input pkg file(s), can be a glob pattern
        input: String,
        /// Alignment the payloads are checked against
        #[arg(long, value_name = "N", default_value = "16")]
        align: String,
        /// Also show the param.sfo entry
        #[arg(short = 'l', long, default_value_t = false)]
        long: bool,
    },
    /// Extract every entry of pkg file(s) as <ID>_<NAME>.bin
    #[command(visible_alias = "x", alias = "unpack", alias = "u")]
    Extract {
        /// Input pkg file(s), can be a glob pattern
        input: String,
        /// Output directory (optional, default: named after the package)
        output: Option<PathBuf>,
    },
    /// Decode and print a PARAM.SFO
    Sfo {
        /// SFO file, or a pkg containing one
        input: PathBuf,
        /// Read the param.sfo entry of a pkg
        #[arg(long, default_value_t = false)]
        from_pkg: bool,
    },
    /// Inspect or patch PSARC archive headers
    Psarc {
        #[command(subcommand)]
        command: PsarcCommands,
    },
    /// Compare the headers of two pkg or two psarc files
    Diff {
        left: PathBuf,
        right: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
enum PsarcCommands {
    /// Show the PSARC header
    Info {
        /// Input psarc file(s), can be a glob pattern
        input: String,
    },
    /// Rewrite the platform flags
    ///
    /// If output is not specified, writes <stem>_pc.psarc or <stem>_ps4.psarc
    /// next to the input.
    Patch {
        input: PathBuf,
        /// Target platform: pc, ps4 or a raw flags value
        #[arg(short = 'p', long, default_value = "pc")]
        platform: String,
        /// Output psarc file
        #[arg(short = 'o', long = "output", conflicts_with = "in_place")]
        output: Option<PathBuf>,
        /// Patch the input file itself
        #[arg(long, default_value_t = false)]
        in_place: bool,
    },
}

/// Options of the create command
struct CreateOptions<'a> {
    inputs: &'a [PathBuf],
    output: Option<&'a Path>,
    content_id: Option<&'a str>,
    region: &'a str,
    standard: bool,
    title: Option<&'a str>,
    title_id: Option<&'a str>,
    app_version: &'a str,
    entries: &'a [String],
    align: Option<&'a str>,
    drm_type: Option<&'a str>,
    content_type: Option<&'a str>,
    content_flags: Option<&'a str>,
}

/// Content id of a new package: given, or generated from the first input's name
fn resolve_content_id(opts: &CreateOptions<'_>) -> Result<String> {
    if let Some(content_id) = opts.content_id {
        return Ok(content_id.to_string());
    }

    let first = match opts.inputs.first() {
        Some(input) => input.clone(),
        None => match opts.entries.first() {
            Some(spec) => util::parse_entry_spec(spec)?.1,
            None => bail!("No inputs to derive a content id from, use --content-id"),
        },
    };
    let name = first
        .canonicalize()
        .unwrap_or(first)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| anyhow!("Cannot derive a content id from the inputs, use --content-id"))?;

    let title_id = opts.title_id.unwrap_or(format::DEFAULT_TITLE_ID);
    let content_id = format::generate_content_id(&name, title_id, opts.region)?;
    info!("Generated content id {content_id} from {name:?}");
    Ok(content_id)
}

fn command_create(opts: &CreateOptions<'_>, overwrite: bool, quiet: bool) -> Result<()> {
    let content_id = resolve_content_id(opts)?;
    let content_id = content_id.as_str();

    let mut builder = PkgBuilder::new();
    builder.content_id(content_id);
    if let Some(align) = opts.align {
        builder.alignment(util::parse_number(align)?);
    }
    if let Some(drm_type) = opts.drm_type {
        builder.drm_type(util::parse_u32(drm_type)?);
    }
    if let Some(content_type) = opts.content_type {
        builder.content_type(util::parse_u32(content_type)?);
    }
    if let Some(content_flags) = opts.content_flags {
        builder.content_flags(util::parse_u32(content_flags)?);
    }

    // Explicit ids first so automatic ids never collide with them
    for spec in opts.entries {
        let (id, path) = util::parse_entry_spec(spec)?;
        builder
            .add_file(id, &path)
            .with_context(|| format!("Failed to add {}", path.display()))?;
    }

    for input in opts.inputs {
        if !input.exists() {
            bail!("Input path does not exist: {:?}", input);
        }
        if input.is_dir() {
            builder.add_dir(input)?;
        } else {
            builder.add_named_file(input)?;
        }
    }

    if opts.standard {
        builder.with_standard_entries();
    }

    if !builder.contains(EntryId::PARAM_SFO) {
        match opts.title {
            Some(title) => {
                let title_id = match opts.title_id {
                    Some(title_id) => title_id,
                    None => util::title_id_from_content_id(content_id).ok_or_else(|| {
                        anyhow!("Cannot derive a title id from the content id, use --title-id")
                    })?,
                };
                let sfo = SfoDocument::additional_content(
                    content_id,
                    title,
                    title_id,
                    opts.app_version,
                )?;
                builder.add_bytes(EntryId::PARAM_SFO, sfo.encode()?);
                info!("Generated param.sfo for {title_id}");
            }
            None => warn!("Package has no param.sfo, use --title to generate one"),
        }
    }

    let output_file = determine_create_output(content_id, opts.output, overwrite)?;
    info!(
        "Creating package {:?} with {} entries",
        output_file,
        builder.entry_count()
    );

    if quiet {
        builder.write_to_file(&output_file)?;
    } else {
        let mut handler = ProgressHandler::new();
        builder.write_to_file_with_progress(&output_file, &mut handler)?;

        let total_bytes = fs::metadata(&output_file)?.len();
        handler.print_summary(total_bytes);
    }

    Ok(())
}

fn command_info(paths: &[PathBuf], alignment: u64, long: bool) -> Result<()> {
    for path in paths {
        let mut archive = PkgArchive::open(path)?;
        let findings = archive.validate(alignment);

        println!("{}", path.display());
        println!();
        print_header(archive.header());
        println!();
        print_entries(&archive);
        println!();
        print_findings(&findings);

        if long {
            println!();
            match archive.param_sfo()? {
                Some(doc) => print_sfo(&doc),
                None => println!("No param.sfo entry"),
            }
        }
        println!();
    }
    Ok(())
}

fn command_extract_paths(paths: &[PathBuf], output: Option<&Path>, quiet: bool) -> Result<()> {
    for path in paths {
        let output_path = determine_extract_output(path, output);
        fs::create_dir_all(&output_path)?;
        info!("Extracting {:?} to {:?}", path, output_path);

        let mut archive = PkgArchive::open(path)?;

        if quiet {
            let mut handler = orbispkg::NoOpHandler;
            archive.extract_all_with_progress(&output_path, &mut handler)?;
        } else {
            let mut handler = ProgressHandler::new();
            archive.extract_all_with_progress(&output_path, &mut handler)?;

            let total_bytes = fs::metadata(path)?.len();
            handler.print_summary(total_bytes);
        }
    }
    Ok(())
}

fn command_sfo(input: &Path, from_pkg: bool) -> Result<()> {
    let doc = if from_pkg || util::sniff_format(input)? == InputFormat::Pkg {
        PkgArchive::open(input)?
            .param_sfo()?
            .ok_or_else(|| anyhow!("{} has no param.sfo entry", input.display()))?
    } else {
        let data = fs::read(input).with_context(|| format!("Failed to read {:?}", input))?;
        SfoDocument::decode(&data)?
    };
    print_sfo(&doc);
    Ok(())
}

fn read_psarc_header(path: &Path) -> Result<PsarcHeader> {
    let mut head = Vec::with_capacity(psarc::PSARC_HEADER_SIZE);
    File::open(path)
        .with_context(|| format!("Failed to open {:?}", path))?
        .take(psarc::PSARC_HEADER_SIZE as u64)
        .read_to_end(&mut head)?;
    Ok(PsarcHeader::parse(&head)?)
}

fn command_psarc_info(paths: &[PathBuf]) -> Result<()> {
    for path in paths {
        let header = read_psarc_header(path)?;
        println!("{}", path.display());
        println!();
        print_header(&header);
        println!();
    }
    Ok(())
}

fn command_psarc_patch(
    input: &Path,
    platform: Platform,
    output: Option<&Path>,
    in_place: bool,
    overwrite: bool,
) -> Result<()> {
    if in_place {
        let (previous, _) = psarc::patch_file(input, platform.code())?;
        info!("Patched {:?} in place: {} -> {}", input, previous, platform);
        return Ok(());
    }

    let output_file = determine_patch_output(input, platform, output, overwrite)?;
    let data = fs::read(input).with_context(|| format!("Failed to read {:?}", input))?;
    let outcome = psarc::patch_platform_flag(&data, platform.code())?;
    if outcome.unchanged(platform.code()) {
        info!("{:?} already targets {}", input, platform);
    }

    fs::write(&output_file, &outcome.bytes)
        .with_context(|| format!("Failed to write {:?}", output_file))?;
    info!(
        "Patched {:?} -> {:?}: {} -> {}",
        input, output_file, outcome.previous, platform
    );
    Ok(())
}

fn command_diff(left: &Path, right: &Path) -> Result<()> {
    let left_format = util::sniff_format(left)?;
    let right_format = util::sniff_format(right)?;
    if left_format != right_format {
        bail!(
            "Cannot compare {:?} ({:?}) with {:?} ({:?})",
            left,
            left_format,
            right,
            right_format
        );
    }

    println!("left:  {}", left.display());
    println!("right: {}", right.display());
    println!();

    match left_format {
        InputFormat::Pkg => {
            let mut left_reader = PkgReader::open(left)?;
            let mut right_reader = PkgReader::open(right)?;

            println!("Header fields:");
            print_lines(&diff::diff_headers(
                left_reader.header(),
                right_reader.header(),
            ));

            println!();
            println!("Entries:");
            let left_entries = left_reader.summarize()?;
            let right_entries = right_reader.summarize()?;
            print_lines(&diff::diff_entries(&left_entries, &right_entries));

            println!();
            println!("Raw header bytes:");
            let left_head = read_head(left, 0x100)?;
            let right_head = read_head(right, 0x100)?;
            print_lines(&diff::diff_header_bytes(&left_head, &right_head));
        }
        InputFormat::Psarc => {
            let left_header = read_psarc_header(left)?;
            let right_header = read_psarc_header(right)?;
            println!("Header fields:");
            print_lines(&diff::diff_headers(&left_header, &right_header));
        }
        other => bail!("Cannot compare {:?} files", other),
    }
    Ok(())
}

fn read_head(path: &Path, len: u64) -> Result<Vec<u8>> {
    let mut head = Vec::new();
    File::open(path)?.take(len).read_to_end(&mut head)?;
    Ok(head)
}

fn print_lines<T: std::fmt::Display>(items: &[T]) {
    if items.is_empty() {
        println!("  no differences");
    }
    for item in items {
        println!("  {item}");
    }
}

#[cfg(feature = "display")]
fn print_header<H: HeaderFields>(header: &H) {
    println!("{}", orbispkg::display::HeaderView::new(header));
}

#[cfg(not(feature = "display"))]
fn print_header<H: HeaderFields>(header: &H) {
    for (field, value) in header.fields() {
        println!("{field}: {value}");
    }
}

#[cfg(feature = "display")]
fn print_entries(archive: &PkgArchive) {
    println!(
        "{}",
        orbispkg::display::EntryList::from_records(archive.entries())
    );
}

#[cfg(not(feature = "display"))]
fn print_entries(archive: &PkgArchive) {
    for entry in archive.entries() {
        println!(
            "{}: offset 0x{:X}, {} bytes",
            entry.entry_id(),
            entry.file_offset,
            entry.file_size
        );
    }
}

#[cfg(feature = "display")]
fn print_findings(findings: &[diff::Finding]) {
    println!("{}", orbispkg::display::FindingList(findings));
}

#[cfg(not(feature = "display"))]
fn print_findings(findings: &[diff::Finding]) {
    for finding in findings {
        println!("{finding}");
    }
}

#[cfg(feature = "display")]
fn print_sfo(doc: &SfoDocument) {
    println!("{}", orbispkg::display::SfoView::new(doc));
}

#[cfg(not(feature = "display"))]
fn print_sfo(doc: &SfoDocument) {
    for entry in doc.entries() {
        println!("{}: {}", entry.key, entry.value);
    }
}

/// Progress handler that collects statistics and prints progress
struct ProgressHandler {
    start_time: Instant,
    total_files: usize,
}

impl ProgressHandler {
    fn new() -> Self {
        Self {
            start_time: Instant::now(),
            total_files: 0,
        }
    }

    fn print_summary(&self, total_bytes: u64) {
        let elapsed = self.start_time.elapsed();
        let elapsed_secs = elapsed.as_secs_f64();
        let speed = if elapsed_secs > 0.0 {
            total_bytes as f64 / elapsed_secs / 1024.0 / 1024.0
        } else {
            0.0
        };

        info!(
            "Done: Time: {:.2}s, Entries: {}, Size: {:.2} MB, Speed: {:.2} MB/s",
            elapsed_secs,
            self.total_files,
            total_bytes as f64 / 1024.0 / 1024.0,
            speed
        );
    }
}

impl ArchiveHandler for ProgressHandler {
    fn on_entry_started(&mut self, name: &str) -> ControlAction {
        self.total_files += 1;
        info!("Processing: {}", name);
        ControlAction::Continue
    }
}

/// Drag-in: packages are extracted, PSARC archives are patched for PC
fn process_dropped_inputs(inputs: &[PathBuf], overwrite: bool, quiet: bool) -> Result<()> {
    for input in inputs {
        match util::sniff_format(input)? {
            InputFormat::Pkg => command_extract_paths(std::slice::from_ref(input), None, quiet)?,
            InputFormat::Psarc => {
                command_psarc_patch(input, Platform::Generic, None, false, overwrite)?
            }
            other => warn!("Skipping {:?}: unsupported format {:?}", input, other),
        }
    }
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run() {
        error!("Fatal error: {e:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Args::parse();

    // Change directory if specified
    if let Some(dir) = &cli.directory {
        std::env::set_current_dir(dir)
            .map_err(|e| anyhow!("Failed to change directory to {:?}: {}", dir, e))?;
        info!("Changed working directory to {:?}", dir);
    }

    let overwrite = cli.overwrite;
    let quiet = cli.quiet;
    let verbose = cli.verbose;

    // Set log level based on verbose/quiet flags
    if verbose && !quiet {
        log::set_max_level(log::LevelFilter::Debug);
    }

    match &cli.command {
        Some(command) => match command {
            Commands::Create {
                inputs,
                output,
                content_id,
                region,
                standard,
                title,
                title_id,
                app_version,
                entries,
                align,
                drm_type,
                content_type,
                content_flags,
            } => {
                let opts = CreateOptions {
                    inputs,
                    output: output.as_deref(),
                    content_id: content_id.as_deref(),
                    region,
                    standard: *standard,
                    title: title.as_deref(),
                    title_id: title_id.as_deref(),
                    app_version,
                    entries,
                    align: align.as_deref(),
                    drm_type: drm_type.as_deref(),
                    content_type: content_type.as_deref(),
                    content_flags: content_flags.as_deref(),
                };
                command_create(&opts, overwrite, quiet)?;
            }
            Commands::Info { input, align, long } => {
                let files = util::glob_expand(input)?;
                command_info(&files, util::parse_number(align)?, *long)?;
            }
            Commands::Extract { input, output } => {
                let files = util::glob_expand(input)?;
                command_extract_paths(&files, output.as_deref(), quiet)?;
            }
            Commands::Sfo { input, from_pkg } => command_sfo(input, *from_pkg)?,
            Commands::Psarc { command } => match command {
                PsarcCommands::Info { input } => {
                    let files = util::glob_expand(input)?;
                    command_psarc_info(&files)?;
                }
                PsarcCommands::Patch {
                    input,
                    platform,
                    output,
                    in_place,
                } => {
                    let platform = Platform::from_name(platform)
                        .ok_or_else(|| anyhow!("Unknown platform: '{platform}'"))?;
                    command_psarc_patch(input, platform, output.as_deref(), *in_place, overwrite)?;
                }
            },
            Commands::Diff { left, right } => command_diff(left, right)?,
        },
        None => {
            if !cli.inputs.is_empty() {
                process_dropped_inputs(&cli.inputs, overwrite, quiet)?;
            } else {
                let mut cmd = Args::command();
                cmd.print_help()?;
            }
        }
    }
    Ok(())
}
