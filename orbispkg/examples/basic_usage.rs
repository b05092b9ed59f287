//! Example program demonstrating the orbispkg library usage

use orbispkg::psarc::{self, Platform};
use orbispkg::{EntryId, PkgArchive, PkgBuilder, Result, SfoDocument, create_from_dir, extract};
use std::fs;

const CONTENT_ID: &str = "UP0001-CUSA00745_00-RS001PACK0000001";

fn main() -> Result<()> {
    let temp_dir = std::env::temp_dir().join("orbispkg_example");
    let input_dir = temp_dir.join("input");
    let pkg_path = temp_dir.join("example.pkg");
    let output_dir = temp_dir.join("output");

    // Clean up any existing files
    let _ = fs::remove_dir_all(&temp_dir);

    // A DLC directory: sce_sys metadata plus one song archive
    let sce_sys = input_dir.join("sce_sys");
    fs::create_dir_all(&sce_sys)?;
    let sfo = SfoDocument::additional_content(CONTENT_ID, "Example Song Pack", "CUSA00745", "01.00")?;
    fs::write(sce_sys.join("param.sfo"), sfo.encode()?)?;
    fs::write(sce_sys.join("icon0.png"), b"fake PNG data")?;

    let mut song = vec![0u8; 64];
    song[..4].copy_from_slice(b"PSAR");
    song[28..32].copy_from_slice(&0u32.to_be_bytes());
    fs::write(input_dir.join("song_p.psarc"), &song)?;

    println!("=== orbispkg Example ===\n");

    println!("1. Creating a package using the convenience function...");
    create_from_dir(&input_dir, &pkg_path, CONTENT_ID)?;
    println!("   Created: {}", pkg_path.display());

    println!("\n2. Reading package information...");
    let mut archive = PkgArchive::open(&pkg_path)?;
    println!("   Content id: {}", archive.header().content_id);
    println!("   Package contains {} entries:", archive.len());
    for entry in archive.entries() {
        println!(
            "   - {}: {} bytes at 0x{:X}",
            entry.entry_id(),
            entry.file_size,
            entry.file_offset
        );
    }

    println!("\n3. Reading the embedded param.sfo...");
    if let Some(doc) = archive.param_sfo()? {
        for entry in doc.entries() {
            println!("   {} = {}", entry.key, entry.value);
        }
    }

    println!("\n4. Extracting the package...");
    for path in extract(&pkg_path, &output_dir)? {
        println!("   Wrote: {}", path.display());
    }

    println!("\n5. Patching the song archive to the PS4 platform flags...");
    let outcome = psarc::patch_platform_flag(&song, Platform::AlternatePlatform.code())?;
    println!("   Previous platform: {}", outcome.previous);

    println!("\n6. Building a package in memory with custom settings...");
    let mut builder = PkgBuilder::new();
    builder
        .content_id(CONTENT_ID)
        .alignment(0x1000)
        .add_bytes(EntryId::PARAM_SFO, sfo.encode()?)
        .add_bytes(EntryId::FIRST_DATA_FILE, outcome.bytes);
    let bytes = builder.to_bytes()?;
    let parsed = orbispkg::parse(&bytes)?;
    println!(
        "   {} bytes, body at 0x{:X}",
        bytes.len(),
        parsed.header.body_offset
    );

    #[cfg(feature = "display")]
    {
        println!("\n7. Pretty-printing package contents...");
        println!("{}", orbispkg::display::EntryList::from_records(&parsed.entries));
    }

    // Clean up
    println!("\nCleaning up temporary files...");
    let _ = fs::remove_dir_all(&temp_dir);

    println!("\n=== Example completed successfully! ===");
    Ok(())
}
