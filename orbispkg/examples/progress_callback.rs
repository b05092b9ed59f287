//! Example demonstrating progress reporting and cancellation with ArchiveHandler.

use orbispkg::{
    ArchiveHandler, ControlAction, OperationType, PkgArchive, PkgBuilder, ProgressInfo, Result,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// A simple handler that prints progress to stdout
struct SimpleProgressHandler {
    last_percentage: f64,
}

impl SimpleProgressHandler {
    fn new() -> Self {
        Self {
            last_percentage: 0.0,
        }
    }
}

impl ArchiveHandler for SimpleProgressHandler {
    fn on_started(&mut self, operation: OperationType) -> ControlAction {
        println!("Operation started: {operation:?}");
        ControlAction::Continue
    }

    fn on_entry_started(&mut self, name: &str) -> ControlAction {
        println!("  Processing: {name}");
        ControlAction::Continue
    }

    fn on_progress(&mut self, info: &ProgressInfo) -> ControlAction {
        let percentage = info.overall_progress();
        if (percentage - self.last_percentage).abs() >= 1.0 {
            println!(
                "  Progress: {:.1}% ({}/{} entries, {} bytes)",
                percentage,
                info.processed_files,
                info.total_files.unwrap_or(0),
                info.processed_bytes
            );
            self.last_percentage = percentage;
        }
        ControlAction::Continue
    }

    fn on_finished(&mut self) {
        println!("Operation finished successfully!");
    }
}

/// A handler that can be cancelled externally
struct CancellableHandler {
    cancel_flag: Arc<AtomicBool>,
    inner: SimpleProgressHandler,
}

impl ArchiveHandler for CancellableHandler {
    fn on_entry_started(&mut self, name: &str) -> ControlAction {
        if self.cancel_flag.load(Ordering::SeqCst) {
            println!("  Cancellation requested!");
            return ControlAction::Abort;
        }
        self.inner.on_entry_started(name)
    }

    fn on_progress(&mut self, info: &ProgressInfo) -> ControlAction {
        // Cancel once half of the bytes are done
        if info.overall_progress() >= 50.0 {
            self.cancel_flag.store(true, Ordering::SeqCst);
        }
        self.inner.on_progress(info)
    }
}

fn main() -> Result<()> {
    let temp_dir = std::env::temp_dir().join("orbispkg_progress_example");
    let _ = std::fs::remove_dir_all(&temp_dir);
    std::fs::create_dir_all(&temp_dir)?;
    let pkg_path = temp_dir.join("test.pkg");
    let output_dir = temp_dir.join("output");

    let mut builder = PkgBuilder::new();
    builder.content_id("UP0001-CUSA00745_00-RS001PACK0000001");
    for i in 0..10u32 {
        let content = format!("Payload of entry {i}\n").repeat(1000);
        builder.add_bytes(0x1201 + i, content.into_bytes());
    }

    println!("=== Example 1: Pack with progress reporting ===");
    builder.write_to_file_with_progress(&pkg_path, &mut SimpleProgressHandler::new())?;

    println!("\n=== Example 2: Extract with progress reporting ===");
    let mut archive = PkgArchive::open(&pkg_path)?;
    archive.extract_all_with_progress(&output_dir, &mut SimpleProgressHandler::new())?;
    std::fs::remove_dir_all(&output_dir)?;

    println!("\n=== Example 3: Extract with cancellation ===");
    let mut handler = CancellableHandler {
        cancel_flag: Arc::new(AtomicBool::new(false)),
        inner: SimpleProgressHandler::new(),
    };
    match archive.extract_all_with_progress(&output_dir, &mut handler) {
        Ok(_) => println!("Extraction completed"),
        Err(orbispkg::Error::Cancelled) => println!("Extraction was cancelled"),
        Err(e) => return Err(e),
    }

    let _ = std::fs::remove_dir_all(&temp_dir);
    println!("\n=== All examples completed ===");
    Ok(())
}
