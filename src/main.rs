use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use cgfx::{Cgfx, SaveOptions};
use clap::{Parser, Subcommand};
use itertools::Itertools;
use memmap2::Mmap;
use rootcause::prelude::*;
use tracing::{Level, info, warn};

/// Inspect and patch CGFX model files
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Increase log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args, Debug)]
struct SaveArgs {
    /// Store identical raw blobs once
    #[arg(long)]
    dedup_blobs: bool,

    /// Header size to write instead of the loaded one
    #[arg(long)]
    header_size: Option<u16>,
}

impl SaveArgs {
    fn options(&self) -> SaveOptions {
        SaveOptions::builder()
            .dedup_blobs(self.dedup_blobs)
            .maybe_header_size(self.header_size)
            .build()
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the chunks, dictionaries and textures of a model
    Info {
        model: PathBuf,

        /// Dump the loaded model as JSON
        #[arg(long)]
        json: bool,
    },
    /// Check that loading and saving reproduces each file byte for byte
    Verify {
        #[arg(required = true)]
        models: Vec<PathBuf>,
    },
    /// Load a model and save it again
    Rewrite {
        input: PathBuf,
        output: PathBuf,

        #[command(flatten)]
        save: SaveArgs,
    },
    /// Write each texture's native data to `<out-dir>/<name>.bin`
    Export { model: PathBuf, out_dir: PathBuf },
    /// Replace texture data from `<in-dir>/<name>.bin` files and save the result
    Import {
        model: PathBuf,
        in_dir: PathBuf,
        output: PathBuf,

        #[command(flatten)]
        save: SaveArgs,
    },
}

fn map_file(path: &Path) -> Result<Mmap, Report> {
    let file = File::open(path).context(format!("Failed to open {}", path.display()))?;
    // The file is only read, and not expected to change while mapped.
    let mmap = unsafe { Mmap::map(&file) }.context(format!("Failed to map {}", path.display()))?;
    Ok(mmap)
}

fn load_model(path: &Path) -> Result<Cgfx, Report> {
    let mmap = map_file(path)?;
    Ok(Cgfx::load(&mmap).context(format!("Failed to parse {}", path.display()))?)
}

/// Save `cgfx` and write it to `path`. Nothing is left at `path` if either step fails.
fn write_model(path: &Path, cgfx: &Cgfx, options: &SaveOptions) -> Result<(), Report> {
    let bytes = cgfx.save_with(options).context("Failed to save model")?;
    let result = std::fs::write(path, &bytes).context(format!("Failed to write {}", path.display()));
    if result.is_err() {
        let _ = std::fs::remove_file(path);
    }
    result?;
    info!(path = %path.display(), bytes = bytes.len(), "wrote model");
    Ok(())
}

fn first_difference(a: &[u8], b: &[u8]) -> Option<usize> {
    a.iter()
        .zip(b)
        .position(|(x, y)| x != y)
        .or_else(|| (a.len() != b.len()).then(|| a.len().min(b.len())))
}

fn texture_file(dir: &Path, name: &str) -> Result<PathBuf, Report> {
    if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
        return Err(rootcause::report!(
            "Texture name {:?} cannot be used as a file name",
            name
        ));
    }
    Ok(dir.join(format!("{name}.bin")))
}

fn info(path: &Path, json: bool) -> Result<(), Report> {
    let cgfx = load_model(path)?;
    if json {
        let text = serde_json::to_string_pretty(&cgfx).context("Failed to serialize model")?;
        println!("{text}");
        return Ok(());
    }

    println!(
        "{}: revision 0x{:08X}, {:?} endian, header 0x{:X} bytes",
        path.display(),
        cgfx.revision,
        cgfx.endianness,
        cgfx.header_size
    );
    println!("chunks: {}", cgfx.chunks.iter().map(|c| c.magic()).join(", "));

    let textures: Vec<_> = cgfx.textures().collect();
    println!("textures ({}):", textures.len());
    for (name, texture) in textures {
        let metadata = texture.header.metadata.as_ref().map_or(0, |m| m.len());
        println!(
            "  {name:<24} {:>4}x{:<4} {:<8} {:>8} bytes{}",
            texture.width,
            texture.height,
            texture.format.to_string(),
            texture.data().len(),
            if metadata > 0 {
                format!(", {metadata} metadata")
            } else {
                String::new()
            }
        );
    }
    Ok(())
}

fn verify(paths: &[PathBuf]) -> Result<(), Report> {
    let mut failures = 0usize;
    for path in paths {
        let original = map_file(path)?;
        let result = Cgfx::load(&original).and_then(|cgfx| cgfx.save());
        match result {
            Ok(saved) => match first_difference(&original, &saved) {
                None => println!("{}: OK", path.display()),
                Some(offset) => {
                    failures += 1;
                    println!(
                        "{}: MISMATCH at 0x{offset:X} (original {} bytes, saved {} bytes)",
                        path.display(),
                        original.len(),
                        saved.len()
                    );
                }
            },
            Err(e) => {
                failures += 1;
                println!("{}: FAILED: {e}", path.display());
            }
        }
    }
    if failures > 0 {
        return Err(rootcause::report!(
            "{} of {} file(s) did not round-trip",
            failures,
            paths.len()
        ));
    }
    Ok(())
}

fn export(model: &Path, out_dir: &Path) -> Result<(), Report> {
    let cgfx = load_model(model)?;
    std::fs::create_dir_all(out_dir).context(format!("Failed to create {}", out_dir.display()))?;
    let mut count = 0;
    for (name, texture) in cgfx.textures() {
        let path = texture_file(out_dir, name)?;
        std::fs::write(&path, texture.data()).context(format!("Failed to write {}", path.display()))?;
        count += 1;
    }
    println!("exported {count} texture(s) to {}", out_dir.display());
    Ok(())
}

fn import(model: &Path, in_dir: &Path, output: &Path, options: &SaveOptions) -> Result<(), Report> {
    let mut cgfx = load_model(model)?;
    let names: Vec<String> = cgfx.textures().map(|(name, _)| name.to_string()).collect();
    let Some(data) = cgfx.data_mut() else {
        return Err(rootcause::report!("{} has no DATA chunk", model.display()));
    };

    let mut count = 0;
    for name in names {
        let path = texture_file(in_dir, &name)?;
        if !path.is_file() {
            continue;
        }
        let bytes = std::fs::read(&path).context(format!("Failed to read {}", path.display()))?;
        if let Some(texture) = data.texture_mut(&name) {
            texture
                .replace_data(bytes)
                .context(format!("Failed to import {}", path.display()))?;
            count += 1;
        }
    }
    if count == 0 {
        warn!(dir = %in_dir.display(), "no texture files found to import");
    }

    write_model(output, &cgfx, options)?;
    println!("imported {count} texture(s) into {}", output.display());
    Ok(())
}

fn run(args: Args) -> Result<(), Report> {
    match args.command {
        Command::Info { model, json } => info(&model, json),
        Command::Verify { models } => verify(&models),
        Command::Rewrite {
            input,
            output,
            save,
        } => {
            let cgfx = load_model(&input)?;
            write_model(&output, &cgfx, &save.options())
        }
        Command::Export { model, out_dir } => export(&model, &out_dir),
        Command::Import {
            model,
            in_dir,
            output,
            save,
        } => import(&model, &in_dir, &output, &save.options()),
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    let level = match args.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgfx::data::dict::Dict;
    use cgfx::models::texture::{Texture, TextureFormat};

    fn sample_model(dir: &Path) -> PathBuf {
        let mut cgfx = Cgfx::new(1);
        let mut textures = Dict::new();
        for (name, fill) in [("Wood", 1u8), ("Metal", 2)] {
            let texture = Texture::builder()
                .name(name)
                .width(4)
                .height(4)
                .format(TextureFormat::L8)
                .data(vec![fill; 16])
                .build();
            textures.insert(name, texture).unwrap();
        }
        cgfx.data_mut().unwrap().textures = Some(textures);

        let path = dir.join("sample.bcres");
        write_model(&path, &cgfx, &SaveOptions::default()).unwrap();
        path
    }

    #[test]
    fn first_difference_offsets() {
        assert_eq!(first_difference(b"abc", b"abc"), None);
        assert_eq!(first_difference(b"abc", b"abd"), Some(2));
        assert_eq!(first_difference(b"abc", b"abcd"), Some(3));
    }

    #[test]
    fn verify_accepts_saved_model() {
        let dir = tempfile::tempdir().unwrap();
        let model = sample_model(dir.path());
        verify(&[model]).unwrap();
    }

    #[test]
    fn verify_rejects_corrupt_model() {
        let dir = tempfile::tempdir().unwrap();
        let model = sample_model(dir.path());
        let mut bytes = std::fs::read(&model).unwrap();
        bytes[0] = b'X';
        std::fs::write(&model, bytes).unwrap();
        assert!(verify(&[model]).is_err());
    }

    #[test]
    fn export_then_import() {
        let dir = tempfile::tempdir().unwrap();
        let model = sample_model(dir.path());
        let textures = dir.path().join("textures");
        export(&model, &textures).unwrap();
        assert_eq!(std::fs::read(textures.join("Wood.bin")).unwrap(), vec![1; 16]);

        std::fs::write(textures.join("Metal.bin"), vec![9; 16]).unwrap();
        let output = dir.path().join("patched.bcres");
        import(&model, &textures, &output, &SaveOptions::default()).unwrap();

        let patched = load_model(&output).unwrap();
        let metal = patched.data().unwrap().texture("Metal").unwrap();
        assert_eq!(metal.data(), &[9; 16]);
        let wood = patched.data().unwrap().texture("Wood").unwrap();
        assert_eq!(wood.data(), &[1; 16]);
    }

    #[test]
    fn failed_import_leaves_no_output() {
        let dir = tempfile::tempdir().unwrap();
        let model = sample_model(dir.path());
        let textures = dir.path().join("textures");
        std::fs::create_dir_all(&textures).unwrap();
        std::fs::write(textures.join("Wood.bin"), vec![0; 3]).unwrap();

        let output = dir.path().join("out.bcres");
        assert!(import(&model, &textures, &output, &SaveOptions::default()).is_err());
        assert!(!output.exists());
    }

    #[test]
    fn path_like_names_are_refused() {
        let dir = Path::new("out");
        assert!(texture_file(dir, "../escape").is_err());
        assert!(texture_file(dir, "..").is_err());
        assert_eq!(texture_file(dir, "Wood").unwrap(), dir.join("Wood.bin"));
    }
}
