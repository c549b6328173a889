use std::env;
use std::fs;
use std::time::Instant;

use tracto_reader::tracto::codec::compression;
use tracto_reader::{decode_tck, decode_trk, decode_trx, decode_tt, decode_vtk, Tractogram};

const DEFAULT_RUNS: u32 = 10;

fn main() {
    let args: Vec<String> = env::args().collect();

    let mut runs = DEFAULT_RUNS;
    let mut files: Vec<&str> = Vec::new();
    let mut i = 1;
    while i < args.len() {
        if args[i] == "--runs" {
            match args.get(i + 1).and_then(|v| v.parse::<u32>().ok()) {
                Some(n) if n > 0 => {
                    runs = n;
                    i += 2;
                }
                _ => {
                    eprintln!("ERROR: --runs requires a positive integer argument.");
                    std::process::exit(1);
                }
            }
        } else {
            files.push(&args[i]);
            i += 1;
        }
    }

    if files.is_empty() {
        eprintln!(
            "Usage: {} [--runs N] <file.tck|trk|trx|vtk|tt>[.gz] ...",
            args[0]
        );
        std::process::exit(1);
    }

    let mut failures = 0;
    for path in files {
        if let Err(message) = bench_file(path, runs) {
            eprintln!("ERROR: {}: {}", path, message);
            failures += 1;
        }
    }
    if failures > 0 {
        std::process::exit(1);
    }
}

/// Decode one file `runs` times and print a TSV row:
/// format, path, size in bytes, streamline count, best time in ms.
fn bench_file(path: &str, runs: u32) -> Result<(), String> {
    let raw = fs::read(path).map_err(|e| e.to_string())?;
    let size = raw.len();

    // Strip a trailing .gz before extension inspection.
    let stem = path.strip_suffix(".gz").unwrap_or(path);
    let extension = stem
        .rsplit('.')
        .next()
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    let decode: fn(&[u8]) -> tracto_reader::Result<Tractogram> = match extension.as_str() {
        "tck" => decode_tck,
        "trk" => decode_trk,
        "trx" => decode_trx,
        "vtk" => decode_vtk,
        "tt" => decode_tt,
        other => return Err(format!("unknown file extension {:?}", other)),
    };

    let buffer = if compression::is_gzip(&raw) {
        compression::gunzip(&raw).map_err(|e| e.to_string())?
    } else {
        raw
    };

    let mut best_ms = f64::INFINITY;
    let mut streamlines = 0;
    for _ in 0..runs {
        let start = Instant::now();
        let tractogram = decode(&buffer).map_err(|e| e.to_string())?;
        let elapsed = start.elapsed().as_secs_f64() * 1000.0;
        best_ms = best_ms.min(elapsed);
        streamlines = tractogram.streamline_count();
    }

    println!(
        "{}\t{}\t{}\t{}\t{:.4}",
        extension, path, size, streamlines, best_ms
    );
    Ok(())
}
