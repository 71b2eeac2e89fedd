//! xtask probe: print what the parser finds in one WAV file or a folder of them.
//!
//! Runs the same parser the firmware uses, over `LocalFileSource`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use colored::Colorize;
use embassy_futures::block_on;
use platform::file_source::LocalFileSource;
use playback::wav::{self, TAG_BUFFER_SIZE};
use playback::{TrackTags, WavStream};
use walkdir::WalkDir;

/// Parsed view of one file.
pub(crate) struct ProbeReport {
    pub path: PathBuf,
    pub stream: Option<WavStream>,
    pub tags: TrackTags<TAG_BUFFER_SIZE>,
}

/// Entry point called from main.rs
pub fn run(path: &Path) -> Result<()> {
    let files = if path.is_dir() {
        scan_wav_files(path)?
    } else {
        vec![path.to_path_buf()]
    };
    println!("{}", format!("Probing {} file(s)", files.len()).cyan().bold());

    let mut playable = 0usize;
    for file in &files {
        let report = probe_file(file)?;
        print_report(&report);
        if report.stream.is_some() {
            playable = playable.saturating_add(1);
        }
    }
    println!();
    println!("{playable}/{} playable", files.len());
    Ok(())
}

/// Parse `path` with tag extraction.
pub(crate) fn probe_file(path: &Path) -> Result<ProbeReport> {
    let mut src = LocalFileSource::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let mut tags = TrackTags::new();
    let stream = block_on(wav::parse_with_tags(&mut src, &mut tags))
        .with_context(|| format!("failed to read {}", path.display()))?;
    Ok(ProbeReport {
        path: path.to_path_buf(),
        stream,
        tags,
    })
}

/// Recursively collect `*.wav` paths under `dir`, sorted by name.
pub(crate) fn scan_wav_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry?;
        let is_wav = entry
            .path()
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("wav"));
        if entry.file_type().is_file() && is_wav {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

fn print_report(report: &ProbeReport) {
    println!();
    println!("{}", report.path.display().to_string().bold());
    let Some(stream) = report.stream else {
        println!("  {}", "not a playable WAV stream".yellow());
        return;
    };
    let f = stream.format;
    println!(
        "  {} ch, {} Hz, {} bit{}",
        f.channel_count,
        f.sample_rate_hz,
        f.block_size_bits,
        if f.is_packed_24() { " (widened to 32)" } else { "" }
    );
    println!(
        "  data: offset {} length {}",
        stream.cursor.data_offset(),
        stream.cursor.data_len()
    );
    for (label, value) in [
        ("title", report.tags.title_str()),
        ("artist", report.tags.artist_str()),
        ("album", report.tags.album_str()),
    ] {
        if let Some(v) = value {
            println!("  {label}: {v}");
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects,
    clippy::cast_possible_truncation
)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn tagged_wav(artist: &str, data_len: usize) -> Vec<u8> {
        let mut v = Vec::new();
        v.extend_from_slice(b"RIFF\0\0\0\0WAVEfmt ");
        v.extend_from_slice(&16u32.to_le_bytes());
        v.extend_from_slice(&1u16.to_le_bytes());
        v.extend_from_slice(&2u16.to_le_bytes());
        v.extend_from_slice(&44_100u32.to_le_bytes());
        v.extend_from_slice(&176_400u32.to_le_bytes());
        v.extend_from_slice(&4u16.to_le_bytes());
        v.extend_from_slice(&16u16.to_le_bytes());

        let mut list = b"INFO".to_vec();
        list.extend_from_slice(b"IART");
        list.extend_from_slice(&((artist.len() + 1) as u32).to_le_bytes());
        list.extend_from_slice(artist.as_bytes());
        list.push(0);
        v.extend_from_slice(b"LIST");
        v.extend_from_slice(&(list.len() as u32).to_le_bytes());
        v.extend_from_slice(&list);

        v.extend_from_slice(b"data");
        v.extend_from_slice(&(data_len as u32).to_le_bytes());
        v.resize(v.len() + data_len, 0x55);
        let riff_len = (v.len() - 8) as u32;
        v[4..8].copy_from_slice(&riff_len.to_le_bytes());
        v
    }

    #[test]
    fn probe_reads_format_and_tags() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("take.wav");
        fs::write(&path, tagged_wav("Test Artist", 128)).unwrap();

        let report = probe_file(&path).unwrap();
        let stream = report.stream.expect("playable");
        assert_eq!(stream.format.sample_rate_hz, 44_100);
        assert_eq!(stream.cursor.data_len(), 128);
        assert_eq!(report.tags.artist_str(), Some("Test Artist"));
    }

    #[test]
    fn probe_flags_non_wav_as_unplayable() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("notes.wav");
        fs::write(&path, b"just text").unwrap();
        assert!(probe_file(&path).unwrap().stream.is_none());
    }

    #[test]
    fn scan_finds_only_wav_files() {
        let tmp = TempDir::new().unwrap();
        let album = tmp.path().join("Artist").join("Album");
        fs::create_dir_all(&album).unwrap();
        fs::write(album.join("01.wav"), tagged_wav("A", 8)).unwrap();
        fs::write(album.join("02.WAV"), tagged_wav("A", 8)).unwrap();
        fs::write(album.join("cover.jpg"), b"FAKE").unwrap();

        let files = scan_wav_files(tmp.path()).unwrap();
        assert_eq!(files.len(), 2);
    }
}
