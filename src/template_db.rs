//! Template metadata and on-disk sequence/name readers.
//!
//! Grounded on `reassign.c`'s init block (the `seq_indexes`/`name_indexes`
//! prefix-sum construction from `template_lengths`) and its
//! `reassign_loadseq` cursor save/restore pattern around `.seq.b` reads.

use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};

use anyhow::{bail, Context, Result};

/// Builds the byte-offset table into `.seq.b` for templates `1..=db_size`
/// (index 0 is an unused sentinel, matching the 1-indexed template-id
/// convention). Each template occupies `((len >> 5) + 1) * 8` bytes, the same
/// stride `PackedDna`'s word count follows.
pub fn build_seq_indexes(template_lengths: &[u32]) -> Vec<u64> {
    let mut indexes = vec![0u64; template_lengths.len()];
    for i in 1..template_lengths.len() {
        let words = ((template_lengths[i - 1] as u64) >> 5) + 1;
        indexes[i] = indexes[i - 1] + words * 8;
    }
    indexes
}

/// Builds the byte-offset table into `.name` by scanning for newline
/// terminators; index 0 is an unused sentinel like `build_seq_indexes`.
pub fn build_name_indexes(file: &mut File, db_size: usize) -> Result<Vec<u64>> {
    let start = file.stream_position()?;
    file.rewind()?;
    let mut reader = BufReader::new(&mut *file);
    let mut indexes = vec![0u64; db_size + 1];
    let mut offset = 0u64;
    let mut line = Vec::new();
    for i in 1..=db_size {
        line.clear();
        let n = reader.read_until(b'\n', &mut line)?;
        if n == 0 {
            bail!("Wrong format of DB: *.name has fewer entries than templates");
        }
        indexes[i] = offset;
        offset += n as u64;
    }
    file.seek(SeekFrom::Start(start))?;
    Ok(indexes)
}

/// Reads a template sequence of `len` bases starting at byte `offset` in
/// `.seq.b`, restoring the file cursor afterwards. Ported from
/// `reassign_loadseq`.
pub fn load_seq(file: &mut File, len: u32, offset: u64) -> Result<Vec<u64>> {
    let saved = file.stream_position()?;
    let words = ((len as u64) >> 5) + 1;
    let byte_len = (words * 8) as usize;

    let result = (|| -> Result<Vec<u64>> {
        file.seek(SeekFrom::Start(offset)).context("Corrupted *.seq.b")?;
        let mut buf = vec![0u8; byte_len];
        file.read_exact(&mut buf).context("Corrupted *.seq.b")?;
        Ok(buf
            .chunks_exact(8)
            .map(|chunk| u64::from_le_bytes(chunk.try_into().unwrap()))
            .collect())
    })();

    file.seek(SeekFrom::Start(saved)).context("Corrupted *.seq.b")?;
    result
}

/// Reads a newline-terminated name starting at byte `offset` in `.name`,
/// restoring the file cursor afterwards.
pub fn load_name(file: &mut File, offset: u64) -> Result<String> {
    let saved = file.stream_position()?;

    let result = (|| -> Result<String> {
        file.seek(SeekFrom::Start(offset)).context("Corrupted *.name")?;
        let mut reader = BufReader::new(&mut *file);
        let mut line = Vec::new();
        reader.read_until(b'\n', &mut line).context("Corrupted *.name")?;
        while line.last() == Some(&b'\n') || line.last() == Some(&b'\r') {
            line.pop();
        }
        String::from_utf8(line).context("Corrupted *.name: not valid UTF-8")
    })();

    file.seek(SeekFrom::Start(saved)).context("Corrupted *.name")?;
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn seq_indexes_follow_disk_stride() {
        let lengths = vec![0, 10, 65, 32];
        let indexes = build_seq_indexes(&lengths);
        assert_eq!(indexes[0], 0);
        assert_eq!(indexes[1], 0);
        assert_eq!(indexes[2], 8); // template 1: len=10 -> (10>>5)+1 = 1 word = 8 bytes
        assert_eq!(indexes[3], 8 + 24); // template 2: len=65 -> (65>>5)+1 = 3 words = 24 bytes
    }

    #[test]
    fn load_seq_restores_cursor() -> Result<()> {
        let mut file = NamedTempFile::new()?;
        let words: [u64; 2] = [0x1122_3344_5566_7788, 0x99AA_BBCC_DDEE_FF00];
        for w in &words {
            file.write_all(&w.to_le_bytes())?;
        }
        let mut handle = file.reopen()?;
        handle.seek(SeekFrom::Start(3))?;

        let loaded = load_seq(&mut handle, 40, 0)?; // 40 bases -> (40>>5)+1 = 2 words
        assert_eq!(loaded, words.to_vec());
        assert_eq!(handle.stream_position()?, 3);
        Ok(())
    }

    #[test]
    fn load_seq_reports_corruption() -> Result<()> {
        let file = NamedTempFile::new()?;
        let mut handle = file.reopen()?;
        let err = load_seq(&mut handle, 64, 0).unwrap_err();
        assert!(err.to_string().contains("Corrupted"));
        Ok(())
    }

    #[test]
    fn name_indexes_and_load_round_trip() -> Result<()> {
        let mut file = NamedTempFile::new()?;
        write!(file, "chr1\nchr2_longer\nchr3\n")?;
        let mut handle = file.reopen()?;

        let indexes = build_name_indexes(&mut handle, 3)?;
        assert_eq!(load_name(&mut handle, indexes[1])?, "chr1");
        assert_eq!(load_name(&mut handle, indexes[2])?, "chr2_longer");
        assert_eq!(load_name(&mut handle, indexes[3])?, "chr3");
        Ok(())
    }
}
