use std::collections::hash_map::DefaultHasher;
use std::fs::{self, File};
use std::hash::Hasher;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

pub fn ensure_dir(path: impl AsRef<Path>) -> std::io::Result<()> {
    fs::create_dir_all(path.as_ref())
}

/// Lists every file under `path`, sorted so shard numbering does not depend
/// on file-system iteration order.
pub fn list_files_recursive(path: impl AsRef<Path>) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in walkdir::WalkDir::new(path) {
        let entry = entry?;
        if entry.file_type().is_file() {
            files.push(entry.path().to_path_buf());
        }
    }
    files.sort();
    Ok(files)
}

pub fn read_lines(path: impl AsRef<Path>) -> std::io::Result<impl Iterator<Item = std::io::Result<String>>> {
    let file = File::open(path.as_ref())?;
    let reader = BufReader::new(file);
    Ok(reader.lines())
}

pub fn open_writer(path: impl AsRef<Path>) -> std::io::Result<BufWriter<File>> {
    if let Some(parent) = path.as_ref().parent() {
        ensure_dir(parent)?;
    }
    let file = File::create(path)?;
    Ok(BufWriter::new(file))
}

/// Hash of the serialized key bytes. `DefaultHasher` uses fixed SipHash keys,
/// so the same key bytes land in the same partition across runs.
pub fn hash_key_bytes(key: &[u8]) -> u64 {
    let mut hasher = DefaultHasher::new();
    hasher.write(key);
    hasher.finish()
}

// ========== Intermediate record framing ==========
//
// Spill and partition files hold binary records:
//   [klen u32 LE][vlen u32 LE][shard u32 LE][seq u32 LE][key bytes][value bytes]
// (shard, seq) is the emission stamp: it gives equal keys a total,
// file-order-independent tie-break in the sort stage.

pub const REC_HEADER_LEN: usize = 16;

/// Borrowed view of one framed record.
pub struct RecRef<'a> {
    pub shard: u32,
    pub seq: u32,
    pub key: &'a [u8],
    pub value: &'a [u8],
}

pub fn write_rec(buf: &mut Vec<u8>, shard: u32, seq: u32, key: &[u8], value: &[u8]) {
    buf.extend_from_slice(&(key.len() as u32).to_le_bytes());
    buf.extend_from_slice(&(value.len() as u32).to_le_bytes());
    buf.extend_from_slice(&shard.to_le_bytes());
    buf.extend_from_slice(&seq.to_le_bytes());
    buf.extend_from_slice(key);
    buf.extend_from_slice(value);
}

/// Reads the record starting at `off`; returns it and the offset of the next
/// record, or `None` at end of input.
pub fn read_rec(bytes: &[u8], off: usize) -> Option<(RecRef<'_>, usize)> {
    if off + REC_HEADER_LEN > bytes.len() {
        return None;
    }
    let klen = u32::from_le_bytes(bytes[off..off + 4].try_into().ok()?) as usize;
    let vlen = u32::from_le_bytes(bytes[off + 4..off + 8].try_into().ok()?) as usize;
    let shard = u32::from_le_bytes(bytes[off + 8..off + 12].try_into().ok()?);
    let seq = u32::from_le_bytes(bytes[off + 12..off + 16].try_into().ok()?);
    let key_start = off + REC_HEADER_LEN;
    let end = key_start + klen + vlen;
    if end > bytes.len() {
        return None;
    }
    let rec = RecRef {
        shard,
        seq,
        key: &bytes[key_start..key_start + klen],
        value: &bytes[key_start + klen..end],
    };
    Some((rec, end))
}

pub fn write_line(writer: &mut BufWriter<File>, line: &str) -> std::io::Result<()> {
    writer.write_all(line.as_bytes())?;
    writer.write_all(b"\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rec_framing_round_trips() {
        let mut buf = Vec::new();
        write_rec(&mut buf, 3, 17, b"key-a", b"value-1");
        write_rec(&mut buf, 4, 0, b"k", b"");

        let (first, next) = read_rec(&buf, 0).unwrap();
        assert_eq!(first.shard, 3);
        assert_eq!(first.seq, 17);
        assert_eq!(first.key, b"key-a");
        assert_eq!(first.value, b"value-1");

        let (second, end) = read_rec(&buf, next).unwrap();
        assert_eq!(second.shard, 4);
        assert_eq!(second.key, b"k");
        assert!(second.value.is_empty());
        assert_eq!(end, buf.len());
        assert!(read_rec(&buf, end).is_none());
    }

    #[test]
    fn truncated_input_yields_none() {
        let mut buf = Vec::new();
        write_rec(&mut buf, 0, 0, b"key", b"value");
        assert!(read_rec(&buf[..buf.len() - 1], 0).is_none());
        assert!(read_rec(&buf[..8], 0).is_none());
    }

    #[test]
    fn key_hash_is_stable() {
        assert_eq!(hash_key_bytes(b"u1"), hash_key_bytes(b"u1"));
        assert_ne!(hash_key_bytes(b"u1"), hash_key_bytes(b"u2"));
    }
}
