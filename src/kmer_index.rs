//! C2 — compressed k-mer hash index: k-mer/cmer -> template-id value vector.
//!
//! Grounded on the `.comp.b` header fields named in spec.md §3/§6
//! (`kmersize`, `prefix`, `prefix_len`, `flag`, `mlen`, `DB_size`, `shmFlag`).
//! `hashmapkma.c` (the real on-disk (de)serializer) was not part of the
//! retrieved source pack, so the binary layout below is this crate's own,
//! internally consistent format — documented in DESIGN.md — rather than a
//! byte-for-byte reproduction of the original database file.
//!
//! Value-vector storage follows the `DB_size < 65535` narrow/wide split
//! described in the data model: small databases store 16-bit template ids,
//! larger ones 32-bit. Lookups return an arena index rather than the vector
//! itself so callers (the scanner) can compare identity cheaply instead of
//! doing a structural comparison (see `reassign_kmers`'s `values == last`
//! compression trick).

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use anyhow::{bail, Context, Result};
use fxhash::FxHashMap;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct KmerIndexHeader {
    pub kmersize: u32,
    pub prefix: u64,
    pub prefix_len: u32,
    pub flag: u32,
    pub mlen: u32,
    pub db_size: u32,
    pub shm_flag: u32,
}

const MAGIC: u64 = 0x4b4d_4143_4f4d_5042; // "KMACOMPB"

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ValueVector {
    Narrow(Vec<u16>),
    Wide(Vec<u32>),
}

impl ValueVector {
    pub fn len(&self) -> usize {
        match self {
            ValueVector::Narrow(v) => v.len(),
            ValueVector::Wide(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> Box<dyn Iterator<Item = u32> + '_> {
        match self {
            ValueVector::Narrow(v) => Box::new(v.iter().map(|&x| x as u32)),
            ValueVector::Wide(v) => Box::new(v.iter().copied()),
        }
    }
}

#[derive(Debug, Default)]
pub struct KmerIndex {
    pub header: KmerIndexHeader,
    buckets: FxHashMap<u64, usize>,
    arena: Vec<ValueVector>,
}

impl KmerIndex {
    pub fn new(header: KmerIndexHeader) -> KmerIndex {
        KmerIndex { header, buckets: FxHashMap::default(), arena: Vec::new() }
    }

    /// Inserts (or replaces) the value vector for `kmer`, returning its arena
    /// index.
    pub fn insert(&mut self, kmer: u64, values: Vec<u32>) -> usize {
        let vector = if self.header.db_size < 65535 {
            ValueVector::Narrow(values.into_iter().map(|v| v as u16).collect())
        } else {
            ValueVector::Wide(values)
        };
        let idx = self.arena.len();
        self.arena.push(vector);
        self.buckets.insert(kmer, idx);
        idx
    }

    /// Deterministic, allocation-free lookup: returns the arena index of the
    /// value vector for `cmer`, if present.
    pub fn lookup(&self, cmer: u64) -> Option<usize> {
        self.buckets.get(&cmer).copied()
    }

    pub fn value_vector(&self, idx: usize) -> &ValueVector {
        &self.arena[idx]
    }

    pub fn bucket_count(&self) -> usize {
        self.arena.len()
    }

    pub fn write<W: Write>(&self, mut w: W) -> Result<()> {
        w.write_all(&MAGIC.to_le_bytes())?;
        w.write_all(&self.header.kmersize.to_le_bytes())?;
        w.write_all(&self.header.prefix.to_le_bytes())?;
        w.write_all(&self.header.prefix_len.to_le_bytes())?;
        w.write_all(&self.header.flag.to_le_bytes())?;
        w.write_all(&self.header.mlen.to_le_bytes())?;
        w.write_all(&self.header.db_size.to_le_bytes())?;
        w.write_all(&self.header.shm_flag.to_le_bytes())?;
        w.write_all(&(self.buckets.len() as u64).to_le_bytes())?;
        for (&cmer, &idx) in &self.buckets {
            let vector = &self.arena[idx];
            w.write_all(&cmer.to_le_bytes())?;
            match vector {
                ValueVector::Narrow(v) => {
                    w.write_all(&[0u8])?;
                    w.write_all(&(v.len() as u32).to_le_bytes())?;
                    for &id in v {
                        w.write_all(&id.to_le_bytes())?;
                    }
                }
                ValueVector::Wide(v) => {
                    w.write_all(&[1u8])?;
                    w.write_all(&(v.len() as u32).to_le_bytes())?;
                    for &id in v {
                        w.write_all(&id.to_le_bytes())?;
                    }
                }
            }
        }
        Ok(())
    }

    pub fn load(path: &Path) -> Result<KmerIndex> {
        let mut file = File::open(path)
            .with_context(|| format!("opening k-mer index at {}", path.display()))?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf).context("reading k-mer index")?;
        Self::from_bytes(&buf)
    }

    /// Memory-maps `path` and parses the index directly from the mapping,
    /// avoiding a full-file copy for large databases.
    pub fn load_mmap(path: &Path) -> Result<KmerIndex> {
        let file = File::open(path)
            .with_context(|| format!("opening k-mer index at {}", path.display()))?;
        let mmap = unsafe { memmap2::Mmap::map(&file) }
            .with_context(|| format!("memory-mapping {}", path.display()))?;
        Self::from_bytes(&mmap)
    }

    fn from_bytes(buf: &[u8]) -> Result<KmerIndex> {
        let mut cursor = Cursor { buf, pos: 0 };
        let magic = cursor.read_u64()?;
        if magic != MAGIC {
            bail!("Wrong format of DB: bad magic in k-mer index");
        }
        let header = KmerIndexHeader {
            kmersize: cursor.read_u32()?,
            prefix: cursor.read_u64()?,
            prefix_len: cursor.read_u32()?,
            flag: cursor.read_u32()?,
            mlen: cursor.read_u32()?,
            db_size: cursor.read_u32()?,
            shm_flag: cursor.read_u32()?,
        };
        let mut index = KmerIndex::new(header);
        let bucket_count = cursor.read_u64()?;
        for _ in 0..bucket_count {
            let cmer = cursor.read_u64()?;
            let kind = cursor.read_u8()?;
            let len = cursor.read_u32()? as usize;
            let values: Vec<u32> = match kind {
                0 => (0..len).map(|_| cursor.read_u16().map(|v| v as u32)).collect::<Result<_>>()?,
                1 => (0..len).map(|_| cursor.read_u32()).collect::<Result<_>>()?,
                _ => bail!("Wrong format of DB: unknown value-vector kind"),
            };
            index.insert(cmer, values);
        }
        Ok(index)
    }
}

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.pos + n > self.buf.len() {
            bail!("Wrong format of DB: truncated k-mer index");
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn read_u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.take(2)?.try_into().unwrap()))
    }

    fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn read_u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }
}
