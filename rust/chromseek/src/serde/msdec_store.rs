//! Binary store of [`MsDecResult`] records with random access.
//!
//! Little endian layout:
//!
//! ```text
//! "MSDC" | version u32 | count u64 | count x u64 record offsets
//! record: header | (mz f64, intensity f64)* | model mass f64* | (rt f64, intensity f64)*
//! ```
//!
//! The header is versioned. Version 1 headers (no drift, no purity) are
//! migrated to the current layout on read, writing always produces the
//! current version.

use byteorder::{
    LittleEndian,
    ReadBytesExt,
    WriteBytesExt,
};
use chromquery::{
    ChromXType,
    ChromXs,
    SpectrumPeak,
};
use std::fs::File;
use std::io::{
    BufReader,
    BufWriter,
    Read,
    Seek,
    SeekFrom,
    Write,
};
use std::path::{
    Path,
    PathBuf,
};
use tracing::debug;

use crate::models::{
    ModelChromatogramPoint,
    MsDecResult,
};

pub const STORE_MAGIC: [u8; 4] = *b"MSDC";
pub const STORE_VERSION: u32 = 2;
/// Magic, version and record count.
const PREAMBLE_LEN: u64 = 4 + 4 + 8;

#[derive(Debug)]
pub enum StoreError {
    Io {
        source: std::io::Error,
        path: PathBuf,
    },
    BadMagic {
        path: PathBuf,
    },
    UnsupportedVersion {
        version: u32,
        path: PathBuf,
    },
    IndexOutOfRange {
        index: usize,
        len: usize,
    },
    RecordCountMismatch {
        expected: usize,
        written: usize,
    },
    CorruptRecord {
        index: usize,
        msg: String,
    },
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { source, path } => write!(f, "I/O error on store {}: {}", path.display(), source),
            Self::BadMagic { path } => write!(f, "{} is not an MSDec store", path.display()),
            Self::UnsupportedVersion { version, path } => {
                write!(f, "Unsupported MSDec store version {} in {}", version, path.display())
            }
            Self::IndexOutOfRange { index, len } => {
                write!(f, "Record {} out of range, store has {} records", index, len)
            }
            Self::RecordCountMismatch { expected, written } => write!(
                f,
                "Store was created for {} records but {} were written",
                expected, written
            ),
            Self::CorruptRecord { index, msg } => write!(f, "Corrupt record {}: {}", index, msg),
        }
    }
}

impl std::error::Error for StoreError {}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        source,
        path: path.to_path_buf(),
    }
}

fn axis_code(axis: ChromXType) -> u8 {
    match axis {
        ChromXType::Rt => 0,
        ChromXType::Ri => 1,
        ChromXType::Drift => 2,
    }
}

fn axis_from_code(code: u8) -> Option<ChromXType> {
    match code {
        0 => Some(ChromXType::Rt),
        1 => Some(ChromXType::Ri),
        2 => Some(ChromXType::Drift),
        _ => None,
    }
}

/// Header of the first store version.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MsDecHeaderV1 {
    pub scan_id: u64,
    pub raw_spectrum_id: i64,
    pub rt: f64,
    pub ri: f64,
    pub main_axis: u8,
    pub precursor_mz: f64,
    pub model_peak_mz: f64,
    pub model_peak_height: f64,
    pub model_peak_area: f64,
    pub num_spectrum: u32,
    pub num_model_masses: u32,
    pub num_model_chromatogram: u32,
}

impl MsDecHeaderV1 {
    fn read_from<R: Read>(r: &mut R) -> std::io::Result<Self> {
        Ok(Self {
            scan_id: r.read_u64::<LittleEndian>()?,
            raw_spectrum_id: r.read_i64::<LittleEndian>()?,
            rt: r.read_f64::<LittleEndian>()?,
            ri: r.read_f64::<LittleEndian>()?,
            main_axis: r.read_u8()?,
            precursor_mz: r.read_f64::<LittleEndian>()?,
            model_peak_mz: r.read_f64::<LittleEndian>()?,
            model_peak_height: r.read_f64::<LittleEndian>()?,
            model_peak_area: r.read_f64::<LittleEndian>()?,
            num_spectrum: r.read_u32::<LittleEndian>()?,
            num_model_masses: r.read_u32::<LittleEndian>()?,
            num_model_chromatogram: r.read_u32::<LittleEndian>()?,
        })
    }
}

/// Current header.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MsDecHeaderV2 {
    pub scan_id: u64,
    /// -1 when the result has no MS2 scan.
    pub raw_spectrum_id: i64,
    pub rt: f64,
    pub ri: f64,
    pub drift: f64,
    pub main_axis: u8,
    pub precursor_mz: f64,
    pub model_peak_mz: f64,
    pub model_peak_height: f64,
    pub model_peak_area: f64,
    pub model_peak_purity: f64,
    pub num_spectrum: u32,
    pub num_model_masses: u32,
    pub num_model_chromatogram: u32,
}

/// Version 1 records had no drift coordinate and no purity, both become 0.
impl From<MsDecHeaderV1> for MsDecHeaderV2 {
    fn from(v1: MsDecHeaderV1) -> Self {
        Self {
            scan_id: v1.scan_id,
            raw_spectrum_id: v1.raw_spectrum_id,
            rt: v1.rt,
            ri: v1.ri,
            drift: 0.0,
            main_axis: v1.main_axis,
            precursor_mz: v1.precursor_mz,
            model_peak_mz: v1.model_peak_mz,
            model_peak_height: v1.model_peak_height,
            model_peak_area: v1.model_peak_area,
            model_peak_purity: 0.0,
            num_spectrum: v1.num_spectrum,
            num_model_masses: v1.num_model_masses,
            num_model_chromatogram: v1.num_model_chromatogram,
        }
    }
}

impl MsDecHeaderV2 {
    fn read_from<R: Read>(r: &mut R) -> std::io::Result<Self> {
        Ok(Self {
            scan_id: r.read_u64::<LittleEndian>()?,
            raw_spectrum_id: r.read_i64::<LittleEndian>()?,
            rt: r.read_f64::<LittleEndian>()?,
            ri: r.read_f64::<LittleEndian>()?,
            drift: r.read_f64::<LittleEndian>()?,
            main_axis: r.read_u8()?,
            precursor_mz: r.read_f64::<LittleEndian>()?,
            model_peak_mz: r.read_f64::<LittleEndian>()?,
            model_peak_height: r.read_f64::<LittleEndian>()?,
            model_peak_area: r.read_f64::<LittleEndian>()?,
            model_peak_purity: r.read_f64::<LittleEndian>()?,
            num_spectrum: r.read_u32::<LittleEndian>()?,
            num_model_masses: r.read_u32::<LittleEndian>()?,
            num_model_chromatogram: r.read_u32::<LittleEndian>()?,
        })
    }

    fn write_to<W: Write>(&self, w: &mut W) -> std::io::Result<()> {
        w.write_u64::<LittleEndian>(self.scan_id)?;
        w.write_i64::<LittleEndian>(self.raw_spectrum_id)?;
        w.write_f64::<LittleEndian>(self.rt)?;
        w.write_f64::<LittleEndian>(self.ri)?;
        w.write_f64::<LittleEndian>(self.drift)?;
        w.write_u8(self.main_axis)?;
        w.write_f64::<LittleEndian>(self.precursor_mz)?;
        w.write_f64::<LittleEndian>(self.model_peak_mz)?;
        w.write_f64::<LittleEndian>(self.model_peak_height)?;
        w.write_f64::<LittleEndian>(self.model_peak_area)?;
        w.write_f64::<LittleEndian>(self.model_peak_purity)?;
        w.write_u32::<LittleEndian>(self.num_spectrum)?;
        w.write_u32::<LittleEndian>(self.num_model_masses)?;
        w.write_u32::<LittleEndian>(self.num_model_chromatogram)?;
        Ok(())
    }
}

fn array_len(len: usize, what: &str, index: usize) -> Result<u32, StoreError> {
    u32::try_from(len).map_err(|_| StoreError::CorruptRecord {
        index,
        msg: format!("{} has {} entries, more than a record can hold", what, len),
    })
}

/// Serializes one record (header and arrays).
fn encode_record(result: &MsDecResult, index: usize, buf: &mut Vec<u8>) -> Result<(), StoreError> {
    let header = MsDecHeaderV2 {
        scan_id: result.scan_id as u64,
        raw_spectrum_id: result.raw_spectrum_id.map_or(-1, |x| x as i64),
        rt: result.chrom.rt,
        ri: result.chrom.ri,
        drift: result.chrom.drift,
        main_axis: axis_code(result.chrom.main),
        precursor_mz: result.precursor_mz,
        model_peak_mz: result.model_peak_mz,
        model_peak_height: result.model_peak_height,
        model_peak_area: result.model_peak_area,
        model_peak_purity: result.model_peak_purity,
        num_spectrum: array_len(result.spectrum.len(), "spectrum", index)?,
        num_model_masses: array_len(result.model_masses.len(), "model masses", index)?,
        num_model_chromatogram: array_len(result.model_chromatogram.len(), "model chromatogram", index)?,
    };
    // Writes into a Vec<u8> cannot fail.
    let write = |buf: &mut Vec<u8>| -> std::io::Result<()> {
        header.write_to(buf)?;
        for p in result.spectrum.iter() {
            buf.write_f64::<LittleEndian>(p.mz)?;
            buf.write_f64::<LittleEndian>(p.intensity)?;
        }
        for m in result.model_masses.iter() {
            buf.write_f64::<LittleEndian>(*m)?;
        }
        for p in result.model_chromatogram.iter() {
            buf.write_f64::<LittleEndian>(p.rt)?;
            buf.write_f64::<LittleEndian>(p.intensity)?;
        }
        Ok(())
    };
    write(buf).map_err(|e| StoreError::CorruptRecord {
        index,
        msg: e.to_string(),
    })
}

fn decode_body<R: Read>(r: &mut R, header: MsDecHeaderV2, index: usize) -> Result<MsDecResult, StoreError> {
    let corrupt = |msg: String| StoreError::CorruptRecord { index, msg };
    let main = axis_from_code(header.main_axis)
        .ok_or_else(|| corrupt(format!("unknown chromatographic axis {}", header.main_axis)))?;
    let read_body = |r: &mut R| -> std::io::Result<(Vec<SpectrumPeak>, Vec<f64>, Vec<ModelChromatogramPoint>)> {
        let mut spectrum = Vec::with_capacity(header.num_spectrum as usize);
        for _ in 0..header.num_spectrum {
            let mz = r.read_f64::<LittleEndian>()?;
            let intensity = r.read_f64::<LittleEndian>()?;
            spectrum.push(SpectrumPeak::new(mz, intensity));
        }
        let mut masses = Vec::with_capacity(header.num_model_masses as usize);
        for _ in 0..header.num_model_masses {
            masses.push(r.read_f64::<LittleEndian>()?);
        }
        let mut chromatogram = Vec::with_capacity(header.num_model_chromatogram as usize);
        for _ in 0..header.num_model_chromatogram {
            let rt = r.read_f64::<LittleEndian>()?;
            let intensity = r.read_f64::<LittleEndian>()?;
            chromatogram.push(ModelChromatogramPoint { rt, intensity });
        }
        Ok((spectrum, masses, chromatogram))
    };
    let (spectrum, model_masses, model_chromatogram) = read_body(r).map_err(|e| corrupt(e.to_string()))?;

    Ok(MsDecResult {
        scan_id: header.scan_id as usize,
        raw_spectrum_id: usize::try_from(header.raw_spectrum_id).ok(),
        chrom: ChromXs {
            rt: header.rt,
            ri: header.ri,
            drift: header.drift,
            main,
        },
        precursor_mz: header.precursor_mz,
        model_peak_mz: header.model_peak_mz,
        model_peak_height: header.model_peak_height,
        model_peak_area: header.model_peak_area,
        model_peak_purity: header.model_peak_purity,
        model_masses,
        model_chromatogram,
        spectrum,
    })
}

/// Single writer of a store.
///
/// The number of records is fixed on creation, the offsets table is filled
/// in by [`MsDecStoreWriter::finish`].
pub struct MsDecStoreWriter {
    path: PathBuf,
    writer: BufWriter<File>,
    offsets: Vec<u64>,
    expected: usize,
    position: u64,
    buffer: Vec<u8>,
}

impl MsDecStoreWriter {
    pub fn create(path: &Path, num_records: usize) -> Result<Self, StoreError> {
        let file = File::create(path).map_err(io_err(path))?;
        let mut writer = BufWriter::new(file);
        let mut preamble = || -> std::io::Result<()> {
            writer.write_all(&STORE_MAGIC)?;
            writer.write_u32::<LittleEndian>(STORE_VERSION)?;
            writer.write_u64::<LittleEndian>(num_records as u64)?;
            for _ in 0..num_records {
                writer.write_u64::<LittleEndian>(0)?;
            }
            Ok(())
        };
        preamble().map_err(io_err(path))?;
        Ok(Self {
            path: path.to_path_buf(),
            writer,
            offsets: Vec::with_capacity(num_records),
            expected: num_records,
            position: PREAMBLE_LEN + 8 * num_records as u64,
            buffer: Vec::new(),
        })
    }

    pub fn append(&mut self, result: &MsDecResult) -> Result<(), StoreError> {
        let index = self.offsets.len();
        if index >= self.expected {
            return Err(StoreError::RecordCountMismatch {
                expected: self.expected,
                written: index + 1,
            });
        }
        self.buffer.clear();
        encode_record(result, index, &mut self.buffer)?;
        self.writer.write_all(&self.buffer).map_err(io_err(&self.path))?;
        self.offsets.push(self.position);
        self.position += self.buffer.len() as u64;
        Ok(())
    }

    /// Back fills the offsets table and flushes.
    pub fn finish(mut self) -> Result<(), StoreError> {
        if self.offsets.len() != self.expected {
            return Err(StoreError::RecordCountMismatch {
                expected: self.expected,
                written: self.offsets.len(),
            });
        }
        let path = self.path.clone();
        let mut backfill = || -> std::io::Result<()> {
            self.writer.seek(SeekFrom::Start(PREAMBLE_LEN))?;
            for offset in self.offsets.iter() {
                self.writer.write_u64::<LittleEndian>(*offset)?;
            }
            self.writer.flush()
        };
        backfill().map_err(io_err(&path))?;
        debug!("Wrote {} MSDec records to {}", self.expected, path.display());
        Ok(())
    }
}

/// Writes all the results of a file to a new store.
pub fn write_msdec_store(path: &Path, results: &[MsDecResult]) -> Result<(), StoreError> {
    let mut writer = MsDecStoreWriter::create(path, results.len())?;
    for r in results {
        writer.append(r)?;
    }
    writer.finish()
}

/// Random access reader, every reader owns its file handle.
pub struct MsDecStoreReader {
    path: PathBuf,
    reader: BufReader<File>,
    version: u32,
    offsets: Vec<u64>,
}

impl MsDecStoreReader {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let file = File::open(path).map_err(io_err(path))?;
        let mut reader = BufReader::new(file);
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic).map_err(io_err(path))?;
        if magic != STORE_MAGIC {
            return Err(StoreError::BadMagic {
                path: path.to_path_buf(),
            });
        }
        let version = reader.read_u32::<LittleEndian>().map_err(io_err(path))?;
        if version == 0 || version > STORE_VERSION {
            return Err(StoreError::UnsupportedVersion {
                version,
                path: path.to_path_buf(),
            });
        }
        let count = reader.read_u64::<LittleEndian>().map_err(io_err(path))?;
        let mut offsets = Vec::with_capacity(count.min(1 << 20) as usize);
        for _ in 0..count {
            offsets.push(reader.read_u64::<LittleEndian>().map_err(io_err(path))?);
        }
        if version < STORE_VERSION {
            debug!("Store {} has version {}, migrating headers on read", path.display(), version);
        }
        Ok(Self {
            path: path.to_path_buf(),
            reader,
            version,
            offsets,
        })
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Decodes record `index` without touching the records before it.
    pub fn read(&mut self, index: usize) -> Result<MsDecResult, StoreError> {
        let offset = *self.offsets.get(index).ok_or(StoreError::IndexOutOfRange {
            index,
            len: self.offsets.len(),
        })?;
        self.reader
            .seek(SeekFrom::Start(offset))
            .map_err(io_err(&self.path))?;
        let header = match self.version {
            1 => MsDecHeaderV1::read_from(&mut self.reader).map(MsDecHeaderV2::from),
            _ => MsDecHeaderV2::read_from(&mut self.reader),
        }
        .map_err(|e| StoreError::CorruptRecord {
            index,
            msg: e.to_string(),
        })?;
        decode_body(&mut self.reader, header, index)
    }

    pub fn read_all(&mut self) -> Result<Vec<MsDecResult>, StoreError> {
        (0..self.len()).map(|i| self.read(i)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(i: usize) -> MsDecResult {
        MsDecResult {
            scan_id: i,
            raw_spectrum_id: if i % 3 == 0 { None } else { Some(i * 10) },
            chrom: if i % 2 == 0 {
                ChromXs::from_rt(i as f64 * 0.5)
            } else {
                ChromXs::from_drift(i as f64 * 0.5, 20.0 + i as f64)
            },
            precursor_mz: 100.0 + i as f64,
            model_peak_mz: 50.0 + i as f64,
            model_peak_height: 1000.0 * i as f64,
            model_peak_area: 10.0 * i as f64,
            model_peak_purity: 0.5,
            model_masses: (0..i).map(|k| k as f64 * 1.5).collect(),
            model_chromatogram: (0..(i % 4))
                .map(|k| ModelChromatogramPoint {
                    rt: k as f64,
                    intensity: k as f64 * 2.0,
                })
                .collect(),
            spectrum: (0..(i + 1) % 5)
                .map(|k| SpectrumPeak::new(60.0 + k as f64, 1.0 + k as f64))
                .collect(),
        }
    }

    /// Writes a store with version 1 headers.
    fn write_v1(path: &Path, results: &[MsDecResult]) {
        let mut body: Vec<u8> = Vec::new();
        let mut offsets = Vec::new();
        let table_end = PREAMBLE_LEN + 8 * results.len() as u64;
        for r in results {
            offsets.push(table_end + body.len() as u64);
            body.write_u64::<LittleEndian>(r.scan_id as u64).unwrap();
            body.write_i64::<LittleEndian>(r.raw_spectrum_id.map_or(-1, |x| x as i64)).unwrap();
            body.write_f64::<LittleEndian>(r.chrom.rt).unwrap();
            body.write_f64::<LittleEndian>(r.chrom.ri).unwrap();
            body.write_u8(0).unwrap();
            body.write_f64::<LittleEndian>(r.precursor_mz).unwrap();
            body.write_f64::<LittleEndian>(r.model_peak_mz).unwrap();
            body.write_f64::<LittleEndian>(r.model_peak_height).unwrap();
            body.write_f64::<LittleEndian>(r.model_peak_area).unwrap();
            body.write_u32::<LittleEndian>(r.spectrum.len() as u32).unwrap();
            body.write_u32::<LittleEndian>(r.model_masses.len() as u32).unwrap();
            body.write_u32::<LittleEndian>(r.model_chromatogram.len() as u32).unwrap();
            for p in &r.spectrum {
                body.write_f64::<LittleEndian>(p.mz).unwrap();
                body.write_f64::<LittleEndian>(p.intensity).unwrap();
            }
            for m in &r.model_masses {
                body.write_f64::<LittleEndian>(*m).unwrap();
            }
            for p in &r.model_chromatogram {
                body.write_f64::<LittleEndian>(p.rt).unwrap();
                body.write_f64::<LittleEndian>(p.intensity).unwrap();
            }
        }
        let mut out: Vec<u8> = Vec::new();
        out.extend_from_slice(&STORE_MAGIC);
        out.write_u32::<LittleEndian>(1).unwrap();
        out.write_u64::<LittleEndian>(results.len() as u64).unwrap();
        for o in offsets {
            out.write_u64::<LittleEndian>(o).unwrap();
        }
        out.extend_from_slice(&body);
        std::fs::write(path, out).unwrap();
    }

    #[test]
    fn test_round_trip_random_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.msdec");
        let results: Vec<MsDecResult> = (0..20).map(result).collect();
        write_msdec_store(&path, &results).unwrap();

        let mut reader = MsDecStoreReader::open(&path).unwrap();
        assert_eq!(reader.version(), STORE_VERSION);
        assert_eq!(reader.len(), 20);
        for k in [13, 0, 19, 7, 7, 2] {
            assert_eq!(reader.read(k).unwrap(), results[k]);
        }
        assert_eq!(reader.read_all().unwrap(), results);
    }

    #[test]
    fn test_v1_is_migrated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("old.msdec");
        let results: Vec<MsDecResult> = (0..6).step_by(2).map(result).collect();
        write_v1(&path, &results);

        let mut reader = MsDecStoreReader::open(&path).unwrap();
        assert_eq!(reader.version(), 1);
        let second = reader.read(1).unwrap();
        assert_eq!(second.model_peak_purity, 0.0);
        assert_eq!(second.chrom.drift, 0.0);
        assert_eq!(second.spectrum, results[1].spectrum);
        assert_eq!(second.model_masses, results[1].model_masses);
        assert_eq!(second.scan_id, results[1].scan_id);
    }

    #[test]
    fn test_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.msdec");
        std::fs::write(&path, b"NOPE0000000000000000").unwrap();
        assert!(matches!(
            MsDecStoreReader::open(&path),
            Err(StoreError::BadMagic { .. })
        ));

        let path = dir.path().join("short.msdec");
        let mut writer = MsDecStoreWriter::create(&path, 2).unwrap();
        writer.append(&result(1)).unwrap();
        assert!(matches!(
            writer.finish(),
            Err(StoreError::RecordCountMismatch {
                expected: 2,
                written: 1
            })
        ));

        let path = dir.path().join("ok.msdec");
        write_msdec_store(&path, &[result(1)]).unwrap();
        let mut reader = MsDecStoreReader::open(&path).unwrap();
        assert!(matches!(
            reader.read(5),
            Err(StoreError::IndexOutOfRange { index: 5, len: 1 })
        ));
    }

    #[test]
    fn test_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.msdec");
        write_msdec_store(&path, &[]).unwrap();
        let mut reader = MsDecStoreReader::open(&path).unwrap();
        assert!(reader.is_empty());
        assert!(reader.read_all().unwrap().is_empty());
    }
}
