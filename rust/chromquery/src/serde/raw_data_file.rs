//! Readers (and a writer) for raw scan files.
//!
//! Files are streams of [`RawSpectrum`] records, either one JSON object per
//! line or concatenated MessagePack values, optionally zstd compressed.

use std::fs::File;
use std::io::{
    BufRead,
    BufReader,
    BufWriter,
    Read,
    Write,
};
use std::path::{
    Path,
    PathBuf,
};

use serde::Deserialize;
use tracing::{
    debug,
    info,
};

use crate::errors::{
    DataReadingError,
    UnsupportedDataError,
};
use crate::models::spectrum::RawSpectrum;
use crate::traits::data_provider::InMemoryDataProvider;

const ZSTD_MAGIC: [u8; 4] = [0x28, 0xB5, 0x2F, 0xFD];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawDataFormat {
    NdJson,
    NdJsonZstd,
    MessagePack,
    MessagePackZstd,
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> DataReadingError + '_ {
    move |source| DataReadingError::Io {
        source,
        path: PathBuf::from(path),
    }
}

/// MessagePack streams of records start with a map or an array marker.
fn looks_like_msgpack(first: u8) -> bool {
    matches!(first, 0x80..=0x9f | 0xdc..=0xdf)
}

impl RawDataFormat {
    pub fn is_compressed(&self) -> bool {
        matches!(self, Self::NdJsonZstd | Self::MessagePackZstd)
    }

    pub fn detect_from_path(path: &Path) -> Result<Self, DataReadingError> {
        let path_str = path.to_string_lossy().to_lowercase();

        if path_str.ends_with(".msgpack.zst") {
            Ok(RawDataFormat::MessagePackZstd)
        } else if path_str.ends_with(".msgpack") {
            Ok(RawDataFormat::MessagePack)
        } else if path_str.ends_with(".ndjson.zst") {
            Ok(RawDataFormat::NdJsonZstd)
        } else if path_str.ends_with(".ndjson") || path_str.ends_with(".jsonl") {
            Ok(RawDataFormat::NdJson)
        } else {
            Self::detect_from_content(path)
        }
    }

    fn detect_from_content(path: &Path) -> Result<Self, DataReadingError> {
        let mut reader = BufReader::new(File::open(path).map_err(io_err(path))?);
        let mut buffer = [0u8; 4];
        let read = reader.read(&mut buffer).map_err(io_err(path))?;
        let unknown = || UnsupportedDataError::UnknownFormat {
            path: PathBuf::from(path),
        };

        if read == 4 && buffer == ZSTD_MAGIC {
            // Need to peek inside the frame to know what is compressed.
            let mut decoder = zstd::Decoder::new(File::open(path).map_err(io_err(path))?)
                .map_err(io_err(path))?;
            let mut first = [0u8; 1];
            decoder.read_exact(&mut first).map_err(io_err(path))?;
            return match first[0] {
                b'{' => Ok(RawDataFormat::NdJsonZstd),
                x if looks_like_msgpack(x) => Ok(RawDataFormat::MessagePackZstd),
                _ => Err(unknown().into()),
            };
        }
        match buffer[..read].first() {
            Some(b'{') => Ok(RawDataFormat::NdJson),
            Some(x) if looks_like_msgpack(*x) => Ok(RawDataFormat::MessagePack),
            _ => Err(unknown().into()),
        }
    }
}

struct NdJsonReader<R: BufRead> {
    reader: R,
    line_number: usize,
}

impl<R: BufRead> NdJsonReader<R> {
    fn new(reader: R) -> Self {
        Self {
            reader,
            line_number: 0,
        }
    }
}

impl<R: BufRead> Iterator for NdJsonReader<R> {
    type Item = Result<RawSpectrum, DataReadingError>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut line = String::new();
        loop {
            line.clear();
            self.line_number += 1;
            match self.reader.read_line(&mut line) {
                Ok(0) => return None,
                Ok(_) if line.trim().is_empty() => continue,
                Ok(_) => {
                    return Some(serde_json::from_str(&line).map_err(|source| {
                        DataReadingError::Json {
                            source,
                            line: self.line_number,
                        }
                    }));
                }
                Err(source) => {
                    return Some(Err(DataReadingError::Io {
                        source,
                        path: PathBuf::new(),
                    }));
                }
            }
        }
    }
}

struct MessagePackReader<R: Read> {
    deserializer: rmp_serde::Deserializer<rmp_serde::decode::ReadReader<R>>,
    record: usize,
}

impl<R: Read> MessagePackReader<R> {
    fn new(reader: R) -> Self {
        Self {
            deserializer: rmp_serde::Deserializer::new(reader),
            record: 0,
        }
    }
}

impl<R: Read> Iterator for MessagePackReader<R> {
    type Item = Result<RawSpectrum, DataReadingError>;

    fn next(&mut self) -> Option<Self::Item> {
        let out = match RawSpectrum::deserialize(&mut self.deserializer) {
            Ok(elem) => Some(Ok(elem)),
            Err(rmp_serde::decode::Error::InvalidMarkerRead(ref io_err))
                if io_err.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                None
            }
            Err(source) => Some(Err(DataReadingError::MessagePack {
                source,
                record: self.record,
            })),
        };
        self.record += 1;
        out
    }
}

/// Streaming reader over the records of a raw file.
pub struct RawSpectrumReader<'a> {
    inner: Box<dyn Iterator<Item = Result<RawSpectrum, DataReadingError>> + Send + 'a>,
}

impl<'a> RawSpectrumReader<'a> {
    pub fn new<R: Read + Send + 'a>(
        reader: R,
        format: RawDataFormat,
    ) -> Result<Self, DataReadingError> {
        let zstd_err = |source| DataReadingError::Io {
            source,
            path: PathBuf::from("<zstd stream>"),
        };
        let inner: Box<dyn Iterator<Item = Result<RawSpectrum, DataReadingError>> + Send> =
            match format {
                RawDataFormat::NdJson => Box::new(NdJsonReader::new(BufReader::new(reader))),
                RawDataFormat::NdJsonZstd => {
                    let decoder = zstd::Decoder::new(reader).map_err(zstd_err)?;
                    Box::new(NdJsonReader::new(BufReader::new(decoder)))
                }
                RawDataFormat::MessagePack => Box::new(MessagePackReader::new(reader)),
                RawDataFormat::MessagePackZstd => {
                    let decoder = zstd::Decoder::new(reader).map_err(zstd_err)?;
                    Box::new(MessagePackReader::new(decoder))
                }
            };
        Ok(Self { inner })
    }
}

impl Iterator for RawSpectrumReader<'_> {
    type Item = Result<RawSpectrum, DataReadingError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}

impl InMemoryDataProvider {
    pub fn from_file(path: &Path) -> Result<Self, DataReadingError> {
        let format = RawDataFormat::detect_from_path(path)?;
        Self::from_file_with_format(path, format)
    }

    pub fn from_file_with_format(
        path: &Path,
        format: RawDataFormat,
    ) -> Result<Self, DataReadingError> {
        debug!("Reading {} as {:?}", path.display(), format);
        let file = File::open(path).map_err(io_err(path))?;
        let reader = RawSpectrumReader::new(file, format)?;
        let spectra = reader
            .map(|x| {
                let x = x?;
                x.check_sorted()?;
                Ok(x)
            })
            .collect::<Result<Vec<_>, DataReadingError>>()?;
        info!("Read {} spectra from {}", spectra.len(), path.display());
        Ok(Self::new(spectra))
    }
}

/// Writes scans in the given format, mostly useful to produce test inputs.
pub fn write_raw_spectra(
    path: &Path,
    spectra: &[RawSpectrum],
    format: RawDataFormat,
) -> Result<(), DataReadingError> {
    let file = BufWriter::new(File::create(path).map_err(io_err(path))?);
    let mut writer: Box<dyn Write> = if format.is_compressed() {
        Box::new(
            zstd::Encoder::new(file, 3)
                .map_err(io_err(path))?
                .auto_finish(),
        )
    } else {
        Box::new(file)
    };

    for spec in spectra {
        match format {
            RawDataFormat::NdJson | RawDataFormat::NdJsonZstd => {
                let line = serde_json::to_string(spec)
                    .map_err(|source| DataReadingError::Json { source, line: 0 })?;
                writeln!(writer, "{}", line).map_err(io_err(path))?;
            }
            RawDataFormat::MessagePack | RawDataFormat::MessagePackZstd => {
                let bytes = rmp_serde::to_vec_named(spec).map_err(|e| DataReadingError::Io {
                    source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
                    path: PathBuf::from(path),
                })?;
                writer.write_all(&bytes).map_err(io_err(path))?;
            }
        }
    }
    writer.flush().map_err(io_err(path))?;
    Ok(())
}
