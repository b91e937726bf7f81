pub mod raw_data_file;

pub use raw_data_file::{
    RawDataFormat,
    RawSpectrumReader,
    write_raw_spectra,
};
