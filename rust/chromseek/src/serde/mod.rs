pub mod msdec_store;

pub use msdec_store::{
    MsDecStoreReader,
    MsDecStoreWriter,
    StoreError,
    write_msdec_store,
};
