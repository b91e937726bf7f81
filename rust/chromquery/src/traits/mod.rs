pub mod data_provider;

pub use data_provider::DataProvider;
