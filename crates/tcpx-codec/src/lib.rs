pub mod packer;
pub use packer::DataPacker;
