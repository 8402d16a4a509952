pub mod bpb;
pub mod debug;
pub mod device;
pub mod dir;
pub mod entry;
pub mod error;
pub mod fat;
pub mod fuse_fs;
pub mod name;
pub mod path;
pub mod reader;
pub mod time;
pub mod volume;

pub use error::Fat32Error;
pub use volume::Volume;
