mod open;
mod write;

pub use open::JsonFileStore;
