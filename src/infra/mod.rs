pub mod archive;
pub mod collector;
pub mod onionoo;
