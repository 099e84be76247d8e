pub mod decode;
pub mod send;
