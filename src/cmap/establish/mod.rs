pub(crate) mod handshake;

pub use self::handshake::Handshaker;
