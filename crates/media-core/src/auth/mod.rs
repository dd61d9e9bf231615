//! Thin auth shim: decode the bearer token a gateway has already validated.

pub mod jwt;

pub use jwt::{BearerDecoder, Claims, JwtError};
