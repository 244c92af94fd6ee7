//! Bearer-token authentication: HS256 issuance/verification and the request
//! guard applied to protected routes.
pub mod middleware;
mod token;

pub use token::{Claims, TokenError, TokenIssuer};
