// src/auth/mod.rs

//! Credentials and access tokens for the batch service.

pub mod credential;
pub mod token;

pub use credential::Credential;
pub use token::{
    AadTokenProvider, AccessToken, Authenticator, DEFAULT_AUTHORITY, TokenManager, TokenProvider,
    TokenRequest,
};
