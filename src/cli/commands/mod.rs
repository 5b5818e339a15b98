pub mod auth;
pub mod convert;
pub mod credentials;
pub mod platforms;
