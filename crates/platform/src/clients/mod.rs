pub mod dns;
pub mod oauth;

pub use dns::{DnsService, DnsServiceRef, HttpDnsClient};
pub use oauth::{ClientRegistration, HttpOAuthClient, OAuthService, OAuthServiceRef};
